//! Sending account handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rotamail_common::Error;
use rotamail_storage::models::{Account, AccountPatch, Credential};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::handlers::{ApiError, ApiResult};
use crate::state::AppState;

/// Account creation payload
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: i32,
    #[serde(default)]
    pub secure: bool,
    pub credential: Credential,
    #[serde(default = "default_max_per_cycle")]
    pub max_per_cycle: i32,
}

fn default_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_port() -> i32 {
    587
}

fn default_max_per_cycle() -> i32 {
    100
}

/// Account as exposed over the API. Credential material stays private;
/// only the mechanism is reported.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub email: String,
    pub host: String,
    pub port: i32,
    pub secure: bool,
    pub auth: &'static str,
    pub max_per_cycle: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            email: account.email,
            host: account.host,
            port: account.port,
            secure: account.secure,
            auth: match account.credential {
                Credential::Password { .. } => "password",
                Credential::OAuth2 { .. } => "oauth2",
            },
            max_per_cycle: account.max_per_cycle,
            created_at: account.created_at,
        }
    }
}

fn validate_create(input: &CreateAccountRequest) -> Result<(), Error> {
    if input.email.trim().is_empty() || !input.email.contains('@') {
        return Err(Error::Validation("email must be a valid address".to_string()));
    }
    if input.host.trim().is_empty() {
        return Err(Error::Validation("host must not be empty".to_string()));
    }
    if !(1..=65535).contains(&input.port) {
        return Err(Error::Validation("port must be in 1..=65535".to_string()));
    }
    if input.max_per_cycle <= 0 {
        return Err(Error::Validation("max_per_cycle must be positive".to_string()));
    }
    if !input.credential.is_complete() {
        return Err(Error::Validation("credential is incomplete".to_string()));
    }
    Ok(())
}

/// Register a sending account
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateAccountRequest>,
) -> ApiResult<(StatusCode, Json<AccountResponse>)> {
    validate_create(&input)?;

    let account = Account {
        email: input.email.trim().to_lowercase(),
        host: input.host.trim().to_string(),
        port: input.port,
        secure: input.secure,
        credential: input.credential,
        max_per_cycle: input.max_per_cycle,
        created_at: Utc::now(),
    };

    let created = state.accounts.insert(&account).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// List sending accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<AccountResponse>>> {
    let accounts = state.accounts.load_all().await?;
    Ok(Json(accounts.into_iter().map(Into::into).collect()))
}

/// Partially update a sending account
pub async fn patch_account(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
    Json(patch): Json<AccountPatch>,
) -> ApiResult<Json<AccountResponse>> {
    if let Some(port) = patch.port {
        if !(1..=65535).contains(&port) {
            return Err(ApiError(Error::Validation(
                "port must be in 1..=65535".to_string(),
            )));
        }
    }
    if let Some(credential) = &patch.credential {
        if !credential.is_complete() {
            return Err(ApiError(Error::Validation(
                "credential is incomplete".to_string(),
            )));
        }
    }

    let updated = state
        .accounts
        .patch(&email.to_lowercase(), patch)
        .await?
        .ok_or(Error::NotFound(format!("account {}", email)))?;

    Ok(Json(updated.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, host: &str) -> CreateAccountRequest {
        CreateAccountRequest {
            email: email.to_string(),
            host: host.to_string(),
            port: 587,
            secure: false,
            credential: Credential::Password {
                user: email.to_string(),
                pass: "pw".to_string(),
            },
            max_per_cycle: 100,
        }
    }

    #[test]
    fn test_validate_create() {
        assert!(validate_create(&request("a@x.com", "smtp.x.com")).is_ok());
        assert!(validate_create(&request("not-an-address", "smtp.x.com")).is_err());
        assert!(validate_create(&request("a@x.com", " ")).is_err());

        let mut bad_quota = request("a@x.com", "smtp.x.com");
        bad_quota.max_per_cycle = 0;
        assert!(validate_create(&bad_quota).is_err());

        let mut bad_cred = request("a@x.com", "smtp.x.com");
        bad_cred.credential = Credential::Password {
            user: "a@x.com".to_string(),
            pass: String::new(),
        };
        assert!(validate_create(&bad_cred).is_err());
    }

    #[test]
    fn test_response_redacts_credential() {
        let account = Account {
            email: "a@x.com".to_string(),
            host: "smtp.x.com".to_string(),
            port: 587,
            secure: false,
            credential: Credential::Password {
                user: "a@x.com".to_string(),
                pass: "hunter2".to_string(),
            },
            max_per_cycle: 100,
            created_at: Utc::now(),
        };
        let response = AccountResponse::from(account);
        assert_eq!(response.auth, "password");

        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
