//! OAuth2 onboarding handlers
//!
//! Two-step flow: `authorize` hands back the provider consent URL, the
//! provider then redirects to `callback` with a code that is exchanged
//! for tokens. The account the flow was started for is upserted: a known
//! account gets its stored credential updated, an unknown one is
//! registered with provider defaults.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use rotamail_common::Error;
use rotamail_core::dispatch::authorization_url;
use rotamail_storage::models::{Account, AccountPatch, Credential};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::handlers::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// Account the consent flow is for; round-tripped via `state`
    pub email: String,
    /// Overrides the configured client id
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
}

/// Build the provider consent URL
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AuthorizeRequest>,
) -> ApiResult<Json<AuthorizeResponse>> {
    if input.email.trim().is_empty() {
        return Err(Error::Validation("email must not be empty".to_string()).into());
    }

    let client_id = input
        .client_id
        .or_else(|| state.oauth.client_id.clone())
        .ok_or(Error::Config("OAuth client_id not configured".to_string()))?;
    let redirect_uri = input
        .redirect_uri
        .or_else(|| state.oauth.redirect_uri.clone())
        .ok_or(Error::Config("OAuth redirect_uri not configured".to_string()))?;

    let url = authorization_url(
        &state.oauth,
        &client_id,
        &redirect_uri,
        input.email.trim(),
    );
    Ok(Json(AuthorizeResponse { url }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: String,
    /// Account email the flow was started for
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub refresh_token: Option<String>,
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether a stored account credential was updated
    pub account_updated: bool,
}

/// Exchange the authorization code for tokens
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Json<CallbackResponse>> {
    let redirect_uri = state
        .oauth
        .redirect_uri
        .clone()
        .ok_or(Error::Config("OAuth redirect_uri not configured".to_string()))?;

    let token = state.tokens.exchange_code(&query.code, &redirect_uri).await?;

    let mut account_updated = false;
    if let Some(email) = query.state.as_deref().filter(|s| !s.is_empty()) {
        account_updated = apply_tokens(
            &state,
            email,
            token.refresh_token.as_deref(),
            &token.access_token,
            token.expires_at,
        )
        .await;
    }

    Ok(Json(CallbackResponse {
        refresh_token: token.refresh_token,
        access_token: token.access_token,
        expires_at: token.expires_at,
        account_updated,
    }))
}

/// Upsert an account with freshly issued tokens: update a stored OAuth2
/// credential in place, or register the account with provider defaults
/// when it does not exist yet.
/// Best-effort: callers still receive the tokens when this fails.
async fn apply_tokens(
    state: &AppState,
    email: &str,
    refresh_token: Option<&str>,
    access_token: &str,
    expires_at: Option<DateTime<Utc>>,
) -> bool {
    let email = email.to_lowercase();
    let account = match state.accounts.find(&email).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            return create_from_tokens(state, &email, refresh_token, access_token, expires_at)
                .await
        }
        Err(e) => {
            warn!(account = %email, error = %e, "Account lookup failed during OAuth callback");
            return false;
        }
    };

    let Credential::OAuth2 {
        client_id,
        client_secret,
        refresh_token: stored_refresh,
        ..
    } = account.credential
    else {
        return false;
    };

    let patch = AccountPatch {
        credential: Some(Credential::OAuth2 {
            client_id,
            client_secret,
            refresh_token: refresh_token.map(String::from).unwrap_or(stored_refresh),
            access_token: Some(access_token.to_string()),
            expires_at,
        }),
        ..Default::default()
    };

    match state.accounts.patch(&account.email, patch).await {
        Ok(Some(_)) => {
            info!(account = %account.email, "OAuth2 credential updated");
            true
        }
        Ok(None) => false,
        Err(e) => {
            warn!(account = %account.email, error = %e, "Failed to store OAuth2 tokens");
            false
        }
    }
}

/// Register a brand-new account from a completed consent flow, using the
/// configured OAuth client and provider defaults for the transport.
async fn create_from_tokens(
    state: &AppState,
    email: &str,
    refresh_token: Option<&str>,
    access_token: &str,
    expires_at: Option<DateTime<Utc>>,
) -> bool {
    let (Some(client_id), Some(client_secret)) = (
        state.oauth.client_id.clone(),
        state.oauth.client_secret.clone(),
    ) else {
        warn!(account = %email, "No OAuth client configured, not registering account");
        return false;
    };
    let Some(refresh_token) = refresh_token else {
        warn!(account = %email, "Provider issued no refresh token, not registering account");
        return false;
    };

    let account = Account {
        email: email.to_string(),
        host: "smtp.gmail.com".to_string(),
        port: 587,
        secure: false,
        credential: Credential::OAuth2 {
            client_id,
            client_secret,
            refresh_token: refresh_token.to_string(),
            access_token: Some(access_token.to_string()),
            expires_at,
        },
        max_per_cycle: 100,
        created_at: Utc::now(),
    };

    match state.accounts.insert(&account).await {
        Ok(_) => {
            info!(account = %email, "Account registered from OAuth2 consent flow");
            true
        }
        Err(e) => {
            warn!(account = %email, error = %e, "Failed to register account");
            false
        }
    }
}
