//! Credential refresh adapter
//!
//! Ensures a token-based account has a non-expired access credential
//! before a delivery attempt, refreshing through the identity provider
//! and best-effort persisting the new token back to the account store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rotamail_common::config::OAuthConfig;
use rotamail_common::{Error, Result};
use rotamail_storage::models::{AccountPatch, AccountSnapshot, Credential};
use rotamail_storage::repository::AccountStore;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Refresh an access token this close to expiry
const REFRESH_MARGIN_SECS: i64 = 60;

/// A freshly issued access token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Identity-provider adapter
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<AccessToken>;

    /// Exchange an authorization code for tokens (OAuth2 onboarding)
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<AccessToken>;
}

/// Wire shape of a token-endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_access_token(self, issued_at: DateTime<Utc>) -> AccessToken {
        AccessToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| issued_at + Duration::seconds(secs)),
        }
    }
}

/// Token provider backed by a real OAuth2 token endpoint
pub struct HttpTokenProvider {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl HttpTokenProvider {
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn post_token_request(&self, params: HashMap<&str, &str>) -> Result<AccessToken> {
        let issued_at = Utc::now();
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::OAuth(format!("Token endpoint unreachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::OAuth(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::OAuth(format!("Malformed token response: {}", e)))?;

        Ok(token.into_access_token(issued_at))
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<AccessToken> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", client_id);
        params.insert("client_secret", client_secret);

        self.post_token_request(params).await
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<AccessToken> {
        let client_id = self
            .config
            .client_id
            .as_deref()
            .ok_or_else(|| Error::Config("OAuth client_id not configured".to_string()))?;
        let client_secret = self
            .config
            .client_secret
            .as_deref()
            .ok_or_else(|| Error::Config("OAuth client_secret not configured".to_string()))?;

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", client_id);
        params.insert("client_secret", client_secret);
        params.insert("redirect_uri", redirect_uri);

        self.post_token_request(params).await
    }
}

/// Build the provider consent URL for account onboarding.
///
/// Offline access with a forced consent prompt so a refresh token is
/// always issued.
pub fn authorization_url(config: &OAuthConfig, client_id: &str, redirect_uri: &str, state: &str) -> String {
    format!(
        "{}?response_type=code&access_type=offline&prompt=consent&client_id={}&redirect_uri={}&scope={}&state={}",
        config.auth_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&config.scope),
        urlencoding::encode(state)
    )
}

/// Whether a credential needs a refresh before it can authenticate a send
fn needs_refresh(credential: &Credential, now: DateTime<Utc>) -> bool {
    match credential {
        Credential::Password { .. } => false,
        Credential::OAuth2 {
            access_token,
            expires_at,
            ..
        } => {
            if access_token.is_none() {
                return true;
            }
            matches!(expires_at, Some(exp) if *exp - now < Duration::seconds(REFRESH_MARGIN_SECS))
        }
    }
}

/// Ensure the snapshot account carries a usable access credential.
///
/// Password accounts are a no-op. For token accounts close to expiry the
/// refresh token is exchanged and the snapshot updated in place; the new
/// token is then persisted to the live account store best-effort — a
/// refreshed-but-not-persisted token never blocks the current send, it is
/// only observable as a later refresh. A failed refresh also does not
/// block: delivery will fail downstream with a classifiable auth error.
pub async fn ensure_fresh_credential(
    account: &mut AccountSnapshot,
    tokens: &dyn TokenProvider,
    store: &dyn AccountStore,
) {
    let now = Utc::now();
    if !needs_refresh(&account.credential, now) {
        return;
    }

    let Credential::OAuth2 {
        client_id,
        client_secret,
        refresh_token,
        ..
    } = account.credential.clone()
    else {
        return;
    };

    if client_id.is_empty() || client_secret.is_empty() || refresh_token.is_empty() {
        debug!(account = %account.email, "Refresh skipped: incomplete OAuth2 credential");
        return;
    }

    let refreshed = match tokens
        .refresh_access_token(&client_id, &client_secret, &refresh_token)
        .await
    {
        Ok(token) => token,
        Err(e) => {
            warn!(account = %account.email, error = %e, "Access token refresh failed");
            return;
        }
    };

    account.credential = Credential::OAuth2 {
        client_id,
        client_secret,
        refresh_token: refreshed.refresh_token.unwrap_or(refresh_token),
        access_token: Some(refreshed.access_token),
        expires_at: refreshed.expires_at,
    };

    // best-effort write-back to the live account pool
    let patch = AccountPatch {
        credential: Some(account.credential.clone()),
        ..Default::default()
    };
    if let Err(e) = store.patch(&account.email, patch).await {
        warn!(account = %account.email, error = %e, "Failed to persist refreshed token");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotamail_storage::models::Account;
    use std::sync::Mutex;

    struct FakeTokens {
        calls: Mutex<u32>,
        fail: bool,
    }

    #[async_trait]
    impl TokenProvider for FakeTokens {
        async fn refresh_access_token(
            &self,
            _client_id: &str,
            _client_secret: &str,
            _refresh_token: &str,
        ) -> Result<AccessToken> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(Error::OAuth("invalid_grant".to_string()));
            }
            Ok(AccessToken {
                access_token: "fresh-token".to_string(),
                refresh_token: None,
                expires_at: Some(Utc::now() + Duration::hours(1)),
            })
        }

        async fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> Result<AccessToken> {
            unimplemented!("not used in these tests")
        }
    }

    struct FakeStore {
        patches: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AccountStore for FakeStore {
        async fn insert(&self, _account: &Account) -> Result<Account> {
            unimplemented!("not used in these tests")
        }
        async fn load_all(&self) -> Result<Vec<Account>> {
            Ok(Vec::new())
        }
        async fn find(&self, _email: &str) -> Result<Option<Account>> {
            Ok(None)
        }
        async fn patch(&self, email: &str, _patch: AccountPatch) -> Result<Option<Account>> {
            if self.fail {
                return Err(Error::Database("store down".to_string()));
            }
            self.patches.lock().unwrap().push(email.to_string());
            Ok(None)
        }
    }

    fn oauth_snapshot(access_token: Option<&str>, expires_at: Option<DateTime<Utc>>) -> AccountSnapshot {
        AccountSnapshot {
            email: "o@x.com".to_string(),
            host: "smtp.gmail.com".to_string(),
            port: 587,
            secure: false,
            credential: Credential::OAuth2 {
                client_id: "cid".to_string(),
                client_secret: "cs".to_string(),
                refresh_token: "rt".to_string(),
                access_token: access_token.map(String::from),
                expires_at,
            },
            max_per_cycle: 100,
            remaining: 100,
            fail_count: 0,
            disabled_until: None,
        }
    }

    #[tokio::test]
    async fn test_password_account_is_noop() {
        let tokens = FakeTokens { calls: Mutex::new(0), fail: false };
        let store = FakeStore { patches: Mutex::new(Vec::new()), fail: false };
        let mut account = oauth_snapshot(Some("x"), None);
        account.credential = Credential::Password {
            user: "o@x.com".to_string(),
            pass: "pw".to_string(),
        };

        ensure_fresh_credential(&mut account, &tokens, &store).await;
        assert_eq!(*tokens.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fresh_token_is_noop() {
        let tokens = FakeTokens { calls: Mutex::new(0), fail: false };
        let store = FakeStore { patches: Mutex::new(Vec::new()), fail: false };
        let mut account = oauth_snapshot(Some("valid"), Some(Utc::now() + Duration::hours(1)));

        ensure_fresh_credential(&mut account, &tokens, &store).await;
        assert_eq!(*tokens.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expiring_token_is_refreshed_and_persisted() {
        let tokens = FakeTokens { calls: Mutex::new(0), fail: false };
        let store = FakeStore { patches: Mutex::new(Vec::new()), fail: false };
        // inside the 60s safety margin
        let mut account = oauth_snapshot(Some("stale"), Some(Utc::now() + Duration::seconds(30)));

        ensure_fresh_credential(&mut account, &tokens, &store).await;

        assert_eq!(*tokens.calls.lock().unwrap(), 1);
        match &account.credential {
            Credential::OAuth2 { access_token, refresh_token, .. } => {
                assert_eq!(access_token.as_deref(), Some("fresh-token"));
                // refresh token preserved when the provider omits it
                assert_eq!(refresh_token, "rt");
            }
            _ => panic!("credential changed shape"),
        }
        assert_eq!(store.patches.lock().unwrap().as_slice(), ["o@x.com"]);
    }

    #[tokio::test]
    async fn test_missing_access_token_triggers_refresh() {
        let tokens = FakeTokens { calls: Mutex::new(0), fail: false };
        let store = FakeStore { patches: Mutex::new(Vec::new()), fail: false };
        let mut account = oauth_snapshot(None, None);

        ensure_fresh_credential(&mut account, &tokens, &store).await;
        assert_eq!(*tokens.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_leaves_account_unchanged() {
        let tokens = FakeTokens { calls: Mutex::new(0), fail: true };
        let store = FakeStore { patches: Mutex::new(Vec::new()), fail: false };
        let mut account = oauth_snapshot(None, None);
        let before = account.credential.clone();

        ensure_fresh_credential(&mut account, &tokens, &store).await;
        assert_eq!(account.credential, before);
        assert!(store.patches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_is_swallowed() {
        let tokens = FakeTokens { calls: Mutex::new(0), fail: false };
        let store = FakeStore { patches: Mutex::new(Vec::new()), fail: true };
        let mut account = oauth_snapshot(None, None);

        // must not bubble the store error; the refreshed token still applies
        ensure_fresh_credential(&mut account, &tokens, &store).await;
        match &account.credential {
            Credential::OAuth2 { access_token, .. } => {
                assert_eq!(access_token.as_deref(), Some("fresh-token"));
            }
            _ => panic!("credential changed shape"),
        }
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let config = OAuthConfig::default();
        let url = authorization_url(&config, "my-client", "http://cb/oauth2/callback", "st&ate");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=my-client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Fcb%2Foauth2%2Fcallback"));
        assert!(url.contains("state=st%26ate"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
    }
}
