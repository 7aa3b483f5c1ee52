//! SMTP delivery - lettre transports cached per account credential

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rotamail_common::{Error, Result};
use rotamail_storage::models::{AccountSnapshot, Credential};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// A rendered message ready for delivery
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivery seam. The production implementation speaks SMTP through
/// lettre; tests substitute scripted doubles.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, account: &AccountSnapshot, email: &OutboundEmail) -> Result<()>;
}

/// SMTP mailer with a per-credential transport cache.
///
/// Transports are keyed by account and credential material, so a token
/// refresh naturally rotates to a new connection pool instead of reusing
/// a transport authenticated with the stale token.
pub struct SmtpMailer {
    timeout: Duration,
    transports: Mutex<HashMap<String, AsyncSmtpTransport<Tokio1Executor>>>,
}

impl SmtpMailer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            transports: Mutex::new(HashMap::new()),
        }
    }

    fn build_transport(&self, account: &AccountSnapshot) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let builder = if account.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&account.host)
                .map_err(|e| Error::Smtp(format!("Invalid relay {}: {}", account.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&account.host)
                .map_err(|e| Error::Smtp(format!("Invalid relay {}: {}", account.host, e)))?
        };

        let builder = builder
            .port(account.port as u16)
            .timeout(Some(self.timeout));

        let builder = match &account.credential {
            Credential::Password { user, pass } => {
                builder.credentials(Credentials::new(user.clone(), pass.clone()))
            }
            Credential::OAuth2 { access_token, .. } => {
                let token = access_token
                    .clone()
                    .ok_or_else(|| Error::Smtp("Missing credentials: no access token".to_string()))?;
                builder
                    .credentials(Credentials::new(account.email.clone(), token))
                    .authentication(vec![Mechanism::Xoauth2])
            }
        };

        Ok(builder.build())
    }

    async fn transport_for(&self, account: &AccountSnapshot) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let key = transport_key(account);
        let mut cache = self.transports.lock().await;
        if let Some(transport) = cache.get(&key) {
            return Ok(transport.clone());
        }
        debug!(account = %account.email, "Opening SMTP transport");
        let transport = self.build_transport(account)?;
        cache.insert(key, transport.clone());
        Ok(transport)
    }
}

/// Cache key binding a transport to its credential material
fn transport_key(account: &AccountSnapshot) -> String {
    match &account.credential {
        Credential::Password { .. } => format!("{}:password", account.email),
        Credential::OAuth2 { access_token, .. } => format!(
            "{}:oauth2:{}",
            account.email,
            access_token.as_deref().unwrap_or("noat")
        ),
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, account: &AccountSnapshot, email: &OutboundEmail) -> Result<()> {
        let message = Message::builder()
            .from(
                account
                    .email
                    .parse()
                    .map_err(|e| Error::Smtp(format!("Invalid sender address: {}", e)))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| Error::Smtp(format!("Invalid recipient address: {}", e)))?)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| Error::Smtp(format!("Failed to build message: {}", e)))?;

        let transport = self.transport_for(account).await?;
        transport
            .send(message)
            .await
            .map_err(|e| Error::Smtp(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn password_account() -> AccountSnapshot {
        AccountSnapshot {
            email: "a@x.com".to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            secure: false,
            credential: Credential::Password {
                user: "a@x.com".to_string(),
                pass: "pw".to_string(),
            },
            max_per_cycle: 10,
            remaining: 10,
            fail_count: 0,
            disabled_until: None,
        }
    }

    #[test]
    fn test_transport_key_tracks_credential_material() {
        let mut account = password_account();
        assert_eq!(transport_key(&account), "a@x.com:password");

        account.credential = Credential::OAuth2 {
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            refresh_token: "rt".to_string(),
            access_token: None,
            expires_at: None,
        };
        assert_eq!(transport_key(&account), "a@x.com:oauth2:noat");

        account.credential = Credential::OAuth2 {
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            refresh_token: "rt".to_string(),
            access_token: Some("tok-1".to_string()),
            expires_at: None,
        };
        assert_eq!(transport_key(&account), "a@x.com:oauth2:tok-1");
    }

    #[tokio::test]
    async fn test_oauth_without_token_is_a_credential_error() {
        let mailer = SmtpMailer::new(Duration::from_secs(5));
        let mut account = password_account();
        account.credential = Credential::OAuth2 {
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            refresh_token: "rt".to_string(),
            access_token: None,
            expires_at: None,
        };

        let err = match mailer.build_transport(&account) {
            Ok(_) => panic!("expected a credential error"),
            Err(e) => e,
        };
        // classified as permanent downstream
        assert!(err.to_string().contains("Missing credentials"));
    }
}
