//! Configuration for Rotamail

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Dispatch engine configuration
    #[serde(default)]
    pub mailer: MailerConfig,

    /// Job queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Open/click tracking configuration
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// OAuth2 provider configuration
    #[serde(default)]
    pub oauth: OAuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// API port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL used when building tracking links
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            base_url: default_base_url(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_base_url() -> String {
    format!("http://localhost:{}", default_port())
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Dispatch engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailerConfig {
    /// Pause after every successful send, to respect provider rate limits
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,

    /// Maximum retry passes per recipient before marking it failed
    #[serde(default = "default_max_retries")]
    pub max_retries_per_email: u32,

    /// Consecutive failures before an account is put on cooldown
    #[serde(default = "default_failure_limit")]
    pub account_failure_limit: u32,

    /// Cooldown duration once the failure limit is hit
    #[serde(default = "default_disable_minutes")]
    pub account_disable_minutes: i64,

    /// Delay before a requeued recipient is retried
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-attempt SMTP timeout
    #[serde(default = "default_smtp_timeout_secs")]
    pub smtp_timeout_secs: u64,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay_ms(),
            max_retries_per_email: default_max_retries(),
            account_failure_limit: default_failure_limit(),
            account_disable_minutes: default_disable_minutes(),
            retry_delay_ms: default_retry_delay_ms(),
            smtp_timeout_secs: default_smtp_timeout_secs(),
        }
    }
}

fn default_send_delay_ms() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_failure_limit() -> u32 {
    5
}

fn default_disable_minutes() -> i64 {
    20
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

/// Job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Interval between poll cycles (seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Jobs fetched per poll cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Transport-level attempts before a job is parked as failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> i64 {
    10
}

fn default_max_attempts() -> i32 {
    5
}

/// Open/click tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// HMAC secret for click-redirect signatures.
    /// Changing it invalidates every previously sent signed link.
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            secret_key: default_secret_key(),
        }
    }
}

fn default_secret_key() -> String {
    "change-me-in-prod".to_string()
}

/// OAuth2 provider configuration (defaults target Google)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Fallback client id when the account carries none
    pub client_id: Option<String>,

    /// Fallback client secret when the account carries none
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    pub redirect_uri: Option<String>,

    /// Token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Authorization endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Requested scope. The full mail scope improves XOAUTH2 SMTP
    /// compatibility with some providers.
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            token_url: default_token_url(),
            auth_url: default_auth_url(),
            scope: default_scope(),
        }
    }
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_scope() -> String {
    "https://mail.google.com/".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from environment and file
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var("ROTAMAIL_CONFIG") {
            return Self::from_file(std::path::Path::new(&path));
        }

        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/rotamail/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sections() {
        let server = ServerConfig::default();
        assert_eq!(server.port, 8000);
        assert_eq!(server.base_url, "http://localhost:8000");

        let mailer = MailerConfig::default();
        assert_eq!(mailer.send_delay_ms, 300);
        assert_eq!(mailer.max_retries_per_email, 3);
        assert_eq!(mailer.account_failure_limit, 5);
        assert_eq!(mailer.account_disable_minutes, 20);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
port = 9000
base_url = "https://mail.example.com"

[database]
url = "postgres://localhost/rotamail"

[mailer]
send_delay_ms = 100
max_retries_per_email = 2

[tracking]
secret_key = "s3cret"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "postgres://localhost/rotamail");
        assert_eq!(config.mailer.send_delay_ms, 100);
        assert_eq!(config.mailer.max_retries_per_email, 2);
        assert_eq!(config.tracking.secret_key, "s3cret");
        // untouched sections fall back to defaults
        assert_eq!(config.queue.poll_interval_secs, 5);
        assert_eq!(config.oauth.token_url, "https://oauth2.googleapis.com/token");
    }
}
