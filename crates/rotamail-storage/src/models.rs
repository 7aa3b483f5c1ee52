//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a sending account authenticates against its SMTP endpoint.
///
/// Discriminated explicitly rather than probed by field presence: an
/// account is either password-based or token-based, never an untyped bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Credential {
    #[serde(rename = "password")]
    Password { user: String, pass: String },

    #[serde(rename = "oauth2")]
    OAuth2 {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        access_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
}

impl Credential {
    /// Whether the credential carries everything needed to attempt a send
    pub fn is_complete(&self) -> bool {
        match self {
            Credential::Password { user, pass } => !user.is_empty() && !pass.is_empty(),
            Credential::OAuth2 {
                client_id,
                client_secret,
                refresh_token,
                ..
            } => !client_id.is_empty() && !client_secret.is_empty() && !refresh_token.is_empty(),
        }
    }
}

/// Sending account as stored in the live account pool
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub host: String,
    pub port: i32,
    pub secure: bool,
    #[sqlx(json)]
    pub credential: Credential,
    pub max_per_cycle: i32,
    pub created_at: DateTime<Utc>,
}

/// Partial update for an account. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPatch {
    pub host: Option<String>,
    pub port: Option<i32>,
    pub secure: Option<bool>,
    pub credential: Option<Credential>,
    pub max_per_cycle: Option<i32>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.port.is_none()
            && self.secure.is_none()
            && self.credential.is_none()
            && self.max_per_cycle.is_none()
    }
}

/// Copy of a sending account embedded in a campaign at creation time.
///
/// Health fields (`remaining`, `fail_count`, `disabled_until`) are mutated
/// by the dispatch worker as sends proceed; later edits to the live
/// account do not reach in-flight campaigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub email: String,
    pub host: String,
    pub port: i32,
    pub secure: bool,
    pub credential: Credential,
    pub max_per_cycle: i32,
    pub remaining: i32,
    pub fail_count: i32,
    #[serde(default)]
    pub disabled_until: Option<DateTime<Utc>>,
}

impl AccountSnapshot {
    /// Snapshot a live account with a full quota and clean health
    pub fn from_account(account: &Account) -> Self {
        Self {
            email: account.email.clone(),
            host: account.host.clone(),
            port: account.port,
            secure: account.secure,
            credential: account.credential.clone(),
            max_per_cycle: account.max_per_cycle,
            remaining: account.max_per_cycle,
            fail_count: 0,
            disabled_until: None,
        }
    }

    /// Whether the account is on cooldown at `now`
    pub fn is_disabled(&self, now: DateTime<Utc>) -> bool {
        matches!(self.disabled_until, Some(until) if until > now)
    }

    /// Usable means: not on cooldown and quota left this cycle
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.is_disabled(now) && self.remaining > 0
    }
}

/// Per-recipient delivery state, embedded in a campaign.
///
/// A recipient is in exactly one of three states: pending
/// (`sent == failed == false`), sent, or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub to: String,
    #[serde(default)]
    pub sent: bool,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_clicked_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn new(to: String) -> Self {
        Self {
            to,
            sent: false,
            failed: false,
            retries: 0,
            last_error: None,
            opened_at: None,
            last_clicked_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        !self.sent && !self.failed
    }
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Ongoing,
    Completed,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Ongoing => write!(f, "ongoing"),
            CampaignStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(CampaignStatus::Ongoing),
            "completed" => Ok(CampaignStatus::Completed),
            _ => Err(format!("Unknown campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub subject: String,
    pub template: String,
    pub template_data: serde_json::Value,
    #[sqlx(json)]
    pub recipients: Vec<Recipient>,
    #[sqlx(json)]
    pub accounts: Vec<AccountSnapshot>,
    /// Rotation cursor: index into `accounts` where the next trial starts
    pub pointer: i32,
    pub status: String,
    pub total_count: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub opens: i32,
    pub clicks: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    /// Build a new campaign: dedupe recipients case-insensitively
    /// (first occurrence wins) and snapshot the given accounts.
    pub fn new(
        subject: String,
        template: String,
        template_data: serde_json::Value,
        recipients: Vec<String>,
        accounts: &[Account],
    ) -> Self {
        let recipients = dedupe_recipients(recipients);
        let total = recipients.len() as i32;

        Self {
            id: Uuid::new_v4(),
            subject,
            template,
            template_data,
            recipients,
            accounts: accounts.iter().map(AccountSnapshot::from_account).collect(),
            pointer: 0,
            status: CampaignStatus::Ongoing.to_string(),
            total_count: total,
            sent_count: 0,
            failed_count: 0,
            opens: 0,
            clicks: 0,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Parsed status
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Locate a recipient by address, case-insensitively
    pub fn find_recipient(&self, to: &str) -> Option<usize> {
        self.recipients
            .iter()
            .position(|r| r.to.eq_ignore_ascii_case(to))
    }

    /// Recompute aggregate counters from recipient state and perform the
    /// ongoing -> completed transition when every recipient is terminal.
    ///
    /// Pure over the in-memory document and idempotent: safe to re-run
    /// after any persisted mutation. `completed_at` is set exactly once.
    /// Returns true when the campaign transitioned to completed.
    pub fn recompute_counters(&mut self, now: DateTime<Utc>) -> bool {
        self.sent_count = self.recipients.iter().filter(|r| r.sent).count() as i32;
        self.failed_count = self.recipients.iter().filter(|r| r.failed).count() as i32;

        let done = self.total_count > 0 && self.sent_count + self.failed_count == self.total_count;
        if done && self.status_enum() != Some(CampaignStatus::Completed) {
            self.status = CampaignStatus::Completed.to_string();
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
            return true;
        }
        false
    }
}

/// Dedupe a recipient address list case-insensitively, keeping the first
/// occurrence and its original order.
pub fn dedupe_recipients(addresses: Vec<String>) -> Vec<Recipient> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for addr in addresses {
        let addr = addr.trim().to_lowercase();
        if addr.is_empty() {
            continue;
        }
        if seen.insert(addr.clone()) {
            out.push(Recipient::new(addr));
        }
    }
    out
}

/// Partial update for a campaign. Absent fields are left untouched;
/// present fields are written last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct CampaignPatch {
    pub recipients: Option<Vec<Recipient>>,
    pub accounts: Option<Vec<AccountSnapshot>>,
    pub pointer: Option<i32>,
    pub status: Option<String>,
    pub sent_count: Option<i32>,
    pub failed_count: Option<i32>,
    pub opens: Option<i32>,
    pub clicks: Option<i32>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CampaignPatch {
    /// Patch covering everything one delivery attempt may have mutated
    pub fn from_progress(campaign: &Campaign) -> Self {
        Self {
            recipients: Some(campaign.recipients.clone()),
            accounts: Some(campaign.accounts.clone()),
            pointer: Some(campaign.pointer),
            status: Some(campaign.status.clone()),
            sent_count: Some(campaign.sent_count),
            failed_count: Some(campaign.failed_count),
            completed_at: campaign.completed_at,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_none()
            && self.accounts.is_none()
            && self.pointer.is_none()
            && self.status.is_none()
            && self.sent_count.is_none()
            && self.failed_count.is_none()
            && self.opens.is_none()
            && self.clicks.is_none()
            && self.completed_at.is_none()
    }
}

/// Queued job row. `id` is the producer-supplied idempotency key, so a
/// duplicate enqueue is a no-op at the database level.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn password_account(email: &str) -> Account {
        Account {
            email: email.to_string(),
            host: "smtp.example.com".to_string(),
            port: 587,
            secure: false,
            credential: Credential::Password {
                user: email.to_string(),
                pass: "hunter2".to_string(),
            },
            max_per_cycle: 100,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_credential_tagged_serde() {
        let cred = Credential::OAuth2 {
            client_id: "cid".to_string(),
            client_secret: "cs".to_string(),
            refresh_token: "rt".to_string(),
            access_token: None,
            expires_at: None,
        };
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(json["type"], "oauth2");

        let back: Credential = serde_json::from_value(json).unwrap();
        assert_eq!(back, cred);

        let pw: Credential =
            serde_json::from_str(r#"{"type":"password","user":"u@x.com","pass":"p"}"#).unwrap();
        assert!(pw.is_complete());
    }

    #[test]
    fn test_incomplete_credentials() {
        let cred = Credential::OAuth2 {
            client_id: "cid".to_string(),
            client_secret: String::new(),
            refresh_token: "rt".to_string(),
            access_token: None,
            expires_at: None,
        };
        assert!(!cred.is_complete());
    }

    #[test]
    fn test_snapshot_usability() {
        let now = Utc::now();
        let mut snap = AccountSnapshot::from_account(&password_account("a@x.com"));
        assert_eq!(snap.remaining, 100);
        assert!(snap.is_usable(now));

        snap.remaining = 0;
        assert!(!snap.is_usable(now));

        snap.remaining = 5;
        snap.disabled_until = Some(now + Duration::minutes(10));
        assert!(!snap.is_usable(now));

        // an expired cooldown no longer disables the account
        snap.disabled_until = Some(now - Duration::minutes(1));
        assert!(snap.is_usable(now));
    }

    #[test]
    fn test_dedupe_recipients() {
        let recipients = dedupe_recipients(vec![
            "A@x.com".to_string(),
            "a@x.com ".to_string(),
            "b@x.com".to_string(),
            "".to_string(),
        ]);
        let addresses: Vec<&str> = recipients.iter().map(|r| r.to.as_str()).collect();
        assert_eq!(addresses, vec!["a@x.com", "b@x.com"]);
        assert!(recipients.iter().all(|r| r.is_pending()));
    }

    #[test]
    fn test_recompute_counters_completion() {
        let accounts = vec![password_account("a@x.com")];
        let mut campaign = Campaign::new(
            "Hi".to_string(),
            "<p>Hi</p>".to_string(),
            serde_json::json!({}),
            vec!["a@x.com".to_string(), "b@x.com".to_string()],
            &accounts,
        );
        assert_eq!(campaign.total_count, 2);

        let now = Utc::now();
        campaign.recipients[0].sent = true;
        assert!(!campaign.recompute_counters(now));
        assert_eq!(campaign.sent_count, 1);
        assert_eq!(campaign.status_enum(), Some(CampaignStatus::Ongoing));

        campaign.recipients[1].failed = true;
        assert!(campaign.recompute_counters(now));
        assert_eq!(campaign.status_enum(), Some(CampaignStatus::Completed));
        let completed_at = campaign.completed_at.unwrap();

        // re-running is idempotent and never overwrites completed_at
        let later = now + Duration::seconds(30);
        assert!(!campaign.recompute_counters(later));
        assert_eq!(campaign.completed_at, Some(completed_at));
    }

    #[test]
    fn test_empty_campaign_never_completes() {
        let mut campaign = Campaign::new(
            "Hi".to_string(),
            "x".to_string(),
            serde_json::json!({}),
            vec![],
            &[],
        );
        assert!(!campaign.recompute_counters(Utc::now()));
        assert_eq!(campaign.status_enum(), Some(CampaignStatus::Ongoing));
    }
}
