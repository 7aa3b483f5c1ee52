//! Campaign handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rotamail_common::Error;
use rotamail_core::queue::{EnqueueOptions, SendJob};
use rotamail_storage::models::{Account, AccountSnapshot, Campaign, Recipient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::handlers::ApiResult;
use crate::state::AppState;

/// Campaign submission payload
#[derive(Debug, Deserialize)]
pub struct SendCampaignRequest {
    pub subject: String,
    pub template: String,
    #[serde(default)]
    pub template_data: serde_json::Value,
    pub recipients: Vec<String>,
    /// Restrict the rotation to these account emails. Absent means every
    /// registered account.
    #[serde(default)]
    pub accounts: Option<Vec<String>>,
}

/// Campaign list/summary shape
#[derive(Debug, Serialize)]
pub struct CampaignSummary {
    pub id: Uuid,
    pub subject: String,
    pub status: String,
    pub total_count: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    pub opens: i32,
    pub clicks: i32,
    pub accounts: usize,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Campaign> for CampaignSummary {
    fn from(c: &Campaign) -> Self {
        Self {
            id: c.id,
            subject: c.subject.clone(),
            status: c.status.clone(),
            total_count: c.total_count,
            sent_count: c.sent_count,
            failed_count: c.failed_count,
            opens: c.opens,
            clicks: c.clicks,
            accounts: c.accounts.len(),
            completed_at: c.completed_at,
            created_at: c.created_at,
        }
    }
}

/// Account health as exposed on a campaign, without credential material
#[derive(Debug, Serialize)]
pub struct AccountHealth {
    pub email: String,
    pub max_per_cycle: i32,
    pub remaining: i32,
    pub fail_count: i32,
    pub disabled_until: Option<DateTime<Utc>>,
}

impl From<&AccountSnapshot> for AccountHealth {
    fn from(a: &AccountSnapshot) -> Self {
        Self {
            email: a.email.clone(),
            max_per_cycle: a.max_per_cycle,
            remaining: a.remaining,
            fail_count: a.fail_count,
            disabled_until: a.disabled_until,
        }
    }
}

/// Full campaign detail
#[derive(Debug, Serialize)]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub summary: CampaignSummary,
    pub pointer: i32,
    pub recipients: Vec<Recipient>,
    pub account_health: Vec<AccountHealth>,
}

impl From<&Campaign> for CampaignDetail {
    fn from(c: &Campaign) -> Self {
        Self {
            summary: c.into(),
            pointer: c.pointer,
            recipients: c.recipients.clone(),
            account_health: c.accounts.iter().map(Into::into).collect(),
        }
    }
}

fn validate_send(input: &SendCampaignRequest) -> Result<(), Error> {
    if input.subject.trim().is_empty() {
        return Err(Error::Validation("subject must not be empty".to_string()));
    }
    if input.template.trim().is_empty() {
        return Err(Error::Validation("template must not be empty".to_string()));
    }
    if input.recipients.iter().all(|r| r.trim().is_empty()) {
        return Err(Error::Validation(
            "recipients must contain at least one address".to_string(),
        ));
    }
    Ok(())
}

/// Pick the sending accounts for a campaign: optionally restricted to a
/// requested subset, always restricted to complete credentials.
fn select_accounts(all: Vec<Account>, requested: Option<&[String]>) -> Vec<Account> {
    all.into_iter()
        .filter(|a| match requested {
            Some(emails) => emails.iter().any(|e| e.eq_ignore_ascii_case(&a.email)),
            None => true,
        })
        .filter(|a| a.credential.is_complete())
        .collect()
}

/// Submit a campaign: snapshot accounts, dedupe recipients and enqueue
/// one job per recipient.
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<SendCampaignRequest>,
) -> ApiResult<(StatusCode, Json<CampaignSummary>)> {
    validate_send(&input)?;

    let accounts = select_accounts(
        state.accounts.load_all().await?,
        input.accounts.as_deref(),
    );
    if accounts.is_empty() {
        return Err(Error::Validation(
            "no usable sending account is registered".to_string(),
        )
        .into());
    }

    let campaign = Campaign::new(
        input.subject.trim().to_string(),
        input.template,
        input.template_data,
        input.recipients,
        &accounts,
    );
    if campaign.recipients.is_empty() {
        return Err(Error::Validation(
            "recipients must contain at least one address".to_string(),
        )
        .into());
    }

    state.campaigns.insert(&campaign).await?;

    for recipient in &campaign.recipients {
        let job = SendJob {
            campaign_id: campaign.id,
            to: recipient.to.clone(),
        };
        let key = job.idempotency_key();
        if let Err(e) = state.jobs.enqueue(job, EnqueueOptions::immediate(key)).await {
            // the queue poller owns retries; a failed enqueue here only
            // costs this one recipient, so log and keep going
            warn!(campaign = %campaign.id, to = %recipient.to, error = %e, "Failed to enqueue recipient");
        }
    }

    info!(
        campaign = %campaign.id,
        recipients = campaign.total_count,
        accounts = campaign.accounts.len(),
        "Campaign accepted"
    );

    Ok((StatusCode::CREATED, Json((&campaign).into())))
}

/// List campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<CampaignSummary>>> {
    let campaigns = state.campaigns.list().await?;
    Ok(Json(campaigns.iter().map(Into::into).collect()))
}

/// Get one campaign with per-recipient state and account health
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CampaignDetail>> {
    let campaign = state
        .campaigns
        .load(id)
        .await?
        .ok_or(Error::NotFound(format!("campaign {}", id)))?;
    Ok(Json((&campaign).into()))
}

/// Delete a campaign. In-flight jobs for it become no-ops.
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.campaigns.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound(format!("campaign {}", id)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotamail_storage::models::Credential;

    fn account(email: &str, complete: bool) -> Account {
        Account {
            email: email.to_string(),
            host: "smtp.x.com".to_string(),
            port: 587,
            secure: false,
            credential: Credential::Password {
                user: email.to_string(),
                pass: if complete { "pw".to_string() } else { String::new() },
            },
            max_per_cycle: 100,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validate_send() {
        let ok = SendCampaignRequest {
            subject: "Hi".to_string(),
            template: "<p>Hi</p>".to_string(),
            template_data: serde_json::json!({}),
            recipients: vec!["a@x.com".to_string()],
            accounts: None,
        };
        assert!(validate_send(&ok).is_ok());

        let no_subject = SendCampaignRequest {
            subject: " ".to_string(),
            ..destructure(&ok)
        };
        assert!(validate_send(&no_subject).is_err());

        let no_recipients = SendCampaignRequest {
            recipients: vec!["  ".to_string()],
            ..destructure(&ok)
        };
        assert!(validate_send(&no_recipients).is_err());
    }

    fn destructure(r: &SendCampaignRequest) -> SendCampaignRequest {
        SendCampaignRequest {
            subject: r.subject.clone(),
            template: r.template.clone(),
            template_data: r.template_data.clone(),
            recipients: r.recipients.clone(),
            accounts: r.accounts.clone(),
        }
    }

    #[test]
    fn test_select_accounts_filters_incomplete() {
        let all = vec![account("a@x.com", true), account("b@x.com", false)];
        let selected = select_accounts(all, None);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].email, "a@x.com");
    }

    #[test]
    fn test_select_accounts_subset_is_case_insensitive() {
        let all = vec![account("a@x.com", true), account("b@x.com", true)];
        let requested = vec!["B@X.COM".to_string()];
        let selected = select_accounts(all, Some(&requested));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].email, "b@x.com");
    }

    #[test]
    fn test_detail_hides_credentials() {
        let campaign = Campaign::new(
            "Hi".to_string(),
            "x".to_string(),
            serde_json::json!({}),
            vec!["r@x.com".to_string()],
            &[account("a@x.com", true)],
        );
        let detail = CampaignDetail::from(&campaign);
        let json = serde_json::to_string(&detail).unwrap();
        assert!(!json.contains("pw"));
        assert!(json.contains("account_health"));
    }
}
