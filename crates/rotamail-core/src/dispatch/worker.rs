//! Send worker - processes one recipient job through the account rotation

use crate::dispatch::oauth::{ensure_fresh_credential, TokenProvider};
use crate::dispatch::retry::{classify, decide_after_pass, ErrorClass, RetryDecision};
use crate::dispatch::rotation::{cycle_reset, has_usable, trial_order};
use crate::dispatch::template::TemplateRenderer;
use crate::dispatch::tracking::LinkTracker;
use crate::dispatch::transport::{Mailer, OutboundEmail};
use crate::queue::{EnqueueOptions, JobTransport, SendJob};
use chrono::{Duration as ChronoDuration, Utc};
use rotamail_common::config::MailerConfig;
use rotamail_common::{Error, Result};
use rotamail_storage::models::{Campaign, CampaignPatch};
use rotamail_storage::repository::{AccountStore, CampaignStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tunables for one worker instance
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Pause after every successful send
    pub send_delay: Duration,
    /// Delay before a requeued recipient is retried
    pub retry_delay: Duration,
    /// Maximum retry passes per recipient
    pub max_retries: u32,
    /// Consecutive failures before an account goes on cooldown
    pub failure_limit: i32,
    /// Cooldown duration
    pub cooldown: ChronoDuration,
}

impl From<&MailerConfig> for DispatchSettings {
    fn from(config: &MailerConfig) -> Self {
        Self {
            send_delay: Duration::from_millis(config.send_delay_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_retries: config.max_retries_per_email,
            failure_limit: config.account_failure_limit as i32,
            cooldown: ChronoDuration::minutes(config.account_disable_minutes),
        }
    }
}

/// Processes send jobs: renders, instruments, walks the account rotation
/// and persists campaign progress after every attempt.
///
/// One job owns one recipient for a full pass over the rotation. The
/// campaign document is read once per job and written back piecewise, so
/// jobs for the same campaign must not run concurrently.
pub struct SendWorker {
    campaigns: Arc<dyn CampaignStore>,
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
    tokens: Arc<dyn TokenProvider>,
    jobs: Arc<dyn JobTransport>,
    tracker: LinkTracker,
    renderer: TemplateRenderer,
    settings: DispatchSettings,
}

impl SendWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
        tokens: Arc<dyn TokenProvider>,
        jobs: Arc<dyn JobTransport>,
        tracker: LinkTracker,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            campaigns,
            accounts,
            mailer,
            tokens,
            jobs,
            tracker,
            renderer: TemplateRenderer::new(),
            settings,
        }
    }

    /// Process one recipient of one campaign.
    ///
    /// Deleted campaigns, unknown recipients and already-terminal
    /// recipients all short-circuit to Ok: a stale or duplicate job is
    /// not an error.
    pub async fn process_send_job(&self, campaign_id: Uuid, to: &str) -> Result<()> {
        let Some(mut campaign) = self.campaigns.load(campaign_id).await? else {
            debug!(campaign = %campaign_id, "Campaign gone, dropping job");
            return Ok(());
        };

        let Some(idx) = campaign.find_recipient(to) else {
            debug!(campaign = %campaign_id, to, "Recipient not in campaign, dropping job");
            return Ok(());
        };

        if !campaign.recipients[idx].is_pending() {
            debug!(campaign = %campaign_id, to, "Recipient already terminal, dropping job");
            return Ok(());
        }

        let n = campaign.accounts.len();
        if n == 0 {
            debug!(campaign = %campaign_id, "Campaign has no accounts, dropping job");
            return Ok(());
        }

        // The pass starts where the rotation cursor points. The cursor
        // only advances on success, so failed passes retry the same
        // account first.
        let start = (campaign.pointer.max(0) as usize) % n;

        if !has_usable(&campaign.accounts, Utc::now()) {
            debug!(campaign = %campaign_id, "All accounts exhausted, starting a new cycle");
            cycle_reset(&mut campaign.accounts);
        }

        let recipient_addr = campaign.recipients[idx].to.clone();
        let rendered = self
            .renderer
            .render(&campaign.template, &campaign.template_data, &recipient_addr);
        let email = OutboundEmail {
            to: recipient_addr.clone(),
            subject: campaign.subject.clone(),
            html: self.tracker.instrument(&rendered, campaign.id, &recipient_addr),
        };

        let mut saw_transient = false;
        let mut attempted = false;

        for i in trial_order(n, start) {
            if !campaign.accounts[i].is_usable(Utc::now()) {
                continue;
            }
            attempted = true;

            ensure_fresh_credential(
                &mut campaign.accounts[i],
                self.tokens.as_ref(),
                self.accounts.as_ref(),
            )
            .await;

            match self.mailer.deliver(&campaign.accounts[i], &email).await {
                Ok(()) => {
                    return self.record_success(&mut campaign, idx, i, start).await;
                }
                Err(e) => {
                    let message = e.to_string();
                    if classify(&message) == ErrorClass::Transient {
                        saw_transient = true;
                    }
                    self.record_failure(&mut campaign, idx, i, message).await?;
                }
            }
        }

        if !attempted {
            // Every account was on cooldown. Treated as transient so the
            // recipient comes back once a cooldown expires.
            saw_transient = true;
            campaign.recipients[idx].last_error = Some(Error::NoUsableAccount.to_string());
        }

        self.finish_pass(&mut campaign, idx, saw_transient).await
    }

    /// Successful delivery: charge quota, advance the cursor, mark sent
    async fn record_success(
        &self,
        campaign: &mut Campaign,
        idx: usize,
        account_idx: usize,
        start: usize,
    ) -> Result<()> {
        let n = campaign.accounts.len();
        {
            let account = &mut campaign.accounts[account_idx];
            account.remaining = (account.remaining - 1).max(0);
            account.fail_count = 0;
        }
        campaign.pointer = ((start + 1) % n) as i32;

        {
            let recipient = &mut campaign.recipients[idx];
            recipient.sent = true;
            recipient.last_error = None;
        }

        let completed = campaign.recompute_counters(Utc::now());
        self.campaigns
            .patch(campaign.id, CampaignPatch::from_progress(campaign))
            .await?;

        info!(
            campaign = %campaign.id,
            to = %campaign.recipients[idx].to,
            account = %campaign.accounts[account_idx].email,
            "Email sent"
        );
        if completed {
            info!(campaign = %campaign.id, sent = campaign.sent_count, failed = campaign.failed_count, "Campaign completed");
        }

        tokio::time::sleep(self.settings.send_delay).await;
        Ok(())
    }

    /// Failed attempt: bump account health, maybe start a cooldown.
    /// The rotation cursor does not move on failure.
    async fn record_failure(
        &self,
        campaign: &mut Campaign,
        idx: usize,
        account_idx: usize,
        message: String,
    ) -> Result<()> {
        {
            let account = &mut campaign.accounts[account_idx];
            account.fail_count += 1;
            if account.fail_count >= self.settings.failure_limit {
                let until = Utc::now() + self.settings.cooldown;
                account.disabled_until = Some(until);
                account.fail_count = 0;
                warn!(
                    campaign = %campaign.id,
                    account = %account.email,
                    until = %until,
                    "Account on cooldown after repeated failures"
                );
            }
        }
        campaign.recipients[idx].last_error = Some(message.clone());

        warn!(
            campaign = %campaign.id,
            to = %campaign.recipients[idx].to,
            account = %campaign.accounts[account_idx].email,
            error = %message,
            "Delivery attempt failed"
        );

        let patch = CampaignPatch {
            recipients: Some(campaign.recipients.clone()),
            accounts: Some(campaign.accounts.clone()),
            ..Default::default()
        };
        self.campaigns.patch(campaign.id, patch).await
    }

    /// The pass is exhausted with no delivery: count it and either
    /// requeue the recipient or mark it failed for good.
    async fn finish_pass(
        &self,
        campaign: &mut Campaign,
        idx: usize,
        saw_transient: bool,
    ) -> Result<()> {
        campaign.recipients[idx].retries += 1;
        let retries = campaign.recipients[idx].retries;

        match decide_after_pass(saw_transient, retries, self.settings.max_retries) {
            RetryDecision::Requeue => {
                let patch = CampaignPatch {
                    recipients: Some(campaign.recipients.clone()),
                    accounts: Some(campaign.accounts.clone()),
                    ..Default::default()
                };
                self.campaigns.patch(campaign.id, patch).await?;

                let job = SendJob {
                    campaign_id: campaign.id,
                    to: campaign.recipients[idx].to.clone(),
                };
                let key = job.retry_key(retries);
                self.jobs
                    .enqueue(job, EnqueueOptions::delayed(key, self.settings.retry_delay))
                    .await?;

                info!(
                    campaign = %campaign.id,
                    to = %campaign.recipients[idx].to,
                    retries,
                    "Recipient requeued"
                );
            }
            RetryDecision::GiveUp => {
                campaign.recipients[idx].failed = true;
                let completed = campaign.recompute_counters(Utc::now());
                self.campaigns
                    .patch(campaign.id, CampaignPatch::from_progress(campaign))
                    .await?;

                warn!(
                    campaign = %campaign.id,
                    to = %campaign.recipients[idx].to,
                    error = ?campaign.recipients[idx].last_error,
                    "Recipient marked failed"
                );
                if completed {
                    info!(campaign = %campaign.id, sent = campaign.sent_count, failed = campaign.failed_count, "Campaign completed");
                }
            }
        }

        Ok(())
    }
}
