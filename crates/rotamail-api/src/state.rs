//! Shared API state

use rotamail_common::config::OAuthConfig;
use rotamail_core::dispatch::{LinkTracker, TokenProvider};
use rotamail_core::queue::{JobQueue, JobTransport};
use rotamail_storage::db::DatabasePool;
use rotamail_storage::repository::{AccountStore, CampaignStore};
use std::sync::Arc;

/// Shared state for API handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub accounts: Arc<dyn AccountStore>,
    pub campaigns: Arc<dyn CampaignStore>,
    /// Enqueue seam used when a campaign is submitted
    pub jobs: Arc<dyn JobTransport>,
    /// Concrete queue handle for the status endpoint
    pub queue: Arc<JobQueue>,
    pub tokens: Arc<dyn TokenProvider>,
    pub tracker: LinkTracker,
    pub oauth: OAuthConfig,
}
