//! Repository layer for data access

pub mod accounts;
pub mod campaigns;

pub use accounts::{AccountStore, DbAccountStore};
pub use campaigns::{CampaignStore, DbCampaignStore};
