//! Open and click tracking handlers
//!
//! These endpoints are hit by mail clients, not API consumers. The open
//! beacon always answers with the pixel so a broken image never shows up
//! in an inbox; the click redirect refuses to touch anything before the
//! signature checks out.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Redirect;
use chrono::Utc;
use rotamail_common::Error;
use rotamail_core::dispatch::is_web_target;
use rotamail_storage::models::CampaignPatch;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::handlers::ApiResult;
use crate::state::AppState;

/// 1x1 transparent GIF
const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, // 1x1, global color table
    0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, // palette
    0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, // transparency
    0x2C, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // image descriptor
    0x02, 0x02, 0x44, 0x01, 0x00, // image data
    0x3B, // trailer
];

/// Open beacon. Records the open best-effort and always serves the pixel.
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Path((id, to)): Path<(Uuid, String)>,
) -> (HeaderMap, &'static [u8]) {
    let to = to.strip_suffix(".gif").unwrap_or(&to);

    if let Err(e) = record_open(&state, id, to).await {
        warn!(campaign = %id, to, error = %e, "Failed to record open");
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    (headers, TRACKING_PIXEL)
}

async fn record_open(state: &AppState, id: Uuid, to: &str) -> rotamail_common::Result<()> {
    let Some(mut campaign) = state.campaigns.load(id).await? else {
        debug!(campaign = %id, "Open for unknown campaign");
        return Ok(());
    };
    let Some(idx) = campaign.find_recipient(to) else {
        debug!(campaign = %id, to, "Open for unknown recipient");
        return Ok(());
    };

    campaign.opens += 1;
    campaign.recipients[idx].opened_at.get_or_insert(Utc::now());

    let patch = CampaignPatch {
        opens: Some(campaign.opens),
        recipients: Some(campaign.recipients.clone()),
        ..Default::default()
    };
    state.campaigns.patch(id, patch).await
}

#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    pub url: String,
    pub to: String,
    pub sig: String,
}

/// Click redirect. The signature covers campaign, target and recipient;
/// nothing is counted and nobody is redirected until it verifies.
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ClickQuery>,
) -> ApiResult<Redirect> {
    if !is_web_target(&query.url) {
        return Err(Error::InvalidTarget(query.url).into());
    }
    if !state.tracker.verify(id, &query.url, &query.to, &query.sig) {
        return Err(Error::SignatureMismatch.into());
    }

    if let Err(e) = record_click(&state, id, &query.to).await {
        warn!(campaign = %id, to = %query.to, error = %e, "Failed to record click");
    }

    Ok(Redirect::temporary(&query.url))
}

async fn record_click(state: &AppState, id: Uuid, to: &str) -> rotamail_common::Result<()> {
    let Some(mut campaign) = state.campaigns.load(id).await? else {
        debug!(campaign = %id, "Click for unknown campaign");
        return Ok(());
    };
    let Some(idx) = campaign.find_recipient(to) else {
        debug!(campaign = %id, to, "Click for unknown recipient");
        return Ok(());
    };

    campaign.clicks += 1;
    campaign.recipients[idx].last_clicked_at = Some(Utc::now());

    let patch = CampaignPatch {
        clicks: Some(campaign.clicks),
        recipients: Some(campaign.recipients.clone()),
        ..Default::default()
    };
    state.campaigns.patch(id, patch).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_pixel_is_a_gif() {
        assert_eq!(&TRACKING_PIXEL[..6], b"GIF89a");
        assert_eq!(TRACKING_PIXEL[TRACKING_PIXEL.len() - 1], 0x3B);
    }
}
