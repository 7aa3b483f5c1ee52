//! Link signing and instrumentation
//!
//! Rewrites outbound HTML to add an open-tracking beacon and HMAC-signed
//! click-redirect links. Only `http(s)` targets are rewritten; `mailto:`,
//! `javascript:` and relative targets pass through untouched so non-web
//! actions keep working.

use hmac::{Hmac, Mac};
use regex::{Captures, Regex};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Signs and rewrites tracked links for one deployment.
///
/// The signing input ordering (`campaignId|url|recipient`) and the secret
/// are fixed; changing either invalidates every previously sent link.
#[derive(Debug, Clone)]
pub struct LinkTracker {
    base_url: String,
    secret: String,
}

impl LinkTracker {
    pub fn new(base_url: String, secret: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret,
        }
    }

    /// Hex HMAC-SHA-256 signature over `campaignId|url|recipient`
    pub fn sign(&self, campaign_id: Uuid, url: &str, to: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}|{}|{}", campaign_id, url, to).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a click-redirect signature in constant time
    pub fn verify(&self, campaign_id: Uuid, url: &str, to: &str, signature: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}|{}|{}", campaign_id, url, to).as_bytes());
        mac.verify_slice(&sig_bytes).is_ok()
    }

    /// Rewrite hyperlinks to signed redirect URLs and append the
    /// open-tracking beacon.
    pub fn instrument(&self, html: &str, campaign_id: Uuid, to: &str) -> String {
        let re = Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();

        let rewritten = re.replace_all(html, |caps: &Captures| {
            let (quote, url) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => ('"', m.as_str()),
                (_, Some(m)) => ('\'', m.as_str()),
                _ => return caps[0].to_string(),
            };
            let trimmed = url.trim();
            if !is_web_target(trimmed) {
                return caps[0].to_string();
            }
            let tracked = self.redirect_url(campaign_id, trimmed, to);
            format!("href={}{}{}", quote, tracked, quote)
        });

        format!("{}\n{}", rewritten, self.open_pixel(campaign_id, to))
    }

    /// Signed click-redirect URL carrying the original target
    fn redirect_url(&self, campaign_id: Uuid, url: &str, to: &str) -> String {
        let sig = self.sign(campaign_id, url, to);
        format!(
            "{}/api/campaigns/{}/click?url={}&to={}&sig={}",
            self.base_url,
            campaign_id,
            urlencoding::encode(url),
            urlencoding::encode(to),
            sig
        )
    }

    /// Invisible 1x1 open beacon scoped to campaign + recipient
    fn open_pixel(&self, campaign_id: Uuid, to: &str) -> String {
        format!(
            r#"<img src="{}/api/campaigns/{}/open/{}.gif" width="1" height="1" style="display:block" alt=""/>"#,
            self.base_url,
            campaign_id,
            urlencoding::encode(to)
        )
    }
}

/// Only absolute http(s) targets are eligible for rewriting/redirecting
pub fn is_web_target(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
