//! Dispatch Module - Account rotation, delivery attempts, and retry policy

mod oauth;
mod retry;
mod rotation;
mod template;
mod tracking;
mod transport;
mod worker;

pub use oauth::{
    authorization_url, ensure_fresh_credential, AccessToken, HttpTokenProvider, TokenProvider,
};
pub use retry::{classify, decide_after_pass, ErrorClass, RetryDecision};
pub use rotation::{cycle_reset, has_usable, trial_order};
pub use template::TemplateRenderer;
pub use tracking::{is_web_target, LinkTracker};
pub use transport::{Mailer, OutboundEmail, SmtpMailer};
pub use worker::{DispatchSettings, SendWorker};
