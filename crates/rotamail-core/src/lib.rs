//! Rotamail Core - Send-dispatch engine
//!
//! Given a campaign and its snapshot of sending accounts, this crate
//! selects an account for one recipient, renders and instruments the
//! message, attempts delivery, updates account health / quota and
//! recipient / campaign progress, and decides whether to retry.

pub mod dispatch;
pub mod queue;

pub use dispatch::{
    classify, DispatchSettings, ErrorClass, LinkTracker, Mailer, OutboundEmail, SendWorker,
    SmtpMailer, TemplateRenderer, TokenProvider,
};
pub use queue::{EnqueueOptions, JobQueue, JobTransport, QueueStats, SendJob};
