//! Retry policy - failure classification and the after-pass decision

/// Classification of a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying will not help (bad credentials, unresolvable host, ...)
    Permanent,
    /// Worth another attempt later
    Transient,
}

/// Error signatures that mark a failure as permanent. Matched
/// case-insensitively as substrings of the transport error message.
const PERMANENT_SIGNATURES: &[&str] = &[
    "invalid login",
    "missing credentials",
    "username and password not accepted",
    "bad credentials",
    "authentication",
    "535",
    "connection refused",
    "dns error",
    "failed to lookup",
    "name or service not known",
];

/// Classify a delivery error message as permanent or transient.
///
/// Anything that does not match a known permanent signature is treated as
/// transient, including timeouts.
pub fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if PERMANENT_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        ErrorClass::Permanent
    } else {
        ErrorClass::Transient
    }
}

/// What to do with a recipient after a pass over all accounts failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueue the recipient for another pass
    Requeue,
    /// Mark the recipient permanently failed
    GiveUp,
}

/// Decide the recipient's fate after an exhausted pass.
///
/// `retries` is the cumulative pass count including the one that just
/// failed. A recipient is requeued only when at least one failure in the
/// pass was transient and the retry budget is not spent.
pub fn decide_after_pass(saw_transient: bool, retries: u32, max_retries: u32) -> RetryDecision {
    if saw_transient && retries <= max_retries {
        RetryDecision::Requeue
    } else {
        RetryDecision::GiveUp
    }
}
