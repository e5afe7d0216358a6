//! Restart supervisor
//!
//! Consulted only when an instance reaches FAILED on abnormal exit; a
//! clean or requested stop never gets here — the control loop routes
//! those straight to STOPPED. No backoff is applied at this layer; the
//! engine beneath applies its own.

use crate::domain::RestartPolicy;

/// What to do with a freshly failed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Re-launch: exactly one STARTING transition per failure event
    Restart,
    /// Leave it failed; the stack keeps running without it
    GiveUp,
}

/// Map the service's policy and its restart count so far to a decision.
pub fn decide(policy: RestartPolicy, restart_count: u32) -> RestartDecision {
    match policy {
        RestartPolicy::No => RestartDecision::GiveUp,
        RestartPolicy::OnFailure { max_retries: None } => RestartDecision::Restart,
        RestartPolicy::OnFailure {
            max_retries: Some(max),
        } => {
            if restart_count < max {
                RestartDecision::Restart
            } else {
                RestartDecision::GiveUp
            }
        }
    }
}
