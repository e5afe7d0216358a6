//! Control-loop events
//!
//! Everything the coordinator reacts to: process lifecycle reports from
//! service tasks, probe results from health monitors, and the broadcast
//! teardown request. The coordinator is the only consumer; per-service
//! tasks only ever send.

/// One asynchronous occurrence in the running stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEvent {
    /// The engine reports the container running
    Running { service: String },

    /// A launch attempt failed before the process came up
    StartFailed { service: String, error: String },

    /// The process exited; `failed` marks an abnormal status
    Exited { service: String, failed: bool },

    /// One health probe completed
    Probe { service: String, healthy: bool },

    /// The bring-up retry budget ran out without a single probe success
    ProbeBudgetExhausted { service: String },

    /// Broadcast teardown request for the whole stack
    Shutdown,
}
