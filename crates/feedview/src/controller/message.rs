use tokio::sync::oneshot;

use crate::status::StatusReport;

#[derive(Debug)]
pub(crate) enum ControllerMessage {
    Start,
    Stop,
    Status(oneshot::Sender<StatusReport>),
    Shutdown,
}

/// Outcome of a health probe running outside the actor.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProbeResult {
    pub(crate) ticket: u64,
    pub(crate) healthy: bool,
}
