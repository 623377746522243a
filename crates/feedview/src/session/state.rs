use std::fmt::{Display, Formatter};

/// What the background monitor last learned about the backend while idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendAvailability {
    Unknown,
    Online,
    Offline,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The health probe failed: network error, non-200 status or bad body.
    HealthCheckFailed,
    /// The display surface reported that the stream failed to load or dropped.
    StreamLoadFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Not streaming.
    Idle { backend: BackendAvailability },
    /// A health probe has been issued on behalf of a start request.
    CheckingHealth,
    /// The surface is bound to the stream and we are waiting for frames.
    Connecting,
    /// Frames are arriving.
    Live,
    /// The last attempt failed. `reconnecting` is set while an automatic
    /// reconnect is scheduled.
    Error {
        cause: FailureKind,
        reconnecting: bool,
    },
}

impl StreamState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle { .. })
    }

    /// Whether an attempt is already under way, in which case starting again is a no-op.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::CheckingHealth | Self::Connecting | Self::Live)
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::Idle {
            backend: BackendAvailability::Unknown,
        }
    }
}

impl Display for StreamState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle { .. } => write!(f, "idle"),
            Self::CheckingHealth => write!(f, "checking-health"),
            Self::Connecting => write!(f, "connecting"),
            Self::Live => write!(f, "live"),
            Self::Error { .. } => write!(f, "error"),
        }
    }
}
