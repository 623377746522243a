use crate::session::{BackendAvailability, FailureKind, StreamState};

pub const CLASS_ONLINE: &str = "status online";
pub const CLASS_OFFLINE: &str = "status offline";
pub const CLASS_CHECKING: &str = "status checking";

/// User-facing status line for a session snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub state: StreamState,
    pub retry_count: u32,
    pub text: String,
    pub css_class: &'static str,
}

impl StatusReport {
    pub fn new(state: StreamState, retry_count: u32) -> Self {
        let (text, css_class) = describe(state, retry_count);
        Self {
            state,
            retry_count,
            text,
            css_class,
        }
    }
}

/// Maps a session snapshot to its display text and CSS class.
pub fn describe(state: StreamState, retry_count: u32) -> (String, &'static str) {
    match state {
        StreamState::Idle { backend } => match backend {
            BackendAvailability::Unknown => ("Stream stopped".to_string(), CLASS_OFFLINE),
            BackendAvailability::Online => (
                "Backend online - ready to stream".to_string(),
                CLASS_ONLINE,
            ),
            BackendAvailability::Offline => (
                "Backend offline - check if server is running".to_string(),
                CLASS_OFFLINE,
            ),
        },
        StreamState::CheckingHealth => ("Checking backend...".to_string(), CLASS_CHECKING),
        StreamState::Connecting if retry_count == 0 => {
            ("Connecting to stream...".to_string(), CLASS_CHECKING)
        }
        StreamState::Connecting => (
            format!("Reconnecting (attempt {retry_count})..."),
            CLASS_CHECKING,
        ),
        StreamState::Live => ("Live".to_string(), CLASS_ONLINE),
        StreamState::Error {
            cause: FailureKind::HealthCheckFailed,
            ..
        } => ("Backend offline".to_string(), CLASS_OFFLINE),
        StreamState::Error {
            cause: FailureKind::StreamLoadFailed,
            reconnecting: true,
        } => (
            "Connection lost - reconnecting...".to_string(),
            CLASS_CHECKING,
        ),
        StreamState::Error {
            cause: FailureKind::StreamLoadFailed,
            reconnecting: false,
        } => (
            "Max retries reached - press start to retry".to_string(),
            CLASS_OFFLINE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live() {
        let (text, class) = describe(StreamState::Live, 0);
        assert_eq!(text, "Live");
        assert_eq!(class, CLASS_ONLINE);
    }

    #[test]
    fn test_backend_offline_after_failed_health_check() {
        let state = StreamState::Error {
            cause: FailureKind::HealthCheckFailed,
            reconnecting: false,
        };

        let (text, class) = describe(state, 0);
        assert!(text.contains("offline"));
        assert_eq!(class, CLASS_OFFLINE);
    }

    #[test]
    fn test_reconnect_attempt_is_shown() {
        let (text, class) = describe(StreamState::Connecting, 2);
        assert_eq!(text, "Reconnecting (attempt 2)...");
        assert_eq!(class, CLASS_CHECKING);

        let (text, _) = describe(StreamState::Connecting, 0);
        assert_eq!(text, "Connecting to stream...");
    }

    #[test]
    fn test_terminal_error_asks_for_manual_restart() {
        let state = StreamState::Error {
            cause: FailureKind::StreamLoadFailed,
            reconnecting: false,
        };

        let report = StatusReport::new(state, 5);
        assert_eq!(report.text, "Max retries reached - press start to retry");
        assert_eq!(report.css_class, CLASS_OFFLINE);
        assert_eq!(report.retry_count, 5);
    }

    #[test]
    fn test_idle_reflects_backend_availability() {
        let online = StreamState::Idle {
            backend: BackendAvailability::Online,
        };
        assert_eq!(describe(online, 0).1, CLASS_ONLINE);

        let unknown = StreamState::default();
        assert_eq!(describe(unknown, 0).0, "Stream stopped");
    }
}
