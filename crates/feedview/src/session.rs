//! The stream session state machine.
//!
//! [`StreamSession`] holds no I/O of its own. Every transition returns the
//! [`Command`]s the owner has to carry out (probe, bind, timers), which keeps
//! the machine synchronous and lets the controller actor own all side effects.
mod state;

use feedview_mjpeg::Dimensions;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{Readiness, ViewerConfig};
use crate::endpoints::Endpoints;
use crate::error::Result;
use crate::status::StatusReport;

pub use state::{BackendAvailability, FailureKind, StreamState};

/// Side effect requested by a session transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Issue one health probe; its result must come back tagged with `ticket`.
    ProbeHealth { ticket: u64 },
    /// Point the display surface at `url`. Events it raises carry `attempt`.
    Bind { attempt: u64, url: Url },
    ClearSurface,
    ScheduleReconnect { delay: Duration },
    CancelReconnect,
    /// Inspect the surface's rendered dimensions once `delay` has passed.
    ScheduleReadinessCheck { attempt: u64, delay: Duration },
}

#[derive(Debug)]
pub struct StreamSession {
    state: StreamState,
    retry_count: u32,
    /// Set by a user start, cleared by a stop or when the session gives up.
    streaming: bool,
    endpoints: Endpoints,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    readiness: Readiness,
    next_ticket: u64,
    pending_probe: Option<u64>,
    pending_monitor: Option<u64>,
    attempt: Option<u64>,
    last_cache_buster: u64,
}

impl StreamSession {
    pub fn new(endpoints: Endpoints, config: &ViewerConfig) -> Self {
        Self {
            state: StreamState::default(),
            retry_count: 0,
            streaming: false,
            endpoints,
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            readiness: config.readiness,
            next_ticket: 0,
            pending_probe: None,
            pending_monitor: None,
            attempt: None,
            last_cache_buster: 0,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::from_config(config)?;
        Ok(Self::new(endpoints, config))
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The stream attempt that surface events are currently accepted for.
    pub fn current_attempt(&self) -> Option<u64> {
        self.attempt
    }

    pub fn report(&self) -> StatusReport {
        StatusReport::new(self.state, self.retry_count)
    }

    pub fn start(&mut self) -> Vec<Command> {
        if self.state.is_active() {
            debug!(state = %self.state, "start requested while an attempt is under way");
            return vec![];
        }

        let mut commands = vec![];
        if matches!(self.state, StreamState::Error { reconnecting: true, .. }) {
            commands.push(Command::CancelReconnect);
        }

        self.streaming = true;
        self.retry_count = 0;
        self.pending_monitor = None;
        self.attempt = None;

        let ticket = self.issue_ticket();
        self.pending_probe = Some(ticket);
        self.state = StreamState::CheckingHealth;
        commands.push(Command::ProbeHealth { ticket });

        commands
    }

    pub fn stop(&mut self) -> Vec<Command> {
        if self.state.is_idle() {
            return vec![];
        }

        info!(state = %self.state, "stopping stream");
        self.streaming = false;
        self.pending_probe = None;
        self.attempt = None;
        self.state = StreamState::Idle {
            backend: BackendAvailability::Unknown,
        };

        let mut commands = vec![Command::CancelReconnect, Command::ClearSurface];
        // refresh the availability indicator straight away
        commands.extend(self.begin_monitor_probe());
        commands
    }

    /// Issues a background availability probe, if the session is not streaming
    /// and none is outstanding.
    pub fn begin_monitor_probe(&mut self) -> Vec<Command> {
        if !self.is_monitoring() || self.pending_monitor.is_some() {
            return vec![];
        }

        let ticket = self.issue_ticket();
        self.pending_monitor = Some(ticket);
        vec![Command::ProbeHealth { ticket }]
    }

    pub fn on_probe_result(&mut self, ticket: u64, healthy: bool) -> Vec<Command> {
        if self.pending_probe == Some(ticket) {
            self.pending_probe = None;
            return self.on_health_checked(healthy);
        }

        if self.pending_monitor == Some(ticket) {
            self.pending_monitor = None;
            if self.is_monitoring() {
                // a settled error gives way to the backend's current availability
                let backend = if healthy {
                    BackendAvailability::Online
                } else {
                    BackendAvailability::Offline
                };
                self.state = StreamState::Idle { backend };
            }
            return vec![];
        }

        debug!(ticket, "ignoring stale health probe result");
        vec![]
    }

    fn on_health_checked(&mut self, healthy: bool) -> Vec<Command> {
        if self.state != StreamState::CheckingHealth {
            debug!(state = %self.state, "health result arrived outside of a health check");
            return vec![];
        }

        if healthy {
            self.connect()
        } else {
            warn!("backend is offline, waiting for a manual restart");
            self.streaming = false;
            self.state = StreamState::Error {
                cause: FailureKind::HealthCheckFailed,
                reconnecting: false,
            };
            vec![]
        }
    }

    pub fn on_surface_loaded(&mut self, attempt: u64) -> Vec<Command> {
        if self.attempt != Some(attempt) {
            debug!(attempt, "ignoring load event from a superseded attempt");
            return vec![];
        }

        if self.state == StreamState::Connecting {
            info!(attempt, "stream is live");
            self.state = StreamState::Live;
            self.retry_count = 0;
        }
        vec![]
    }

    pub fn on_surface_failed(&mut self, attempt: u64) -> Vec<Command> {
        if self.attempt != Some(attempt) {
            debug!(attempt, "ignoring failure from a superseded attempt");
            return vec![];
        }
        if !matches!(self.state, StreamState::Connecting | StreamState::Live) {
            return vec![];
        }

        if self.retry_count >= self.max_reconnect_attempts {
            warn!(
                retries = self.retry_count,
                "giving up on the stream after repeated failures"
            );
            self.streaming = false;
            self.attempt = None;
            self.state = StreamState::Error {
                cause: FailureKind::StreamLoadFailed,
                reconnecting: false,
            };
            return vec![Command::ClearSurface];
        }

        self.retry_count += 1;
        warn!(
            attempt,
            retry = self.retry_count,
            delay_ms = self.reconnect_delay.as_millis() as u64,
            "stream failed, scheduling a reconnect"
        );
        self.state = StreamState::Error {
            cause: FailureKind::StreamLoadFailed,
            reconnecting: true,
        };
        vec![Command::ScheduleReconnect {
            delay: self.reconnect_delay,
        }]
    }

    pub fn on_reconnect_due(&mut self) -> Vec<Command> {
        match self.state {
            StreamState::Error {
                reconnecting: true, ..
            } if self.streaming => self.connect(),
            _ => {
                debug!(state = %self.state, "reconnect timer fired with nothing to do");
                vec![]
            }
        }
    }

    /// Readiness for surfaces without a load event: non-zero rendered
    /// dimensions mean loaded, anything else counts as a failure.
    pub fn on_readiness_polled(
        &mut self,
        attempt: u64,
        dimensions: Option<Dimensions>,
    ) -> Vec<Command> {
        if self.state != StreamState::Connecting {
            return vec![];
        }

        match dimensions {
            Some(d) if !d.is_empty() => self.on_surface_loaded(attempt),
            _ => {
                debug!(attempt, "nothing rendered after the readiness delay");
                self.on_surface_failed(attempt)
            }
        }
    }

    fn connect(&mut self) -> Vec<Command> {
        let attempt = self.issue_ticket();
        let cache_buster = self.next_cache_buster();
        let url = self.endpoints.stream(cache_buster);
        self.attempt = Some(attempt);
        self.state = StreamState::Connecting;

        let mut commands = vec![Command::Bind { attempt, url }];
        if let Readiness::Poll { after_ms } = self.readiness {
            commands.push(Command::ScheduleReadinessCheck {
                attempt,
                delay: Duration::from_millis(after_ms),
            });
        }
        commands
    }

    /// Idle, or in an error that no longer reconnects.
    fn is_monitoring(&self) -> bool {
        !self.streaming && !self.state.is_active()
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Current time in milliseconds, bumped past the previous value so that two
    /// requests in the same millisecond still differ.
    fn next_cache_buster(&mut self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let value = now.max(self.last_cache_buster + 1);
        self.last_cache_buster = value;
        value
    }
}
