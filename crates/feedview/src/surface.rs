pub mod mjpeg;

use feedview_mjpeg::Dimensions;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

pub use mjpeg::{FrameInfo, HttpMjpegSurface};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceEvent {
    Loaded { attempt: u64 },
    Failed { attempt: u64, reason: String },
}

/// Handed to a surface on every bind. Events sent through it are tagged with the
/// attempt the surface was bound for, so reports from an old source are
/// recognised as stale by the controller.
#[derive(Clone, Debug)]
pub struct SurfaceEvents {
    attempt: u64,
    sender: mpsc::UnboundedSender<SurfaceEvent>,
}

impl SurfaceEvents {
    pub(crate) fn new(attempt: u64, sender: mpsc::UnboundedSender<SurfaceEvent>) -> Self {
        Self { attempt, sender }
    }

    /// A handle that is not connected to a controller, for driving a surface directly.
    pub fn detached(attempt: u64) -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(attempt, sender), receiver)
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn loaded(&self) {
        self.send(SurfaceEvent::Loaded {
            attempt: self.attempt,
        });
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.send(SurfaceEvent::Failed {
            attempt: self.attempt,
            reason: reason.into(),
        });
    }

    fn send(&self, event: SurfaceEvent) {
        if self.sender.send(event).is_err() {
            debug!(attempt = self.attempt, "surface event dropped, controller is gone");
        }
    }
}

/// Wherever the stream ends up being shown.
#[async_trait::async_trait]
pub trait DisplaySurface: Send + 'static {
    /// Points the surface at `url`, releasing whatever it showed before.
    async fn bind(&mut self, url: Url, events: SurfaceEvents);

    /// Drops the current source.
    async fn clear(&mut self);

    /// Size of what is currently rendered, for surfaces that cannot report loads.
    fn rendered_dimensions(&self) -> Option<Dimensions>;
}
