pub mod config;
pub mod control;
pub mod controller;
pub mod endpoints;
mod error;
pub mod health;
pub mod session;
pub mod status;
pub mod surface;
#[cfg(test)]
mod test_support;

pub use config::{Config, Readiness, ViewerConfig};
pub use control::{ClickAck, ClickPoint, ControlClient, ReferenceResolution};
pub use controller::ControllerRef;
pub use error::{Error, Result};
pub use feedview_mjpeg::Dimensions;
pub use health::{HealthProbe, HttpHealthProbe};
pub use session::{BackendAvailability, FailureKind, StreamState};
pub use status::StatusReport;
pub use surface::{DisplaySurface, HttpMjpegSurface, SurfaceEvents};
