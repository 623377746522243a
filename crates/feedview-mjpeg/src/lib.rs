//! Crate implementing frame extraction for MJPEG streams.
//!
//! An MJPEG stream is a sequence of JPEG images delivered over a single long-lived
//! HTTP response, usually as a `multipart/x-mixed-replace` body. The [`Parser`] here
//! is fed raw body chunks as they arrive and hands back every complete frame, without
//! caring about part boundaries or part headers.
mod error;
pub mod jpeg;
mod parser;

pub use error::DecodeError;
pub use jpeg::Dimensions;
pub use parser::{Frame, Parser, DEFAULT_MAX_FRAME_LEN};
