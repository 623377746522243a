//! Forwarding clicks on the rendered frame to the backend's control endpoint.
//!
//! The backend works in a fixed reference resolution, so a click is first
//! expressed as a fraction of the displayed frame and then scaled to it.
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::ViewerConfig;
use crate::endpoints::Endpoints;
use crate::error::Result;

/// A position in reference-resolution pixels, as posted to the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClickPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ScreenCoords {
    pub x: i64,
    pub y: i64,
}

/// The backend's answer to a forwarded click.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClickAck {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub screen_coords: Option<ScreenCoords>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceResolution {
    pub width: u32,
    pub height: u32,
}

impl ReferenceResolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Maps a fractional position on the frame to reference pixels.
    ///
    /// Fractions are clamped to `[0, 1]` and the result to the last pixel, so a
    /// click on the far edge stays inside the frame.
    pub fn map_fraction(&self, fx: f64, fy: f64) -> ClickPoint {
        ClickPoint {
            x: scale(fx, self.width),
            y: scale(fy, self.height),
        }
    }

    /// Maps a click at `(px, py)` on a frame displayed at `displayed_width` by
    /// `displayed_height`. Returns `None` while nothing is displayed.
    pub fn map_pixels(
        &self,
        px: f64,
        py: f64,
        displayed_width: f64,
        displayed_height: f64,
    ) -> Option<ClickPoint> {
        if displayed_width <= 0.0 || displayed_height <= 0.0 {
            return None;
        }
        Some(self.map_fraction(px / displayed_width, py / displayed_height))
    }
}

fn scale(fraction: f64, extent: u32) -> i32 {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let last = extent.saturating_sub(1);
    let scaled = (fraction * f64::from(extent)).round().min(f64::from(last));
    // bounded by `last`, which came from a u32 extent
    i32::try_from(scaled as u32).unwrap_or(i32::MAX)
}

pub struct ControlClient {
    client: reqwest::Client,
    url: Url,
    resolution: ReferenceResolution,
}

impl ControlClient {
    pub fn new(client: reqwest::Client, url: Url, resolution: ReferenceResolution) -> Self {
        Self {
            client,
            url,
            resolution,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Result<Self> {
        let endpoints = Endpoints::from_config(config)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::new(
            client,
            endpoints.control().clone(),
            ReferenceResolution::new(config.reference_width, config.reference_height),
        ))
    }

    pub fn resolution(&self) -> ReferenceResolution {
        self.resolution
    }

    pub async fn click_at_fraction(&self, fx: f64, fy: f64) -> Result<ClickAck> {
        self.send_click(self.resolution.map_fraction(fx, fy)).await
    }

    pub async fn send_click(&self, point: ClickPoint) -> Result<ClickAck> {
        debug!(x = point.x, y = point.y, url = %self.url, "forwarding click");
        let ack = self
            .client
            .post(self.url.clone())
            .json(&point)
            .send()
            .await?
            .error_for_status()?
            .json::<ClickAck>()
            .await?;
        debug!(status = %ack.status, "click acknowledged");
        Ok(ack)
    }
}
