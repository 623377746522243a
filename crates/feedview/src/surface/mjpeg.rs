use feedview_mjpeg::{Dimensions, Parser};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

use crate::config::ViewerConfig;
use crate::error::Result;
use crate::surface::{DisplaySurface, SurfaceEvents};

/// The most recent frame a surface has shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frames received since the last bind, starting at 1.
    pub sequence: u64,
    pub len: usize,
    pub dimensions: Option<Dimensions>,
    /// Frames the parser discarded since the last bind, corrupt or oversized.
    pub dropped: u64,
}

#[derive(Debug, thiserror::Error)]
enum StreamError {
    #[error("stream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stream answered with status {0}")]
    Status(u16),
}

/// Reads an MJPEG stream over HTTP, the headless counterpart of an `<img>` tag.
///
/// One reader task runs per bind. Rebinding or clearing aborts the previous one,
/// which closes its connection.
pub struct HttpMjpegSurface {
    client: reqwest::Client,
    max_frame_len: usize,
    reader: Option<JoinHandle<()>>,
    frames: Arc<watch::Sender<Option<FrameInfo>>>,
}

impl HttpMjpegSurface {
    pub fn new(client: reqwest::Client, max_frame_len: usize) -> Self {
        let (frames, _) = watch::channel(None);
        Self {
            client,
            max_frame_len,
            reader: None,
            frames: Arc::new(frames),
        }
    }

    /// The stream is long-lived, so only connecting is bounded by the request timeout.
    pub fn from_config(config: &ViewerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self::new(client, config.max_frame_len))
    }

    pub fn frames(&self) -> watch::Receiver<Option<FrameInfo>> {
        self.frames.subscribe()
    }

    fn release(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.frames.send_replace(None);
    }
}

#[async_trait::async_trait]
impl DisplaySurface for HttpMjpegSurface {
    async fn bind(&mut self, url: Url, events: SurfaceEvents) {
        self.release();
        info!(%url, attempt = events.attempt(), "opening stream");

        let task = read_stream(
            self.client.clone(),
            url,
            events,
            Arc::clone(&self.frames),
            self.max_frame_len,
        );
        self.reader = Some(tokio::spawn(task));
    }

    async fn clear(&mut self) {
        self.release();
    }

    fn rendered_dimensions(&self) -> Option<Dimensions> {
        self.frames.borrow().and_then(|frame| frame.dimensions)
    }
}

impl Drop for HttpMjpegSurface {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_stream(
    client: reqwest::Client,
    url: Url,
    events: SurfaceEvents,
    frames: Arc<watch::Sender<Option<FrameInfo>>>,
    max_frame_len: usize,
) {
    match stream_frames(client, url, &events, &frames, max_frame_len).await {
        Ok(()) => events.failed("stream ended"),
        Err(err) => events.failed(err.to_string()),
    }
    debug!(attempt = events.attempt(), "stream reader is shutting down");
}

async fn stream_frames(
    client: reqwest::Client,
    url: Url,
    events: &SurfaceEvents,
    frames: &watch::Sender<Option<FrameInfo>>,
    max_frame_len: usize,
) -> std::result::Result<(), StreamError> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::Status(status.as_u16()));
    }

    let mut body = response.bytes_stream();
    let mut parser = Parser::new(max_frame_len);
    let mut sequence = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in parser.parse(&chunk) {
            sequence += 1;
            if sequence == 1 {
                debug!(%frame, "first frame received");
                events.loaded();
            }
            frames.send_replace(Some(FrameInfo {
                sequence,
                len: frame.len(),
                dimensions: frame.dimensions(),
                dropped: parser.dropped_frames(),
            }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceEvent;
    use crate::test_support::{http_response, serve_once};

    fn jpeg(width: u16, height: u16) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x0B, 0x08];
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&[0x01, 0x01, 0x11, 0x00]);
        out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00]);
        out.extend_from_slice(&[0x7F, 0xFF, 0x00, 0x13, 0xFF, 0xD9]);
        out
    }

    fn mjpeg_response(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\nConnection: close\r\n\r\n".to_vec();
        for frame in frames {
            response.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            response.extend_from_slice(frame);
            response.extend_from_slice(b"\r\n");
        }
        response
    }

    fn surface() -> HttpMjpegSurface {
        HttpMjpegSurface::new(reqwest::Client::new(), feedview_mjpeg::DEFAULT_MAX_FRAME_LEN)
    }

    #[tokio::test]
    async fn test_frames_load_the_surface_and_end_of_stream_fails_it() {
        let (addr, server) = serve_once(mjpeg_response(&[jpeg(1280, 720), jpeg(1280, 720)])).await;
        let url = Url::parse(&format!("http://{addr}/stream?t=1")).unwrap();
        let (events, mut received) = SurfaceEvents::detached(7);
        let mut surface = surface();
        let frames = surface.frames();

        surface.bind(url, events).await;

        assert_eq!(received.recv().await, Some(SurfaceEvent::Loaded { attempt: 7 }));
        assert_eq!(
            received.recv().await,
            Some(SurfaceEvent::Failed {
                attempt: 7,
                reason: "stream ended".to_string()
            })
        );
        assert_eq!(
            surface.rendered_dimensions(),
            Some(Dimensions::new(1280, 720))
        );
        assert_eq!(frames.borrow().map(|f| f.sequence), Some(2));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /stream?t=1 "));
    }

    #[tokio::test]
    async fn test_error_status_fails_without_loading() {
        let (addr, _server) = serve_once(http_response("404 Not Found", "text/plain", "nope")).await;
        let url = Url::parse(&format!("http://{addr}/stream")).unwrap();
        let (events, mut received) = SurfaceEvents::detached(1);
        let mut surface = surface();

        surface.bind(url, events).await;

        match received.recv().await {
            Some(SurfaceEvent::Failed { attempt, reason }) => {
                assert_eq!(attempt, 1);
                assert!(reason.contains("404"));
            }
            other => panic!("expected a failure, got {other:?}"),
        }
        assert_eq!(surface.rendered_dimensions(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_is_skipped_without_failing_the_stream() {
        let small = jpeg(640, 480);
        let mut large = jpeg(1280, 720);
        let eoi = large.split_off(large.len() - 2);
        large.extend_from_slice(&[0x02; 200]);
        large.extend_from_slice(&eoi);

        let response = mjpeg_response(&[small.clone(), large, small.clone()]);
        let (addr, _server) = serve_once(response).await;
        let url = Url::parse(&format!("http://{addr}/stream")).unwrap();
        let (events, mut received) = SurfaceEvents::detached(5);
        let mut surface = HttpMjpegSurface::new(reqwest::Client::new(), small.len() + 50);
        let frames = surface.frames();

        surface.bind(url, events).await;

        assert_eq!(received.recv().await, Some(SurfaceEvent::Loaded { attempt: 5 }));
        assert_eq!(
            received.recv().await,
            Some(SurfaceEvent::Failed {
                attempt: 5,
                reason: "stream ended".to_string()
            })
        );
        let latest = frames.borrow().unwrap();
        assert_eq!(latest.sequence, 2);
        assert_eq!(latest.dropped, 1);
        assert_eq!(latest.dimensions, Some(Dimensions::new(640, 480)));
    }

    #[tokio::test]
    async fn test_clear_resets_rendered_dimensions() {
        let (addr, _server) = serve_once(mjpeg_response(&[jpeg(640, 480)])).await;
        let url = Url::parse(&format!("http://{addr}/stream")).unwrap();
        let (events, mut received) = SurfaceEvents::detached(3);
        let mut surface = surface();

        surface.bind(url, events).await;
        assert_eq!(received.recv().await, Some(SurfaceEvent::Loaded { attempt: 3 }));
        assert_eq!(surface.rendered_dimensions(), Some(Dimensions::new(640, 480)));

        surface.clear().await;
        assert_eq!(surface.rendered_dimensions(), None);
    }
}
