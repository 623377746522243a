use std::fmt::{Display, Formatter};

use tracing::{debug, warn};

use crate::jpeg::{find_soi, Dimensions, FrameScan, Step, SOI};

/// Default upper bound for a single buffered frame.
pub const DEFAULT_MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// A complete JPEG image cut out of the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    dimensions: Option<Dimensions>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.dimensions {
            Some(d) => write!(f, "{}x{} jpeg, {} bytes", d.width, d.height, self.data.len()),
            None => write!(f, "jpeg, {} bytes", self.data.len()),
        }
    }
}

/// Streaming frame extractor.
///
/// Bytes before a start-of-image marker (multipart boundaries, part headers,
/// trailing CRLFs) are discarded. A frame with a broken marker structure is
/// dropped and the parser resynchronises on the next start-of-image marker.
pub struct Parser {
    buffer: Vec<u8>,
    scan: Option<FrameScan>,
    max_frame_len: usize,
    dropped: u64,
}

impl Parser {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buffer: vec![],
            scan: None,
            max_frame_len,
            dropped: 0,
        }
    }

    /// Appends `data` and returns every frame completed by it.
    ///
    /// A partial frame that outgrows the limit is discarded and counted in
    /// [`Parser::dropped_frames`]; frames completed before it are still returned
    /// and parsing carries on with the next frame.
    pub fn parse(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = vec![];
        self.buffer.extend_from_slice(data);

        loop {
            if self.scan.is_none() && !self.align_to_soi() {
                break;
            }

            let scan = self.scan.get_or_insert_with(FrameScan::new);
            match scan.advance(&self.buffer) {
                Step::Complete { len, dimensions } => {
                    self.scan = None;
                    if len > self.max_frame_len {
                        warn!(len, max = self.max_frame_len, "dropping oversized jpeg frame");
                        self.buffer.drain(..len);
                        self.dropped += 1;
                        continue;
                    }
                    let remainder = self.buffer.split_off(len);
                    let data = std::mem::replace(&mut self.buffer, remainder);
                    frames.push(Frame { data, dimensions });
                }
                Step::Incomplete => break,
                Step::Corrupt { offset } => {
                    warn!(offset, "dropping corrupt jpeg frame");
                    self.buffer.drain(..SOI.len());
                    self.scan = None;
                    self.dropped += 1;
                }
            }
        }

        if self.buffer.len() > self.max_frame_len {
            warn!(
                len = self.buffer.len(),
                max = self.max_frame_len,
                "dropping oversized jpeg frame"
            );
            self.reset();
            self.dropped += 1;
        }

        frames
    }

    /// Frames discarded so far, either corrupt or over the size limit.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Number of bytes held back for an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scan = None;
    }

    /// Drops everything before the next start-of-image marker.
    ///
    /// Returns whether the buffer now starts with one.
    fn align_to_soi(&mut self) -> bool {
        match find_soi(&self.buffer) {
            Some(start) => {
                if start > 0 {
                    debug!(skipped = start, "skipping bytes between frames");
                    self.buffer.drain(..start);
                }
                true
            }
            None => {
                // a trailing 0xFF could be the first half of the next marker
                let keep = usize::from(self.buffer.last() == Some(&SOI[0]));
                let cut = self.buffer.len() - keep;
                self.buffer.drain(..cut);
                false
            }
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}
