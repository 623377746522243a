//! JPEG marker walking.
//!
//! Only the structure of the file is inspected: segments are skipped by their
//! declared length and entropy-coded data is scanned for the next real marker.
//! Nothing is decoded.
use std::ops::Range;

use crate::error::DecodeError;

/// Start of image, the first two bytes of every JPEG file.
pub const SOI: [u8; 2] = [MARKER_PREFIX, SOI_MARKER];

const MARKER_PREFIX: u8 = 0xFF;
const SOI_MARKER: u8 = 0xD8;
const EOI_MARKER: u8 = 0xD9;
const SOS_MARKER: u8 = 0xDA;
const TEM_MARKER: u8 = 0x01;
const STUFFED: u8 = 0x00;

/// Pixel size of a frame as declared in its start-of-frame segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u16,
    pub height: u16,
}

impl Dimensions {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// A frame that declares a zero width or height has not rendered anything.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Reads the dimensions of a complete JPEG frame.
///
/// Returns `Ok(None)` for a well-formed frame without a start-of-frame segment.
pub fn dimensions(frame: &[u8]) -> Result<Option<Dimensions>, DecodeError> {
    if !frame.starts_with(&SOI) {
        return Err(DecodeError::Corrupt { offset: 0 });
    }

    match FrameScan::new().advance(frame) {
        Step::Complete { dimensions, .. } => Ok(dimensions),
        Step::Incomplete => Err(DecodeError::Truncated),
        Step::Corrupt { offset } => Err(DecodeError::Corrupt { offset }),
    }
}

/// Position of the first start-of-image marker in `data`.
pub(crate) fn find_soi(data: &[u8]) -> Option<usize> {
    data.windows(SOI.len()).position(|window| window == SOI)
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// The frame ends `len` bytes after its start.
    Complete {
        len: usize,
        dimensions: Option<Dimensions>,
    },
    /// More bytes are needed. Scanning resumes where it stopped.
    Incomplete,
    Corrupt {
        offset: usize,
    },
}

/// Resumable scan over a single frame that starts with [`SOI`].
///
/// The scan only moves past a segment once all of its bytes are available, so
/// calling [`FrameScan::advance`] again with a longer buffer continues without
/// re-reading what was already walked.
#[derive(Debug, Clone)]
pub(crate) struct FrameScan {
    pos: usize,
    dimensions: Option<Dimensions>,
    in_entropy: bool,
}

impl FrameScan {
    pub(crate) fn new() -> Self {
        Self {
            pos: SOI.len(),
            dimensions: None,
            in_entropy: false,
        }
    }

    pub(crate) fn advance(&mut self, data: &[u8]) -> Step {
        loop {
            if self.in_entropy {
                match next_marker(data, self.pos) {
                    Ok(marker_pos) => {
                        self.pos = marker_pos;
                        self.in_entropy = false;
                    }
                    Err(resume) => {
                        self.pos = resume;
                        return Step::Incomplete;
                    }
                }
            }

            match read_segment(data, self.pos) {
                Segment::Incomplete => return Step::Incomplete,
                Segment::Corrupt { offset } => return Step::Corrupt { offset },
                Segment::End { next } => {
                    return Step::Complete {
                        len: next,
                        dimensions: self.dimensions,
                    }
                }
                Segment::Standalone { next } => self.pos = next,
                Segment::Marker { marker, body, next } => {
                    if is_start_of_frame(marker) {
                        match sof_dimensions(&data[body]) {
                            Some(dimensions) => self.dimensions = Some(dimensions),
                            None => return Step::Corrupt { offset: self.pos },
                        }
                    }
                    self.pos = next;
                    self.in_entropy = marker == SOS_MARKER;
                }
            }
        }
    }
}

enum Segment {
    Incomplete,
    Corrupt {
        offset: usize,
    },
    End {
        next: usize,
    },
    Standalone {
        next: usize,
    },
    Marker {
        marker: u8,
        body: Range<usize>,
        next: usize,
    },
}

fn read_segment(data: &[u8], pos: usize) -> Segment {
    match data.get(pos) {
        None => return Segment::Incomplete,
        Some(&MARKER_PREFIX) => {}
        Some(_) => return Segment::Corrupt { offset: pos },
    }

    // any number of 0xFF fill bytes may precede a marker
    let mut marker_pos = pos + 1;
    while data.get(marker_pos) == Some(&MARKER_PREFIX) {
        marker_pos += 1;
    }
    let Some(&marker) = data.get(marker_pos) else {
        return Segment::Incomplete;
    };
    let after = marker_pos + 1;

    match marker {
        EOI_MARKER => Segment::End { next: after },
        STUFFED | SOI_MARKER => Segment::Corrupt { offset: marker_pos },
        m if is_standalone(m) => Segment::Standalone { next: after },
        _ => {
            let Some(length) = read_u16(data, after) else {
                return Segment::Incomplete;
            };
            let length = usize::from(length);
            if length < 2 {
                return Segment::Corrupt { offset: after };
            }
            let next = after + length;
            if data.len() < next {
                return Segment::Incomplete;
            }
            Segment::Marker {
                marker,
                body: after + 2..next,
                next,
            }
        }
    }
}

/// Finds the next marker in entropy-coded data starting at `from`.
///
/// On failure returns the offset to resume from once more data has arrived.
fn next_marker(data: &[u8], from: usize) -> Result<usize, usize> {
    let mut pos = from;
    while pos + 1 < data.len() {
        if data[pos] == MARKER_PREFIX {
            let next = data[pos + 1];
            if next != STUFFED && !is_restart(next) {
                return Ok(pos);
            }
            pos += 2;
        } else {
            pos += 1;
        }
    }
    Err(pos)
}

fn sof_dimensions(body: &[u8]) -> Option<Dimensions> {
    // precision (1), height (2), width (2), component count (1)
    if body.len() < 6 {
        return None;
    }
    let height = read_u16(body, 1)?;
    let width = read_u16(body, 3)?;
    Some(Dimensions { width, height })
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    let bytes = data.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn is_restart(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

fn is_standalone(marker: u8) -> bool {
    marker == TEM_MARKER || is_restart(marker)
}

fn is_start_of_frame(marker: u8) -> bool {
    // C4 (DHT), C8 (JPG) and CC (DAC) share the range but are not frame headers
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a small but structurally complete baseline JPEG.
    pub(crate) fn jpeg(width: u16, height: u16, entropy: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, 0xD8];
        out.extend_from_slice(&[
            0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
            0x00, 0x01, 0x00, 0x00,
        ]);
        out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
        out.extend_from_slice(&height.to_be_bytes());
        out.extend_from_slice(&width.to_be_bytes());
        out.extend_from_slice(&[0x03, 0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
        out.extend_from_slice(&[
            0xFF, 0xDA, 0x00, 0x0C, 0x03, 0x01, 0x00, 0x02, 0x11, 0x03, 0x11, 0x00, 0x3F, 0x00,
        ]);
        out.extend_from_slice(entropy);
        out.extend_from_slice(&[0xFF, 0xD9]);
        out
    }

    #[test]
    fn test_dimensions_of_baseline_frame() {
        let frame = jpeg(1280, 720, &[0x12, 0x34, 0x56]);

        let result = dimensions(&frame).unwrap();
        assert_eq!(result, Some(Dimensions::new(1280, 720)));
    }

    #[test]
    fn test_stuffed_bytes_and_restart_markers_do_not_end_the_frame() {
        let entropy = [0x01, 0xFF, 0x00, 0x02, 0xFF, 0xD3, 0x03, 0xFF, 0x00];
        let frame = jpeg(640, 480, &entropy);

        let mut scan = FrameScan::new();
        let step = scan.advance(&frame);
        assert_eq!(
            step,
            Step::Complete {
                len: frame.len(),
                dimensions: Some(Dimensions::new(640, 480)),
            }
        );
    }

    #[test]
    fn test_end_marker_inside_thumbnail_is_skipped() {
        let mut frame = vec![0xFF, 0xD8];
        // APP1 segment carrying an embedded image that has its own SOI/EOI
        frame.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x08, 0xFF, 0xD8, 0x00, 0x00, 0xFF, 0xD9]);
        let rest = jpeg(320, 240, &[0xAA]);
        frame.extend_from_slice(&rest[2..]);

        let result = dimensions(&frame).unwrap();
        assert_eq!(result, Some(Dimensions::new(320, 240)));
    }

    #[test]
    fn test_scan_resumes_across_partial_input() {
        let frame = jpeg(64, 48, &[0x10, 0xFF, 0x00, 0x20]);
        let mut scan = FrameScan::new();

        for end in SOI.len()..frame.len() {
            assert_eq!(scan.advance(&frame[..end]), Step::Incomplete);
        }
        assert!(matches!(
            scan.advance(&frame),
            Step::Complete { len, .. } if len == frame.len()
        ));
    }

    #[test]
    fn test_fill_bytes_before_marker() {
        let mut frame = jpeg(8, 8, &[0x01]);
        let eoi = frame.len() - 2;
        frame.splice(eoi..eoi, [0xFF, 0xFF]);

        assert_eq!(dimensions(&frame).unwrap(), Some(Dimensions::new(8, 8)));
    }

    #[test]
    fn test_truncated_frame() {
        let frame = jpeg(8, 8, &[0x01]);

        let result = dimensions(&frame[..frame.len() - 1]);
        assert_eq!(result, Err(DecodeError::Truncated));
    }

    #[test]
    fn test_garbage_between_segments_is_corrupt() {
        let frame = [0xFF, 0xD8, 0x42, 0x42];

        let result = dimensions(&frame);
        assert_eq!(result, Err(DecodeError::Corrupt { offset: 2 }));
    }

    #[test]
    fn test_not_a_jpeg() {
        let result = dimensions(b"--frame\r\n");
        assert_eq!(result, Err(DecodeError::Corrupt { offset: 0 }));
    }

    #[test]
    fn test_zero_sized_frame_is_empty() {
        let frame = jpeg(0, 720, &[0x01]);

        let result = dimensions(&frame).unwrap().unwrap();
        assert!(result.is_empty());
    }
}
