/// The type returned in the event of an error while extracting frames.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The JPEG marker structure is broken at the given offset.
    #[error("Corrupt JPEG marker structure at offset {offset}.")]
    Corrupt { offset: usize },
    /// The data ends before the frame does.
    #[error("JPEG frame is truncated.")]
    Truncated,
}
