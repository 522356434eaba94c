#![warn(missing_docs)]
//! Frame ingestion: turning input files into streams of fixed-dimension
//! vectors.
//!
//! The clustering engine only ever sees the [FrameSource] trait; the
//! concrete readers below cover whitespace-float text files and image
//! stacks. Piped video decoders and shared-memory rings present the same
//! interface from the engine's point of view and can be slotted in behind
//! it.

use std::path::Path;

pub mod errors;
pub mod images;
pub mod text;

use errors::SourceError;

/// A single frame: its position in the stream and its flattened data.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// 0-based position in the stream.
    pub index: u64,
    /// Flattened sample values; length is the stream dimension.
    pub data: Vec<f64>,
}

/// A blocking producer of frames.
///
/// Implementations yield frames in strictly increasing index order and
/// report a stable dimension from the first frame onward. A source backed
/// by a producer handshake counter must acknowledge every consumed frame
/// even when the consumer terminates early; skipping the acknowledgement
/// can deadlock the producer.
pub trait FrameSource {
    /// The next frame, or `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Random access to a frame already seen by `next_frame`. Used by the
    /// output stage to re-read cluster members; does not disturb the
    /// streaming position.
    fn frame_at(&mut self, index: u64) -> Result<Option<Frame>, SourceError>;

    /// Stream dimension, known once the first frame has been read.
    fn dim(&self) -> Option<usize>;

    /// Width x height for image-like streams; text streams report
    /// `(dim, 1)`.
    fn shape(&self) -> Option<(u32, u32)>;

    /// Rewind to the first frame (used between the scan pre-pass and the
    /// clustering pass).
    fn reset(&mut self) -> Result<(), SourceError>;
}

const IMAGE_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff", "webp"];

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == e)
        })
        .unwrap_or(false)
}

/// Open the right source for `path`: a directory is an image stack, a file
/// is routed by extension.
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, SourceError> {
    if !path.exists() {
        return Err(SourceError::Open(path.to_path_buf()));
    }
    if path.is_dir() || is_image_path(path) {
        Ok(Box::new(images::ImageStackSource::open(path)?))
    } else {
        Ok(Box::new(text::TextSource::open(path)?))
    }
}
