#![warn(missing_docs)]
//! Image frame reader: a single image is one frame, a directory of images
//! is a stack (sorted by file name, outermost axis is the frame index).

use image::error::ImageError;
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{errors::SourceError, is_image_path, Frame, FrameSource};

/// Reads frames from an image file or a directory of image files.
///
/// Frames are decoded to 8-bit grayscale and flattened row-major to `f64`;
/// the dimension is width x height of the first frame and every later
/// frame must match it.
pub struct ImageStackSource {
    paths: Vec<PathBuf>,
    shape: Option<(u32, u32)>,
    next_index: u64,
}

impl ImageStackSource {
    /// Open an image file or a directory of images.
    pub fn open(path: &Path) -> Result<ImageStackSource, SourceError> {
        let paths = if path.is_dir() {
            let entries =
                fs::read_dir(path).map_err(|_| SourceError::Open(path.to_path_buf()))?;
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| {
                    entry.ok().and_then(|ok_entry| {
                        let entry_path = ok_entry.path();
                        if entry_path.is_file() && is_image_path(&entry_path) {
                            Some(entry_path)
                        } else {
                            None
                        }
                    })
                })
                .collect();
            paths.sort();
            paths
        } else {
            vec![path.to_path_buf()]
        };
        if paths.is_empty() {
            return Err(SourceError::Empty(path.to_path_buf()));
        }
        Ok(ImageStackSource {
            paths,
            shape: None,
            next_index: 0,
        })
    }

    fn load(&mut self, index: u64) -> Result<Frame, SourceError> {
        let path = &self.paths[index as usize];
        let dynamic_image = match image::open(path) {
            Ok(image) => image,
            Err(ImageError::Unsupported(_)) => {
                return Err(SourceError::Decode(path.clone()));
            }
            Err(image_error) => {
                eprintln!(
                    "Warning @ {}: {}",
                    path.display(),
                    image_error.to_string()
                );
                return Err(SourceError::Decode(path.clone()));
            }
        };
        let gray = dynamic_image.to_luma8();
        let (width, height) = (gray.width(), gray.height());
        match self.shape {
            None => self.shape = Some((width, height)),
            Some((w, h)) if (w, h) != (width, height) => {
                return Err(SourceError::Mismatch {
                    index,
                    expected: (w * h) as usize,
                    got: (width * height) as usize,
                });
            }
            Some(_) => {}
        }
        let data = gray.pixels().map(|p| p.0[0] as f64).collect();
        Ok(Frame { index, data })
    }
}

impl FrameSource for ImageStackSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.next_index as usize >= self.paths.len() {
            return Ok(None);
        }
        let frame = self.load(self.next_index)?;
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn frame_at(&mut self, index: u64) -> Result<Option<Frame>, SourceError> {
        if index >= self.next_index || index as usize >= self.paths.len() {
            return Ok(None);
        }
        Ok(Some(self.load(index)?))
    }

    fn dim(&self) -> Option<usize> {
        self.shape.map(|(w, h)| (w * h) as usize)
    }

    fn shape(&self) -> Option<(u32, u32)> {
        self.shape
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.next_index = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_gray_png(dir: &Path, name: &str, pixels: &[u8], w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        let buffer = image::GrayImage::from_raw(w, h, pixels.to_vec()).unwrap();
        buffer.save(&path).unwrap();
        path
    }

    #[test]
    fn directory_stack_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_gray_png(dir.path(), "b.png", &[10, 20, 30, 40], 2, 2);
        write_gray_png(dir.path(), "a.png", &[1, 2, 3, 4], 2, 2);
        let mut source = ImageStackSource::open(dir.path()).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.data, vec![1.0, 2.0, 3.0, 4.0]);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.data, vec![10.0, 20.0, 30.0, 40.0]);
        assert_eq!(source.next_frame().unwrap(), None);
        assert_eq!(source.shape(), Some((2, 2)));
        assert_eq!(source.dim(), Some(4));
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_gray_png(dir.path(), "a.png", &[0, 0, 0, 0], 2, 2);
        write_gray_png(dir.path(), "b.png", &[0, 0], 2, 1);
        let mut source = ImageStackSource::open(dir.path()).unwrap();
        source.next_frame().unwrap();
        assert!(matches!(
            source.next_frame(),
            Err(SourceError::Mismatch { index: 1, .. })
        ));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageStackSource::open(dir.path()),
            Err(SourceError::Empty(_))
        ));
    }
}
