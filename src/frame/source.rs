//! Frame sources feeding the capture loop.

use super::PixelFrame;
use crate::constants::IMAGE_EXTENSIONS;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Something that produces camera frames.
///
/// `Ok(None)` means the stream has ended. A [`Error::CaptureHardware`] error
/// means the source is unusable; other errors only affect the current frame.
pub trait FrameSource: Send {
    /// Pull the next frame.
    fn next_frame(&mut self) -> Result<Option<PixelFrame>>;
}

/// Replays still images from a directory in file-name order.
#[derive(Debug)]
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    position: usize,
    looping: bool,
}

impl ImageDirSource {
    /// Open a directory of `.jpg`/`.png` frames.
    ///
    /// With `looping` set, playback restarts from the first file once the
    /// last one has been read.
    pub fn open(dir: &Path, looping: bool) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| Error::CaptureHardware {
            reason: format!("cannot open frame directory {}: {e}", dir.display()),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && is_image_file(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::CaptureHardware {
                reason: format!("no image frames found in {}", dir.display()),
            });
        }

        info!("Frame source: {} image(s) in {}", files.len(), dir.display());
        Ok(Self {
            files,
            position: 0,
            looping,
        })
    }

    /// Number of distinct frames in the directory.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the directory held no frames (never true after `open`).
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Result<Option<PixelFrame>> {
        if self.position >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            debug!("Frame source looping back to start");
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;
        load_frame(path).map(Some)
    }
}

/// Decode an image file into an RGBA frame.
pub fn load_frame(path: &Path) -> Result<PixelFrame> {
    let image = image::open(path).map_err(|e| Error::ImageDecode {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(PixelFrame::from_image(image.to_rgba8()))
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// In-memory frame queue, handy for replaying captured sequences.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    frames: VecDeque<PixelFrame>,
}

impl VecFrameSource {
    /// Queue the given frames in order.
    pub fn new(frames: impl IntoIterator<Item = PixelFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Result<Option<PixelFrame>> {
        Ok(self.frames.pop_front())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, shade: u8) {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([shade, shade, shade, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_missing_directory_is_hardware_error() {
        let err = ImageDirSource::open(Path::new("/nonexistent/frames"), false).unwrap_err();
        assert!(matches!(err, Error::CaptureHardware { .. }));
    }

    #[test]
    fn test_empty_directory_is_hardware_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();
        let err = ImageDirSource::open(dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::CaptureHardware { .. }));
    }

    #[test]
    fn test_frames_are_read_in_name_order() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "b.png", 200);
        write_png(dir.path(), "a.png", 100);

        let mut source = ImageDirSource::open(dir.path(), false).unwrap();
        assert_eq!(source.len(), 2);
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!((first.width(), first.height()), (4, 3));
        assert_eq!(first.pixel(0, 0)[0], 100);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.pixel(0, 0)[0], 200);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_looping_restarts() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "only.png", 50);

        let mut source = ImageDirSource::open(dir.path(), true).unwrap();
        for _ in 0..3 {
            assert!(source.next_frame().unwrap().is_some());
        }
    }

    #[test]
    fn test_vec_source_drains_in_order() {
        let mut source = VecFrameSource::new([
            PixelFrame::filled(1, 1, [1, 0, 0, 255]),
            PixelFrame::filled(1, 1, [2, 0, 0, 255]),
        ]);
        assert_eq!(source.next_frame().unwrap().unwrap().pixel(0, 0)[0], 1);
        assert_eq!(source.next_frame().unwrap().unwrap().pixel(0, 0)[0], 2);
        assert!(source.next_frame().unwrap().is_none());
    }
}
