//! Clip encoders.

use crate::config::CaptureConfig;
use crate::error::{Error, Result};
use crate::frame::PixelFrame;
use bytes::{Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;

/// Encodes the frames of one recording.
pub trait Recorder: Send {
    /// Append a frame.
    fn push(&mut self, frame: &PixelFrame) -> Result<()>;

    /// Bytes produced so far. Compared against the size cap.
    fn encoded_size(&self) -> u64;

    /// Number of frames pushed.
    fn frame_count(&self) -> usize;

    /// Finish the stream and return the encoded media.
    fn finish(self: Box<Self>) -> Result<Bytes>;
}

/// Opens a recorder when a recording starts.
///
/// Failing here is a capture hardware failure: the recording does not start.
pub trait RecorderFactory: Send {
    /// Create a recorder for a new recording.
    fn create(&mut self, config: &CaptureConfig) -> Result<Box<dyn Recorder>>;
}

/// Encode one frame as JPEG.
pub fn encode_jpeg(frame: &PixelFrame, quality: u8) -> Result<Bytes> {
    let rgb = frame.to_rgb_image()?;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| Error::ImageEncode {
            reason: e.to_string(),
        })?;
    Ok(Bytes::from(out))
}

/// Motion-JPEG recorder: every frame is a complete JPEG, concatenated.
#[derive(Debug)]
pub struct MjpegRecorder {
    quality: u8,
    buffer: BytesMut,
    frames: usize,
}

impl MjpegRecorder {
    /// Recorder writing JPEGs at `quality` (1-100).
    pub fn new(quality: u8) -> Self {
        Self {
            quality,
            buffer: BytesMut::new(),
            frames: 0,
        }
    }
}

impl Recorder for MjpegRecorder {
    fn push(&mut self, frame: &PixelFrame) -> Result<()> {
        if frame.is_empty() {
            return Ok(());
        }
        let jpeg = encode_jpeg(frame, self.quality)?;
        self.buffer.extend_from_slice(&jpeg);
        self.frames += 1;
        Ok(())
    }

    fn encoded_size(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn frame_count(&self) -> usize {
        self.frames
    }

    fn finish(self: Box<Self>) -> Result<Bytes> {
        Ok(self.buffer.freeze())
    }
}

/// Creates [`MjpegRecorder`]s using the configured JPEG quality.
#[derive(Debug, Default, Clone, Copy)]
pub struct MjpegRecorderFactory;

impl RecorderFactory for MjpegRecorderFactory {
    fn create(&mut self, config: &CaptureConfig) -> Result<Box<dyn Recorder>> {
        Ok(Box::new(MjpegRecorder::new(config.jpeg_quality)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_jpeg_has_markers() {
        let jpeg = encode_jpeg(&PixelFrame::filled(8, 8, [200, 100, 50, 255]), 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_mjpeg_size_grows_per_frame() {
        let mut recorder = Box::new(MjpegRecorder::new(80));
        let frame = PixelFrame::filled(16, 16, [10, 20, 30, 255]);
        recorder.push(&frame).unwrap();
        let one = recorder.encoded_size();
        recorder.push(&frame).unwrap();
        assert!(one > 0);
        assert_eq!(recorder.encoded_size(), one * 2);
        assert_eq!(recorder.frame_count(), 2);

        let media = recorder.finish().unwrap();
        assert_eq!(media.len() as u64, one * 2);
    }

    #[test]
    fn test_empty_frame_is_skipped() {
        let mut recorder = MjpegRecorder::new(80);
        recorder.push(&PixelFrame::filled(0, 0, [0; 4])).unwrap();
        assert_eq!(recorder.encoded_size(), 0);
        assert_eq!(recorder.frame_count(), 0);
    }
}
