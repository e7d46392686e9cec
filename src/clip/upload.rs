//! Upload handoff.

use crate::capture::SpeciesCounts;
use crate::error::Result;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything the upload collaborator needs for one clip.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Clip being uploaded.
    pub clip_id: String,
    /// Encoded media.
    pub video: Bytes,
    /// Encoded thumbnail.
    pub thumbnail: Option<Bytes>,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// Recording device.
    pub device_id: String,
    /// Counts at upload time.
    pub species_counts: SpeciesCounts,
    /// Frames with at least one animal.
    pub frames_with_animals: u32,
}

/// Public locations of an uploaded clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    /// Media URL.
    pub video_url: String,
    /// Thumbnail URL, when a thumbnail was sent.
    pub thumbnail_url: Option<String>,
}

/// Stores clips somewhere and returns their URLs.
///
/// Implementations block; the capture driver calls them from
/// `spawn_blocking`.
pub trait ClipUploader: Send + Sync {
    /// Store one clip.
    fn upload(&self, request: &UploadRequest) -> Result<UploadResult>;
}
