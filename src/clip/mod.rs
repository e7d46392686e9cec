//! Recorded clips and their upload handoff.

mod assembler;
mod store;
mod upload;

pub use assembler::{ClipAssembler, format_counts};
pub use store::{ClipMetadata, LocalClipStore};
pub use upload::{ClipUploader, UploadRequest, UploadResult};

use crate::capture::SpeciesCounts;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clip identifier: `clip_<YYYYmmdd_HHMMSS>_<seq>`.
///
/// The sequence is zero-padded to six digits so ids sort in start order.
pub fn clip_id(started_at: DateTime<Utc>, seq: u64) -> String {
    format!("clip_{}_{seq:06}", started_at.format("%Y%m%d_%H%M%S"))
}

/// Progress of the second-pass species classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ClassificationStatus {
    /// Queued or running.
    Pending,
    /// Counts were replaced by the classified tally.
    Complete,
    /// Not attempted (classifier disabled or nothing to classify).
    Skipped,
    /// Classification failed; live counts were kept.
    Failed(String),
}

/// Upload state of a clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadStatus {
    /// Not uploaded yet.
    Idle,
    /// Handed to the uploader.
    Uploading,
    /// Stored; the clip is frozen from now on.
    Success {
        /// Public URLs.
        urls: UploadResult,
    },
    /// Upload failed and may be retried.
    Error {
        /// Failure reason.
        reason: String,
    },
}

/// One finished recording.
#[derive(Debug, Clone)]
pub struct Clip {
    /// Stable identifier.
    pub id: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// Encoded media stream.
    pub media: Bytes,
    /// Encoded thumbnail, if one could be made.
    pub thumbnail: Option<Bytes>,
    /// Recording device.
    pub device_id: String,
    /// Live counts, replaced by the classified tally once available.
    pub species_counts: SpeciesCounts,
    /// Frames in which at least one animal was detected.
    pub frames_with_animals: u32,
    /// Species classification progress.
    pub classification: ClassificationStatus,
    /// Upload progress.
    pub upload: UploadStatus,
}

impl Clip {
    /// Clip length.
    pub fn duration(&self) -> chrono::TimeDelta {
        self.ended_at - self.started_at
    }

    /// Whether the clip may no longer change.
    pub const fn is_frozen(&self) -> bool {
        matches!(self.upload, UploadStatus::Success { .. })
    }
}
