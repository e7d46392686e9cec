//! Turns finished recordings into clips and tracks their lifecycle.

use super::upload::{UploadRequest, UploadResult};
use super::{ClassificationStatus, Clip, UploadStatus};
use crate::capture::{FinishedRecording, SpeciesCounts};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{info, warn};

/// Owns every clip produced by a capture run, addressed by clip id.
///
/// Late classification or upload results can only reach the clip they were
/// started for. A clip whose upload succeeded never changes again.
#[derive(Debug, Default)]
pub struct ClipAssembler {
    device_id: String,
    clips: BTreeMap<String, Clip>,
}

impl ClipAssembler {
    /// Assembler stamping clips with `device_id`.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            clips: BTreeMap::new(),
        }
    }

    /// Device id written into every clip.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Build a clip from a finished recording with its live counts.
    ///
    /// With `classify` set the clip starts as pending classification,
    /// otherwise classification is skipped.
    pub fn assemble(&mut self, recording: FinishedRecording, classify: bool) -> &Clip {
        let classification = if classify {
            ClassificationStatus::Pending
        } else {
            ClassificationStatus::Skipped
        };
        let clip = Clip {
            id: recording.clip_id,
            started_at: recording.started_at,
            ended_at: recording.ended_at,
            media: recording.media,
            thumbnail: recording.thumbnail,
            device_id: self.device_id.clone(),
            species_counts: recording.species_counts,
            frames_with_animals: recording.frames_with_animals,
            classification,
            upload: UploadStatus::Idle,
        };
        match self.clips.entry(clip.id.clone()) {
            Entry::Occupied(mut existing) => {
                existing.insert(clip);
                existing.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(clip),
        }
    }

    /// Look up a clip.
    pub fn get(&self, id: &str) -> Option<&Clip> {
        self.clips.get(id)
    }

    /// All clips in id order.
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    /// Number of clips.
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether no clip was produced.
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    fn mutable(&mut self, id: &str) -> Result<&mut Clip> {
        let clip = self.clips.get_mut(id).ok_or_else(|| Error::InvalidTransition {
            reason: format!("unknown clip '{id}'"),
        })?;
        if clip.is_frozen() {
            return Err(Error::InvalidTransition {
                reason: format!("clip '{id}' is already uploaded"),
            });
        }
        Ok(clip)
    }

    /// Record the classification outcome for a clip.
    ///
    /// A tally replaces the live counts; `None` leaves them and marks the
    /// clip skipped; an error leaves them and marks the clip failed.
    pub fn apply_classification(
        &mut self,
        id: &str,
        outcome: Result<Option<SpeciesCounts>>,
    ) -> Result<&Clip> {
        let clip = self.mutable(id)?;
        match outcome {
            Ok(Some(tally)) => {
                info!("Clip {id} classified: {}", format_counts(&tally));
                clip.species_counts = tally;
                clip.classification = ClassificationStatus::Complete;
            }
            Ok(None) => clip.classification = ClassificationStatus::Skipped,
            Err(e) => {
                warn!("Classification of clip {id} failed: {e}");
                clip.classification = ClassificationStatus::Failed(e.to_string());
            }
        }
        Ok(clip)
    }

    /// Mark a clip as uploading and build the upload request.
    pub fn begin_upload(&mut self, id: &str) -> Result<UploadRequest> {
        let clip = self.mutable(id)?;
        if clip.upload == UploadStatus::Uploading {
            return Err(Error::InvalidTransition {
                reason: format!("clip '{id}' is already uploading"),
            });
        }
        clip.upload = UploadStatus::Uploading;
        Ok(UploadRequest {
            clip_id: clip.id.clone(),
            video: clip.media.clone(),
            thumbnail: clip.thumbnail.clone(),
            started_at: clip.started_at,
            ended_at: clip.ended_at,
            device_id: clip.device_id.clone(),
            species_counts: clip.species_counts.clone(),
            frames_with_animals: clip.frames_with_animals,
        })
    }

    /// Record the upload outcome for a clip.
    pub fn complete_upload(&mut self, id: &str, outcome: Result<UploadResult>) -> Result<&Clip> {
        let clip = self.mutable(id)?;
        if clip.upload != UploadStatus::Uploading {
            return Err(Error::InvalidTransition {
                reason: format!("clip '{id}' is not uploading"),
            });
        }
        clip.upload = match outcome {
            Ok(urls) => {
                info!("Clip {id} uploaded: {}", urls.video_url);
                UploadStatus::Success { urls }
            }
            Err(e) => {
                warn!("Upload of clip {id} failed: {e}");
                UploadStatus::Error {
                    reason: e.to_string(),
                }
            }
        };
        Ok(clip)
    }
}

/// `deer: 2, fox: 1` style summary.
pub fn format_counts(counts: &SpeciesCounts) -> String {
    if counts.is_empty() {
        return "none".to_string();
    }
    counts
        .iter()
        .map(|(label, count)| format!("{label}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::capture::StopReason;
    use bytes::Bytes;
    use chrono::Utc;

    fn recording(id: &str) -> FinishedRecording {
        let now = Utc::now();
        FinishedRecording {
            clip_id: id.to_string(),
            started_at: now,
            ended_at: now,
            media: Bytes::from_static(b"media"),
            thumbnail: None,
            species_counts: [("animal".to_string(), 2)].into_iter().collect(),
            frames_with_animals: 4,
            key_frames: Vec::new(),
            reason: StopReason::Silence,
        }
    }

    #[test]
    fn test_assemble_keeps_live_counts() {
        let mut assembler = ClipAssembler::new("cam-1");
        let clip = assembler.assemble(recording("clip_a"), true);
        assert_eq!(clip.device_id, "cam-1");
        assert_eq!(clip.species_counts.get("animal"), 2);
        assert_eq!(clip.classification, ClassificationStatus::Pending);
        assert_eq!(clip.upload, UploadStatus::Idle);
    }

    #[test]
    fn test_classification_replaces_counts() {
        let mut assembler = ClipAssembler::new("cam-1");
        assembler.assemble(recording("clip_a"), true);
        let tally: SpeciesCounts = [("deer".to_string(), 3)].into_iter().collect();
        let clip = assembler.apply_classification("clip_a", Ok(Some(tally))).unwrap();
        assert_eq!(clip.species_counts.get("deer"), 3);
        assert_eq!(clip.species_counts.get("animal"), 0);
        assert_eq!(clip.classification, ClassificationStatus::Complete);
    }

    #[test]
    fn test_failed_classification_keeps_counts() {
        let mut assembler = ClipAssembler::new("cam-1");
        assembler.assemble(recording("clip_a"), true);
        let clip = assembler
            .apply_classification("clip_a", Err(Error::WorkerClosed))
            .unwrap();
        assert_eq!(clip.species_counts.get("animal"), 2);
        assert!(matches!(clip.classification, ClassificationStatus::Failed(_)));
    }

    #[test]
    fn test_uploaded_clip_is_frozen() {
        let mut assembler = ClipAssembler::new("cam-1");
        assembler.assemble(recording("clip_a"), false);
        let request = assembler.begin_upload("clip_a").unwrap();
        assert_eq!(request.video, Bytes::from_static(b"media"));
        assert!(assembler.begin_upload("clip_a").is_err());

        let urls = UploadResult {
            video_url: "file:///clips/clip_a.mjpeg".to_string(),
            thumbnail_url: None,
        };
        assembler.complete_upload("clip_a", Ok(urls)).unwrap();
        assert!(assembler.get("clip_a").unwrap().is_frozen());

        assert!(matches!(
            assembler.apply_classification("clip_a", Ok(None)),
            Err(Error::InvalidTransition { .. })
        ));
        assert!(assembler.begin_upload("clip_a").is_err());
    }

    #[test]
    fn test_failed_upload_can_retry() {
        let mut assembler = ClipAssembler::new("cam-1");
        assembler.assemble(recording("clip_a"), false);
        assembler.begin_upload("clip_a").unwrap();
        let clip = assembler
            .complete_upload(
                "clip_a",
                Err(Error::Upload {
                    reason: "offline".to_string(),
                }),
            )
            .unwrap();
        assert!(matches!(clip.upload, UploadStatus::Error { .. }));
        assert!(assembler.begin_upload("clip_a").is_ok());
    }

    #[test]
    fn test_unknown_clip_is_rejected() {
        let mut assembler = ClipAssembler::new("cam-1");
        assert!(assembler.begin_upload("missing").is_err());
    }

    #[test]
    fn test_format_counts() {
        let counts: SpeciesCounts = [("fox".to_string(), 1), ("deer".to_string(), 2)]
            .into_iter()
            .collect();
        assert_eq!(format_counts(&counts), "deer: 2, fox: 1");
        assert_eq!(format_counts(&SpeciesCounts::new()), "none");
    }
}
