//! Local filesystem clip store.

use super::upload::{ClipUploader, UploadRequest, UploadResult};
use crate::capture::SpeciesCounts;
use crate::constants::clip::{METADATA_EXTENSION, THUMBNAIL_EXTENSION, VIDEO_EXTENSION};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar written next to every stored clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipMetadata {
    /// Clip identifier.
    pub clip_id: String,
    /// Recording device.
    pub device_id: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end.
    pub ended_at: DateTime<Utc>,
    /// Clip length in seconds.
    pub duration_sec: f64,
    /// Counts per species.
    pub species_counts: SpeciesCounts,
    /// Most frequent species.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_species: Option<String>,
    /// Highest per-species count.
    pub max_animals: u32,
    /// Frames with at least one animal.
    pub frames_with_animals: u32,
    /// Media file name.
    pub video_file: String,
    /// Thumbnail file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_file: Option<String>,
}

impl ClipMetadata {
    /// Metadata for an upload request.
    pub fn from_request(
        request: &UploadRequest,
        video_file: String,
        thumbnail_file: Option<String>,
    ) -> Self {
        let duration = request.ended_at - request.started_at;
        Self {
            clip_id: request.clip_id.clone(),
            device_id: request.device_id.clone(),
            started_at: request.started_at,
            ended_at: request.ended_at,
            duration_sec: duration.num_milliseconds() as f64 / 1000.0,
            species_counts: request.species_counts.clone(),
            primary_species: request.species_counts.primary_species().map(ToString::to_string),
            max_animals: request.species_counts.max_count(),
            frames_with_animals: request.frames_with_animals,
            video_file,
            thumbnail_file,
        }
    }
}

/// Writes clips to `<root>/<YYYY-MM-DD>/` and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalClipStore {
    root: PathBuf,
}

impl LocalClipStore {
    /// Store rooted at `root`. The directory is created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory that holds clips started on the given day.
    pub fn day_dir(&self, started_at: DateTime<Utc>) -> PathBuf {
        self.root.join(started_at.format("%Y-%m-%d").to_string())
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::ClipWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

fn file_url(path: &Path) -> String {
    let absolute = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

impl ClipUploader for LocalClipStore {
    fn upload(&self, request: &UploadRequest) -> Result<UploadResult> {
        let dir = self.day_dir(request.started_at);
        fs::create_dir_all(&dir).map_err(|e| Error::OutputDirCreateFailed {
            path: dir.clone(),
            source: e,
        })?;

        let video_file = format!("{}.{VIDEO_EXTENSION}", request.clip_id);
        let video_path = dir.join(&video_file);
        write_file(&video_path, &request.video)?;

        let thumbnail_path = match &request.thumbnail {
            Some(thumbnail) => {
                let path = dir.join(format!("{}.{THUMBNAIL_EXTENSION}", request.clip_id));
                write_file(&path, thumbnail)?;
                Some(path)
            }
            None => None,
        };

        let thumbnail_file = thumbnail_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());
        let metadata = ClipMetadata::from_request(request, video_file, thumbnail_file);
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| Error::JsonSerialize { source: e })?;
        let metadata_path = dir.join(format!("{}.{METADATA_EXTENSION}", request.clip_id));
        write_file(&metadata_path, &json)?;

        debug!("Stored clip {} in {}", request.clip_id, dir.display());

        Ok(UploadResult {
            video_url: file_url(&video_path),
            thumbnail_url: thumbnail_path.as_deref().map(file_url),
        })
    }
}
