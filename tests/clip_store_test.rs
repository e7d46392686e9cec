//! Local clip storage layout and metadata.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use wildcam::capture::SpeciesCounts;
use wildcam::clip::{ClipMetadata, ClipUploader, LocalClipStore, UploadRequest, clip_id};

fn request(thumbnail: Option<Bytes>) -> UploadRequest {
    let started_at = Utc.with_ymd_and_hms(2024, 8, 14, 3, 12, 45).unwrap();
    let species_counts: SpeciesCounts = [("fox".to_string(), 1), ("badger".to_string(), 3)]
        .into_iter()
        .collect();
    UploadRequest {
        clip_id: clip_id(started_at, 2),
        video: Bytes::from_static(b"\xFF\xD8fake\xFF\xD9"),
        thumbnail,
        started_at,
        ended_at: started_at + chrono::TimeDelta::milliseconds(12_500),
        device_id: "hedge-cam".to_string(),
        species_counts,
        frames_with_animals: 40,
    }
}

#[test]
fn test_upload_writes_day_directory() {
    let dir = TempDir::new().unwrap();
    let store = LocalClipStore::new(dir.path());
    let result = store
        .upload(&request(Some(Bytes::from_static(b"thumb"))))
        .unwrap();

    let day = dir.path().join("2024-08-14");
    let video = day.join("clip_20240814_031245_000002.mjpeg");
    let thumb = day.join("clip_20240814_031245_000002.jpg");
    let meta = day.join("clip_20240814_031245_000002.json");
    assert_eq!(std::fs::read(&video).unwrap(), b"\xFF\xD8fake\xFF\xD9");
    assert_eq!(std::fs::read(&thumb).unwrap(), b"thumb");

    assert!(result.video_url.starts_with("file://"));
    assert!(result.video_url.ends_with("clip_20240814_031245_000002.mjpeg"));
    assert!(result.thumbnail_url.unwrap().ends_with(".jpg"));

    let metadata: ClipMetadata =
        serde_json::from_str(&std::fs::read_to_string(meta).unwrap()).unwrap();
    assert_eq!(metadata.device_id, "hedge-cam");
    assert_eq!(metadata.duration_sec, 12.5);
    assert_eq!(metadata.primary_species.as_deref(), Some("badger"));
    assert_eq!(metadata.max_animals, 3);
    assert_eq!(metadata.frames_with_animals, 40);
    assert_eq!(metadata.species_counts.get("fox"), 1);
}

#[test]
fn test_upload_without_thumbnail() {
    let dir = TempDir::new().unwrap();
    let store = LocalClipStore::new(dir.path());
    let result = store.upload(&request(None)).unwrap();
    assert!(result.thumbnail_url.is_none());

    let day = dir.path().join("2024-08-14");
    assert!(!day.join("clip_20240814_031245_000002.jpg").exists());
    let raw = std::fs::read_to_string(day.join("clip_20240814_031245_000002.json")).unwrap();
    assert!(!raw.contains("thumbnail_file"));
}

#[test]
fn test_unwritable_root_fails() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"").unwrap();
    let store = LocalClipStore::new(&blocker);
    assert!(store.upload(&request(None)).is_err());
}
