//! Crop-and-classify over recorded key frames.

#![allow(clippy::unwrap_used)]

mod common;

use common::{ScriptedEngine, fixed_classifier_script, loaded_context, red_frame, write_labels};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wildcam::capture::{KeyFrame, classify_key_frames};
use wildcam::config::ClassifierConfig;
use wildcam::inference::{BoundingBox, Detection};
use wildcam::runtime::ModelRole;
use wildcam::tensor::Tensor;

const DETECTOR_INPUT: u32 = 64;

fn key_frame(labels: &[&str]) -> KeyFrame {
    KeyFrame {
        frame: red_frame(128),
        detections: labels
            .iter()
            .map(|label| Detection::new(BoundingBox::new(8.0, 8.0, 56.0, 56.0), 0.9, 0, *label))
            .collect(),
        offset: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_tally_counts_each_classified_crop() {
    let dir = TempDir::new().unwrap();
    let labels = write_labels(dir.path(), "species.json", &["blank", "red deer", "fox"]);
    let classifier = loaded_context(
        ModelRole::Classifier,
        ScriptedEngine::new(fixed_classifier_script()),
        Some(&labels),
        32,
    )
    .await;

    let frames = [key_frame(&["animal", "person"]), key_frame(&["animal"])];
    let tally = classify_key_frames(
        &classifier,
        &frames,
        &ClassifierConfig::default(),
        DETECTOR_INPUT,
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(tally.get("red deer"), 2);
    assert_eq!(tally.len(), 1);
}

#[tokio::test]
async fn test_crops_without_results_are_not_counted() {
    let empty = Arc::new(|_: &Tensor| Tensor::new(vec![1, 0], Vec::new()));
    let classifier = loaded_context(
        ModelRole::Classifier,
        ScriptedEngine::new(empty),
        None,
        32,
    )
    .await;

    let tally = classify_key_frames(
        &classifier,
        &[key_frame(&["animal"])],
        &ClassifierConfig::default(),
        DETECTOR_INPUT,
    )
    .await
    .unwrap();

    assert!(tally.is_none());
}
