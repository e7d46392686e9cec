//! Second-pass species classification of key frames.

use super::counts::SpeciesCounts;
use super::keyframes::KeyFrame;
use crate::config::ClassifierConfig;
use crate::constants::classifier::MIN_CROP_EDGE;
use crate::error::{Error, Result};
use crate::inference::select_species;
use crate::runtime::ExecutionContext;
use tracing::{debug, warn};

/// Crop every qualifying detection out of its key frame, classify it and
/// tally the resolved species.
///
/// `detector_input_size` is the model space the detection boxes live in.
/// Detections with an ignored label and crops of `MIN_CROP_EDGE` pixels or
/// less per side are skipped, as are crops the classifier returns no results
/// for. A crop whose inference fails counts under the detector label. Returns `Ok(None)` when nothing was classified, and an
/// error when the classifier is unavailable.
pub async fn classify_key_frames(
    classifier: &ExecutionContext,
    key_frames: &[KeyFrame],
    config: &ClassifierConfig,
    detector_input_size: u32,
) -> Result<Option<SpeciesCounts>> {
    if !classifier.is_ready() {
        return Err(Error::ModelNotReady);
    }

    let mut tally = SpeciesCounts::new();
    for key_frame in key_frames {
        let frame = &key_frame.frame;
        for detection in &key_frame.detections {
            if config
                .ignored_labels
                .iter()
                .any(|l| l.eq_ignore_ascii_case(detection.label()))
            {
                continue;
            }

            let region = detection.bbox().to_frame_region(
                detector_input_size,
                frame.width(),
                frame.height(),
            );
            if region.width as f32 <= MIN_CROP_EDGE || region.height as f32 <= MIN_CROP_EDGE {
                debug!(
                    "Skipping {}x{} crop of '{}'",
                    region.width,
                    region.height,
                    detection.label()
                );
                continue;
            }

            let species = match classifier.classify(frame.crop(region)).await {
                Ok(results) if results.is_empty() => {
                    debug!("Classifier returned nothing for '{}'", detection.label());
                    continue;
                }
                Ok(results) => select_species(
                    &results,
                    detection.label(),
                    config.acceptance_threshold,
                ),
                Err(e @ (Error::WorkerClosed | Error::ModelNotReady)) => return Err(e),
                Err(e) => {
                    warn!("Classification of '{}' crop failed: {e}", detection.label());
                    detection.label().to_string()
                }
            };
            tally.increment(&species);
        }
    }

    Ok((!tally.is_empty()).then_some(tally))
}
