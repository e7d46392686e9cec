//! Configuration validation.

use crate::config::Config;
use crate::constants::confidence;
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_detector(config)?;
    validate_classifier(config)?;
    validate_capture(config)?;
    Ok(())
}

fn check_unit_range(name: &str, value: f32) -> Result<()> {
    if !(confidence::MIN..=confidence::MAX).contains(&value) {
        return Err(Error::ConfigValidation {
            message: format!(
                "{name} must be between {} and {}, got {value}",
                confidence::MIN,
                confidence::MAX
            ),
        });
    }
    Ok(())
}

fn check_nonzero(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::ConfigValidation {
            message: format!("{name} must be at least 1"),
        });
    }
    Ok(())
}

/// Validate detector settings.
fn validate_detector(config: &Config) -> Result<()> {
    let detector = &config.detector;
    check_unit_range("detector.conf_threshold", detector.conf_threshold)?;
    check_unit_range("detector.iou_threshold", detector.iou_threshold)?;
    check_nonzero("detector.input_size", u64::from(detector.input_size))?;
    check_nonzero("detector.top_k", detector.top_k as u64)?;
    Ok(())
}

/// Validate classifier settings.
fn validate_classifier(config: &Config) -> Result<()> {
    let classifier = &config.classifier;
    check_unit_range(
        "classifier.acceptance_threshold",
        classifier.acceptance_threshold,
    )?;
    check_nonzero("classifier.input_size", u64::from(classifier.input_size))?;
    check_nonzero("classifier.top_k", classifier.top_k as u64)?;
    Ok(())
}

/// Validate capture loop settings.
fn validate_capture(config: &Config) -> Result<()> {
    let capture = &config.capture;
    check_nonzero("capture.process_every_n", u64::from(capture.process_every_n))?;
    check_nonzero("capture.silence_timeout_ms", capture.silence_timeout_ms)?;
    check_nonzero("capture.max_file_size_mb", capture.max_file_size_mb)?;
    check_nonzero("capture.key_frame_interval_ms", capture.key_frame_interval_ms)?;
    check_nonzero("capture.target_fps", u64::from(capture.target_fps))?;

    if !(1..=100).contains(&capture.jpeg_quality) {
        return Err(Error::ConfigValidation {
            message: format!(
                "capture.jpeg_quality must be between 1 and 100, got {}",
                capture.jpeg_quality
            ),
        });
    }

    if let Some(ref id) = capture.device_id
        && id.trim().is_empty()
    {
        return Err(Error::ConfigValidation {
            message: "capture.device_id must not be empty".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_confidence() {
        let mut config = Config::default();
        config.detector.conf_threshold = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_invalid_iou() {
        let mut config = Config::default();
        config.detector.iou_threshold = -0.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_process_every_n() {
        let mut config = Config::default();
        config.capture.process_every_n = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
        assert!(err.to_string().contains("process_every_n"));
    }

    #[test]
    fn test_validate_zero_size_cap() {
        let mut config = Config::default();
        config.capture.max_file_size_mb = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_blank_device_id() {
        let mut config = Config::default();
        config.capture.device_id = Some("  ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_jpeg_quality_bounds() {
        let mut config = Config::default();
        config.capture.jpeg_quality = 0;
        assert!(validate_config(&config).is_err());
        config.capture.jpeg_quality = 100;
        assert!(validate_config(&config).is_ok());
    }
}
