//! Per-species animal counts.

use crate::inference::Detection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label to count map attached to a recording.
///
/// Two merge rules exist and are never mixed on the same instance:
/// [`SpeciesCounts::merge_max`] keeps the most animals of a species seen in
/// one frame, [`SpeciesCounts::increment`] tallies classified detections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesCounts(BTreeMap<String, u32>);

impl SpeciesCounts {
    /// Empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count detections per label in a single frame.
    pub fn from_detections<'a>(detections: impl IntoIterator<Item = &'a Detection>) -> Self {
        let mut counts = Self::new();
        for detection in detections {
            counts.increment(detection.label());
        }
        counts
    }

    /// Keep the larger count for every species in `frame`.
    pub fn merge_max(&mut self, frame: &Self) {
        for (label, &count) in &frame.0 {
            let entry = self.0.entry(label.clone()).or_insert(0);
            *entry = (*entry).max(count);
        }
    }

    /// Add one to a species.
    pub fn increment(&mut self, label: &str) {
        *self.0.entry(label.to_string()).or_insert(0) += 1;
    }

    /// Count for a species, zero when absent.
    pub fn get(&self, label: &str) -> u32 {
        self.0.get(label).copied().unwrap_or(0)
    }

    /// The species with the highest count. Ties resolve to the
    /// alphabetically first label.
    pub fn primary_species(&self) -> Option<&str> {
        self.0
            .iter()
            .fold(None, |best: Option<(&String, u32)>, (label, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((label, count)),
            })
            .map(|(label, _)| label.as_str())
    }

    /// Highest single count.
    pub fn max_count(&self) -> u32 {
        self.0.values().copied().max().unwrap_or(0)
    }

    /// Whether no species was counted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct species.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(label, &count)| (label.as_str(), count))
    }
}

impl FromIterator<(String, u32)> for SpeciesCounts {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
