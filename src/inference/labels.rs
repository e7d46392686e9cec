//! Class label tables.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Class index to label lookup with a `class_<id>` fallback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelsFile {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl Labels {
    /// Labels in class-index order.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Read a labels file.
    ///
    /// Accepts a JSON array (`["animal", "person"]`), a JSON index map
    /// (`{"0": "animal", "1": "person"}`), or plain text with one label per line.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::LabelsRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let trimmed = contents.trim_start();
        if !(trimmed.starts_with('[') || trimmed.starts_with('{')) {
            return Ok(Self::new(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(ToString::to_string)
                    .collect(),
            ));
        }

        let parsed: LabelsFile =
            serde_json::from_str(&contents).map_err(|e| Error::LabelsParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(match parsed {
            LabelsFile::List(names) => Self::new(names),
            LabelsFile::Map(map) => {
                let mut indexed: Vec<(usize, String)> = map
                    .into_iter()
                    .filter_map(|(k, v)| k.trim().parse::<usize>().ok().map(|i| (i, v)))
                    .collect();
                indexed.sort_by_key(|(i, _)| *i);
                let len = indexed.last().map_or(0, |(i, _)| i + 1);
                let mut names: Vec<String> = (0..len).map(fallback_label).collect();
                for (i, name) in indexed {
                    names[i] = name;
                }
                Self::new(names)
            }
        })
    }

    /// Label for a class index.
    pub fn resolve(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| fallback_label(class_id))
    }

    /// All labels in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of known labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether no labels are known.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Placeholder label for an unknown class index.
pub fn fallback_label(class_id: usize) -> String {
    format!("class_{class_id}")
}
