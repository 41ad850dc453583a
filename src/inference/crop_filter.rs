//! Crop filtering.
//!
//! Restricts a probability vector to the classes of one crop. Which labels
//! belong to a crop is declared in an alias table, so new crops or label
//! naming schemes only need a JSON edit.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::labels::LabelRegistry;
use crate::utils::error::{AdvisorError, Result, ResultExt};

/// Predicate over a lowercased label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMatcher {
    Prefix(String),
    Contains(String),
}

impl LabelMatcher {
    pub fn matches(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        match self {
            LabelMatcher::Prefix(prefix) => label.starts_with(&prefix.to_lowercase()),
            LabelMatcher::Contains(needle) => label.contains(&needle.to_lowercase()),
        }
    }
}

/// Crop name to extra label matchers.
///
/// A plain prefix match on the crop name always applies in addition to the
/// matchers listed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropAliases {
    aliases: BTreeMap<String, Vec<LabelMatcher>>,
}

impl Default for CropAliases {
    fn default() -> Self {
        let contains = |s: &str| vec![LabelMatcher::Contains(s.to_string())];
        let aliases = [
            ("corn", contains("corn")),
            ("maize", contains("corn")),
            ("cherry", contains("cherry")),
            ("pepper", contains("pepper,_bell")),
            ("bell pepper", contains("pepper,_bell")),
            ("rice", contains("rice")),
            ("wheat", contains("wheat")),
            ("onion", contains("onion")),
        ]
        .into_iter()
        .map(|(crop, matchers)| (crop.to_string(), matchers))
        .collect();

        Self { aliases }
    }
}

impl CropAliases {
    pub fn new(aliases: BTreeMap<String, Vec<LabelMatcher>>) -> Self {
        Self {
            aliases: aliases
                .into_iter()
                .map(|(crop, matchers)| (normalize_crop(&crop), matchers))
                .collect(),
        }
    }

    /// Load an alias table from JSON: `{"corn": [{"contains": "corn"}]}`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AdvisorError::PathNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let aliases: BTreeMap<String, Vec<LabelMatcher>> = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid crop alias file {}", path.display()))?;
        info!("Loaded {} crop aliases from {}", aliases.len(), path.display());
        Ok(Self::new(aliases))
    }

    /// Aliases from `path` when given, otherwise the built-in table.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn matchers(&self, crop: &str) -> &[LabelMatcher] {
        self.aliases
            .get(&normalize_crop(crop))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Label indices belonging to `crop`, in ascending order.
    pub fn matching_indices(&self, labels: &LabelRegistry, crop: &str) -> BTreeSet<usize> {
        let crop = normalize_crop(crop);
        if crop.is_empty() {
            return BTreeSet::new();
        }

        let prefix = LabelMatcher::Prefix(crop.clone());
        let extra = self.matchers(&crop);

        labels
            .iter()
            .enumerate()
            .filter(|(_, label)| prefix.matches(label) || extra.iter().any(|m| m.matches(label)))
            .map(|(i, _)| i)
            .collect()
    }
}

fn normalize_crop(crop: &str) -> String {
    crop.trim().to_lowercase()
}

/// Zero every probability whose index is not in `keep`.
///
/// An empty `keep` leaves the vector untouched. The result is not
/// renormalized: confidence is read straight off the masked vector.
pub fn apply_mask(probabilities: &[f64], keep: &BTreeSet<usize>) -> Vec<f64> {
    if keep.is_empty() {
        debug!("Crop mask is empty, using the full probability vector");
        return probabilities.to_vec();
    }

    probabilities
        .iter()
        .enumerate()
        .map(|(i, &p)| if keep.contains(&i) { p } else { 0.0 })
        .collect()
}
