//! Class label registry.
//!
//! Index position is the identity used by the classifier's output vector, so
//! the registry is loaded once and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

/// Default labels used when no label file is available.
///
/// 48 classes: PlantVillage (38) + Rice (4) + Wheat (4) + Onion (2),
/// sorted the same way the training folders are.
pub const DEFAULT_CLASS_LABELS: [&str; 48] = [
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Cherry_(including_sour)___healthy",
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Corn_(maize)___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Onion___Purple_blotch",
    "Onion___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Rice___Brown_spot",
    "Rice___Hispa",
    "Rice___Leaf_blast",
    "Rice___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
    "Wheat___Brown_rust",
    "Wheat___Septoria",
    "Wheat___Yellow_rust",
    "Wheat___healthy",
];

/// Where the registry's labels came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    File(PathBuf),
    BuiltIn,
}

impl fmt::Display for LabelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelSource::File(path) => write!(f, "{}", path.display()),
            LabelSource::BuiltIn => write!(f, "built-in defaults"),
        }
    }
}

/// Ordered, immutable list of class names.
#[derive(Debug, Clone)]
pub struct LabelRegistry {
    labels: Vec<String>,
    source: LabelSource,
}

impl Default for LabelRegistry {
    fn default() -> Self {
        Self::built_in()
    }
}

impl LabelRegistry {
    /// Registry backed by [`DEFAULT_CLASS_LABELS`].
    pub fn built_in() -> Self {
        Self {
            labels: DEFAULT_CLASS_LABELS.iter().map(|s| s.to_string()).collect(),
            source: LabelSource::BuiltIn,
        }
    }

    /// Registry over an explicit list, mostly useful for tests and tools.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            source: LabelSource::BuiltIn,
        }
    }

    /// Load labels from `path`, falling back to the defaults.
    ///
    /// Never fails: a missing file, an unreadable file or a file without a
    /// single usable line all yield the built-in list.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::built_in();
        };

        if !path.exists() {
            info!(
                "Label file {} not found, using {} built-in labels",
                path.display(),
                DEFAULT_CLASS_LABELS.len()
            );
            return Self::built_in();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Could not read label file {}: {}", path.display(), e);
                return Self::built_in();
            }
        };

        let labels = parse_label_lines(&contents);
        if labels.is_empty() {
            warn!(
                "Label file {} contained no usable lines, using built-in labels",
                path.display()
            );
            return Self::built_in();
        }

        info!("Loaded {} class labels from {}", labels.len(), path.display());
        Self {
            labels,
            source: LabelSource::File(path.to_path_buf()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|label| label == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn source(&self) -> &LabelSource {
        &self.source
    }
}

/// Parse `index: label` lines into an index-ordered list.
fn parse_label_lines(contents: &str) -> Vec<String> {
    let mut by_index: BTreeMap<usize, String> = BTreeMap::new();

    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((index, label)) = line.split_once(':') else {
            warn!("Skipping label line {}: missing ':' in {:?}", line_no + 1, line);
            continue;
        };

        let index = match index.trim().parse::<usize>() {
            Ok(index) => index,
            Err(e) => {
                warn!("Skipping label line {}: bad index {:?} ({})", line_no + 1, index, e);
                continue;
            }
        };

        let label = label.trim();
        if label.is_empty() {
            warn!("Skipping label line {}: empty label", line_no + 1);
            continue;
        }

        if let Some(previous) = by_index.insert(index, label.to_string()) {
            warn!("Label index {} defined twice; {:?} replaced by {:?}", index, previous, label);
        }
    }

    if let Some((&last, _)) = by_index.iter().next_back() {
        if last + 1 != by_index.len() {
            warn!(
                "Label indices are not contiguous ({} labels, highest index {}); compacting",
                by_index.len(),
                last
            );
        }
    }

    by_index.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_labels(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_labels() {
        let registry = LabelRegistry::built_in();
        assert_eq!(registry.len(), 48);
        assert_eq!(registry.get(0), Some("Apple___Apple_scab"));
        assert_eq!(registry.get(29), Some("Rice___healthy"));
        assert_eq!(registry.get(47), Some("Wheat___healthy"));
        assert_eq!(registry.get(48), None);
        assert_eq!(registry.source(), &LabelSource::BuiltIn);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let registry = LabelRegistry::load(Some(Path::new("/definitely/not/here.txt")));
        assert_eq!(registry.len(), DEFAULT_CLASS_LABELS.len());
        assert_eq!(registry.source(), &LabelSource::BuiltIn);
    }

    #[test]
    fn test_no_path_uses_defaults() {
        assert_eq!(LabelRegistry::load(None).len(), 48);
    }

    #[test]
    fn test_out_of_order_lines_are_sorted() {
        let file = write_labels("2: Tomato___healthy\n0: Apple___healthy\n1: Corn_(maize)___healthy\n");
        let registry = LabelRegistry::load(Some(file.path()));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(0), Some("Apple___healthy"));
        assert_eq!(registry.get(1), Some("Corn_(maize)___healthy"));
        assert_eq!(registry.get(2), Some("Tomato___healthy"));
        assert_eq!(registry.source(), &LabelSource::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let file = write_labels(
            "0: Apple___healthy\nnot a label line\nx: Broken___label\n\n1:   \n1: Grape___healthy\n",
        );
        let registry = LabelRegistry::load(Some(file.path()));

        assert_eq!(registry.as_slice(), &["Apple___healthy", "Grape___healthy"]);
    }

    #[test]
    fn test_label_may_contain_colon() {
        let file = write_labels("0: Odd: label\n");
        let registry = LabelRegistry::load(Some(file.path()));
        assert_eq!(registry.get(0), Some("Odd: label"));
    }

    #[test]
    fn test_file_without_valid_lines_falls_back() {
        let file = write_labels("garbage\nmore garbage\n");
        let registry = LabelRegistry::load(Some(file.path()));
        assert_eq!(registry.len(), 48);
        assert_eq!(registry.source(), &LabelSource::BuiltIn);
    }

    #[test]
    fn test_duplicate_index_last_wins() {
        let labels = parse_label_lines("0: First\n0: Second\n");
        assert_eq!(labels, vec!["Second".to_string()]);
    }

    #[test]
    fn test_position() {
        let registry = LabelRegistry::built_in();
        assert_eq!(registry.position("Tomato___Early_blight"), Some(35));
        assert_eq!(registry.position("Unknown___class"), None);
    }
}
