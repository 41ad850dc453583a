//! Disease treatment knowledge base.
//!
//! Keys are formatted disease names as produced by
//! [`crate::inference::format_label`], e.g. `"Tomato Early Blight"`.

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::utils::error::{AdvisorError, Result, ResultExt};

const BUILTIN_KNOWLEDGE_BASE: &str = include_str!("../../data/recommendations.json");

/// Treatments for one disease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub disease: String,
    pub fertilizers: Vec<String>,
    pub pesticides: Vec<String>,
    pub organic_treatments: Vec<String>,
    pub preventive_measures: Vec<String>,
}

/// Ordered list of recommendations.
///
/// Order matters: partial-name lookups return the first entry that matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
    entries: Vec<Recommendation>,
}

impl KnowledgeBase {
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<Recommendation> = serde_json::from_str(json)?;
        if entries.is_empty() {
            return Err(AdvisorError::Config("knowledge base has no entries".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AdvisorError::PathNotFound(path.to_path_buf()));
        }
        let kb = Self::from_json(&fs::read_to_string(path)?)
            .with_context(|| format!("Invalid knowledge base {}", path.display()))?;
        info!("Loaded {} recommendations from {}", kb.len(), path.display());
        Ok(kb)
    }

    /// The knowledge base bundled with the crate, parsed on first use.
    pub fn builtin() -> Result<&'static KnowledgeBase> {
        static BUILTIN: OnceLock<std::result::Result<KnowledgeBase, String>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Self::from_json(BUILTIN_KNOWLEDGE_BASE).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| AdvisorError::Config(format!("bundled knowledge base is invalid: {}", e)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find treatments for `disease_name`.
    ///
    /// Tries an exact match, then a case-insensitive match, then the first
    /// entry whose name contains the query or is contained in it.
    pub fn lookup(&self, disease_name: &str) -> Option<&Recommendation> {
        let query = disease_name.trim();
        if query.is_empty() {
            return None;
        }

        if let Some(hit) = self.entries.iter().find(|r| r.disease == query) {
            return Some(hit);
        }

        let lower = query.to_lowercase();
        if let Some(hit) = self.entries.iter().find(|r| r.disease.to_lowercase() == lower) {
            return Some(hit);
        }

        let hit = self.entries.iter().find(|r| {
            let key = r.disease.to_lowercase();
            key.contains(&lower) || lower.contains(&key)
        });
        if let Some(hit) = hit {
            debug!("Partial recommendation match: {:?} -> {:?}", query, hit.disease);
        }
        hit
    }

    /// Every disease name, sorted.
    pub fn available_diseases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.iter().map(|r| r.disease.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{format_label, DEFAULT_CLASS_LABELS};

    fn kb() -> &'static KnowledgeBase {
        KnowledgeBase::builtin().unwrap()
    }

    #[test]
    fn test_builtin_parses() {
        assert_eq!(kb().len(), 38);
    }

    #[test]
    fn test_exact_and_case_insensitive() {
        let hit = kb().lookup("Tomato Early Blight").unwrap();
        assert_eq!(hit.disease, "Tomato Early Blight");
        assert!(hit.pesticides.iter().any(|p| p.starts_with("Mancozeb")));

        assert_eq!(kb().lookup("tomato early blight").unwrap().disease, "Tomato Early Blight");
    }

    #[test]
    fn test_partial_match_both_directions() {
        // query contains the key
        let hit = kb().lookup("Tomato Tomato Yellow Leaf Curl Virus").unwrap();
        assert_eq!(hit.disease, "Tomato Yellow Leaf Curl Virus");

        // key contains the query; first entry in order wins
        assert_eq!(kb().lookup("late blight").unwrap().disease, "Tomato Late Blight");
    }

    #[test]
    fn test_unknown_and_blank() {
        assert!(kb().lookup("Banana Panama Wilt").is_none());
        assert!(kb().lookup("   ").is_none());
    }

    #[test]
    fn test_available_diseases_sorted() {
        let names = kb().available_diseases();
        assert_eq!(names.len(), 38);
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(names[0], "Apple Apple Scab");
    }

    #[test]
    fn test_plantvillage_labels_resolve() {
        // every PlantVillage class has treatments; rice, wheat and onion do not
        for raw in DEFAULT_CLASS_LABELS.iter().filter(|l| {
            !l.starts_with("Rice") && !l.starts_with("Wheat") && !l.starts_with("Onion")
        }) {
            assert!(kb().lookup(&format_label(raw)).is_some(), "no entry for {}", raw);
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        fs::write(
            &path,
            r#"[{"disease": "Onion Purple Blotch", "fertilizers": ["Sulphur"], "pesticides": [],
                "organic_treatments": [], "preventive_measures": ["Crop rotation"]}]"#,
        )
        .unwrap();

        let kb = KnowledgeBase::load(&path).unwrap();
        assert_eq!(kb.lookup("onion purple blotch").unwrap().fertilizers, vec!["Sulphur"]);
    }

    #[test]
    fn test_empty_knowledge_base_rejected() {
        assert!(KnowledgeBase::from_json("[]").is_err());
        assert!(KnowledgeBase::from_json("{").is_err());
    }
}
