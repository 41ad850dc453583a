//! Treatment recommendations for classified diseases.

pub mod knowledge_base;

pub use knowledge_base::{KnowledgeBase, Recommendation};
