//! Model architecture module
//!
//! Holds the CNN whose trained record backs the primary disease classifier.

pub mod cnn;

pub use cnn::{CropDiseaseNet, CropDiseaseNetConfig};
