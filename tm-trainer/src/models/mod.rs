//! Data models for tm-trainer
//!
//! - Training job lifecycle and submission
//! - Ephemeral image assets and tag bindings
//! - Persisted job references
//! - Prediction request/result

pub mod image_asset;
pub mod job_reference;
pub mod prediction;
pub mod training_job;

pub use image_asset::{tag_index, total_images, ImageAsset, LabelImages, LabeledImages, TagBinding};
pub use job_reference::{JobReference, NewJobReference};
pub use prediction::{probability_to_percent, LabelConfidence, PredictionRequest, PredictionResult};
pub use training_job::{parse_on_off, Hyperparameters, TrainingJob, TrainingRequest};
