//! Image assets and tag bindings used during ingestion

use std::collections::HashMap;

/// One labeled image held for the duration of a job's ingestion step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// File name, reported to the provider as the image name
    pub name: String,
    /// Owning class label
    pub label: String,
    /// Raw bytes as submitted
    pub bytes: Vec<u8>,
    /// Enhanced variant, when enhancement ran
    pub enhanced: Option<Vec<u8>>,
}

impl ImageAsset {
    pub fn new(label: impl Into<String>, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            bytes,
            enhanced: None,
        }
    }

    /// Consume the asset, keeping the enhanced variant if present, else the original
    pub fn into_upload_bytes(self) -> Vec<u8> {
        self.enhanced.unwrap_or(self.bytes)
    }
}

/// Images of one class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelImages {
    pub label: String,
    pub assets: Vec<ImageAsset>,
}

/// Label → images, in class submission order
pub type LabeledImages = Vec<LabelImages>;

/// Total number of images across all labels
pub fn total_images(images: &[LabelImages]) -> usize {
    images.iter().map(|l| l.assets.len()).sum()
}

/// Class label → provider tag id, created once per class per job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagBinding {
    pub label: String,
    pub tag_id: String,
}

/// Lookup tag ids by label
pub fn tag_index(bindings: &[TagBinding]) -> HashMap<&str, &str> {
    bindings
        .iter()
        .map(|b| (b.label.as_str(), b.tag_id.as_str()))
        .collect()
}
