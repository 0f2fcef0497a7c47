//! On-disk class image folders
//!
//! Layout under the root folder:
//! - `uploads/<class>/<file>` holds images submitted through `/upload`
//! - `enhanced/<class>/enhanced_<file>` holds enhanced variants for audit

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::error::ServiceError;
use crate::models::{ImageAsset, LabelImages, LabeledImages};

pub const UPLOADS_DIR: &str = "uploads";
pub const ENHANCED_DIR: &str = "enhanced";
const ENHANCED_PREFIX: &str = "enhanced_";

/// Filesystem store for class images
#[derive(Debug, Clone)]
pub struct ImageStore {
    uploads: PathBuf,
    enhanced: PathBuf,
}

impl ImageStore {
    pub fn new(root_folder: &Path) -> Self {
        Self {
            uploads: root_folder.join(UPLOADS_DIR),
            enhanced: root_folder.join(ENHANCED_DIR),
        }
    }

    /// Create the upload and audit folders
    pub async fn ensure_dirs(&self) -> Result<(), ServiceError> {
        tokio::fs::create_dir_all(&self.uploads).await?;
        tokio::fs::create_dir_all(&self.enhanced).await?;
        Ok(())
    }

    /// Class of an uploaded file: the file name up to the first `_`
    pub fn class_from_filename(filename: &str) -> Option<&str> {
        let class = filename.split('_').next()?;
        if class.is_empty() || class == filename {
            return None;
        }
        Some(class)
    }

    /// Store one uploaded file under `uploads/<class>/<file>`
    ///
    /// Returns the class the file was filed under.
    pub async fn save_upload(&self, filename: &str, bytes: &[u8]) -> Result<String, ServiceError> {
        let filename = sanitize_filename(filename)?;
        let class = Self::class_from_filename(&filename)
            .ok_or_else(|| {
                ServiceError::Validation(format!(
                    "file name {:?} must start with a class prefix followed by '_'",
                    filename
                ))
            })?
            .to_string();

        let class_dir = self.uploads.join(&class);
        tokio::fs::create_dir_all(&class_dir).await?;
        tokio::fs::write(class_dir.join(&filename), bytes).await?;

        debug!(class = %class, file = %filename, size = bytes.len(), "Stored upload");
        Ok(class)
    }

    /// Load every image of each class, in class order, files sorted by name
    ///
    /// A class without images is a validation failure.
    pub async fn load_labeled_images(
        &self,
        classes: &[String],
    ) -> Result<LabeledImages, ServiceError> {
        let uploads = self.uploads.clone();
        let classes = classes.to_vec();

        tokio::task::spawn_blocking(move || load_classes_blocking(&uploads, &classes))
            .await
            .map_err(|e| ServiceError::Internal(format!("image loader panicked: {}", e)))?
    }

    /// Persist an enhanced variant to `enhanced/<class>/enhanced_<file>`
    pub async fn save_enhanced(
        &self,
        label: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ServiceError> {
        let name = sanitize_filename(name)?;
        let class_dir = self.enhanced.join(label);
        tokio::fs::create_dir_all(&class_dir).await?;
        let path = class_dir.join(format!("{}{}", ENHANCED_PREFIX, name));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

fn load_classes_blocking(
    uploads: &Path,
    classes: &[String],
) -> Result<LabeledImages, ServiceError> {
    let mut labeled = Vec::with_capacity(classes.len());

    for class in classes {
        let class_dir = uploads.join(class);
        if !class_dir.is_dir() {
            return Err(ServiceError::Validation(format!(
                "no images uploaded for class {}",
                class
            )));
        }

        let files: Vec<PathBuf> = WalkDir::new(&class_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .map(|entry| entry.into_path())
            .collect();

        if files.is_empty() {
            return Err(ServiceError::Validation(format!(
                "no images uploaded for class {}",
                class
            )));
        }

        let mut assets = Vec::with_capacity(files.len());
        for path in files {
            let bytes = std::fs::read(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            assets.push(ImageAsset::new(class.clone(), name, bytes));
        }

        info!(class = %class, images = assets.len(), "Loaded class images");
        labeled.push(LabelImages {
            label: class.clone(),
            assets,
        });
    }

    Ok(labeled)
}

/// Keep only the final path component and refuse hidden or empty names
fn sanitize_filename(filename: &str) -> Result<String, ServiceError> {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name.starts_with('.') {
        return Err(ServiceError::Validation(format!(
            "invalid file name {:?}",
            filename
        )));
    }
    Ok(name.to_string())
}
