//! Batch ingestion engine
//!
//! Prepares labeled images (optionally enhanced) and uploads them in
//! sequential batches no larger than the provider limit. A batch is uploaded
//! as soon as it fills, so at most one prepared batch is held at a time.
//! Batches span label boundaries: 10 cat and 10 dog images with a limit of 64
//! go up as one batch.

use std::sync::Arc;
use tm_common::events::ProgressEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::enhancement::{EnhancementAdapter, EnhancementFailurePolicy};
use super::error::ServiceError;
use super::image_store::ImageStore;
use super::progress::ProgressSink;
use super::provider::{ImageEntry, TrainingProvider};
use crate::models::{tag_index, total_images, ImageAsset, LabeledImages, TagBinding};
use crate::utils::{retry_transient, RetryPolicy};

/// Maximum images the provider accepts in one upload call
pub const PROVIDER_MAX_BATCH: usize = 64;

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    /// Requested batch size; clamped to `1..=PROVIDER_MAX_BATCH`
    pub batch_limit: usize,
    pub enhancement_policy: EnhancementFailurePolicy,
    /// Keep enhanced variants under `enhanced/<label>/`
    pub save_enhanced: bool,
    pub retry: RetryPolicy,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            batch_limit: PROVIDER_MAX_BATCH,
            enhancement_policy: EnhancementFailurePolicy::default(),
            save_enhanced: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl IngestionSettings {
    pub fn effective_batch_limit(&self) -> usize {
        self.batch_limit.clamp(1, PROVIDER_MAX_BATCH)
    }
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSummary {
    pub total: usize,
    /// Size of each uploaded batch, in upload order
    pub batch_sizes: Vec<usize>,
    /// Images uploaded with original bytes after enhancement failed
    pub enhancement_fallbacks: usize,
}

pub struct BatchIngestionEngine {
    provider: Arc<dyn TrainingProvider>,
    enhancer: Option<Arc<dyn EnhancementAdapter>>,
    image_store: ImageStore,
    settings: IngestionSettings,
}

impl BatchIngestionEngine {
    pub fn new(
        provider: Arc<dyn TrainingProvider>,
        enhancer: Option<Arc<dyn EnhancementAdapter>>,
        image_store: ImageStore,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            provider,
            enhancer,
            image_store,
            settings,
        }
    }

    /// Upload all images of `images` to `project_id`, tagged per `tags`
    pub async fn ingest(
        &self,
        project_id: &str,
        images: LabeledImages,
        tags: &[TagBinding],
        enhance: bool,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<IngestionSummary, ServiceError> {
        let total = total_images(&images);
        if total == 0 {
            return Err(ServiceError::Validation("no images to upload".into()));
        }

        let tag_ids = tag_index(tags);
        let limit = self.settings.effective_batch_limit();
        let mut batch: Vec<ImageEntry> = Vec::with_capacity(limit.min(total));
        let mut batch_sizes = Vec::with_capacity(total.div_ceil(limit));
        let mut uploaded = 0;
        let mut enhancement_fallbacks = 0;

        for label_images in images {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let label = label_images.label;
            let tag_id = tag_ids
                .get(label.as_str())
                .map(|id| id.to_string())
                .ok_or_else(|| ServiceError::Internal(format!("no tag created for {}", label)))?;

            progress.emit(ProgressEvent::LabelProcessing {
                label: label.clone(),
                image_count: label_images.assets.len(),
            });

            for mut asset in label_images.assets {
                if enhance && !self.enhance_asset(&mut asset, cancel).await? {
                    enhancement_fallbacks += 1;
                }
                batch.push(ImageEntry {
                    name: asset.name.clone(),
                    contents: asset.into_upload_bytes(),
                    tag_ids: vec![tag_id.clone()],
                });

                if batch.len() == limit {
                    uploaded += self
                        .upload_batch(project_id, &mut batch, batch_sizes.len() + 1, progress, cancel)
                        .await?;
                    progress.emit(ProgressEvent::BatchUploaded { uploaded, total });
                    batch_sizes.push(limit);
                }
            }
        }

        if !batch.is_empty() {
            let size = self
                .upload_batch(project_id, &mut batch, batch_sizes.len() + 1, progress, cancel)
                .await?;
            uploaded += size;
            progress.emit(ProgressEvent::BatchUploaded { uploaded, total });
            batch_sizes.push(size);
        }

        info!(
            job_id = %progress.job_id(),
            project_id = %project_id,
            total,
            batches = batch_sizes.len(),
            "Image ingestion complete"
        );

        Ok(IngestionSummary {
            total,
            batch_sizes,
            enhancement_fallbacks,
        })
    }

    /// Upload and drain one batch; returns its size
    async fn upload_batch(
        &self,
        project_id: &str,
        batch: &mut Vec<ImageEntry>,
        number: usize,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<usize, ServiceError> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }

        let provider = &self.provider;
        let entries = batch.as_slice();
        retry_transient("upload image batch", &self.settings.retry, cancel, |_| async move {
            provider
                .upload_images(project_id, entries)
                .await
                .map_err(ServiceError::from)
        })
        .await?;

        let size = batch.len();
        batch.clear();
        debug!(
            job_id = %progress.job_id(),
            project_id = %project_id,
            batch = number,
            size,
            "Uploaded image batch"
        );
        Ok(size)
    }

    /// Replace the asset's upload bytes with the enhanced variant
    ///
    /// Returns `false` when enhancement failed and the fallback policy kept
    /// the original bytes.
    async fn enhance_asset(
        &self,
        asset: &mut ImageAsset,
        cancel: &CancellationToken,
    ) -> Result<bool, ServiceError> {
        let enhancer = self.enhancer.as_ref().ok_or_else(|| ServiceError::Enhancement {
            label: asset.label.clone(),
            image: asset.name.clone(),
            message: "no enhancement provider configured".into(),
        })?;

        let original = asset.bytes.as_slice();
        let result = retry_transient("enhance image", &self.settings.retry, cancel, |_| async move {
            enhancer.enhance(original).await.map_err(ServiceError::from)
        })
        .await;

        let enhanced = match result {
            Ok(bytes) => bytes,
            Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
            Err(err) => match self.settings.enhancement_policy {
                EnhancementFailurePolicy::Abort => {
                    return Err(ServiceError::Enhancement {
                        label: asset.label.clone(),
                        image: asset.name.clone(),
                        message: err.to_string(),
                    });
                }
                EnhancementFailurePolicy::Fallback => {
                    warn!(
                        label = %asset.label,
                        image = %asset.name,
                        error = %err,
                        "Enhancement failed, uploading original image"
                    );
                    return Ok(false);
                }
            },
        };

        if self.settings.save_enhanced {
            // Audit copy only; the upload does not depend on it
            if let Err(e) = self
                .image_store
                .save_enhanced(&asset.label, &asset.name, &enhanced)
                .await
            {
                warn!(label = %asset.label, image = %asset.name, error = %e, "Failed to save enhanced image");
            }
        }

        asset.enhanced = Some(enhanced);
        Ok(true)
    }
}
