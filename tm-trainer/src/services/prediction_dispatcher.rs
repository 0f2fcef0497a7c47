//! Prediction dispatcher
//!
//! Resolves the latest job reference and forwards an image to the provider's
//! prediction endpoint.

use std::sync::Arc;
use tracing::{debug, info};

use super::enhancement::EnhancementAdapter;
use super::error::ServiceError;
use super::job_reference_store::JobReferenceStore;
use super::provider::PredictionProvider;
use crate::models::{
    probability_to_percent, JobReference, LabelConfidence, PredictionRequest, PredictionResult,
};

pub struct PredictionDispatcher {
    provider: Arc<dyn PredictionProvider>,
    enhancer: Option<Arc<dyn EnhancementAdapter>>,
    references: JobReferenceStore,
}

impl PredictionDispatcher {
    pub fn new(
        provider: Arc<dyn PredictionProvider>,
        enhancer: Option<Arc<dyn EnhancementAdapter>>,
        references: JobReferenceStore,
    ) -> Self {
        Self {
            provider,
            enhancer,
            references,
        }
    }

    /// Cached reference, else the store, else `JobReferenceNotFound`
    pub async fn resolve_reference(&self) -> Result<JobReference, ServiceError> {
        if let Some(reference) = self.references.cached().await {
            return Ok(reference);
        }
        self.references.read_latest().await
    }

    /// Classify one image against the latest trained model
    pub async fn predict(&self, request: PredictionRequest) -> Result<PredictionResult, ServiceError> {
        if request.image.is_empty() {
            return Err(ServiceError::Validation("image is empty".into()));
        }

        let reference = self.resolve_reference().await?;
        let enhance = request.enhance_images.unwrap_or(reference.enhanced);

        let image = if enhance {
            let enhancer = self.enhancer.as_ref().ok_or_else(|| ServiceError::Enhancement {
                label: String::new(),
                image: "prediction".into(),
                message: "no enhancement provider configured".into(),
            })?;
            enhancer
                .enhance(&request.image)
                .await
                .map_err(|e| ServiceError::Enhancement {
                    label: String::new(),
                    image: "prediction".into(),
                    message: e.to_string(),
                })?
        } else {
            request.image
        };

        debug!(
            project_id = %reference.project_id,
            published_name = %reference.published_name,
            enhanced = enhance,
            size = image.len(),
            "Dispatching prediction"
        );

        let predictions = self
            .provider
            .classify_image(&reference.project_id, &reference.published_name, &image)
            .await?;

        let predictions: Vec<LabelConfidence> = predictions
            .into_iter()
            .map(|p| LabelConfidence {
                label: p.tag_name,
                confidence_percent: probability_to_percent(p.probability),
            })
            .collect();

        info!(
            project_id = %reference.project_id,
            top = %predictions.first().map(|p| p.label.as_str()).unwrap_or("-"),
            "Prediction complete"
        );

        Ok(PredictionResult {
            predictions,
            project_id: reference.project_id,
            iteration_id: reference.iteration_id,
        })
    }
}
