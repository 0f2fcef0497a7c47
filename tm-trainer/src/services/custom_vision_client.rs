//! Custom Vision REST client
//!
//! Implements [`TrainingProvider`] against the v3.3 training API and
//! [`PredictionProvider`] against the v3.0 prediction API. Training and
//! prediction share one resource endpoint but use separate keys.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::provider::{
    Domain, ImageEntry, IterationInfo, Prediction, PredictionProvider, ProjectInfo,
    ProviderError, TagInfo, TrainingProvider,
};
use crate::models::Hyperparameters;

const TRAINING_API_PATH: &str = "customvision/v3.3/training";
const PREDICTION_API_PATH: &str = "customvision/v3.0/Prediction";
const USER_AGENT: &str = concat!("tm-trainer/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Image upload status values the provider counts as stored
const ACCEPTED_IMAGE_STATUSES: [&str; 2] = ["OK", "OKDuplicate"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageFileCreateBatch<'a> {
    images: Vec<ImageFileCreateEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageFileCreateEntry<'a> {
    name: &'a str,
    contents: String,
    tag_ids: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageCreateSummary {
    is_batch_successful: bool,
    #[serde(default)]
    images: Vec<ImageCreateResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageCreateResult {
    #[serde(default)]
    source_url: String,
    status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainingParameters<'a> {
    selected_tags: &'a [String],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImagePrediction {
    #[serde(default)]
    predictions: Vec<PredictionModel>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionModel {
    tag_name: String,
    probability: f64,
}

/// HTTP client for one Custom Vision resource
pub struct CustomVisionClient {
    http_client: Client,
    endpoint: String,
    training_key: String,
    prediction_key: String,
}

impl CustomVisionClient {
    pub fn new(
        endpoint: &str,
        training_key: String,
        prediction_key: String,
    ) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            training_key,
            prediction_key,
        })
    }

    fn training_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.endpoint, TRAINING_API_PATH, path)
    }

    fn training(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Training-Key", &self.training_key)
    }

    async fn send(builder: RequestBuilder) -> Result<Response, ProviderError> {
        let response = builder.send().await.map_err(ProviderError::from_reqwest)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(status.as_u16(), body))
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ProviderError> {
        Self::send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl TrainingProvider for CustomVisionClient {
    async fn list_domains(&self) -> Result<Vec<Domain>, ProviderError> {
        let request = self.training(self.http_client.get(self.training_url("domains")));
        Self::send_json(request).await
    }

    async fn create_project(
        &self,
        name: &str,
        domain_id: &str,
    ) -> Result<ProjectInfo, ProviderError> {
        debug!(name = %name, domain_id = %domain_id, "Creating Custom Vision project");
        let request = self
            .training(self.http_client.post(self.training_url("projects")))
            .query(&[
                ("name", name),
                ("domainId", domain_id),
                ("classificationType", "Multiclass"),
            ]);
        Self::send_json(request).await
    }

    async fn list_tags(&self, project_id: &str) -> Result<Vec<TagInfo>, ProviderError> {
        let url = self.training_url(&format!("projects/{}/tags", project_id));
        Self::send_json(self.training(self.http_client.get(url))).await
    }

    async fn create_tag(&self, project_id: &str, name: &str) -> Result<TagInfo, ProviderError> {
        let url = self.training_url(&format!("projects/{}/tags", project_id));
        let request = self
            .training(self.http_client.post(url))
            .query(&[("name", name)]);
        Self::send_json(request).await
    }

    async fn upload_images(
        &self,
        project_id: &str,
        images: &[ImageEntry],
    ) -> Result<(), ProviderError> {
        let batch = ImageFileCreateBatch {
            images: images
                .iter()
                .map(|image| ImageFileCreateEntry {
                    name: &image.name,
                    contents: BASE64.encode(&image.contents),
                    tag_ids: &image.tag_ids,
                })
                .collect(),
        };

        let url = self.training_url(&format!("projects/{}/images/files", project_id));
        let summary: ImageCreateSummary =
            Self::send_json(self.training(self.http_client.post(url)).json(&batch)).await?;

        if summary.is_batch_successful {
            return Ok(());
        }

        let rejected: Vec<String> = summary
            .images
            .iter()
            .filter(|result| !ACCEPTED_IMAGE_STATUSES.contains(&result.status.as_str()))
            .map(|result| format!("{} ({})", result.source_url, result.status))
            .collect();

        // Batch flagged unsuccessful only because of duplicates
        if rejected.is_empty() {
            warn!(project_id = %project_id, "Image batch reported duplicates only");
            return Ok(());
        }

        Err(ProviderError::Rejected {
            status: 200,
            message: format!("image batch rejected: {}", rejected.join(", ")),
        })
    }

    async fn train_project(
        &self,
        project_id: &str,
        tag_ids: &[String],
        hyperparameters: &Hyperparameters,
    ) -> Result<IterationInfo, ProviderError> {
        // The service chooses its own schedule; the values are only logged
        debug!(
            project_id = %project_id,
            epochs = hyperparameters.epochs,
            batch_size = hyperparameters.batch_size,
            learning_rate = hyperparameters.learning_rate,
            "Requesting training iteration"
        );
        let url = self.training_url(&format!("projects/{}/train", project_id));
        let request = self
            .training(self.http_client.post(url))
            .query(&[("trainingType", "Regular")])
            .json(&TrainingParameters {
                selected_tags: tag_ids,
            });
        let iteration: IterationInfo = Self::send_json(request).await?;
        info!(project_id = %project_id, iteration_id = %iteration.id, "Training queued");
        Ok(iteration)
    }

    async fn get_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<IterationInfo, ProviderError> {
        let url = self.training_url(&format!(
            "projects/{}/iterations/{}",
            project_id, iteration_id
        ));
        Self::send_json(self.training(self.http_client.get(url))).await
    }

    async fn publish_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        prediction_resource_id: &str,
    ) -> Result<(), ProviderError> {
        let url = self.training_url(&format!(
            "projects/{}/iterations/{}/publish",
            project_id, iteration_id
        ));
        let request = self
            .training(self.http_client.post(url))
            .query(&[
                ("publishName", publish_name),
                ("predictionId", prediction_resource_id),
            ]);
        Self::send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl PredictionProvider for CustomVisionClient {
    async fn classify_image(
        &self,
        project_id: &str,
        published_name: &str,
        image: &[u8],
    ) -> Result<Vec<Prediction>, ProviderError> {
        let url = format!(
            "{}/{}/{}/classify/iterations/{}/image",
            self.endpoint, PREDICTION_API_PATH, project_id, published_name
        );
        let request = self
            .http_client
            .post(url)
            .header("Prediction-Key", &self.prediction_key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec());

        let result: ImagePrediction = Self::send_json(request).await?;
        Ok(result
            .predictions
            .into_iter()
            .map(|p| Prediction {
                tag_name: p.tag_name,
                probability: p.probability,
            })
            .collect())
    }
}
