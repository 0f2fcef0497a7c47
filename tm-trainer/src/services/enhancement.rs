//! Image enhancement adapter
//!
//! Enhancement is the provider's smart-cropped 1024x1024 thumbnail.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use super::provider::ProviderError;

const THUMBNAIL_PATH: &str = "vision/v3.2/generateThumbnail";
const THUMBNAIL_SIZE: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transforms one image's bytes before ingestion or prediction
#[async_trait]
pub trait EnhancementAdapter: Send + Sync {
    async fn enhance(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError>;
}

/// What ingestion does when enhancing an image fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementFailurePolicy {
    /// Fail the job
    #[default]
    Abort,
    /// Upload the original bytes and log a warning
    Fallback,
}

impl FromStr for EnhancementFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(EnhancementFailurePolicy::Abort),
            "fallback" => Ok(EnhancementFailurePolicy::Fallback),
            other => Err(format!(
                "unknown enhancement failure policy {:?} (expected \"abort\" or \"fallback\")",
                other
            )),
        }
    }
}

/// Computer Vision thumbnail client
pub struct VisionThumbnailClient {
    http_client: Client,
    endpoint: String,
    key: String,
}

impl VisionThumbnailClient {
    pub fn new(endpoint: &str, key: String) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key,
        })
    }

    fn thumbnail_url(&self) -> String {
        format!(
            "{}/{}?width={}&height={}&smartCropping=true",
            self.endpoint, THUMBNAIL_PATH, THUMBNAIL_SIZE, THUMBNAIL_SIZE
        )
    }
}

#[async_trait]
impl EnhancementAdapter for VisionThumbnailClient {
    async fn enhance(&self, image: &[u8]) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http_client
            .post(self.thumbnail_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let bytes = response.bytes().await.map_err(ProviderError::from_reqwest)?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse("empty thumbnail".into()));
        }
        Ok(bytes.to_vec())
    }
}
