//! Skill extraction client, the single point of entry for calls to the external
//! skill service.
//!
//! The service is an opaque classifier: `POST <endpoint>` with
//! `{"body": <text>, "skill"?: "hard"|"soft"}` answers `{"hard": [...], "soft": [...]}`.
//! Every failure mode (network, timeout, non-2xx, malformed body) degrades to an
//! empty `SkillResult` at the `SkillExtractor` boundary; the batch and gap-fill
//! workers never see an error from here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::skills::{SkillCategory, SkillResult};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid extraction endpoint '{0}'")]
    InvalidEndpoint(String),
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill: Option<SkillCategory>,
}

/// Status document served by the extraction service at `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub soft_skills_count: Option<u64>,
    #[serde(default)]
    pub hard_skills_count: Option<u64>,
}

/// Anything that can turn vacancy text into hard/soft skills.
///
/// The workers hold it as `Arc<dyn SkillExtractor>`, so tests can drive them
/// with a fake.
#[async_trait]
pub trait SkillExtractor: Send + Sync {
    /// Extracts skills, optionally restricted to one category. Never fails:
    /// problems are logged and reported as an empty result.
    async fn extract(&self, text: &str, category: Option<SkillCategory>) -> SkillResult;
}

/// HTTP client for the skill extraction service.
#[derive(Clone)]
pub struct SkillClient {
    client: Client,
    endpoint: Url,
    health_url: Url,
}

impl SkillClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ExtractionError> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| ExtractionError::InvalidEndpoint(endpoint.into()))?;

        let mut health_url = endpoint.clone();
        health_url.set_path("/health");
        health_url.set_query(None);

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            health_url,
        })
    }

    /// Makes one extraction call and surfaces every failure as an error.
    pub async fn try_extract(
        &self,
        text: &str,
        category: Option<SkillCategory>,
    ) -> Result<SkillResult, ExtractionError> {
        let request_body = ExtractRequest {
            body: text,
            skill: category,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        let result = SkillResult::from_value(&value);

        debug!(
            hard = result.hard.len(),
            soft = result.soft.len(),
            category = ?category,
            "Skill extraction succeeded"
        );

        Ok(result)
    }

    /// Queries the service's health endpoint.
    pub async fn health(&self) -> Result<ServiceHealth, ExtractionError> {
        let response = self.client.get(self.health_url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ServiceHealth>().await?)
    }
}

#[async_trait]
impl SkillExtractor for SkillClient {
    async fn extract(&self, text: &str, category: Option<SkillCategory>) -> SkillResult {
        // The service rejects empty bodies with a 400; skip the round trip.
        if text.trim().is_empty() {
            return SkillResult::empty();
        }

        match self.try_extract(text, category).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Skill extraction failed, using empty result: {e}");
                SkillResult::empty()
            }
        }
    }
}
