//! API client for a running churn-server

use anyhow::{Context, Result};
use churn_core::{ArtifactInfo, RiskSummary, ScoredPrediction};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// API client for the prediction endpoints
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request with a raw body
    pub async fn post_bytes<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => anyhow::bail!("API error ({}): {}: {}", status, err.error, err.message),
                Err(_) => anyhow::bail!("API error ({}): {}", status, body),
            }
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

/// Scored batch, as returned by the server or produced locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    pub predictions: Vec<ScoredPrediction>,
    pub summary: RiskSummary,
    #[serde(default)]
    pub corrections: Vec<Value>,
    pub scaler_version: String,
    pub model_version: String,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(flatten)]
    pub artifacts: ArtifactInfo,
    pub low_risk_threshold: f64,
    pub high_risk_threshold: f64,
    pub csv_policy: String,
    pub json_policy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
