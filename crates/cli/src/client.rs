//! API client for communicating with the sentinel agent

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Non-success response from the agent
#[derive(Debug, Error)]
#[error("API error ({status}): {body}")]
pub struct ApiError {
    pub status: StatusCode,
    pub body: String,
}

/// API client for the sentinel agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
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

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError { status, body }.into());
        }

        response.json().await.context("Failed to parse response")
    }

    /// GET that maps a 404 to `None`
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) => match e.downcast_ref::<ApiError>() {
                Some(api) if api.status == StatusCode::NOT_FOUND => Ok(None),
                _ => Err(e),
            },
        }
    }

    pub async fn status(&self) -> Result<AgentStatus> {
        self.get("api/v1/status").await
    }

    pub async fn latest(&self) -> Result<Option<Sample>> {
        self.get_optional("api/v1/latest").await
    }

    pub async fn series(&self, limit: Option<usize>) -> Result<Series> {
        let path = match limit {
            Some(limit) => format!("api/v1/series?limit={}", limit),
            None => "api/v1/series".to_string(),
        };
        self.get(&path).await
    }
}

// API response types

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: f64,
    pub recorded_at: i64,
    pub cpu_percent: f64,
    pub memory_percent: u8,
    pub inbound_kbps: f64,
    pub outbound_kbps: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    pub device: Device,
    pub connection: String,
    pub health: String,
    pub samples: usize,
    pub capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Sample>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub capacity: usize,
    pub retained: usize,
    pub timestamps: Vec<f64>,
    pub cpu: Vec<f64>,
    pub memory: Vec<f64>,
    pub inbound: Vec<f64>,
    pub outbound: Vec<f64>,
}
