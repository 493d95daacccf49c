//! HTTP descriptor provider
//!
//! `GET {base}/videos/{id}/streams[?quality=Q]` returning
//! `{"code": 0, "message": "", "data": <DescriptorResponse>}`.
//! Transient failures are retried with exponential backoff; every other
//! failure is classified and returned at once.

use super::DescriptorProvider;
use crate::config::{ProviderConfig, RetryPolicy};
use crate::error::FetchError;
use crate::types::{DescriptorResponse, QualityId, VideoId};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<DescriptorResponse>,
}

/// Classify a non-success HTTP status
pub fn classify_status(status: u16, retry_after_ms: Option<u64>) -> Option<FetchError> {
    let reason = format!("HTTP {}", status);
    match status {
        200..=299 => None,
        404 => Some(FetchError::NotFound(reason)),
        403 => Some(FetchError::RegionRestricted(reason)),
        412 | 429 => Some(FetchError::RateLimited { retry_after_ms }),
        _ => Some(FetchError::Transient(reason)),
    }
}

/// Classify a non-zero envelope code
pub fn classify_code(code: i64, message: &str) -> Option<FetchError> {
    let reason = if message.is_empty() {
        format!("code {}", code)
    } else {
        format!("code {}: {}", code, message)
    };
    match code {
        0 => None,
        -404 | 62002 | 62004 => Some(FetchError::NotFound(reason)),
        -10403 | 6002003 => Some(FetchError::RegionRestricted(reason)),
        -412 | -352 => Some(FetchError::RateLimited { retry_after_ms: None }),
        _ => Some(FetchError::Transient(reason)),
    }
}

fn classify_transport(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Transient(format!("timeout: {}", err))
    } else if err.is_connect() {
        FetchError::Transient(format!("connect: {}", err))
    } else {
        FetchError::Transient(err.to_string())
    }
}

/// reqwest-backed [`DescriptorProvider`]
#[derive(Debug, Clone)]
pub struct HttpDescriptorProvider {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl HttpDescriptorProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        let base_url = Url::parse(&config.base_url)?;
        Self::with_client(client, base_url, config.retry.clone())
    }

    pub fn with_client(client: Client, base_url: Url, retry: RetryPolicy) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "provider base URL cannot have path segments: {}",
                base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Endpoint URL for a fetch
    pub fn endpoint(
        &self,
        video_id: &VideoId,
        quality: Option<QualityId>,
    ) -> std::result::Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["videos", video_id.as_str(), "streams"]);

        if let Some(q) = quality {
            url.query_pairs_mut().append_pair("quality", &q.to_string());
        }
        Ok(url)
    }

    async fn fetch_once(&self, url: &Url) -> std::result::Result<DescriptorResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000));
            if let Some(err) = classify_status(status.as_u16(), retry_after_ms) {
                return Err(err);
            }
        }

        let body = response.text().await.map_err(|e| classify_transport(&e))?;
        let envelope: Envelope = serde_json::from_str(&body)
            .map_err(|e| FetchError::Malformed(format!("invalid envelope: {}", e)))?;

        if let Some(err) = classify_code(envelope.code, &envelope.message) {
            return Err(err);
        }

        envelope
            .data
            .ok_or_else(|| FetchError::Malformed("envelope has no data".into()))
    }
}

#[async_trait]
impl DescriptorProvider for HttpDescriptorProvider {
    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn fetch_descriptors(
        &self,
        video_id: &VideoId,
        target_quality: Option<QualityId>,
    ) -> std::result::Result<DescriptorResponse, FetchError> {
        let url = self.endpoint(video_id, target_quality)?;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.fetch_once(&url).await {
                Ok(response) => {
                    debug!(
                        attempt = attempt + 1,
                        descriptors = response.descriptors.len(),
                        granted = ?response.granted_quality,
                        "Descriptors fetched"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Descriptor fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt = attempt + 1, error = %err, "Descriptor fetch failed");
                    return Err(err);
                }
            }
        }
    }
}
