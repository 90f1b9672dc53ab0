use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::http::HttpTransport;

pub const READWISE_API_BASE: &str = "https://readwise.io/api/v2/";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Book,
    Article,
    Podcast,
}

/// One saved quote, in the shape Readwise's `highlights/` endpoint accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Highlight {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight_url: Option<String>,
}

#[async_trait]
pub trait NotesService: Send + Sync {
    /// `true` only if the notes API accepts `token`. Never fails.
    async fn verify_token(&self, token: &str) -> bool;

    async fn add_highlights(&self, token: &str, highlights: &[Highlight]) -> Result<()>;
}

#[derive(Clone)]
pub struct ReadwiseClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
}

impl fmt::Debug for ReadwiseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadwiseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ReadwiseClient {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let base_url = Url::parse(READWISE_API_BASE)
            .map_err(|err| Error::Validation(format!("invalid Readwise URL: {err}")))?;
        Ok(Self::with_base_url(transport, base_url))
    }

    pub fn with_base_url(transport: Arc<dyn HttpTransport>, base_url: Url) -> Self {
        Self {
            transport,
            base_url,
        }
    }

    pub fn build_request(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        token: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Request> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|err| Error::Validation(format!("invalid Readwise endpoint {endpoint}: {err}")))?;
        let mut builder = self
            .transport
            .client()
            .request(method, url)
            .header(AUTHORIZATION, format!("Token {token}"))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder
            .build()
            .map_err(|err| Error::transport("failed to build Readwise request", err))
    }
}

#[async_trait]
impl NotesService for ReadwiseClient {
    async fn verify_token(&self, token: &str) -> bool {
        let request = match self.build_request(reqwest::Method::GET, "auth/", token, None) {
            Ok(request) => request,
            Err(err) => {
                warn!(%err, "could not build Readwise auth check");
                return false;
            }
        };
        match self.transport.execute(request).await {
            Ok(res) => {
                debug!(status = %res.status, "Readwise auth check");
                res.status == StatusCode::NO_CONTENT
            }
            Err(err) => {
                debug!(%err, "Readwise auth check failed");
                false
            }
        }
    }

    async fn add_highlights(&self, token: &str, highlights: &[Highlight]) -> Result<()> {
        if highlights.is_empty() {
            return Ok(());
        }
        let body = json!({ "highlights": highlights });
        let request = self.build_request(reqwest::Method::POST, "highlights/", token, Some(&body))?;
        let res = self
            .transport
            .execute(request)
            .await
            .map_err(|err| Error::transport("failed to reach Readwise", err))?;
        if !res.status.is_success() {
            let text = res.text();
            warn!(status = %res.status, body = %text, "Readwise rejected highlights");
            return Err(Error::status(
                res.status,
                format!("readwise error {}: {}", res.status, text),
            ));
        }
        info!(count = highlights.len(), "submitted highlights to Readwise");
        Ok(())
    }
}
