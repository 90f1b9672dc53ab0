//! HTTP transport injected into the API clients.
//!
//! Clients build `reqwest::Request`s with [`HttpTransport::client`] and hand
//! them to [`HttpTransport::execute`], so tests can swap the network for a
//! scripted fake without touching client code.
use async_trait::async_trait;
use reqwest::{Client, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Parse the body as JSON, falling back to `Null` for empty or non-JSON bodies.
    pub fn json_or_null(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Client used only to build requests.
    fn client(&self) -> &Client;

    async fn execute(&self, request: Request) -> Result<HttpResponse, reqwest::Error>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let http = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    fn client(&self) -> &Client {
        &self.http
    }

    async fn execute(&self, request: Request) -> Result<HttpResponse, reqwest::Error> {
        let res = self.http.execute(request).await?;
        let status = res.status();
        let body = res.bytes().await?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
