use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::Form;
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::http::HttpTransport;

pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
pub const API_BASE: &str = "https://oauth.reddit.com/";

/// Script-app credentials for the password grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("username", &self.username)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSession {
    /// `"<token_type> <access_token>"`, ready for the Authorization header.
    pub bearer: String,
    /// Unix seconds after which the session is refreshed.
    pub expires_at: i64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn describe(&self) -> String {
        format!(
            "{}. {}",
            self.error.as_deref().unwrap_or("unknown error"),
            self.error_description.as_deref().unwrap_or("no description")
        )
    }
}

/// OAuth-authenticated client for Reddit's REST API.
pub struct RedditClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Credentials,
    token_url: Url,
    api_base: Url,
    session: Mutex<Option<OAuthSession>>,
}

impl fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditClient")
            .field("username", &self.credentials.username)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl RedditClient {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Credentials) -> Result<Self> {
        let token_url = parse_url(TOKEN_URL)?;
        let api_base = parse_url(API_BASE)?;
        Ok(Self::with_urls(transport, credentials, token_url, api_base))
    }

    pub fn with_urls(
        transport: Arc<dyn HttpTransport>,
        credentials: Credentials,
        token_url: Url,
        api_base: Url,
    ) -> Self {
        Self {
            transport,
            credentials,
            token_url,
            api_base,
            session: Mutex::new(None),
        }
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Return a bearer value, refreshing it once half its lifetime has passed.
    pub async fn authenticate(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        let now = Utc::now().timestamp();
        if let Some(current) = session.as_ref() {
            if now < current.expires_at {
                return Ok(current.bearer.clone());
            }
        }
        let fresh = self.fetch_session(now).await?;
        let bearer = fresh.bearer.clone();
        *session = Some(fresh);
        Ok(bearer)
    }

    async fn fetch_session(&self, now: i64) -> Result<OAuthSession> {
        let creds = &self.credentials;
        let form = [
            ("grant_type", "password"),
            ("username", creds.username.as_str()),
            ("password", creds.password.as_str()),
        ];
        let request = self
            .transport
            .client()
            .post(self.token_url.clone())
            .basic_auth(&creds.app_id, Some(&creds.app_secret))
            .header(USER_AGENT, &creds.user_agent)
            .header(ACCEPT, "application/json")
            .form(&form)
            .build()
            .map_err(|err| Error::transport("error getting token", err))?;

        debug!(username = %creds.username, "requesting reddit access token");
        let res = self
            .transport
            .execute(request)
            .await
            .map_err(|err| Error::transport("error getting token", err))?;
        let body: TokenResponse = res.json().unwrap_or_default();

        if res.status.is_success() {
            return match (&body.token_type, &body.access_token) {
                (Some(token_type), Some(access_token)) => Ok(OAuthSession {
                    bearer: format!("{token_type} {access_token}"),
                    expires_at: now + body.expires_in.unwrap_or(0) / 2,
                }),
                _ => Err(Error::Auth(format!(
                    "cannot obtain token for username {}. {}",
                    creds.username,
                    body.describe()
                ))),
            };
        }
        if res.status.is_client_error() {
            return Err(Error::Auth(format!(
                "cannot obtain token for username {u}. Did you give {u} access in your Reddit app preferences? {}. Status code: {}",
                body.describe(),
                res.status.as_u16(),
                u = creds.username,
            )));
        }
        Err(Error::Auth(format!(
            "cannot obtain token for username {}. {}. Status code: {}",
            creds.username,
            body.describe(),
            res.status.as_u16()
        )))
    }

    /// Issue an authenticated request. `api_type=json` is always added; GET
    /// sends `data` as the query string, POST as a urlencoded form, and
    /// PATCH/PUT/DELETE as a multipart form.
    #[instrument(skip(self, data))]
    pub async fn request(&self, method: Method, path: &str, data: &[(&str, &str)]) -> Result<Value> {
        let bearer = self.authenticate().await?;
        let url = self
            .api_base
            .join(path.trim_start_matches('/'))
            .map_err(|err| Error::Validation(format!("invalid path {path}: {err}")))?;

        let mut params: Vec<(String, String)> = data
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        params.push(("api_type".into(), "json".into()));

        let builder = self
            .transport
            .client()
            .request(method.clone(), url)
            .header(AUTHORIZATION, bearer)
            .header(USER_AGENT, &self.credentials.user_agent)
            .header(ACCEPT, "application/json");
        let builder = if method == Method::GET {
            builder.query(&params)
        } else if method == Method::POST {
            builder.form(&params)
        } else if method == Method::PATCH || method == Method::PUT || method == Method::DELETE {
            let form = params
                .into_iter()
                .fold(Form::new(), |form, (k, v)| form.text(k, v));
            builder.multipart(form)
        } else {
            return Err(Error::Validation(format!("unsupported method {method}")));
        };

        let context = format!("{method} {path} failed");
        let request = builder
            .build()
            .map_err(|err| Error::transport(context.clone(), err))?;
        let res = self
            .transport
            .execute(request)
            .await
            .map_err(|err| Error::transport(context, err))?;

        let body = res.json_or_null();
        check_envelope(&body)?;
        if !res.status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| res.text());
            return Err(Error::status(
                res.status,
                format!("{message}. Status code: {}", res.status.as_u16()),
            ));
        }
        Ok(body)
    }

    pub async fn get(&self, path: &str, data: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::GET, path, data).await
    }

    pub async fn post(&self, path: &str, data: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::POST, path, data).await
    }

    pub async fn patch(&self, path: &str, data: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::PATCH, path, data).await
    }

    pub async fn put(&self, path: &str, data: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::PUT, path, data).await
    }

    pub async fn delete(&self, path: &str, data: &[(&str, &str)]) -> Result<Value> {
        self.request(Method::DELETE, path, data).await
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|err| Error::Validation(format!("invalid url {raw}: {err}")))
}

/// Fail on Reddit's `{"json": {"errors": [[code, message, field], ...]}}` envelope.
pub(crate) fn check_envelope(body: &Value) -> Result<()> {
    let Some(errors) = body.pointer("/json/errors").and_then(Value::as_array) else {
        return Ok(());
    };
    if errors.is_empty() {
        return Ok(());
    }

    let part = |err: &Value, idx: usize| -> String {
        match err.get(idx) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        }
    };
    let codes: Vec<String> = errors.iter().map(|e| part(e, 0)).collect();
    let message = errors
        .iter()
        .map(|e| format!("{}: {} ({})", part(e, 0), part(e, 1), part(e, 2)))
        .collect::<Vec<_>>()
        .join(". ");
    Err(Error::Api {
        status: None,
        code: codes.first().cloned(),
        codes,
        message,
    })
}
