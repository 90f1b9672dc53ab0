#![allow(dead_code)]

use async_trait::async_trait;
use reddit_readwise::error::Error;
use reddit_readwise::http::{HttpResponse, HttpTransport};
use reddit_readwise::readwise::{Highlight, NotesService};
use reddit_readwise::reddit::{Credentials, Reddit, RedditClient};
use reqwest::{Client, Request, StatusCode, Url};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub const TOKEN_ROUTE: &str = "POST /api/v1/access_token";
pub const UNREAD_ROUTE: &str = "GET /message/unread";
pub const READ_ROUTE: &str = "POST /api/read_message";

#[derive(Debug, Clone)]
pub struct Call {
    pub key: String,
    pub url: Url,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

impl Call {
    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn form(&self, name: &str) -> Option<String> {
        let body = self.body.as_deref()?;
        Url::parse(&format!("http://form.local/?{body}"))
            .ok()?
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

/// Answers requests from per-route queues keyed `"<METHOD> <path>"`, plus
/// `?id=<value>` when the query carries an `id`. The last queued response of
/// a route repeats; unscripted routes get a 404.
pub struct ScriptedTransport {
    client: Client,
    routes: Mutex<HashMap<String, VecDeque<(u16, String)>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            client: Client::new(),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn on(&self, key: &str, status: u16, body: impl Into<String>) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back((status, body.into()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, key: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.key == key)
            .collect()
    }

    /// Fullnames passed to `/api/read_message`.
    pub fn read_ids(&self) -> BTreeSet<String> {
        self.calls_to(READ_ROUTE)
            .iter()
            .filter_map(|c| c.form("id"))
            .collect()
    }
}

fn route_key(request: &Request) -> String {
    let mut key = format!("{} {}", request.method(), request.url().path());
    if let Some((_, id)) = request.url().query_pairs().find(|(k, _)| k == "id") {
        key.push_str(&format!("?id={id}"));
    }
    key
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    fn client(&self) -> &Client {
        &self.client
    }

    async fn execute(&self, request: Request) -> Result<HttpResponse, reqwest::Error> {
        let key = route_key(&request);
        let header = |name: reqwest::header::HeaderName| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.calls.lock().unwrap().push(Call {
            key: key.clone(),
            url: request.url().clone(),
            authorization: header(reqwest::header::AUTHORIZATION),
            content_type: header(reqwest::header::CONTENT_TYPE),
            body: request
                .body()
                .and_then(|b| b.as_bytes())
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        });

        let mut routes = self.routes.lock().unwrap();
        let (status, body) = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue.front().cloned().unwrap(),
            _ => (404, r#"{"message": "Not Found", "error": 404}"#.to_string()),
        };
        Ok(HttpResponse::new(
            StatusCode::from_u16(status).unwrap(),
            body.into_bytes(),
        ))
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        app_id: "app".into(),
        app_secret: "secret".into(),
        username: "reddit-readwise".into(),
        password: "hunter2".into(),
        user_agent: "reddit-readwise-tests/0.1".into(),
    }
}

pub fn reddit_client(transport: &Arc<ScriptedTransport>) -> RedditClient {
    RedditClient::with_urls(
        transport.clone(),
        credentials(),
        Url::parse("https://www.reddit.test/api/v1/access_token").unwrap(),
        Url::parse("https://oauth.reddit.test/").unwrap(),
    )
}

pub fn token_response() -> String {
    json!({ "access_token": "abc", "token_type": "bearer", "expires_in": 3600 }).to_string()
}

/// A `Reddit` whose token endpoint and mark-read endpoint always succeed.
pub fn authed_reddit(transport: &Arc<ScriptedTransport>) -> Reddit {
    transport
        .on(TOKEN_ROUTE, 200, token_response())
        .on(READ_ROUTE, 200, "{}");
    Reddit::new(reddit_client(transport))
}

pub fn message(id: &str, author: &str, body: &str) -> Value {
    json!({
        "kind": "t4",
        "data": {
            "id": id,
            "name": format!("t4_{id}"),
            "author": author,
            "subject": "save this",
            "body": body,
            "created_utc": 1700000000.0,
            "new": true
        }
    })
}

pub fn listing(children: Vec<Value>, after: Option<&str>) -> String {
    json!({
        "kind": "Listing",
        "data": { "after": after, "before": null, "dist": children.len(), "children": children }
    })
    .to_string()
}

pub fn comment_info(id: &str, author: &str, body: &str) -> String {
    listing(
        vec![json!({
            "kind": "t1",
            "data": {
                "id": id,
                "name": format!("t1_{id}"),
                "author": author,
                "body": body,
                "subreddit": "test",
                "created_utc": 1600000000.0
            }
        })],
        None,
    )
}

pub fn submission_info(id: &str, title: &str) -> String {
    listing(
        vec![json!({
            "kind": "t3",
            "data": { "id": id, "name": format!("t3_{id}"), "title": title, "author": "op" }
        })],
        None,
    )
}

/// Script `/api/info` for a comment and its submission.
pub fn script_comment(
    transport: &ScriptedTransport,
    submission_id: &str,
    comment_id: &str,
    author: &str,
    body: &str,
) {
    transport
        .on(
            &format!("GET /api/info?id=t1_{comment_id}"),
            200,
            comment_info(comment_id, author, body),
        )
        .on(
            &format!("GET /api/info?id=t3_{submission_id}"),
            200,
            submission_info(submission_id, &format!("Thread {submission_id}")),
        );
}

pub fn permalink(submission_id: &str, comment_id: &str) -> String {
    format!("https://www.reddit.com/r/test/comments/{submission_id}/a_thread/{comment_id}/")
}

#[derive(Default)]
pub struct RecordingNotes {
    valid: HashSet<String>,
    failing: HashSet<String>,
    verify_calls: Mutex<Vec<String>>,
    batches: Mutex<Vec<(String, Vec<Highlight>)>>,
}

impl RecordingNotes {
    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            valid: tokens.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_submissions_for(mut self, token: &str) -> Self {
        self.failing.insert(token.to_string());
        self
    }

    pub fn verify_calls(&self) -> Vec<String> {
        self.verify_calls.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<(String, Vec<Highlight>)> {
        let mut batches = self.batches.lock().unwrap().clone();
        batches.sort_by(|a, b| a.0.cmp(&b.0));
        batches
    }
}

#[async_trait]
impl NotesService for RecordingNotes {
    async fn verify_token(&self, token: &str) -> bool {
        self.verify_calls.lock().unwrap().push(token.to_string());
        self.valid.contains(token)
    }

    async fn add_highlights(
        &self,
        token: &str,
        highlights: &[Highlight],
    ) -> reddit_readwise::error::Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push((token.to_string(), highlights.to_vec()));
        if self.failing.contains(token) {
            return Err(Error::Api {
                status: Some(StatusCode::INTERNAL_SERVER_ERROR),
                code: None,
                codes: Vec::new(),
                message: "readwise is down".into(),
            });
        }
        Ok(())
    }
}
