//! HTTP endpoint for saving a single comment on demand.
//!
//! `POST /` with `Authorization: Bearer <readwise token>` (or `Token ...`)
//! and either a JSON body `{"url": "..."}` or the URL as plain text.
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::inbox::comment_highlight;
use crate::link::{classify, CommentLink, MessageKind};
use crate::readwise::NotesService;
use crate::reddit::Reddit;

#[derive(Clone)]
pub struct AppState {
    pub reddit: Arc<Reddit>,
    pub notes: Arc<dyn NotesService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(submit_highlight))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug)]
enum Rejection {
    MissingAuth,
    MalformedAuth,
    InvalidToken,
    BadInput(String),
    Internal(anyhow::Error),
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::MissingAuth => {
                (StatusCode::UNAUTHORIZED, "missing authorization header").into_response()
            }
            Rejection::MalformedAuth => {
                (StatusCode::BAD_REQUEST, "malformed authorization header").into_response()
            }
            Rejection::InvalidToken => (StatusCode::FORBIDDEN, "invalid token").into_response(),
            Rejection::BadInput(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            Rejection::Internal(err) => {
                error!(?err, "on-demand submission failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

#[derive(Deserialize)]
struct SubmitBody {
    url: String,
}

pub async fn submit_highlight(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_submit(&state, &headers, &body).await {
        Ok(()) => (StatusCode::OK, "ok").into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_submit(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), Rejection> {
    let token = bearer_token(headers)?;
    let url = body_url(headers, body)?;
    let link = CommentLink::parse(&url).map_err(|err| Rejection::BadInput(err.to_string()))?;

    if !state.notes.verify_token(&token).await {
        warn!("on-demand submission with invalid token");
        return Err(Rejection::InvalidToken);
    }

    let highlight = match comment_highlight(&state.reddit, &link).await {
        Ok(highlight) => highlight,
        Err(Error::NotFound(name)) => {
            return Err(Rejection::BadInput(format!("{name} not found")));
        }
        Err(Error::Validation(msg)) => {
            return Err(Rejection::BadInput(format!("link does not point at a comment: {msg}")));
        }
        Err(err) => {
            return Err(Rejection::Internal(
                anyhow::Error::new(err).context("failed to fetch comment"),
            ))
        }
    };
    state
        .notes
        .add_highlights(&token, std::slice::from_ref(&highlight))
        .await
        .map_err(|err| Rejection::Internal(anyhow::Error::new(err).context("failed to submit highlight")))?;

    info!(source_url = %link.source_url, "saved highlight on demand");
    Ok(())
}

fn bearer_token(headers: &HeaderMap) -> Result<String, Rejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(Rejection::MissingAuth)?
        .to_str()
        .map_err(|_| Rejection::MalformedAuth)?;
    let (scheme, token) = value.trim().split_once(' ').ok_or(Rejection::MalformedAuth)?;
    let token = token.trim();
    let scheme_ok = scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token");
    if !scheme_ok || token.is_empty() {
        return Err(Rejection::MalformedAuth);
    }
    Ok(token.to_string())
}

fn body_url(headers: &HeaderMap, body: &[u8]) -> Result<String, Rejection> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    let raw = if is_json {
        serde_json::from_slice::<SubmitBody>(body)
            .map_err(|_| Rejection::BadInput("expected a JSON body with a url field".into()))?
            .url
    } else {
        std::str::from_utf8(body)
            .map_err(|_| Rejection::BadInput("body must be UTF-8 text".into()))?
            .to_string()
    };
    let raw = raw.trim().to_string();
    if classify(&raw) != MessageKind::Url {
        return Err(Rejection::BadInput("body is not a URL".into()));
    }
    Ok(raw)
}
