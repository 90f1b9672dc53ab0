//! Typed errors shared by the Reddit and Readwise clients.
use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The OAuth password grant failed.
    #[error("auth error: {0}")]
    Auth(String),

    /// Non-2xx status or a structured error envelope from an upstream API.
    #[error("API error: {message}")]
    Api {
        status: Option<StatusCode>,
        code: Option<String>,
        codes: Vec<String>,
        message: String,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown thing kind `{0}`")]
    UnknownKind(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl Error {
    pub(crate) fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        Error::Transport {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Decode {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Api {
            status: Some(status),
            code: None,
            codes: Vec::new(),
            message: message.into(),
        }
    }

    /// Upstream status code, when the error came from an HTTP response.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status, .. } => *status,
            _ => None,
        }
    }
}
