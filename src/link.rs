//! Message classification and comment permalink parsing.
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::error::{Error, Result};

static BASE36_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-z]+$").expect("valid id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A notes-API token the sender wants linked to their username.
    Token,
    /// A link to something the sender wants saved.
    Url,
}

/// Anything that parses as an absolute URL is a link; everything else is
/// treated as a token candidate.
pub fn classify(body: &str) -> MessageKind {
    match Url::parse(body.trim()) {
        Ok(_) => MessageKind::Url,
        Err(_) => MessageKind::Token,
    }
}

/// A parsed `/r/<subreddit>/comments/<submission>/<slug>/<comment>` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLink {
    pub subreddit: String,
    pub submission_id: String,
    pub comment_id: String,
    /// The input with its query and fragment removed.
    pub source_url: String,
}

impl CommentLink {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut url = Url::parse(raw.trim())
            .map_err(|err| Error::Validation(format!("not a url: {err}")))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segs| segs.collect())
            .unwrap_or_default();
        let segments = match segments.as_slice() {
            [head @ .., ""] => head,
            all => all,
        };
        let (subreddit, submission_id, comment_id) = match segments {
            ["r", subreddit, "comments", submission, _slug, comment] => {
                (subreddit.to_string(), submission.to_string(), comment.to_string())
            }
            _ => {
                return Err(Error::Validation(format!(
                    "{} is not a comment permalink",
                    url.path()
                )))
            }
        };
        for id in [&submission_id, &comment_id] {
            if !BASE36_ID.is_match(id) {
                return Err(Error::Validation(format!("invalid reddit id `{id}`")));
            }
        }

        url.set_query(None);
        url.set_fragment(None);
        Ok(Self {
            subreddit,
            submission_id,
            comment_id,
            source_url: url.to_string(),
        })
    }
}
