//! Reddit "thing" envelopes: `{ "kind": ..., "data": { ... } }`.
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

pub const KIND_COMMENT: &str = "t1";
pub const KIND_SUBMISSION: &str = "t3";
pub const KIND_MESSAGE: &str = "t4";
pub const KIND_LISTING: &str = "Listing";

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Thing {
    #[serde(rename = "t1")]
    Comment(Comment),
    #[serde(rename = "t3")]
    Submission(Submission),
    #[serde(rename = "t4")]
    Message(Message),
    Listing(ListingData),
}

impl Thing {
    /// Decode a raw envelope, rejecting kinds that are not modelled here
    /// before looking at the payload.
    pub fn from_value(value: Value) -> Result<Thing> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnknownKind("<missing>".into()))?;
        match kind {
            KIND_COMMENT | KIND_SUBMISSION | KIND_MESSAGE | KIND_LISTING => {}
            other => return Err(Error::UnknownKind(other.to_string())),
        }
        let context = format!("malformed {kind}");
        serde_json::from_value(value).map_err(|err| Error::decode(context, err))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Thing::Comment(_) => KIND_COMMENT,
            Thing::Submission(_) => KIND_SUBMISSION,
            Thing::Message(_) => KIND_MESSAGE,
            Thing::Listing(_) => KIND_LISTING,
        }
    }
}

/// A private message (`t4`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub new: bool,
}

impl Message {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.created_utc)
    }
}

/// A comment (`t1`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Comment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    pub body: String,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub link_id: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub created_utc: f64,
}

impl Comment {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.created_utc)
    }
}

/// A link or self post (`t3`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Submission {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub subreddit: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// Payload of a `Listing`. Children stay raw so each can be decoded (and
/// rejected) on its own.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub dist: Option<u64>,
    #[serde(default)]
    pub children: Vec<Value>,
}

fn epoch_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if secs <= 0.0 {
        return None;
    }
    Utc.timestamp_opt(secs as i64, 0).single()
}

macro_rules! impl_try_from_thing {
    ($ty:ident, $variant:ident, $kind:expr) => {
        impl TryFrom<Thing> for $ty {
            type Error = Error;

            fn try_from(thing: Thing) -> Result<Self> {
                match thing {
                    Thing::$variant(inner) => Ok(inner),
                    other => Err(Error::Validation(format!(
                        "expected {} but got {}",
                        $kind,
                        other.kind()
                    ))),
                }
            }
        }
    };
}

impl_try_from_thing!(Message, Message, KIND_MESSAGE);
impl_try_from_thing!(Comment, Comment, KIND_COMMENT);
impl_try_from_thing!(Submission, Submission, KIND_SUBMISSION);
impl_try_from_thing!(ListingData, Listing, KIND_LISTING);

/// `true` for ids that already carry a type prefix (`t1_`, `t4_`, ...).
pub fn is_fullname(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() > 3 && bytes[0] == b't' && bytes[1].is_ascii_digit() && bytes[2] == b'_'
}

/// Prefix `id` with `<prefix>_` unless it already carries it.
pub fn fullname(prefix: &str, id: &str) -> String {
    if id.starts_with(&format!("{prefix}_")) {
        id.to_string()
    } else {
        format!("{prefix}_{id}")
    }
}
