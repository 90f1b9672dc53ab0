//! The slice of Reddit's API this bot needs: its inbox, marking messages
//! read, and looking up comments and submissions by fullname.
use std::fmt;

use tracing::instrument;

use crate::error::{Error, Result};

pub mod client;
pub mod listing;
pub mod model;

pub use client::{Credentials, RedditClient};
pub use listing::{Listing, ListingParams, Rejected};
pub use model::{fullname, is_fullname, Comment, Message, Submission, Thing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboxKind {
    Inbox,
    Unread,
    Sent,
}

impl InboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboxKind::Inbox => "inbox",
            InboxKind::Unread => "unread",
            InboxKind::Sent => "sent",
        }
    }
}

impl fmt::Display for InboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Reddit {
    client: RedditClient,
}

impl Reddit {
    pub fn new(client: RedditClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RedditClient {
        &self.client
    }

    /// Lazily paginated view of `/message/<kind>`. Nothing is fetched until
    /// the listing is driven.
    pub fn inbox(&self, kind: InboxKind) -> Listing<'_, Message> {
        self.inbox_with(kind, ListingParams::default())
    }

    /// Like [`Reddit::inbox`], starting from explicit page size, cursor and
    /// filter parameters.
    pub fn inbox_with(&self, kind: InboxKind, params: ListingParams) -> Listing<'_, Message> {
        Listing::new(&self.client, format!("/message/{kind}"), params)
    }

    /// Mark a message read. Bare ids are taken to be messages; fullnames of
    /// other kinds (comment replies land in the inbox too) pass through.
    #[instrument(skip(self))]
    pub async fn read_message(&self, id: &str) -> Result<()> {
        let name = if is_fullname(id) {
            id.to_string()
        } else {
            fullname(model::KIND_MESSAGE, id)
        };
        self.client
            .post("/api/read_message", &[("id", name.as_str())])
            .await?;
        Ok(())
    }

    pub async fn comment(&self, id: &str) -> Result<Comment> {
        Comment::try_from(self.thing(&fullname(model::KIND_COMMENT, id)).await?)
    }

    pub async fn submission(&self, id: &str) -> Result<Submission> {
        Submission::try_from(self.thing(&fullname(model::KIND_SUBMISSION, id)).await?)
    }

    async fn thing(&self, name: &str) -> Result<Thing> {
        let body = self.client.get("/api/info", &[("id", name)]).await?;
        let listing = model::ListingData::try_from(Thing::from_value(body)?)?;
        let first = listing
            .children
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        Thing::from_value(first)
    }
}
