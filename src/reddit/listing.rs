//! Cursor-paginated listings (`kind: "Listing"`).
use futures::future::join_all;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

use super::client::RedditClient;
use super::model::{ListingData, Thing};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingParams {
    pub limit: Option<u32>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub count: Option<u32>,
    /// Sends `show=all`, which disables Reddit's hide filters.
    pub show_all: bool,
}

impl ListingParams {
    fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit".into(), limit.to_string()));
        }
        if let Some(after) = &self.after {
            pairs.push(("after".into(), after.clone()));
        }
        if let Some(before) = &self.before {
            pairs.push(("before".into(), before.clone()));
        }
        if let Some(count) = self.count {
            pairs.push(("count".into(), count.to_string()));
        }
        if self.show_all {
            pairs.push(("show".into(), "all".into()));
        }
        pairs
    }
}

/// A listing child that could not be decoded into the item type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub fullname: Option<String>,
    pub reason: String,
}

pub struct Listing<'a, T> {
    client: &'a RedditClient,
    uri: String,
    params: ListingParams,
    items: Vec<T>,
    rejected: Vec<Rejected>,
    done: bool,
}

impl<'a, T> Listing<'a, T>
where
    T: TryFrom<Thing, Error = Error> + Clone,
{
    pub fn new(client: &'a RedditClient, uri: impl Into<String>, params: ListingParams) -> Self {
        Self {
            client,
            uri: uri.into(),
            params,
            items: Vec::new(),
            rejected: Vec::new(),
            done: false,
        }
    }

    pub fn has_more(&self) -> bool {
        !self.done
    }

    /// Items accumulated so far, in fetch order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn rejected(&self) -> &[Rejected] {
        &self.rejected
    }

    /// Fetch one page and return its items. Once the cursor is exhausted this
    /// returns an empty page without touching the network.
    pub async fn fetch_next(&mut self) -> Result<Vec<T>> {
        if self.done {
            return Ok(Vec::new());
        }

        let pairs = self.params.to_pairs();
        let query: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let body = self.client.get(&self.uri, &query).await?;
        let data = ListingData::try_from(Thing::from_value(body)?)?;

        let mut page = Vec::with_capacity(data.children.len());
        for child in data.children {
            let fullname = child
                .pointer("/data/name")
                .and_then(Value::as_str)
                .map(str::to_string);
            match Thing::from_value(child).and_then(T::try_from) {
                Ok(item) => page.push(item),
                Err(err) => {
                    warn!(uri = %self.uri, ?fullname, %err, "rejected listing child");
                    self.rejected.push(Rejected {
                        fullname,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.params.after = data.after.filter(|after| !after.is_empty());
        self.done = self.params.after.is_none();
        debug!(uri = %self.uri, page = page.len(), done = self.done, "fetched listing page");

        self.items.extend(page.iter().cloned());
        Ok(page)
    }

    /// Fetch every remaining page and return all accumulated items.
    pub async fn fetch_all(&mut self) -> Result<Vec<T>> {
        while self.has_more() {
            self.fetch_next().await?;
        }
        Ok(self.items.clone())
    }

    /// Apply `f` to every item of every page. Items of a page run
    /// concurrently while the following page is fetched; results keep item
    /// order.
    pub async fn map_concurrent<F, Fut, U>(&mut self, f: F) -> Result<Vec<U>>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = U>,
    {
        let mut results = Vec::with_capacity(self.items.len());
        let mut pending = self.items.clone();
        while self.has_more() {
            let work = join_all(pending.into_iter().map(&f));
            let (mut done, next) = futures::join!(work, self.fetch_next());
            results.append(&mut done);
            pending = next?;
        }
        results.extend(join_all(pending.into_iter().map(&f)).await);
        Ok(results)
    }
}
