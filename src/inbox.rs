//! One pass over the bot's unread inbox.
//!
//! Token messages link a Reddit username to a Readwise token; link messages
//! become highlights submitted under the sender's token. Every message is
//! handled on its own: a failure is recorded in the [`RunSummary`] and never
//! stops the rest of the batch.
use anyhow::{Context, Result};
use futures::future::join_all;
use reqwest::StatusCode;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::Error;
use crate::link::{classify, CommentLink, MessageKind};
use crate::readwise::{Highlight, NotesService, SourceType};
use crate::reddit::{InboxKind, Message, Reddit};
use crate::store::TokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Decode,
    Token,
    Link,
    Fetch,
    Submit,
    MarkRead,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Token => "token",
            Stage::Link => "link",
            Stage::Fetch => "fetch",
            Stage::Submit => "submit",
            Stage::MarkRead => "mark_read",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    pub fullname: Option<String>,
    pub author: Option<String>,
    pub stage: Stage,
    pub error: String,
}

impl MessageFailure {
    fn for_message(msg: &Message, stage: Stage, error: impl fmt::Display) -> Self {
        Self {
            fullname: Some(msg.name.clone()),
            author: msg.author.clone(),
            stage,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub messages: usize,
    pub tokens_registered: usize,
    pub tokens_rejected: usize,
    /// Token messages from users who already had a token on file.
    pub tokens_ignored: usize,
    pub highlights_submitted: usize,
    pub dropped_without_token: usize,
    pub marked_read: usize,
    pub failures: Vec<MessageFailure>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct TokenOutcome {
    registered: bool,
    rejected: usize,
    ignored: usize,
    /// Fullnames of messages that reached a final outcome.
    settled: Vec<String>,
    /// The token store failed; unsettled messages stay unread.
    store_failed: bool,
    failures: Vec<MessageFailure>,
}

#[derive(Debug)]
enum LinkOutcome {
    Queued { token: String, highlight: Highlight },
    NoToken,
    Failed {
        failure: MessageFailure,
        /// Permanent failures are acknowledged; transient ones stay unread
        /// so the next run retries them.
        mark_read: bool,
    },
}

pub struct InboxProcessor<'a> {
    reddit: &'a Reddit,
    notes: &'a dyn NotesService,
    store: &'a dyn TokenStore,
}

impl<'a> InboxProcessor<'a> {
    pub fn new(reddit: &'a Reddit, notes: &'a dyn NotesService, store: &'a dyn TokenStore) -> Self {
        Self {
            reddit,
            notes,
            store,
        }
    }

    /// Process every unread message. Fails only when the inbox itself cannot
    /// be listed, in which case nothing is marked read.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        self.process(run_id)
            .instrument(info_span!("inbox_run", %run_id))
            .await
    }

    async fn process(&self, run_id: Uuid) -> Result<RunSummary> {
        let mut summary = RunSummary {
            run_id,
            ..Default::default()
        };

        let mut listing = self.reddit.inbox(InboxKind::Unread);
        let classified = listing
            .map_concurrent(|msg| async move {
                let kind = classify(&msg.body);
                (msg, kind)
            })
            .await
            .context("failed to fetch unread messages")?;

        let mut to_mark: Vec<(String, Option<String>)> = Vec::new();
        for rejected in listing.rejected() {
            summary.failures.push(MessageFailure {
                fullname: rejected.fullname.clone(),
                author: None,
                stage: Stage::Decode,
                error: rejected.reason.clone(),
            });
            if let Some(name) = &rejected.fullname {
                to_mark.push((name.clone(), None));
            }
        }
        summary.messages = classified.len() + listing.rejected().len();

        let mut token_msgs: BTreeMap<String, Vec<Message>> = BTreeMap::new();
        let mut link_msgs: Vec<Message> = Vec::new();
        for (msg, kind) in classified {
            let Some(author) = msg.author.clone() else {
                summary
                    .failures
                    .push(MessageFailure::for_message(&msg, Stage::Decode, "message has no author"));
                to_mark.push((msg.name.clone(), None));
                continue;
            };
            match kind {
                MessageKind::Token => token_msgs.entry(author).or_default().push(msg),
                MessageKind::Url => link_msgs.push(msg),
            }
        }
        debug!(
            tokens = token_msgs.values().map(Vec::len).sum::<usize>(),
            links = link_msgs.len(),
            "classified unread messages"
        );

        // Tokens first, so links sent alongside a new token can use it.
        let token_outcomes = join_all(
            token_msgs
                .iter()
                .map(|(author, msgs)| self.register_token(author, msgs)),
        )
        .await;
        let mut store_failed: HashSet<String> = HashSet::new();
        for (author, outcome) in token_msgs.keys().zip(token_outcomes) {
            summary.tokens_registered += usize::from(outcome.registered);
            summary.tokens_rejected += outcome.rejected;
            summary.tokens_ignored += outcome.ignored;
            summary.failures.extend(outcome.failures);
            if outcome.store_failed {
                store_failed.insert(author.clone());
            }
            to_mark.extend(
                outcome
                    .settled
                    .into_iter()
                    .map(|name| (name, Some(author.clone()))),
            );
        }

        // Links from authors whose token could not be stored wait for the
        // retry, otherwise they would be dropped as tokenless.
        let (held, link_msgs): (Vec<Message>, Vec<Message>) =
            link_msgs.into_iter().partition(|msg| {
                msg.author
                    .as_ref()
                    .is_some_and(|author| store_failed.contains(author))
            });
        summary.failures.extend(held.iter().map(|msg| {
            MessageFailure::for_message(msg, Stage::Token, "token registration pending; left unread")
        }));

        let link_outcomes = join_all(link_msgs.iter().map(|msg| self.queue_highlight(msg))).await;

        // token -> messages and their highlights, in inbox order.
        let mut batches: Vec<(String, Vec<(&Message, Highlight)>)> = Vec::new();
        let mut batch_index: HashMap<String, usize> = HashMap::new();
        for (msg, outcome) in link_msgs.iter().zip(link_outcomes) {
            match outcome {
                LinkOutcome::Queued { token, highlight } => {
                    let idx = *batch_index.entry(token.clone()).or_insert_with(|| {
                        batches.push((token, Vec::new()));
                        batches.len() - 1
                    });
                    batches[idx].1.push((msg, highlight));
                }
                LinkOutcome::NoToken => {
                    summary.dropped_without_token += 1;
                    to_mark.push((msg.name.clone(), msg.author.clone()));
                }
                LinkOutcome::Failed { failure, mark_read } => {
                    if mark_read {
                        to_mark.push((msg.name.clone(), msg.author.clone()));
                    }
                    summary.failures.push(failure);
                }
            }
        }

        let submissions = join_all(batches.iter().map(|(token, items)| async move {
            let highlights: Vec<Highlight> = items.iter().map(|(_, h)| h.clone()).collect();
            self.notes.add_highlights(token, &highlights).await
        }))
        .await;
        for ((_, items), result) in batches.iter().zip(submissions) {
            match result {
                Ok(()) => {
                    summary.highlights_submitted += items.len();
                    to_mark.extend(items.iter().map(|(m, _)| (m.name.clone(), m.author.clone())));
                }
                Err(err) => {
                    warn!(%err, count = items.len(), "highlight batch rejected; leaving messages unread");
                    summary.failures.extend(
                        items
                            .iter()
                            .map(|(m, _)| MessageFailure::for_message(m, Stage::Submit, &err)),
                    );
                }
            }
        }

        let marks = join_all(to_mark.iter().map(|(name, _)| self.reddit.read_message(name))).await;
        for ((name, author), result) in to_mark.into_iter().zip(marks) {
            match result {
                Ok(()) => summary.marked_read += 1,
                Err(err) => summary.failures.push(MessageFailure {
                    fullname: Some(name),
                    author,
                    stage: Stage::MarkRead,
                    error: err.to_string(),
                }),
            }
        }

        for failure in &summary.failures {
            warn!(
                fullname = ?failure.fullname,
                author = ?failure.author,
                stage = %failure.stage,
                error = %failure.error,
                "message failed"
            );
        }
        info!(
            messages = summary.messages,
            tokens_registered = summary.tokens_registered,
            tokens_rejected = summary.tokens_rejected,
            highlights = summary.highlights_submitted,
            dropped = summary.dropped_without_token,
            marked_read = summary.marked_read,
            failures = summary.failures.len(),
            "inbox run complete"
        );
        Ok(summary)
    }

    /// First verified token wins: once a user has a token on file, later
    /// token messages are ignored.
    async fn register_token(&self, author: &str, msgs: &[Message]) -> TokenOutcome {
        let mut outcome = TokenOutcome::default();
        match self.store.get(author).await {
            Ok(Some(_)) => {
                debug!(%author, count = msgs.len(), "token already on file; ignoring");
                outcome.ignored = msgs.len();
                outcome.settled = msgs.iter().map(|m| m.name.clone()).collect();
                return outcome;
            }
            Ok(None) => {}
            Err(err) => {
                outcome.store_failed = true;
                outcome.failures.extend(
                    msgs.iter()
                        .map(|m| MessageFailure::for_message(m, Stage::Token, format!("{err:#}"))),
                );
                return outcome;
            }
        }

        for (idx, msg) in msgs.iter().enumerate() {
            let token = msg.body.trim();
            if !self.notes.verify_token(token).await {
                warn!(%author, message = %msg.name, "token failed verification; dropping");
                outcome.rejected += 1;
                outcome.settled.push(msg.name.clone());
                continue;
            }
            match self.store.put(author, token).await {
                Ok(()) => {
                    info!(%author, "registered token");
                    outcome.registered = true;
                    outcome.ignored += msgs.len() - idx - 1;
                    outcome
                        .settled
                        .extend(msgs[idx..].iter().map(|m| m.name.clone()));
                }
                Err(err) => {
                    outcome.store_failed = true;
                    outcome.failures.push(MessageFailure::for_message(
                        msg,
                        Stage::Token,
                        format!("{err:#}"),
                    ));
                }
            }
            break;
        }
        outcome
    }

    async fn queue_highlight(&self, msg: &Message) -> LinkOutcome {
        let author = msg.author.as_deref().unwrap_or_default();
        let token = match self.store.get(author).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(%author, message = %msg.name, "no token on file; dropping link");
                return LinkOutcome::NoToken;
            }
            Err(err) => {
                return LinkOutcome::Failed {
                    failure: MessageFailure::for_message(msg, Stage::Token, format!("{err:#}")),
                    mark_read: false,
                }
            }
        };

        let link = match CommentLink::parse(&msg.body) {
            Ok(link) => link,
            Err(err) => {
                return LinkOutcome::Failed {
                    failure: MessageFailure::for_message(msg, Stage::Link, err),
                    mark_read: true,
                }
            }
        };

        match comment_highlight(self.reddit, &link).await {
            Ok(highlight) => LinkOutcome::Queued { token, highlight },
            Err(err) => LinkOutcome::Failed {
                mark_read: is_permanent(&err),
                failure: MessageFailure::for_message(msg, Stage::Fetch, err),
            },
        }
    }
}

/// Errors that will repeat on every retry of the same link. Rate limits and
/// auth rejections are client errors too, but pass with time.
fn is_permanent(err: &Error) -> bool {
    match err {
        Error::NotFound(_) | Error::Validation(_) | Error::UnknownKind(_) | Error::Decode { .. } => {
            true
        }
        Error::Api { .. } => err.status_code().is_some_and(|status| {
            status.is_client_error()
                && status != StatusCode::UNAUTHORIZED
                && status != StatusCode::REQUEST_TIMEOUT
                && status != StatusCode::TOO_MANY_REQUESTS
        }),
        Error::Auth(_) | Error::Transport { .. } => false,
    }
}

/// Look up the linked comment and its submission and turn them into a
/// highlight.
pub async fn comment_highlight(reddit: &Reddit, link: &CommentLink) -> crate::error::Result<Highlight> {
    let (comment, submission) = futures::try_join!(
        reddit.comment(&link.comment_id),
        reddit.submission(&link.submission_id)
    )?;
    let highlighted_at = comment.created_at();
    Ok(Highlight {
        text: comment.body,
        author: comment.author,
        title: Some(submission.title),
        source_url: Some(link.source_url.clone()),
        source_type: Some(SourceType::Article),
        highlighted_at,
        ..Default::default()
    })
}
