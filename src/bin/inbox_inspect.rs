use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use reddit_readwise::config;
use reddit_readwise::http::ReqwestTransport;
use reddit_readwise::link::classify;
use reddit_readwise::reddit::{InboxKind, ListingParams, Reddit, RedditClient};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Folder {
    Inbox,
    Unread,
    Sent,
}

impl From<Folder> for InboxKind {
    fn from(folder: Folder) -> Self {
        match folder {
            Folder::Inbox => InboxKind::Inbox,
            Folder::Unread => InboxKind::Unread,
            Folder::Sent => InboxKind::Sent,
        }
    }
}

/// Print the bot's messages without marking anything read.
#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long, value_enum, default_value = "unread")]
    folder: Folder,

    /// Stop after this many pages
    #[arg(long, default_value = "1")]
    pages: usize,

    /// Messages per page (Reddit caps this at 100)
    #[arg(long)]
    limit: Option<u32>,

    /// Start after this fullname
    #[arg(long)]
    after: Option<String>,

    /// Include messages hidden by Reddit's filters
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let transport = Arc::new(ReqwestTransport::new(&cfg.reddit.user_agent)?);
    let reddit = Reddit::new(RedditClient::new(transport, cfg.credentials())?);

    let params = ListingParams {
        limit: args.limit,
        after: args.after,
        show_all: args.all,
        ..Default::default()
    };
    let mut listing = reddit.inbox_with(args.folder.into(), params);
    for _ in 0..args.pages {
        if !listing.has_more() {
            break;
        }
        listing.fetch_next().await?;
    }

    for msg in listing.items() {
        println!(
            "{} from {} ({:?}) at {}",
            msg.name,
            msg.author.as_deref().unwrap_or("[none]"),
            classify(&msg.body),
            msg.created_at()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "?".into())
        );
        println!("  subject: {}", msg.subject);
        println!("  body: {}", msg.body.trim());
    }
    for rejected in listing.rejected() {
        println!(
            "rejected {}: {}",
            rejected.fullname.as_deref().unwrap_or("[unnamed]"),
            rejected.reason
        );
    }
    if listing.has_more() {
        println!("(more pages available)");
    }
    Ok(())
}
