use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Url;
use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use reddit_readwise::config;
use reddit_readwise::http::{HttpTransport, ReqwestTransport};
use reddit_readwise::inbox::{InboxProcessor, RunSummary};
use reddit_readwise::readwise::{NotesService, ReadwiseClient};
use reddit_readwise::reddit::{Reddit, RedditClient};
use reddit_readwise::server::{self, AppState};
use reddit_readwise::store::{MemoryTokenStore, SqliteTokenStore, TokenStore};

#[derive(Debug, Parser)]
#[command(author, version, about = "Save Reddit comments sent by private message to Readwise")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process the unread inbox once and exit (default)
    Run,
    /// Process the inbox every `app.poll_interval_secs`
    Watch,
    /// Accept on-demand submissions over HTTP and process the inbox on schedule
    Serve {
        /// Overrides `server.listen`
        #[arg(long)]
        listen: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&cfg.reddit.user_agent)?);
    let reddit = Arc::new(Reddit::new(RedditClient::new(
        transport.clone(),
        cfg.credentials(),
    )?));
    let readwise_base = Url::parse(&cfg.readwise.base_url).context("invalid readwise.base_url")?;
    let notes: Arc<dyn NotesService> =
        Arc::new(ReadwiseClient::with_base_url(transport, readwise_base));

    let store: Arc<dyn TokenStore> = if cfg.app.local {
        info!("local mode: tokens are kept in memory");
        Arc::new(MemoryTokenStore::new())
    } else {
        let database_url = cfg.database_url();
        Arc::new(
            SqliteTokenStore::open(&database_url)
                .await
                .with_context(|| format!("failed to open token store at {database_url}"))?,
        )
    };
    let interval = Duration::from_secs(cfg.app.poll_interval_secs);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => {
            run_once(&reddit, notes.as_ref(), store.as_ref()).await?;
        }
        Command::Watch => watch(reddit, notes, store, interval).await,
        Command::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| cfg.server.listen.clone());
            let scheduler = tokio::spawn(watch(reddit.clone(), notes.clone(), store, interval));

            let app = server::build_router(AppState { reddit, notes });
            let listener = tokio::net::TcpListener::bind(&listen)
                .await
                .with_context(|| format!("failed to bind {listen}"))?;
            info!(%listen, "serving on-demand submissions");
            tokio::select! {
                served = axum::serve(listener, app).into_future() => served?,
                stopped = scheduler => return Err(scheduler_stopped(stopped)),
            }
        }
    }

    Ok(())
}

/// One scheduled run: failures are logged, then returned to the caller.
async fn run_once(
    reddit: &Reddit,
    notes: &dyn NotesService,
    store: &dyn TokenStore,
) -> Result<RunSummary> {
    match InboxProcessor::new(reddit, notes, store).run().await {
        Ok(summary) => Ok(summary),
        Err(err) => {
            error!(?err, "inbox run failed");
            Err(err)
        }
    }
}

/// The scheduled loop never returns on its own, so any completion is fatal.
fn scheduler_stopped(stopped: Result<(), tokio::task::JoinError>) -> anyhow::Error {
    match stopped {
        Ok(()) => anyhow::anyhow!("scheduled inbox loop exited"),
        Err(err) => anyhow::Error::new(err).context("scheduled inbox loop panicked"),
    }
}

async fn watch(
    reddit: Arc<Reddit>,
    notes: Arc<dyn NotesService>,
    store: Arc<dyn TokenStore>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = interval.as_secs(), "polling inbox");
    loop {
        ticker.tick().await;
        // Errors are logged by run_once; the next tick retries.
        if let Ok(summary) = run_once(&reddit, notes.as_ref(), store.as_ref()).await {
            if !summary.is_clean() {
                warn!(
                    run_id = %summary.run_id,
                    failures = summary.failures.len(),
                    "inbox run finished with failures"
                );
            }
        }
    }
}
