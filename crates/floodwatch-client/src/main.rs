use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use floodwatch_client::api::{ApiClient, ExportFormat, FeedFilter};
use floodwatch_client::config::ClientConfig;
use floodwatch_client::display::{self, LogSurface};
use floodwatch_client::session::{Session, SessionEvent};
use floodwatch_client::stream::PostStream;
use floodwatch_client::vote::VoteCoordinator;
use floodwatch_core::types::VoteKind;

/// Capacity of the session event channel. Stream and baseline fetches both
/// feed it; the session drains it strictly in order.
const SESSION_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "floodwatch", about = "Real-time flood report feed client")]
struct Cli {
    /// API root URL
    #[arg(
        long,
        env = "FLOODWATCH_URL",
        default_value = "http://127.0.0.1:5000/api"
    )]
    base_url: String,

    /// Bearer token issued by the auth service
    #[arg(long, env = "FLOODWATCH_TOKEN")]
    token: String,

    /// Viewer user id; enables the local own-post vote guard
    #[arg(long, env = "FLOODWATCH_USER_ID")]
    user_id: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the live feed: baseline fetch plus stream reconciliation
    Watch,
    /// One-shot feed fetch
    Fetch {
        #[arg(long)]
        hazard_type: Option<String>,

        #[arg(long)]
        urgency: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Only verified reports
        #[arg(long)]
        verified_only: bool,
    },
    /// Cast a vote on a post; nothing updates until the server confirms
    Vote {
        post_id: i64,

        /// up or down
        vote: VoteKind,
    },
    /// Download the authority report export
    Export {
        #[arg(long, default_value = "json")]
        format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing. Respects RUST_LOG env var, defaults to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::new(cli.base_url, cli.token).with_user_id(cli.user_id);

    match cli.command {
        Commands::Watch => run_watch(config).await,
        Commands::Fetch {
            hazard_type,
            urgency,
            location,
            verified_only,
        } => {
            let filter = FeedFilter {
                hazard_type,
                urgency,
                location,
                verified_only,
            };
            run_fetch(config, filter).await
        }
        Commands::Vote { post_id, vote } => run_vote(config, post_id, vote).await,
        Commands::Export { format, out } => run_export(config, format, out).await,
    }
}

/// Live session: stream source and baseline fetch feed one channel; the
/// session loop is the only writer to the store.
async fn run_watch(config: ClientConfig) -> anyhow::Result<()> {
    let api = ApiClient::new(config.clone())?;
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

    let stream = PostStream::new(config, tx.clone(), cancel.clone())?;
    let stream_cancel = cancel.clone();
    let stream_task = tokio::spawn(async move {
        // Auth rejection is the one terminal stream error; it takes the
        // whole session down so the user re-authenticates.
        if let Err(e) = stream.run().await {
            error!("stream terminated: {e}");
            stream_cancel.cancel();
        }
    });

    // Initial population. The stream's first snapshot may land before or
    // after this resolves; last writer wins either way.
    let baseline_api = api.clone();
    let baseline_tx = tx.clone();
    tokio::spawn(async move {
        match baseline_api.fetch_posts(&FeedFilter::default()).await {
            Ok(posts) => {
                let _ = baseline_tx.send(SessionEvent::Baseline(posts)).await;
            }
            Err(e) => warn!("baseline fetch failed: {e}"),
        }
    });
    drop(tx);

    let interrupt_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            interrupt_cancel.cancel();
        }
    });

    let mut session = Session::new(rx, Box::new(LogSurface), cancel.clone());
    session.store_mut().subscribe(Box::new(|reports| {
        println!("{}", display::format_feed(reports));
    }));
    session.run().await;

    cancel.cancel();
    let _ = stream_task.await;
    Ok(())
}

async fn run_fetch(config: ClientConfig, filter: FeedFilter) -> anyhow::Result<()> {
    let api = ApiClient::new(config)?;
    let posts = api.fetch_posts(&filter).await?;
    println!("{}", display::format_feed(&posts));
    Ok(())
}

async fn run_vote(config: ClientConfig, post_id: i64, vote: VoteKind) -> anyhow::Result<()> {
    let api = ApiClient::new(config)?;

    // Locate the post first so the own-post guard has the author id.
    let posts = api.fetch_posts(&FeedFilter::default()).await?;
    let author = posts
        .iter()
        .find(|p| p.id == post_id)
        .and_then(|p| p.user_id);

    let mut coordinator = VoteCoordinator::new(api.clone());
    coordinator.cast(post_id, author, vote).await?;

    // Recount from the server; tallies are never computed locally.
    let posts = api.fetch_posts(&FeedFilter::default()).await?;
    match posts.iter().find(|p| p.id == post_id) {
        Some(post) => println!(
            "vote {vote} confirmed on #{post_id}: {} up / {} down (score {})",
            post.upvotes,
            post.downvotes,
            post.score()
        ),
        None => println!("vote {vote} confirmed on #{post_id}"),
    }
    Ok(())
}

async fn run_export(
    config: ClientConfig,
    format: ExportFormat,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let api = ApiClient::new(config)?;
    let body = api.export_reports(format).await?;
    match out {
        Some(path) => {
            std::fs::write(&path, &body)?;
            info!(path = %path.display(), bytes = body.len(), "export written");
        }
        None => print!("{body}"),
    }
    Ok(())
}
