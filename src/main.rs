use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use velog_activity::analysis::{analyze, Analysis, TopicRules};
use velog_activity::config::{Config, RendererKind};
use velog_activity::corpus::{load_corpus, load_resume_corpus, save_corpus, write_json};
use velog_activity::crawler::Crawler;
use velog_activity::renderer::{ChromiumRenderer, HttpRenderer, PageRenderer};
use velog_activity::temporal::TimeNormalizer;
use velog_activity::web;

/// Harvest a velog author's posts and profile their writing activity.
#[derive(Debug, Parser)]
#[command(name = "velog-activity", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Crawl every post of an author into a corpus file.
    Crawl(CrawlArgs),
    /// Summarize a corpus file.
    Analyze(AnalyzeArgs),
    /// Serve the list/detail HTTP API.
    Serve,
}

#[derive(Debug, Args)]
struct CrawlArgs {
    /// Author handle, with or without the leading `@`.
    #[arg(long)]
    handle: String,
    #[arg(long)]
    max_scrolls: Option<usize>,
    /// Wait after each profile scroll, in milliseconds.
    #[arg(long)]
    pause_ms: Option<u64>,
    /// Courtesy delay between posts, in milliseconds.
    #[arg(long)]
    per_post_delay_ms: Option<u64>,
    /// Corpus file to write (defaults to `OUTPUT_PATH`).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Skip posts already present in the existing corpus file.
    #[arg(long)]
    resume: bool,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Corpus file to read (defaults to `OUTPUT_PATH`).
    #[arg(long)]
    input: Option<PathBuf>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    #[arg(long)]
    trend_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing()?;

    let mut config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Command::Crawl(args) => {
            if let Some(max_scrolls) = args.max_scrolls {
                config.max_scrolls = max_scrolls;
            }
            if let Some(pause_ms) = args.pause_ms {
                config.scroll_pause = Duration::from_millis(pause_ms);
            }
            if let Some(delay_ms) = args.per_post_delay_ms {
                config.per_post_delay = Duration::from_millis(delay_ms);
            }
            if let Some(out) = args.out {
                config.output_path = out;
            }
            config.validate().context("Invalid configuration")?;

            let handle = args.handle.trim().trim_start_matches('@').to_string();
            crawl(&config, &handle, args.resume).await
        }
        Command::Analyze(args) => {
            if let Some(input) = args.input {
                config.output_path = input;
            }
            if let Some(summary_out) = args.summary_out {
                config.summary_path = summary_out;
            }
            if let Some(trend_out) = args.trend_out {
                config.topic_trend_path = trend_out;
            }
            config.validate().context("Invalid configuration")?;

            analyze_corpus(&config).await
        }
        Command::Serve => {
            config.validate().context("Invalid configuration")?;
            serve(config).await
        }
    }
}

/// Renderer for the configured backend. The Chromium handle is returned
/// separately so the browser can be shut down.
fn build_renderer(
    config: &Config,
    page_timeout: Duration,
) -> Result<(Arc<dyn PageRenderer>, Option<Arc<ChromiumRenderer>>)> {
    let renderer_config = config.renderer_config(page_timeout);
    match config.renderer {
        RendererKind::Chromium => {
            let chromium = Arc::new(ChromiumRenderer::new(renderer_config));
            let renderer: Arc<dyn PageRenderer> = chromium.clone();
            Ok((renderer, Some(chromium)))
        }
        RendererKind::Http => {
            let http =
                HttpRenderer::new(&renderer_config).context("Failed to build HTTP renderer")?;
            let renderer: Arc<dyn PageRenderer> = Arc::new(http);
            Ok((renderer, None))
        }
    }
}

async fn crawl(config: &Config, handle: &str, resume: bool) -> Result<()> {
    info!(handle = %handle, renderer = ?config.renderer, out = %config.output_path.display(), "Starting crawl");

    let (renderer, chromium) = build_renderer(config, config.page_timeout)?;
    let crawler = Crawler::new(renderer, config.crawl_settings());

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupt received, finishing current post");
        signal_cancel.cancel();
    });

    let prior = if resume {
        load_resume_corpus(&config.output_path, handle)
            .await
            .context("Failed to read prior corpus")?
    } else {
        None
    };

    let result = crawler.crawl_resuming(handle, prior, &cancel).await;
    if let Some(chromium) = chromium {
        chromium.shutdown().await;
    }
    let outcome = result?;

    if outcome.discovered == 0 && outcome.corpus.posts.is_empty() {
        warn!(handle = %handle, "No posts found; check the handle");
        return Ok(());
    }

    save_corpus(&config.output_path, &outcome.corpus)
        .await
        .context("Failed to write corpus")?;

    info!(
        path = %config.output_path.display(),
        posts = outcome.corpus.posts.len(),
        discovered = outcome.discovered,
        extracted = outcome.extracted,
        skipped = outcome.skipped,
        failed = outcome.failed,
        interrupted = outcome.interrupted,
        "Corpus saved"
    );
    Ok(())
}

async fn analyze_corpus(config: &Config) -> Result<()> {
    let corpus = load_corpus(&config.output_path)
        .await
        .context("Failed to read corpus")?;

    let rules = match &config.topic_rules_path {
        Some(path) => TopicRules::load(path).context("Failed to load topic rules")?,
        None => TopicRules::default(),
    };
    let normalizer = TimeNormalizer::new(Utc::now(), config.source_offset);

    let analysis = analyze(&corpus, &rules, &normalizer);
    if let Analysis::NoUsableData { total_posts } = &analysis {
        warn!(total_posts, "No post has a usable publish time");
    }

    write_json(&config.summary_path, &analysis.summary_json())
        .await
        .context("Failed to write summary")?;
    write_json(&config.topic_trend_path, &analysis.trend_json())
        .await
        .context("Failed to write topic trend")?;

    info!(
        summary = %config.summary_path.display(),
        trend = %config.topic_trend_path.display(),
        "Analysis written"
    );
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let (renderer, chromium) = build_renderer(&config, config.list_timeout)?;
    let crawler = Crawler::new(renderer, config.crawl_settings());

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutting down...");
        signal_shutdown.cancel();
    });

    let result = web::serve(&config, crawler, shutdown).await;
    if let Some(chromium) = chromium {
        chromium.shutdown().await;
    }
    info!("Shutdown complete");
    result
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,velog_activity=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
