use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chunk_storage::{ChunkRepository, FileRepository, Mover};
use rawx::config::NodeConfig;
use rawx::server::{self, RawxService};

#[derive(Parser, Debug)]
#[command(version, about = "Chunk server over a tiered local repository")]
struct Cli {
    /// Namespace to run on
    #[arg(long, default_value = "OPENIO")]
    ns: String,

    /// IP:PORT to serve chunks on
    #[arg(long, default_value = "127.0.0.1:5999")]
    addr: String,

    /// INI configuration file, overrides the flags above
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Store uploads zlib-compressed
    #[arg(long)]
    compress: bool,

    #[arg(
        long,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace). Can also be set via RUST_LOG env var"
    )]
    log_level: String,

    /// Tier root directories, fastest first (absolute paths)
    filerepos: Vec<PathBuf>,
}

fn setup_tracing(log_level: &str) {
    // Try to use RUST_LOG env var first, fall back to CLI flag
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', falling back to 'info'", log_level);
            EnvFilter::new("info")
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(&cli.log_level);

    let mut cfg = match &cli.config {
        Some(path) => NodeConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            let mut cfg = NodeConfig::default();
            cfg.listen = cli.addr.clone();
            cfg.namespace = cli.ns.clone();
            cfg.filerepos = cli.filerepos.clone();
            cfg
        }
    };
    if cli.compress {
        cfg.compress = true;
    }

    cfg.validate()?;

    run(cfg)
}

#[tokio::main]
async fn run(cfg: NodeConfig) -> Result<()> {
    let tiers: Vec<Arc<FileRepository>> = cfg
        .filerepos
        .iter()
        .map(|root| {
            Arc::new(
                FileRepository::new(root)
                    .with_layout(cfg.hash_width, cfg.hash_depth, cfg.hash_start)
                    .with_durability(cfg.fsync_file, cfg.fsync_dir)
                    .with_fallocate(cfg.fallocate),
            )
        })
        .collect();

    let (mover, mover_handle) = Mover::new(tiers.clone());
    let mut repo = ChunkRepository::new(tiers).with_move_sink(Arc::new(mover_handle));
    if let Some(log_root) = &cfg.log_repo {
        repo = repo.with_log(Arc::new(FileRepository::new(log_root)));
    }

    repo.lock(&cfg.namespace, &cfg.listen)
        .context("repository root cannot be locked with the node identity")?;
    info!(ns = %cfg.namespace, addr = %cfg.listen, tiers = cfg.filerepos.len(), "repository locked");

    tokio::spawn(mover.run());

    let service = Arc::new(
        RawxService::new(cfg.namespace.as_str(), cfg.listen.as_str(), repo)
            .with_compression(cfg.compress),
    );
    let listener = tokio::net::TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;

    server::serve(service, listener).await?;
    Ok(())
}
