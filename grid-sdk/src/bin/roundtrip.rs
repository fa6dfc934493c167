//! Live-cluster demo: walks references, containers and a small object
//! through their full lifecycle against a running proxy.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use grid_sdk::{
    ContainerClient, DirectoryClient, FlatName, ObjectClient, StaticConfig, UserName,
};

#[derive(Parser, Debug)]
#[command(version, about = "Exercise a grid namespace end to end")]
struct Cli {
    /// Namespace to run against
    #[arg(long, default_value = "NS")]
    ns: String,

    /// Proxy endpoint, IP:PORT
    #[arg(long, default_value = "127.0.0.1:6002")]
    proxy: String,

    /// Account name
    #[arg(long, default_value = "ACCT")]
    account: String,

    /// Object path
    #[arg(long, default_value = "plop")]
    path: String,

    /// Object size in bytes
    #[arg(long, default_value = "4000")]
    size: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut cfg = StaticConfig::new();
    cfg.set(&cli.ns, "proxy", &cli.proxy);
    cfg.set(&cli.ns, "autocreate", "true");
    let cfg = Arc::new(cfg);

    let reference: String = {
        let mut rng = rand::thread_rng();
        format!("demo-{:x}", rng.gen::<u64>())
    };
    let user = FlatName::user(&cli.ns, &cli.account, &reference);
    let object = FlatName::object(&cli.ns, &cli.account, &reference, &cli.path);

    let dir = DirectoryClient::new(&cli.ns, cfg.clone())?;
    let bkt = ContainerClient::new(&cli.ns, cfg.clone())?;
    let obj = ObjectClient::new(&cli.ns, cfg)?;

    info!("+++ references");
    for _ in 0..2 {
        if dir.has(&user).await? {
            info!(reference = %user.user(), "reference present");
        } else {
            dir.create(&user).await.context("reference create")?;
            info!(reference = %user.user(), "reference created");
        }
        dir.destroy(&user).await.context("reference destroy")?;
    }

    info!("+++ containers");
    for _ in 0..2 {
        if !bkt.has(&user).await? {
            bkt.create(&user, true).await.context("container create")?;
        }
        bkt.destroy(&user).await.context("container destroy")?;
    }

    info!("+++ contents");
    let payload = vec![0u8; cli.size as usize];
    for _ in 0..2 {
        let result = obj
            .put_content(&object, cli.size, true, &mut payload.as_slice())
            .await;
        info!(?result, "put_content");
    }
    for _ in 0..2 {
        let mut dl = obj.get_content(&object).await.context("get_content")?;
        let mut consumed = 0usize;
        let mut buf = [0u8; 8192];
        loop {
            let n = dl.read(&mut buf).await.context("download read")?;
            if n == 0 {
                break;
            }
            consumed += n;
        }
        info!(consumed, "downloaded");
    }
    for _ in 0..2 {
        let result = obj.delete_content(&object).await;
        info!(?result, "delete_content");
    }

    Ok(())
}
