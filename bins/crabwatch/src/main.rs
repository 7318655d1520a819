mod console;
mod module;
mod status;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use crabwatch_core::cfg::{self, AppId, Config};
use crabwatch_core::{logx, HttpTransport, ReconnectPolicy, SyncLoop};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::console::{ConsoleIndicator, ConsolePresenter};
use crate::module::{Module, ModuleCtx};
use crate::sync::{Board, SyncModule};

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    application: env!("CARGO_PKG_NAME"),
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Live view of crab job status")]
struct Cli {
    /// Base URL of the crab server (overrides `server_url` in config.toml).
    #[arg(long)]
    url: Option<String>,
    /// Serve the local status view on this address, e.g. 127.0.0.1:8090.
    #[arg(long)]
    status_addr: Option<String>,
    /// Use this config file instead of the per-user one.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => cfg::load_or_init_at(path)?,
        None => cfg::load_or_init(&APP)?,
    };
    if let Some(url) = cli.url {
        cfg.server_url = url;
    }
    if let Some(addr) = cli.status_addr {
        cfg.status_addr = Some(addr);
    }
    logx::init(logx::level_for(cli.verbose, &cfg.log_level));

    let rt = if cfg!(feature = "rt-single") {
        tokio::runtime::Builder::new_current_thread().enable_all().build()
    } else {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
    .context("build tokio runtime")?;

    rt.block_on(run(cfg))
}

async fn run(cfg: Config) -> anyhow::Result<()> {
    info!("{} boot", APP.application);
    info!(server = %cfg.server_url, poll_timeout_ms = cfg.poll_timeout_ms, reconnect_delay_ms = cfg.reconnect_delay_ms, "cfg");

    let transport = HttpTransport::new(&cfg.server_url, cfg.poll_timeout(), cfg.info_timeout());
    let engine = SyncLoop::new(
        ReconnectPolicy::new(cfg.reconnect_delay()),
        ConsolePresenter::default(),
        ConsoleIndicator::default(),
    );

    let (board_tx, board_rx) = watch::channel(Board::new(engine.dashboard()));
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctx = ModuleCtx { board: board_rx, refresh: refresh_tx, shutdown: shutdown_rx };

    let mut modules: Vec<Box<dyn Module>> = vec![Box::new(SyncModule::new(
        engine,
        Arc::new(transport),
        board_tx,
        refresh_rx,
    ))];
    if let Some(server) = status_module(&cfg)? {
        modules.push(server);
    }

    let handles: Vec<_> = modules
        .into_iter()
        .map(|m| (m.name(), m.spawn(ctx.clone())))
        .collect();

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => info!(module = name, "stopped"),
            Ok(Err(e)) => warn!(module = name, error = %e, "module failed"),
            Err(e) => warn!(module = name, error = %e, "module panicked"),
        }
    }
    Ok(())
}

#[cfg(feature = "web-api")]
fn status_module(cfg: &Config) -> anyhow::Result<Option<Box<dyn Module>>> {
    let Some(addr) = &cfg.status_addr else { return Ok(None) };
    let addr = addr.parse().with_context(|| format!("parse status_addr {addr}"))?;
    Ok(Some(Box::new(status::StatusServer::new(addr))))
}

#[cfg(not(feature = "web-api"))]
fn status_module(cfg: &Config) -> anyhow::Result<Option<Box<dyn Module>>> {
    if cfg.status_addr.is_some() {
        warn!("status_addr set but crabwatch was built without the web-api feature");
    }
    Ok(None)
}
