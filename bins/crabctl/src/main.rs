use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crabwatch_core::cfg::{self, AppId};
use crabwatch_core::{
    logx, Cursors, HttpTransport, JobRegistry, Severity, StatusCode, Transport,
};
use tracing::{info, warn};

const APP: AppId = AppId {
    qualifier: "com",
    organization: "local",
    // Shares config.toml with the daemon.
    application: "crabwatch",
};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "One-shot crab status queries")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every status code with a dedicated name.
    Codes,
    /// Show the name and severity of a status code.
    Name {
        #[arg(allow_hyphen_values = true)]
        code: i64,
    },
    /// Fetch a full snapshot from the server and print it.
    Snapshot {
        /// Base URL of the crab server (defaults to `server_url` in config.toml).
        #[arg(long)]
        url: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logx::init(logx::level_for(cli.verbose, "warn"));

    match cli.cmd {
        Command::Codes => {
            for code in StatusCode::KNOWN {
                println!("{:>3}  {:<16} {}", code.0, code.name(), code.severity());
            }
        }
        Command::Name { code } => {
            let code = StatusCode(code);
            println!("{} ({})", code.name(), code.severity());
        }
        Command::Snapshot { url } => {
            let cfg = cfg::load_or_init(&APP)?;
            let url = url.unwrap_or_else(|| cfg.server_url.clone());
            let transport = HttpTransport::new(url, cfg.poll_timeout(), cfg.info_timeout());
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("build tokio runtime")?;
            rt.block_on(snapshot(&transport))?;
        }
    }
    Ok(())
}

async fn snapshot<T: Transport>(transport: &T) -> Result<()> {
    let resp = transport
        .job_status(Cursors::ZERO)
        .await
        .context("failed to fetch status from server")?;
    info!(jobs = resp.status.len(), "snapshot fetched");

    let mut registry = JobRegistry::new();
    for (id, delta) in &resp.status {
        registry.apply_delta(id, delta);
    }
    let ids: Vec<_> = registry.snapshot().map(|j| j.id.clone()).collect();
    for id in ids {
        match transport.job_info(&id).await {
            Ok(info) => {
                registry.apply_info(info);
            }
            Err(e) => warn!(job = %id, error = %e, "job info fetch failed"),
        }
    }

    for (name, up) in resp.service.iter() {
        println!("service {name}: {}", if up { "up" } else { "DOWN" });
    }
    println!("errors: {}  warnings: {}", resp.numerror, resp.numwarning);
    for job in registry.snapshot() {
        let marker = match job.severity() {
            Severity::Ok => " ",
            Severity::Warning => "!",
            Severity::Fail => "X",
            Severity::Unknown => "?",
        };
        println!(
            "{marker} {:>6}  {:<16} {:<5} {:<8} {}@{}  {}{}",
            job.id.as_str(),
            job.status_name(),
            if job.running { "run" } else { "" },
            job.reliability.stars(),
            job.user.as_deref().unwrap_or("-"),
            job.host.as_deref().unwrap_or("-"),
            job.command.as_deref().unwrap_or("-"),
            if job.scheduled { "" } else { "  (schedule unknown)" },
        );
    }
    Ok(())
}
