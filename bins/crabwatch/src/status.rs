#![cfg(feature = "web-api")]

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crabwatch_core::{
    ConnectionState, Cursors, IndicatorState, JobRecord, Phase, ServiceStatus, Severity,
};
use crate::module::{Module, ModuleCtx};
use crate::sync::Board;

#[derive(Clone)]
struct AppState {
    board: watch::Receiver<Board>,
    refresh: mpsc::Sender<()>,
    started: Instant,
}

#[derive(Serialize)]
struct StatusView {
    phase: Phase,
    connection: ConnectionState,
    indicator: Option<IndicatorState>,
    icon: Option<&'static str>,
    cursors: Cursors,
    failures: u64,
    services: ServiceStatus,
    num_error: u64,
    num_warning: u64,
    jobs: usize,
    last_refresh_ms: Option<u64>,
    uptime_ms: u64,
}

#[derive(Serialize)]
struct JobRow {
    id: String,
    status: Option<i64>,
    status_name: String,
    severity: Severity,
    running: bool,
    reliability: u8,
    stars: String,
    scheduled: bool,
    host: Option<String>,
    user: Option<String>,
    command: Option<String>,
    external_job_id: Option<String>,
}

impl From<&JobRecord> for JobRow {
    fn from(job: &JobRecord) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status.map(|c| c.0),
            status_name: job.status_name(),
            severity: job.severity(),
            running: job.running,
            reliability: job.reliability.percent(),
            stars: job.reliability.stars(),
            scheduled: job.scheduled,
            host: job.host.clone(),
            user: job.user.clone(),
            command: job.command.clone(),
            external_job_id: job.external_job_id.clone(),
        }
    }
}

/// Local JSON view of the dashboard plus the "refresh now" action.
pub struct StatusServer {
    addr: SocketAddr,
}

impl StatusServer {
    pub fn new(addr: SocketAddr) -> Self { Self { addr } }
}

impl Module for StatusServer {
    fn name(&self) -> &'static str { "status" }

    fn spawn(self: Box<Self>, ctx: ModuleCtx) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move {
            let state = AppState {
                board: ctx.board.clone(),
                refresh: ctx.refresh.clone(),
                started: Instant::now(),
            };

            let app = Router::new()
                .route("/status", get(status))
                .route("/jobs", get(jobs))
                .route("/refresh", post(refresh))
                .with_state(state);

            let listener = tokio::net::TcpListener::bind(self.addr).await?;
            info!("status server listening on http://{}", self.addr);

            // clone into a mutable receiver to await .changed()
            let mut shutdown = ctx.shutdown.clone();

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    while shutdown.changed().await.is_ok() {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                })
                .await?;

            Ok(())
        })
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusView> {
    let board = state.board.borrow().clone();
    let dash = board.dashboard;
    Json(StatusView {
        phase: dash.phase,
        connection: dash.connection,
        indicator: dash.indicator,
        icon: dash.indicator.map(IndicatorState::resource),
        cursors: dash.cursors,
        failures: dash.failures,
        services: dash.services,
        num_error: dash.num_error,
        num_warning: dash.num_warning,
        jobs: dash.jobs.len(),
        last_refresh_ms: board.last_refresh_ms,
        uptime_ms: state.started.elapsed().as_millis() as u64,
    })
}

async fn jobs(State(state): State<AppState>) -> Json<Vec<JobRow>> {
    let rows = state.board.borrow().dashboard.jobs.iter().map(JobRow::from).collect();
    Json(rows)
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.refresh.try_send(()) {
        Ok(()) => (StatusCode::ACCEPTED, "refresh queued"),
        // One pending request already covers this one.
        Err(mpsc::error::TrySendError::Full(())) => (StatusCode::ACCEPTED, "refresh already queued"),
        Err(mpsc::error::TrySendError::Closed(())) => (StatusCode::SERVICE_UNAVAILABLE, "sync stopped"),
    }
}
