use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crabwatch_core::{
    Cursors, Dashboard, Effect, Indicator, JobId, JobInfo, Presenter, StatusResponse, SyncLoop,
    Transport, TransportError,
};
use crate::module::{Module, ModuleCtx};

/// What the sync module publishes after every applied outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Board {
    #[serde(flatten)]
    pub dashboard: Dashboard,
    /// Wall clock (ms since epoch) of the last applied status response.
    pub last_refresh_ms: Option<u64>,
}

impl Board {
    pub fn new(dashboard: Dashboard) -> Self {
        Self { dashboard, last_refresh_ms: None }
    }
}

enum Outcome {
    Poll(Result<StatusResponse, TransportError>),
    Refresh(Result<StatusResponse, TransportError>),
    Info(JobId, Result<JobInfo, TransportError>),
}

/// Drives a [`SyncLoop`] against a [`Transport`].
///
/// Requests run as separate tasks and post their outcome back on a
/// channel; the engine itself is only ever touched from this module's
/// task.
pub struct SyncModule<T, P, I> {
    engine: SyncLoop<P, I>,
    transport: Arc<T>,
    board: watch::Sender<Board>,
    refresh_rx: mpsc::Receiver<()>,
}

impl<T: Transport, P: Presenter, I: Indicator> SyncModule<T, P, I> {
    pub fn new(
        engine: SyncLoop<P, I>,
        transport: Arc<T>,
        board: watch::Sender<Board>,
        refresh_rx: mpsc::Receiver<()>,
    ) -> Self {
        Self { engine, transport, board, refresh_rx }
    }
}

impl<T: Transport, P: Presenter, I: Indicator> Module for SyncModule<T, P, I> {
    fn name(&self) -> &'static str { "sync" }

    fn spawn(self: Box<Self>, ctx: ModuleCtx) -> JoinHandle<anyhow::Result<()>> {
        let SyncModule { engine, transport, board, mut refresh_rx } = *self;
        let mut shutdown = ctx.shutdown;

        tokio::spawn(async move {
            let (outcomes, mut rx) = mpsc::unbounded_channel();
            let mut driver = Driver {
                engine,
                transport,
                outcomes,
                board,
                retry_at: None,
                last_refresh_ms: None,
            };
            let mut refresh_open = true;

            let first = driver.engine.start();
            driver.dispatch(first);
            driver.publish();

            loop {
                tokio::select! {
                    Some(outcome) = rx.recv() => driver.handle(outcome),
                    _ = sleep_until(driver.retry_at.unwrap_or_else(Instant::now)), if driver.retry_at.is_some() => {
                        driver.retry_at = None;
                        let effects = driver.engine.retry_fired();
                        driver.dispatch(effects);
                    }
                    req = refresh_rx.recv(), if refresh_open => match req {
                        Some(()) => driver.spawn_refresh(),
                        None => refresh_open = false,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("sync stopping");
                            break;
                        }
                    }
                }
                driver.publish();
            }
            Ok(())
        })
    }
}

struct Driver<T, P, I> {
    engine: SyncLoop<P, I>,
    transport: Arc<T>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    board: watch::Sender<Board>,
    retry_at: Option<Instant>,
    last_refresh_ms: Option<u64>,
}

impl<T: Transport, P: Presenter, I: Indicator> Driver<T, P, I> {
    fn handle(&mut self, outcome: Outcome) {
        let effects = match outcome {
            Outcome::Poll(Ok(resp)) => {
                self.last_refresh_ms = Some(now_ms());
                self.engine.poll_succeeded(resp)
            }
            Outcome::Poll(Err(e)) => self.engine.poll_failed(&e),
            Outcome::Refresh(Ok(resp)) => {
                self.last_refresh_ms = Some(now_ms());
                self.engine.refresh_succeeded(resp)
            }
            Outcome::Refresh(Err(e)) => {
                self.engine.refresh_failed(&e);
                Vec::new()
            }
            Outcome::Info(_, Ok(info)) => {
                self.engine.info_received(info);
                Vec::new()
            }
            Outcome::Info(id, Err(e)) => {
                self.engine.info_failed(&id, &e);
                Vec::new()
            }
        };
        self.dispatch(effects);
    }

    fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Poll(cursors) => self.spawn_poll(cursors),
                Effect::ScheduleRetry(delay) => self.retry_at = Some(Instant::now() + delay),
                Effect::FetchInfo(id) => self.spawn_info(id),
            }
        }
    }

    fn spawn_poll(&self, cursors: Cursors) {
        debug!(?cursors, "long-poll");
        let transport = Arc::clone(&self.transport);
        let tx = self.outcomes.clone();
        tokio::spawn(async move {
            let res = transport.job_status(cursors).await;
            let _ = tx.send(Outcome::Poll(res));
        });
    }

    fn spawn_refresh(&self) {
        info!("manual refresh requested");
        let transport = Arc::clone(&self.transport);
        let tx = self.outcomes.clone();
        tokio::spawn(async move {
            let res = transport.job_status(Cursors::ZERO).await;
            let _ = tx.send(Outcome::Refresh(res));
        });
    }

    fn spawn_info(&self, id: JobId) {
        let transport = Arc::clone(&self.transport);
        let tx = self.outcomes.clone();
        tokio::spawn(async move {
            let res = transport.job_info(&id).await;
            let _ = tx.send(Outcome::Info(id, res));
        });
    }

    fn publish(&self) {
        self.board.send_replace(Board {
            dashboard: self.engine.dashboard(),
            last_refresh_ms: self.last_refresh_ms,
        });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
