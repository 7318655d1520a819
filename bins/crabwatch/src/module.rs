use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::sync::Board;

#[derive(Clone)]
pub struct ModuleCtx {
    /// Latest dashboard published by the sync module.
    pub board: watch::Receiver<Board>,
    /// Queue a manual "refresh now" on the sync module.
    pub refresh: mpsc::Sender<()>,
    pub shutdown: watch::Receiver<bool>,
}

pub trait Module: Send + 'static {
    fn name(&self) -> &'static str;
    fn spawn(self: Box<Self>, ctx: ModuleCtx) -> JoinHandle<anyhow::Result<()>>;
}
