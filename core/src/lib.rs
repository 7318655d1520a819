#![deny(missing_docs)]
//! crabwatch_core: shared building blocks (config, logging, job model, status sync engine).

/// Configuration helpers (AppId, dirs, load_or_init, etc.)
pub mod cfg;
/// Tracing/log initialization helpers.
pub mod logx;
/// Status codes and their severities.
pub mod status;
/// Job identifiers, records and details.
pub mod job;
/// Status stream wire format and cursors.
pub mod wire;
/// In-memory job registry.
pub mod registry;
/// Presenter and indicator interfaces.
pub mod view;
/// Reconnect policy after stream failures.
pub mod reconnect;
/// HTTP transport to the crab server.
pub mod transport;
/// Long-poll synchronization state machine.
pub mod engine;

pub use engine::{Dashboard, Effect, Phase, SyncLoop};
pub use job::{JobId, JobInfo, JobRecord, Reliability};
pub use reconnect::ReconnectPolicy;
pub use registry::JobRegistry;
pub use status::{Severity, StatusCode};
pub use transport::{HttpTransport, Transport, TransportError};
pub use view::{ConnectionState, Indicator, IndicatorState, Presenter};
pub use wire::{Cursors, ServiceStatus, StatusResponse};
