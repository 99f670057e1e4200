//! Cross-host migration: state machine, background job, item pipelines,
//! progress streaming.
//!
//! # Architecture
//!
//! - **state**: the lock-guarded record of one migration attempt
//! - **service**: the orchestrator driving precheck/items/start/reset
//! - **job**: the cancellable background job the run executes on
//! - **website/database/project**: the per-entity transfer pipelines
//! - **progress**: fixed-cadence push publishing of state snapshots
//! - **protocol**: the serde types a routing layer binds to endpoints
//!
//! A run is strictly sequential: SSH trust setup, then every selected
//! website, database and project in that order, then trust teardown. All
//! state lives in memory only; a process restart loses the attempt.

pub mod error;
pub mod job;
pub mod progress;
pub mod protocol;
pub mod service;
pub mod state;

mod database;
mod project;
mod website;

pub use error::MigrateError;
pub use job::{CancelToken, MigrationJob};
pub use progress::{ChannelSink, ProgressPublisher, ProgressSink, SinkClosed};
pub use protocol::{
    ItemsResponse, PrecheckRequest, PrecheckResponse, ProgressFrame, ResultsResponse,
    SshKeyRequest, StatusResponse,
};
pub use service::MigrationService;
pub use state::{
    DatabaseSelection, ItemKind, ItemSelection, ItemStatus, MigrationHandle, MigrationItemResult,
    MigrationStep, ProjectSelection, WebsiteSelection,
};
