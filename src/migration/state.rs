//! Shared migration state and its lock-guarded handle.
//!
//! One migration attempt is described entirely by [`MigrationState`]:
//! the coarse step, the stored peer connection, the selected items, the
//! per-item results, and a timestamped transcript. The state lives behind
//! a single reader/writer lock inside [`MigrationHandle`]; reads take the
//! shared lock, every mutation takes the exclusive lock for the duration
//! of the mutation only. External commands always run outside the lock so
//! slow transfers never block status reads.
//!
//! Nothing here is persisted. A process restart loses any in-flight
//! migration, a documented limitation of the subsystem.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::remote::ConnectionInfo;

use super::error::MigrateError;

/// Coarse state of one migration attempt.
///
/// `Idle → PreCheck → Select → Running → Done`, back to `Idle` only via
/// explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    #[default]
    Idle,
    PreCheck,
    Select,
    Running,
    Done,
}

/// Kind tag of a migratable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Website,
    Database,
    Project,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Website => write!(f, "website"),
            Self::Database => write!(f, "database"),
            Self::Project => write!(f, "project"),
        }
    }
}

/// Status of one item result. `Running` is transient; the terminal states
/// are never left again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Running,
    Success,
    Failed,
}

/// Outcome record of one selected item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationItemResult {
    pub kind: ItemKind,
    /// Display name (databases render as `name (kind)`).
    pub name: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in seconds, filled when the item finalizes.
    #[serde(default)]
    pub duration_secs: f64,
}

/// A website chosen for migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsiteSelection {
    pub id: u64,
    pub name: String,
    /// Custom serving path; empty when the site serves from its root.
    #[serde(default)]
    pub path: String,
}

/// A database chosen for migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSelection {
    pub name: String,
    pub kind: String,
    pub server_id: u64,
}

/// A project chosen for migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSelection {
    pub id: u64,
    pub name: String,
    /// Project directory to mirror; empty when there is none.
    #[serde(default)]
    pub path: String,
}

/// The caller's selection for one run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ItemSelection {
    #[serde(default)]
    pub websites: Vec<WebsiteSelection>,
    #[serde(default)]
    pub databases: Vec<DatabaseSelection>,
    #[serde(default)]
    pub projects: Vec<ProjectSelection>,
    /// Abort remaining items after the first failure.
    #[serde(default)]
    pub stop_on_error: bool,
}

impl ItemSelection {
    pub fn is_empty(&self) -> bool {
        self.websites.is_empty() && self.databases.is_empty() && self.projects.is_empty()
    }
}

/// The full mutable record of one migration attempt.
#[derive(Debug, Default)]
struct MigrationState {
    step: MigrationStep,
    connection: Option<ConnectionInfo>,
    selection: Option<ItemSelection>,
    results: Vec<MigrationItemResult>,
    logs: Vec<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    /// Path of the active ephemeral key pair; `None` when unprovisioned.
    key_path: Option<PathBuf>,
}

/// Read-only view of the state, taken under the shared lock.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub step: MigrationStep,
    pub results: Vec<MigrationItemResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Cloneable handle to one migration attempt's state.
///
/// Constructed per service instance (or per test) and injected wherever
/// the state is read or mutated; there is no process-wide global.
#[derive(Clone, Default)]
pub struct MigrationHandle {
    inner: Arc<RwLock<MigrationState>>,
}

impl MigrationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> MigrationStep {
        self.inner.read().step
    }

    pub fn connection(&self) -> Option<ConnectionInfo> {
        self.inner.read().connection.clone()
    }

    pub fn selection(&self) -> Option<ItemSelection> {
        self.inner.read().selection.clone()
    }

    pub fn key_path(&self) -> Option<PathBuf> {
        self.inner.read().key_path.clone()
    }

    pub fn set_key_path(&self, path: Option<PathBuf>) {
        self.inner.write().key_path = path;
    }

    /// Store the verified peer connection and enter the PreCheck step.
    pub fn store_connection(&self, conn: ConnectionInfo) {
        let mut state = self.inner.write();
        state.connection = Some(conn);
        state.step = MigrationStep::PreCheck;
    }

    /// First successful item listing after a precheck confirms the
    /// operator has reviewed connectivity: advance PreCheck → Select.
    pub fn advance_to_select(&self) {
        let mut state = self.inner.write();
        if state.step == MigrationStep::PreCheck {
            state.step = MigrationStep::Select;
        }
    }

    /// Transition into Running for a new background job. Enforces the
    /// single-job invariant and the precheck precondition atomically under
    /// the exclusive lock; on success the previous run's results and
    /// transcript are cleared and the stored connection is returned.
    pub fn begin_run(&self, selection: ItemSelection) -> Result<ConnectionInfo, MigrateError> {
        let mut state = self.inner.write();
        if state.step == MigrationStep::Running {
            return Err(MigrateError::Conflict(MigrateError::ALREADY_RUNNING));
        }
        let Some(conn) = state.connection.clone() else {
            return Err(MigrateError::Precondition);
        };

        state.step = MigrationStep::Running;
        state.selection = Some(selection);
        state.results.clear();
        state.logs.clear();
        state.started_at = Some(Utc::now());
        state.ended_at = None;
        Ok(conn)
    }

    /// Finalize a run: Done, end timestamp stamped.
    pub fn finish_run(&self) {
        let mut state = self.inner.write();
        state.step = MigrationStep::Done;
        state.ended_at = Some(Utc::now());
    }

    /// Clear everything back to Idle. Refused while a job is running.
    pub fn reset(&self) -> Result<(), MigrateError> {
        let mut state = self.inner.write();
        if state.step == MigrationStep::Running {
            return Err(MigrateError::Conflict(MigrateError::RESET_WHILE_RUNNING));
        }
        *state = MigrationState::default();
        Ok(())
    }

    /// Append a timestamped line to the migration transcript.
    pub fn push_log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        {
            let mut state = self.inner.write();
            let stamped = format!("[{}] {}", Utc::now().format("%H:%M:%S"), message);
            state.logs.push(stamped);
        }
        info!("[migration] {message}");
    }

    /// Record that an item has started processing.
    pub fn start_item(&self, kind: ItemKind, name: impl Into<String>) {
        let mut state = self.inner.write();
        state.results.push(MigrationItemResult {
            kind,
            name: name.into(),
            status: ItemStatus::Running,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
            duration_secs: 0.0,
        });
    }

    /// Finalize the running result for `(kind, name)`. The status moves to
    /// a terminal value exactly once; already-terminal results are left
    /// untouched.
    pub fn finish_item(&self, kind: ItemKind, name: &str, outcome: Result<(), String>) {
        let mut state = self.inner.write();
        if let Some(result) = state
            .results
            .iter_mut()
            .find(|r| r.kind == kind && r.name == name && r.status == ItemStatus::Running)
        {
            let now = Utc::now();
            match outcome {
                Ok(()) => result.status = ItemStatus::Success,
                Err(message) => {
                    result.status = ItemStatus::Failed;
                    result.error = Some(message);
                }
            }
            result.ended_at = Some(now);
            result.duration_secs = ((now - result.started_at).num_milliseconds() as f64 / 1000.0).max(0.0);
        }
    }

    /// Whether the last finalized result failed. Drives stop-on-error.
    pub fn last_item_failed(&self) -> bool {
        self.inner
            .read()
            .results
            .iter()
            .rev()
            .find(|r| r.status != ItemStatus::Running)
            .is_some_and(|r| r.status == ItemStatus::Failed)
    }

    /// Snapshot for status/results reads.
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.inner.read();
        StateSnapshot {
            step: state.step,
            results: state.results.clone(),
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }

    /// Full transcript copy.
    pub fn logs(&self) -> Vec<String> {
        self.inner.read().logs.clone()
    }

    /// Snapshot plus transcript lines appended since `cursor`, advancing
    /// the cursor. Used by the progress publisher's incremental stream.
    pub fn snapshot_with_new_logs(&self, cursor: &mut usize) -> (StateSnapshot, Vec<String>) {
        let state = self.inner.read();
        let snapshot = StateSnapshot {
            step: state.step,
            results: state.results.clone(),
            started_at: state.started_at,
            ended_at: state.ended_at,
        };
        let new_logs = if state.logs.len() > *cursor {
            let lines = state.logs[*cursor..].to_vec();
            *cursor = state.logs.len();
            lines
        } else {
            Vec::new()
        };
        (snapshot, new_logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionInfo {
        ConnectionInfo {
            url: "https://203.0.113.5:8888".into(),
            token_id: 7,
            token: "secret".into(),
        }
    }

    #[test]
    fn test_begin_run_requires_connection() {
        let handle = MigrationHandle::new();
        assert!(matches!(
            handle.begin_run(ItemSelection::default()),
            Err(MigrateError::Precondition)
        ));
        assert_eq!(handle.step(), MigrationStep::Idle);
    }

    #[test]
    fn test_begin_run_rejected_while_running() {
        let handle = MigrationHandle::new();
        handle.store_connection(conn());
        handle.begin_run(ItemSelection::default()).unwrap();
        assert!(matches!(
            handle.begin_run(ItemSelection::default()),
            Err(MigrateError::Conflict(_))
        ));
    }

    #[test]
    fn test_begin_run_clears_previous_attempt() {
        let handle = MigrationHandle::new();
        handle.store_connection(conn());
        handle.begin_run(ItemSelection::default()).unwrap();
        handle.start_item(ItemKind::Website, "shop");
        handle.push_log("first run");
        handle.finish_run();

        handle.begin_run(ItemSelection::default()).unwrap();
        let snapshot = handle.snapshot();
        assert!(snapshot.results.is_empty());
        assert!(handle.logs().is_empty());
        assert!(snapshot.started_at.is_some());
        assert!(snapshot.ended_at.is_none());
    }

    #[test]
    fn test_advance_to_select_only_from_precheck() {
        let handle = MigrationHandle::new();
        handle.advance_to_select();
        assert_eq!(handle.step(), MigrationStep::Idle);

        handle.store_connection(conn());
        assert_eq!(handle.step(), MigrationStep::PreCheck);
        handle.advance_to_select();
        assert_eq!(handle.step(), MigrationStep::Select);
    }

    #[test]
    fn test_reset_refused_while_running() {
        let handle = MigrationHandle::new();
        handle.store_connection(conn());
        handle.begin_run(ItemSelection::default()).unwrap();
        assert!(handle.reset().is_err());

        handle.finish_run();
        handle.reset().unwrap();
        assert_eq!(handle.step(), MigrationStep::Idle);
        assert!(handle.connection().is_none());
        assert!(handle.snapshot().results.is_empty());
        assert!(handle.logs().is_empty());
    }

    #[test]
    fn test_finish_item_finalizes_exactly_once() {
        let handle = MigrationHandle::new();
        handle.start_item(ItemKind::Database, "shop (mysql)");
        handle.finish_item(ItemKind::Database, "shop (mysql)", Err("dump failed".into()));
        // Second finalization attempt must not overwrite the terminal state.
        handle.finish_item(ItemKind::Database, "shop (mysql)", Ok(()));

        let results = handle.snapshot().results;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ItemStatus::Failed);
        assert_eq!(results[0].error.as_deref(), Some("dump failed"));
        assert!(results[0].ended_at.is_some());
    }

    #[test]
    fn test_incremental_log_cursor() {
        let handle = MigrationHandle::new();
        handle.push_log("one");
        handle.push_log("two");

        let mut cursor = 0;
        let (_, first) = handle.snapshot_with_new_logs(&mut cursor);
        assert_eq!(first.len(), 2);

        let (_, none) = handle.snapshot_with_new_logs(&mut cursor);
        assert!(none.is_empty());

        handle.push_log("three");
        let (_, third) = handle.snapshot_with_new_logs(&mut cursor);
        assert_eq!(third.len(), 1);
        assert!(third[0].ends_with("three"));
    }

    #[test]
    fn test_last_item_failed() {
        let handle = MigrationHandle::new();
        assert!(!handle.last_item_failed());

        handle.start_item(ItemKind::Website, "shop");
        handle.finish_item(ItemKind::Website, "shop", Ok(()));
        assert!(!handle.last_item_failed());

        handle.start_item(ItemKind::Database, "shop (mysql)");
        handle.finish_item(ItemKind::Database, "shop (mysql)", Err("boom".into()));
        assert!(handle.last_item_failed());
    }
}
