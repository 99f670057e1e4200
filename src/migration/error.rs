//! Error taxonomy for the migration subsystem.

use thiserror::Error;

use super::state::ItemKind;

/// Errors surfaced to the subsystem's own callers.
///
/// Item failures during a run are *not* returned through this type; they
/// are recorded on the item's result and discovered via status/results or
/// the progress channel.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Peer unreachable or its API rejected us.
    #[error("failed to connect remote server: {0}")]
    Connection(String),

    /// Malformed request to this subsystem's own surface.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Operation not allowed in the current step.
    #[error("{0}")]
    Conflict(&'static str),

    /// Start was called before a successful precheck.
    #[error("please complete pre-check first")]
    Precondition,

    /// A specific item's pipeline failed.
    #[error("{kind} {name}: {message}")]
    Item {
        kind: ItemKind,
        name: String,
        message: String,
    },

    /// Ephemeral SSH trust could not be established or torn down.
    #[error("SSH key provisioning failed: {0}")]
    Provisioning(String),

    /// A local collaborator failed (entity listing, trust store I/O).
    #[error("internal error: {0}")]
    Internal(String),
}

impl MigrateError {
    pub const ALREADY_RUNNING: &'static str = "migration is already running";
    pub const RESET_WHILE_RUNNING: &'static str = "migration is running, cannot reset";
}
