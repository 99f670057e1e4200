//! Wire types for the migration subsystem's own surface.
//!
//! The panel's routing layer binds these to its endpoints; the types stay
//! framework-free so the service can be driven from HTTP, the CLI, or
//! tests alike.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::inventory::{DatabaseInfo, ProjectInfo, WebsiteInfo};

use super::state::{MigrationItemResult, MigrationStep};

/// `POST /precheck` request body: the peer connection to validate.
/// Identical in shape to [`crate::remote::ConnectionInfo`], which is what
/// the service stores on success.
pub use crate::remote::ConnectionInfo as PrecheckRequest;

/// `POST /precheck` response: the peer's installed-environment map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckResponse {
    pub remote: Value,
}

/// `GET /items` response: local migration candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub websites: Vec<WebsiteInfo>,
    pub databases: Vec<DatabaseInfo>,
    pub projects: Vec<ProjectInfo>,
}

/// `GET /status` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub step: MigrationStep,
    pub results: Vec<MigrationItemResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// `GET /results` response: status plus the full transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub step: MigrationStep,
    pub results: Vec<MigrationItemResult>,
    pub logs: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One frame of the push channel: the current state plus only the
/// transcript lines appended since the previous frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub step: MigrationStep,
    pub results: Vec<MigrationItemResult>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_logs: Option<Vec<String>>,
}

/// Inbound trust endpoint body (`POST`/`DELETE` ssh_key): the public key
/// to add to or remove from this host's trust store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshKeyRequest {
    pub public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_frame_omits_empty_new_logs() {
        let frame = ProgressFrame {
            step: MigrationStep::Running,
            results: Vec::new(),
            started_at: None,
            ended_at: None,
            new_logs: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("new_logs").is_none());
        assert_eq!(json["step"], "running");
    }

    #[test]
    fn test_step_serializes_snake_case() {
        assert_eq!(serde_json::to_value(MigrationStep::PreCheck).unwrap(), "pre_check");
        assert_eq!(serde_json::to_value(MigrationStep::Idle).unwrap(), "idle");
    }
}
