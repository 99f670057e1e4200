//! Ephemeral key pair provisioning for one migration run.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::exec::{CommandRunner, CommandSpec};
use crate::migration::state::MigrationHandle;
use crate::remote::{RemoteClient, RemoteError};

/// Errors during key setup. Setup failure is fatal to the run: no item
/// may transfer without established trust.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("failed to generate SSH key: {0}")]
    Keygen(#[source] crate::exec::ExecError),

    #[error("failed to read public key: {0}")]
    ReadKey(#[source] std::io::Error),

    #[error("failed to deploy SSH key to remote: {0}")]
    Deploy(#[source] RemoteError),
}

/// Generates the run's ed25519 key pair and manages its lifecycle.
pub struct KeyProvisioner<'a> {
    runner: &'a dyn CommandRunner,
    key_path: PathBuf,
}

impl<'a> KeyProvisioner<'a> {
    pub fn new(runner: &'a dyn CommandRunner, key_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            key_path: key_path.into(),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    fn public_key_path(&self) -> PathBuf {
        let mut os = self.key_path.clone().into_os_string();
        os.push(".pub");
        PathBuf::from(os)
    }

    /// Generate a fresh pair and deploy the public half to the peer.
    /// On deployment failure the local files are removed again; the run
    /// must not proceed with half-established trust.
    pub fn setup(&self, client: &RemoteClient, state: &MigrationHandle) -> Result<(), ProvisionError> {
        // Stale files from an interrupted run would make ssh-keygen prompt.
        self.remove_local_files();

        state.push_log("Generating temporary SSH key pair for migration");
        let key_path = self.key_path.display().to_string();
        let keygen = CommandSpec::new(
            "ssh-keygen",
            ["-t", "ed25519", "-f", key_path.as_str(), "-N", "", "-q"],
        );
        self.runner.run(&keygen).map_err(ProvisionError::Keygen)?;

        let public_key =
            std::fs::read_to_string(self.public_key_path()).map_err(ProvisionError::ReadKey)?;

        state.push_log("Deploying SSH public key to remote server");
        if let Err(err) = client.add_ssh_key(public_key.trim()) {
            self.remove_local_files();
            return Err(ProvisionError::Deploy(err));
        }

        state.set_key_path(Some(self.key_path.clone()));
        state.push_log("SSH key authentication configured successfully");
        Ok(())
    }

    /// Best-effort cleanup: remove the public key from the peer's trust
    /// store if we can still read it, then delete the local files
    /// unconditionally. Failures are logged, never raised; cleanup must
    /// not mask the run's results.
    pub fn teardown(&self, client: &RemoteClient, state: &MigrationHandle) {
        if state.key_path().is_none() {
            return;
        }

        state.push_log("Cleaning up temporary SSH keys");

        if let Ok(public_key) = std::fs::read_to_string(self.public_key_path())
            && let Err(err) = client.remove_ssh_key(public_key.trim())
        {
            warn!(error = %err, "remote SSH key removal failed");
        }

        self.remove_local_files();
        state.set_key_path(None);
    }

    fn remove_local_files(&self) {
        let _ = std::fs::remove_file(&self.key_path);
        let _ = std::fs::remove_file(self.public_key_path());
    }
}
