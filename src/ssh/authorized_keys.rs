//! Local `authorized_keys` management: the receiving side of migration
//! trust provisioning.
//!
//! The peer panel calls these through its signed API when it is the one
//! migrating *to* this host.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum TrustError {
    #[error("public key is required")]
    EmptyKey,

    #[error("failed to update {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Editor for one `authorized_keys` file.
#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append a public key line. Idempotent: a key already present is left
    /// alone. The file ends up mode 0600, its parent 0700.
    pub fn add(&self, public_key: &str) -> Result<(), TrustError> {
        let key = public_key.trim();
        if key.is_empty() {
            return Err(TrustError::EmptyKey);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_err(source))?;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }

        let mut content = fs::read_to_string(&self.path).unwrap_or_default();
        if content.lines().any(|line| line.trim() == key) {
            debug!(path = %self.path.display(), "public key already present");
            return Ok(());
        }

        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(key);
        content.push('\n');

        self.write(&content)
    }

    /// Remove every line exactly matching the trimmed key. A missing file
    /// means there is nothing to remove.
    pub fn remove(&self, public_key: &str) -> Result<(), TrustError> {
        let key = public_key.trim();
        if key.is_empty() {
            return Err(TrustError::EmptyKey);
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Ok(()),
        };

        let filtered: Vec<&str> = content.lines().filter(|line| line.trim() != key).collect();
        let mut out = filtered.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }

        self.write(&out)
    }

    fn write(&self, content: &str) -> Result<(), TrustError> {
        fs::write(&self.path, content).map_err(|source| self.io_err(source))?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
            .map_err(|source| self.io_err(source))?;
        Ok(())
    }

    fn io_err(&self, source: std::io::Error) -> TrustError {
        TrustError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
