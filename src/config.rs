//! Runtime configuration for the migration subsystem.
//!
//! Coded defaults with environment overrides, loaded once at construction.

use std::path::PathBuf;
use std::time::Duration;

/// Tunables for one migration service instance.
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    /// Filesystem path for the ephemeral SSH key pair (`.pub` appended for
    /// the public half).
    pub key_path: PathBuf,
    /// Local `authorized_keys` file managed by the inbound trust endpoints.
    pub authorized_keys_path: PathBuf,
    /// Directory containing website roots, one subdirectory per site.
    pub sites_root: PathBuf,
    /// Timeout for signed requests against the peer panel.
    pub http_timeout: Duration,
    /// SSH connection timeout for rsync/ssh invocations, in seconds.
    pub ssh_connect_timeout: u64,
    /// Progress publisher sampling cadence.
    pub progress_tick: Duration,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            key_path: PathBuf::from("/tmp/panel_migration_key"),
            authorized_keys_path: PathBuf::from("/root/.ssh/authorized_keys"),
            sites_root: PathBuf::from("/www/sites"),
            http_timeout: Duration::from_secs(30),
            ssh_connect_timeout: 10,
            progress_tick: Duration::from_secs(1),
        }
    }
}

impl MigrateConfig {
    /// Load config from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(path) = dotenvy::var("PANEL_MIGRATION_KEY_PATH") {
            cfg.key_path = PathBuf::from(path);
        }

        if let Ok(path) = dotenvy::var("PANEL_AUTHORIZED_KEYS") {
            cfg.authorized_keys_path = PathBuf::from(path);
        }

        if let Ok(path) = dotenvy::var("PANEL_SITES_ROOT") {
            cfg.sites_root = PathBuf::from(path);
        }

        if let Ok(val) = dotenvy::var("PANEL_MIGRATION_HTTP_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            cfg.http_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = dotenvy::var("PANEL_MIGRATION_SSH_CONNECT_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            cfg.ssh_connect_timeout = secs;
        }

        if let Ok(val) = dotenvy::var("PANEL_MIGRATION_TICK_MS")
            && let Ok(ms) = val.parse()
        {
            cfg.progress_tick = Duration::from_millis(ms);
        }

        cfg
    }

    /// Path of the public half of the ephemeral key pair.
    pub fn public_key_path(&self) -> PathBuf {
        let mut os = self.key_path.clone().into_os_string();
        os.push(".pub");
        PathBuf::from(os)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = MigrateConfig::default();
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert_eq!(cfg.progress_tick, Duration::from_secs(1));
        assert_eq!(cfg.ssh_connect_timeout, 10);
    }

    #[test]
    fn test_public_key_path_appends_pub() {
        let cfg = MigrateConfig {
            key_path: PathBuf::from("/tmp/mig_key"),
            ..Default::default()
        };
        assert_eq!(cfg.public_key_path(), PathBuf::from("/tmp/mig_key.pub"));
    }
}
