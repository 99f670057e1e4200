//! rsync-over-ssh mirroring to identical paths on the destination host.
//!
//! [`Mirror`] builds fully structured [`CommandSpec`]s; callers echo them
//! into the transcript and hand them to their [`crate::exec::CommandRunner`].
//! Directory mirrors use trailing-slash-on-source semantics so the
//! directory *contents* land in the destination path instead of nesting a
//! second directory level.

use std::path::Path;

use crate::exec::CommandSpec;

/// Spec builder for transfers against one destination host, using the
/// ephemeral trust key when one is active.
#[derive(Debug, Clone)]
pub struct Mirror {
    host: String,
    key_path: Option<String>,
    connect_timeout: u64,
}

impl Mirror {
    pub fn new(host: impl Into<String>, key_path: Option<&Path>, connect_timeout: u64) -> Self {
        Self {
            host: host.into(),
            key_path: key_path.map(|p| p.display().to_string()),
            connect_timeout,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The ssh invocation as rsync's `-e` value and as the base of direct
    /// ssh calls. Host key checking is disabled: the trust of record is
    /// the signed peer API, not the SSH known-hosts file.
    pub fn ssh_options(&self) -> String {
        let mut opts = format!(
            "ssh -o StrictHostKeyChecking=no -o ConnectTimeout={}",
            self.connect_timeout
        );
        if let Some(key) = &self.key_path {
            opts.push_str(&format!(" -i {key}"));
        }
        opts
    }

    /// Mirror a directory's contents to the identical remote path.
    pub fn dir_spec(&self, path: &Path) -> CommandSpec {
        let opts = self.ssh_options();
        let src = format!("{}/", path.display().to_string().trim_end_matches('/'));
        let dest = format!(
            "root@{}:{}/",
            self.host,
            path.display().to_string().trim_end_matches('/')
        );
        CommandSpec::new("rsync", ["-avz", "-e", opts.as_str(), src.as_str(), dest.as_str()])
    }

    /// Mirror a single file to the identical remote path.
    pub fn file_spec(&self, path: &Path) -> CommandSpec {
        let opts = self.ssh_options();
        let src = path.display().to_string();
        let dest = format!("root@{}:{}", self.host, src);
        CommandSpec::new("rsync", ["-avz", "-e", opts.as_str(), src.as_str(), dest.as_str()])
    }

    /// Run a command line on the destination host. `command` is evaluated
    /// by the remote shell; callers quote any embedded values with
    /// [`crate::exec::remote_shell_quote`].
    pub fn remote_spec(&self, command: &str) -> CommandSpec {
        let mut args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
        ];
        if let Some(key) = &self.key_path {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.push(format!("root@{}", self.host));
        args.push(command.to_string());
        CommandSpec::new("ssh", args)
    }
}
