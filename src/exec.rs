//! External process execution.
//!
//! The migration pipelines shell out to `ssh-keygen`, `rsync`, `ssh` and the
//! database dump utilities. Everything goes through the [`CommandRunner`]
//! trait so tests can script process behavior without touching the system,
//! and commands are always built as structured argument lists; host, path
//! and credential values are data, never shell syntax. Credentials travel
//! in the process environment, not on the command line.

use std::fs::File;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::debug;

/// Errors from launching or running an external command.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to open {path}: {source}")]
    Redirect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A fully described external command: program, argv, extra environment,
/// and an optional stdout redirection target.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables. Credentials go here so they never
    /// appear in process listings or transcript lines.
    pub env: Vec<(String, String)>,
    /// Write stdout to this file instead of capturing it (used for
    /// database dumps).
    pub stdout_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            stdout_file: None,
        }
    }

    /// Add an environment variable for the child process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Redirect the child's stdout into a file.
    pub fn stdout_to(mut self, path: impl AsRef<std::path::Path>) -> Self {
        self.stdout_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Render the command for the migration transcript. Environment values
    /// are masked: they only ever carry credentials.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.env.len() + 1 + self.args.len());
        for (key, _) in &self.env {
            parts.push(format!("{key}=***"));
        }
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        let mut line = parts.join(" ");
        if let Some(path) = &self.stdout_file {
            line.push_str(&format!(" > {}", path.display()));
        }
        line
    }
}

/// Captured output of a completed command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands. The system implementation is [`SystemRunner`];
/// tests substitute scripted fakes.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null()).stderr(Stdio::piped());

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        match &spec.stdout_file {
            Some(path) => {
                let file = File::create(path).map_err(|source| ExecError::Redirect {
                    path: path.clone(),
                    source,
                })?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        debug!(program = %spec.program, args = ?spec.args, "running command");

        let output = cmd.output().map_err(|source| ExecError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(ExecError::Failed {
                program: spec.program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Quote a value for inclusion in a command string that a *remote* shell
/// will evaluate (the argument ssh hands to the far side). Local commands
/// never need this; local commands are structured argv.
pub fn remote_shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
