//! Control-plane client for the cluster command-line tools.
//!
//! Every mutation and query goes through [`ClusterClient`]: a logical
//! command string is expanded into a full argument vector (connection flags
//! appended) and run as a subprocess, returning raw stdout or a classified
//! failure.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("`{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Substring predicate classifying an execution failure as "resource absent".
///
/// The control plane reports missing resources only through free-text error
/// messages, so each resource kind carries the literal markers its commands
/// emit. The markers must match the deployed tool version.
#[derive(Debug, Clone, Copy)]
pub struct NotFoundMatcher {
    markers: &'static [&'static str],
}

impl NotFoundMatcher {
    pub const fn new(markers: &'static [&'static str]) -> Self {
        Self { markers }
    }

    /// True when the failure is one the tool itself reported and its
    /// message carries a marker. Spawn failures and timeouts never match;
    /// their text comes from the host, not the control plane.
    pub fn matches(&self, err: &ClientError) -> bool {
        let ClientError::CommandFailed { message, .. } = err else {
            return false;
        };
        self.markers.iter().any(|marker| message.contains(marker))
    }
}

/// Connection parameters shared by every command sent to the cluster.
///
/// Immutable once constructed. Each non-empty field is appended to every
/// command as a `--flag value` pair, in a fixed order; empty fields emit
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterConn {
    /// Path to the cluster configuration file (`--conf`).
    #[serde(default)]
    pub conf_file: Option<String>,

    /// Path to the keyring file (`--keyring`).
    #[serde(default)]
    pub keyring: Option<String>,

    /// User identity commands authenticate as (`--user`).
    #[serde(default)]
    pub user: Option<String>,
}

impl ClusterConn {
    /// Split a logical command into tokens and append the configured
    /// connection flags. Pure; a blank command yields only the flag pairs.
    pub fn build_args(&self, logical: &str) -> Vec<String> {
        let mut args: Vec<String> = logical.split_whitespace().map(str::to_string).collect();

        for (flag, value) in [
            ("--conf", &self.conf_file),
            ("--keyring", &self.keyring),
            ("--user", &self.user),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                args.push(flag.to_string());
                args.push(value.to_string());
            }
        }

        args
    }
}

/// Boxed future returned by [`CommandRunner::run`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Output>> + Send + 'a>>;

/// Process-execution boundary.
///
/// Production code uses [`SystemRunner`]; tests substitute a scripted
/// implementation.
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with the remaining tokens as arguments, capturing
    /// stdout and stderr. `argv` is never empty.
    fn run<'a>(&'a self, argv: &'a [String]) -> RunFuture<'a>;
}

/// Runs commands as real subprocesses.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run<'a>(&'a self, argv: &'a [String]) -> RunFuture<'a> {
        Box::pin(async move { Command::new(&argv[0]).args(&argv[1..]).output().await })
    }
}

/// Executes logical commands against the cluster's command-line tools.
///
/// One client is constructed per provider lifetime and passed explicitly
/// into every reconciler; it holds no mutable state and is safe to share.
pub struct ClusterClient {
    conn: ClusterConn,
    runner: Arc<dyn CommandRunner>,
    timeout: Option<Duration>,
}

impl ClusterClient {
    pub fn new(conn: ClusterConn) -> Self {
        Self::with_runner(conn, Arc::new(SystemRunner))
    }

    pub fn with_runner(conn: ClusterConn, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            conn,
            runner,
            timeout: None,
        }
    }

    /// Attach a per-command timeout. A command still running when it
    /// expires is reported as a failed execution, not left to hang the
    /// reconcile pass.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn conn(&self) -> &ClusterConn {
        &self.conn
    }

    /// Run a logical command and return its stdout.
    ///
    /// stderr is not captured separately; on a non-zero exit it is folded
    /// verbatim into the error together with the command that failed, and
    /// callers classify the failure by matching on that text.
    pub async fn execute(&self, logical: &str) -> Result<String> {
        let argv = self.conn.build_args(logical);
        if argv.is_empty() {
            return Err(ClientError::EmptyCommand);
        }

        debug!(command = %logical, "Executing cluster command");

        let run = self.runner.run(&argv);
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ClientError::Timeout {
                        command: logical.to_string(),
                        timeout_secs: limit.as_secs(),
                    });
                }
            },
            None => run.await,
        };

        let output = output.map_err(|source| ClientError::Spawn {
            command: logical.to_string(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                output.status.to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ClientError::CommandFailed {
                command: logical.to_string(),
                message,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
