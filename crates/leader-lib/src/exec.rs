//! Command execution seam
//!
//! Secret generation shells out to `ceph-authtool`. Going through
//! [`CommandExecutor`] lets tests substitute deterministic output.

use crate::error::{LeaderError, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Runs external commands and captures their output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with `args` and return its trimmed stdout.
    ///
    /// `action` is a human readable label used only for logging.
    async fn execute_with_output(&self, action: &str, command: &str, args: &[&str])
        -> Result<String>;
}

/// Executor that spawns real processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute_with_output(
        &self,
        action: &str,
        command: &str,
        args: &[&str],
    ) -> Result<String> {
        debug!(action = %action, command = %command, args = ?args, "Running command");

        let output = Command::new(command)
            .args(args)
            .output()
            .await
            .map_err(|e| LeaderError::Command {
                command: command.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(LeaderError::Command {
                command: command.to_string(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockExecutor;

#[cfg(any(test, feature = "test-util"))]
mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Handler = dyn Fn(&str, &[String]) -> Result<String> + Send + Sync;

    /// Deterministic executor for tests
    #[derive(Clone)]
    pub struct MockExecutor {
        handler: Arc<Handler>,
        calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl MockExecutor {
        /// Executor answering every call through `handler`
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&str, &[String]) -> Result<String> + Send + Sync + 'static,
        {
            Self {
                handler: Arc::new(handler),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Executor that answers `ceph-authtool` with `secret` and rejects anything else
        pub fn with_secret(secret: impl Into<String>) -> Self {
            let secret = secret.into();
            Self::new(move |command, args| {
                if command == "ceph-authtool" {
                    Ok(secret.clone())
                } else {
                    Err(LeaderError::UnrecognizedCommand {
                        command: command.to_string(),
                        args: args.to_vec(),
                    })
                }
            })
        }

        /// Executor whose every call fails
        pub fn failing(message: impl Into<String>) -> Self {
            let message = message.into();
            Self::new(move |command, _| {
                Err(LeaderError::Command {
                    command: command.to_string(),
                    message: message.clone(),
                })
            })
        }

        /// Commands run so far, in order
        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls
                .lock()
                .map(|calls| calls.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn execute_with_output(
            &self,
            action: &str,
            command: &str,
            args: &[&str],
        ) -> Result<String> {
            let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            debug!(action = %action, command = %command, args = ?args, "Mock command");
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((command.to_string(), args.clone()));
            }
            (self.handler)(command, &args)
        }
    }
}
