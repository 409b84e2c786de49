//! Operating-system shutdown hook run after the relay-off sequence.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("shutdown command is empty")]
    EmptyCommand,
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// Command line executed to power the host down.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShutdownHook {
    program: String,
    args: Vec<String>,
    dry_run: bool,
}

impl ShutdownHook {
    /// Splits `command` on whitespace into program and arguments.
    pub fn new(command: &str, dry_run: bool) -> Result<Self, ShutdownError> {
        let mut words = command.split_whitespace().map(str::to_owned);
        let program = words.next().ok_or(ShutdownError::EmptyCommand)?;
        Ok(Self {
            program,
            args: words.collect(),
            dry_run,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Runs the command and waits for it to exit.
    pub async fn run(&self) -> Result<(), ShutdownError> {
        if self.dry_run {
            info!(program = %self.program, args = ?self.args, "dry run: skipping OS shutdown");
            return Ok(());
        }

        warn!(program = %self.program, args = ?self.args, "requesting OS shutdown");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .await
            .map_err(|source| ShutdownError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ShutdownError::Failed {
                program: self.program.clone(),
                status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_program_and_arguments() {
        let hook = ShutdownHook::new("sudo  shutdown now", false).unwrap();
        assert_eq!(hook.program(), "sudo");
        assert_eq!(hook.args(), ["shutdown", "now"]);
        assert!(matches!(
            ShutdownHook::new("   ", false),
            Err(ShutdownError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn dry_run_never_spawns() {
        let hook = ShutdownHook::new("/nonexistent/poweroff", true).unwrap();
        assert!(hook.run().await.is_ok());
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let hook = ShutdownHook::new("/nonexistent/poweroff", false).unwrap();
        assert!(matches!(hook.run().await, Err(ShutdownError::Spawn { .. })));
    }
}
