use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use migration_core::error::MigrationError;
use migration_core::ports::{Result, StatementExecutor};
use tracing::info;

/// Client used when none is configured
pub const DEFAULT_CLIENT: &str = "npx wrangler d1 execute";

/// Database name used when none is configured
pub const DEFAULT_DATABASE: &str = "blog-comments";

/// Hands the statement file to an external database CLI as
/// `<program> <args...> <database> --file=<artifact>`, with inherited stdio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatementExecutor {
    program: String,
    args: Vec<String>,
    database: String,
    working_dir: Option<PathBuf>,
}

impl CommandStatementExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>, database: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            database: database.into(),
            working_dir: None,
        }
    }

    /// Splits a command line such as `npx wrangler d1 execute` on whitespace.
    /// Returns `None` for a blank command line.
    pub fn parse(command_line: &str, database: impl Into<String>) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect(), database))
    }

    /// Runs the client from `dir`, e.g. the project that holds its config
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, artifact: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&self.database)
            .arg(format!("--file={}", artifact.display()));
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl Default for CommandStatementExecutor {
    fn default() -> Self {
        let mut parts = DEFAULT_CLIENT.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self::new(program, parts.collect(), DEFAULT_DATABASE)
    }
}

impl StatementExecutor for CommandStatementExecutor {
    fn execute(&self, artifact: &Path) -> Result<()> {
        // The client may run from another directory
        let artifact_arg = fs::canonicalize(artifact).unwrap_or_else(|_| artifact.to_path_buf());
        let mut command = self.command(&artifact_arg);
        info!(command = %self.describe(&artifact_arg), "running database client");

        let status = command.status().map_err(|e| MigrationError::ExecutionFailed {
            artifact: artifact.to_path_buf(),
            reason: format!("could not start {}: {e}", self.program),
        })?;
        if !status.success() {
            return Err(MigrationError::ExecutionFailed {
                artifact: artifact.to_path_buf(),
                reason: format!("{} exited with {status}", self.program),
            });
        }
        Ok(())
    }

    fn describe(&self, artifact: &Path) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.push(self.database.clone());
        parts.push(format!("--file={}", artifact.display()));
        parts.join(" ")
    }
}
