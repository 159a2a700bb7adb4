use std::fs;
use std::path::{Path, PathBuf};

use migration_core::error::MigrationError;
use migration_core::ports::{Result, StatementExecutor};
use migration_core::utils::is_sql_identifier;
use rusqlite::Connection;
use tracing::info;

/// SQLite implementation of the StatementExecutor trait
pub struct SqliteStatementExecutor {
    db_path: PathBuf,
    schema_table: Option<String>,
}

impl SqliteStatementExecutor {
    /// Creates a new SqliteStatementExecutor for the given database file
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            schema_table: None,
        }
    }

    /// Creates `table` before executing if it does not exist yet
    pub fn with_schema(mut self, table: &str) -> Result<Self> {
        if !is_sql_identifier(table) {
            return Err(MigrationError::InvalidIdentifier(table.to_string()));
        }
        self.schema_table = Some(table.to_string());
        Ok(self)
    }

    fn failure(artifact: &Path, err: impl std::fmt::Display) -> MigrationError {
        MigrationError::ExecutionFailed {
            artifact: artifact.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Table layout the generated inserts target
pub fn comments_table_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_url ON {table} (url);
        "#
    )
}

impl StatementExecutor for SqliteStatementExecutor {
    fn execute(&self, artifact: &Path) -> Result<()> {
        let sql = fs::read_to_string(artifact).map_err(|e| MigrationError::io(artifact, e))?;

        // Connect to the SQLite database
        let conn = Connection::open(&self.db_path).map_err(|e| Self::failure(artifact, e))?;

        if let Some(table) = &self.schema_table {
            conn.execute_batch(&comments_table_ddl(table))
                .map_err(|e| Self::failure(artifact, e))?;
        }

        // The artifact carries its own BEGIN/COMMIT; an error part way through
        // leaves the transaction open and closing the connection rolls it back
        conn.execute_batch(&sql).map_err(|e| Self::failure(artifact, e))?;

        info!(db = %self.db_path.display(), artifact = %artifact.display(), "statements applied");
        Ok(())
    }

    fn describe(&self, artifact: &Path) -> String {
        format!("sqlite3 {} < {}", self.db_path.display(), artifact.display())
    }
}
