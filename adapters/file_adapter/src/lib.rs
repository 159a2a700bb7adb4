use std::fs;
use std::path::Path;

use migration_core::domain::{Comment, ExportBundle, StatementBatch};
use migration_core::error::MigrationError;
use migration_core::ports::{BundleStore, ExportSource, Result, StatementWriter};
use serde::Deserialize;
use tracing::{debug, warn};

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(MigrationError::InputNotFound(path.to_path_buf()))
    }
}

fn json_error(path: &Path, source: serde_json::Error) -> MigrationError {
    MigrationError::Json {
        path: path.to_path_buf(),
        source: Box::new(source),
    }
}

/// Reads the markup export from disk
#[derive(Debug, Default, Clone, Copy)]
pub struct FsExportSource;

impl ExportSource for FsExportSource {
    fn read_export(&self, path: &Path) -> Result<String> {
        ensure_exists(path)?;
        let markup = fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;
        debug!(path = %path.display(), bytes = markup.len(), "export read");
        Ok(markup)
    }
}

/// Bundles as pretty-printed JSON files
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonBundleStore;

/// Either shape `import` accepts
#[derive(Deserialize)]
#[serde(untagged)]
enum BundleDocument {
    Bundle {
        comments: Vec<Comment>,
        #[serde(default)]
        total_comments: Option<usize>,
    },
    Bare(Vec<Comment>),
}

impl BundleStore for JsonBundleStore {
    fn write_bundle(&self, path: &Path, bundle: &ExportBundle) -> Result<()> {
        let json = serde_json::to_string_pretty(bundle).map_err(|e| json_error(path, e))?;
        fs::write(path, json).map_err(|e| MigrationError::io(path, e))
    }

    fn read_comments(&self, path: &Path) -> Result<Vec<Comment>> {
        ensure_exists(path)?;
        let data = fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;
        let document: BundleDocument =
            serde_json::from_str(&data).map_err(|e| json_error(path, e))?;
        match document {
            BundleDocument::Bundle {
                comments,
                total_comments,
            } => {
                if let Some(total) = total_comments.filter(|total| *total != comments.len()) {
                    warn!(
                        path = %path.display(),
                        total_comments = total,
                        found = comments.len(),
                        "bundle total does not match its comments; using the comments"
                    );
                }
                Ok(comments)
            }
            BundleDocument::Bare(comments) => Ok(comments),
        }
    }
}

/// Writes statement batches as newline-joined SQL files
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlFileWriter;

impl StatementWriter for SqlFileWriter {
    fn write_statements(&self, path: &Path, batch: &StatementBatch) -> Result<()> {
        fs::write(path, batch.to_sql()).map_err(|e| MigrationError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use migration_core::application::generate_statements;
    use tempfile::TempDir;

    fn comment(content: &str, email: Option<&str>) -> Comment {
        Comment {
            url: "https://example.com/a".to_string(),
            name: "Ada".to_string(),
            email: email.map(str::to_string),
            content: content.to_string(),
            created_at: "2013-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_read_export_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = FsExportSource
            .read_export(&dir.path().join("missing.xml"))
            .unwrap_err();
        assert!(matches!(err, MigrationError::InputNotFound(_)));
    }

    #[test]
    fn test_read_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("export.xml");
        fs::write(&path, "<disqus/>").unwrap();
        assert_eq!(FsExportSource.read_export(&path).unwrap(), "<disqus/>");
    }

    #[test]
    fn test_bundle_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.json");
        let comments = vec![comment("first", Some("ada@example.com")), comment("second", None)];
        let bundle = ExportBundle::new("disqus", comments.clone());

        JsonBundleStore.write_bundle(&path, &bundle).unwrap();
        assert_eq!(JsonBundleStore.read_comments(&path).unwrap(), comments);
    }

    #[test]
    fn test_bundle_shape_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.json");
        let bundle = ExportBundle::new("disqus", vec![comment("x", None)]);
        JsonBundleStore.write_bundle(&path, &bundle).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["source"], "disqus");
        assert_eq!(value["total_comments"], 1);
        assert!(value["exported_at"].is_string());
        assert!(value["comments"][0]["email"].is_null());
        assert_eq!(value["comments"][0]["created_at"], "2013-01-01T00:00:00Z");
    }

    #[test]
    fn test_read_bare_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.json");
        fs::write(
            &path,
            r#"[{"url": "https://example.com/a", "content": "hi", "created_at": "2013-01-01T00:00:00Z"}]"#,
        )
        .unwrap();

        let comments = JsonBundleStore.read_comments(&path).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].name, "Anonymous");
        assert_eq!(comments[0].email, None);
    }

    #[test]
    fn test_read_mismatched_total_uses_comments() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments.json");
        fs::write(
            &path,
            r#"{"source": "disqus", "total_comments": 5, "comments": [
                {"url": "u", "name": "n", "email": "", "content": "c", "created_at": "t"}
            ]}"#,
        )
        .unwrap();

        let comments = JsonBundleStore.read_comments(&path).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].email.as_deref(), Some(""));
    }

    #[test]
    fn test_read_missing_and_invalid() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            JsonBundleStore.read_comments(&missing),
            Err(MigrationError::InputNotFound(_))
        ));

        let invalid = dir.path().join("invalid.json");
        fs::write(&invalid, r#"{"comments": "nope"}"#).unwrap();
        assert!(matches!(
            JsonBundleStore.read_comments(&invalid),
            Err(MigrationError::Json { .. })
        ));
    }

    #[test]
    fn test_sql_file_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("comments-import.sql");
        let batch = generate_statements(&[comment("a", None), comment("b", None), comment("c", None)]);

        SqlFileWriter.write_statements(&path, &batch).unwrap();
        let sql = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = sql.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "BEGIN TRANSACTION;");
        assert_eq!(lines[4], "COMMIT;");
    }

    #[test]
    fn test_sql_file_writer_reports_io_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("no-such-dir").join("out.sql");
        let err = SqlFileWriter
            .write_statements(&path, &generate_statements(&[]))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Io { .. }));
    }
}
