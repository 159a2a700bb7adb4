use crate::domain::{Comment, ExportBundle, StatementBatch};
use crate::error::MigrationError;
use std::path::Path;

pub type Result<T> = std::result::Result<T, MigrationError>;

/// A block of the export, e.g. one `<thread>` or `<post>` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupBlock {
    /// Value of the scanner's identifier attribute on the opening tag
    pub id: Option<String>,
    /// Everything between the opening and closing tag
    pub body: String,
}

/// What to look up inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldQuery<'a> {
    /// Text of `<name>...</name>`, trimmed
    Text(&'a str),
    /// CDATA section of `<name>`, falling back to its plain text
    Markup(&'a str),
    /// Attribute value on the first nested `<tag ...>`
    Attribute { tag: &'a str, attr: &'a str },
}

/// Pulls blocks and fields out of the export without a full parse
pub trait MarkupScanner: Send + Sync {
    /// Every non-self-closing element named `kind`, in document order
    fn find_blocks(&self, markup: &str, kind: &str) -> Vec<MarkupBlock>;

    /// First match of `query` within a block body
    fn find_field(&self, block: &str, query: FieldQuery<'_>) -> Option<String>;
}

/// Where normalized bundles are written and read back
pub trait BundleStore: Send + Sync {
    fn write_bundle(&self, path: &Path, bundle: &ExportBundle) -> Result<()>;

    // Accepts a full bundle or a bare comment array
    fn read_comments(&self, path: &Path) -> Result<Vec<Comment>>;
}

/// Persists a statement batch as a text artifact
pub trait StatementWriter: Send + Sync {
    fn write_statements(&self, path: &Path, batch: &StatementBatch) -> Result<()>;
}

/// Applies a written statement artifact to the target database
pub trait StatementExecutor: Send + Sync {
    fn execute(&self, artifact: &Path) -> Result<()>;

    /// Command an operator can run by hand to apply the artifact
    fn describe(&self, artifact: &Path) -> String;
}

/// Supplies the raw export text
pub trait ExportSource: Send + Sync {
    fn read_export(&self, path: &Path) -> Result<String>;
}
