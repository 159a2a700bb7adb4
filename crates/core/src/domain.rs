use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author name used when the export carries none
pub const ANONYMOUS: &str = "Anonymous";

/// Source tag written into bundles produced from a Disqus export
pub const DEFAULT_SOURCE: &str = "disqus";

/// A page that comments attach to, as found in the export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawThread {
    pub thread_id: String,
    pub page_url: String,
}

/// One comment block from the export, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    pub post_id: Option<String>,
    pub thread_id: Option<String>,
    pub raw_message: Option<String>,
    pub created_at: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub is_deleted: bool,
    pub is_spam: bool,
}

/// Normalized comment, the durable output record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub url: String,
    #[serde(default = "anonymous")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub content: String,
    pub created_at: String,
}

fn anonymous() -> String {
    ANONYMOUS.to_string()
}

/// The normalized JSON document handed from `migrate` to `import`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub exported_at: DateTime<Utc>,
    pub source: String,
    pub total_comments: usize,
    pub comments: Vec<Comment>,
}

impl ExportBundle {
    pub fn new(source: impl Into<String>, comments: Vec<Comment>) -> Self {
        Self {
            exported_at: Utc::now(),
            source: source.into(),
            total_comments: comments.len(),
            comments,
        }
    }
}

/// Why a post did not make it into the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DropReason {
    Deleted,
    Spam,
    UnknownThread,
    EmptyMessage,
}

impl DropReason {
    pub fn label(self) -> &'static str {
        match self {
            DropReason::Deleted => "deleted",
            DropReason::Spam => "spam",
            DropReason::UnknownThread => "unknown thread",
            DropReason::EmptyMessage => "empty message",
        }
    }

    /// Deleted and spam posts are dropped on purpose; the rest is data loss.
    pub fn is_data_loss(self) -> bool {
        matches!(self, DropReason::UnknownThread | DropReason::EmptyMessage)
    }
}

/// Counters collected during one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub threads_indexed: usize,
    pub threads_without_link: usize,
    pub posts_seen: usize,
    pub dropped_deleted: usize,
    pub dropped_spam: usize,
    pub dropped_unknown_thread: usize,
    pub dropped_empty_message: usize,
    pub missing_timestamps: usize,
}

impl ExtractionReport {
    pub fn record_drop(&mut self, reason: DropReason) {
        match reason {
            DropReason::Deleted => self.dropped_deleted += 1,
            DropReason::Spam => self.dropped_spam += 1,
            DropReason::UnknownThread => self.dropped_unknown_thread += 1,
            DropReason::EmptyMessage => self.dropped_empty_message += 1,
        }
    }

    pub fn dropped(&self, reason: DropReason) -> usize {
        match reason {
            DropReason::Deleted => self.dropped_deleted,
            DropReason::Spam => self.dropped_spam,
            DropReason::UnknownThread => self.dropped_unknown_thread,
            DropReason::EmptyMessage => self.dropped_empty_message,
        }
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped_deleted
            + self.dropped_spam
            + self.dropped_unknown_thread
            + self.dropped_empty_message
    }

    pub fn data_loss(&self) -> usize {
        self.dropped_unknown_thread + self.dropped_empty_message
    }
}

/// Comments extracted from one export, sorted, plus what was left behind
#[derive(Debug, Clone)]
pub struct Extraction {
    pub comments: Vec<Comment>,
    pub report: ExtractionReport,
}

impl Extraction {
    /// Comment counts per page, most commented first, ties by url
    pub fn page_counts(&self) -> Vec<(String, usize)> {
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for comment in &self.comments {
            *counts.entry(comment.url.as_str()).or_insert(0) += 1;
        }
        let mut pages: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(url, count)| (url.to_string(), count))
            .collect();
        pages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        pages
    }
}

/// Begin, one insert per comment, commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementBatch {
    statements: Vec<String>,
}

impl StatementBatch {
    pub(crate) fn from_statements(statements: Vec<String>) -> Self {
        Self { statements }
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Number of insert statements between the transaction frame
    pub fn insert_count(&self) -> usize {
        self.statements.len().saturating_sub(2)
    }

    /// Newline-joined artifact text
    pub fn to_sql(&self) -> String {
        self.statements.join("\n")
    }
}
