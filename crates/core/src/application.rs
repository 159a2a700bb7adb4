use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::domain::{
    Comment, DropReason, ExportBundle, Extraction, ExtractionReport, RawPost, RawThread,
    StatementBatch, ANONYMOUS,
};
use crate::error::MigrationError;
use crate::ports::{
    BundleStore, ExportSource, FieldQuery, MarkupScanner, Result, StatementExecutor,
    StatementWriter,
};
use crate::utils::{
    artifact_path_for, clean_message, compare_timestamps, is_sql_identifier, now_timestamp,
    optional_sql_literal, sql_literal,
};

const THREAD_BLOCK: &str = "thread";
const POST_BLOCK: &str = "post";
const IDENTIFIER_ATTR: &str = "dsq:id";

/// Default target table for generated inserts
pub const DEFAULT_TABLE: &str = "comments";

/// Turns a markup export into sorted, normalized comments
pub struct ExtractionService {
    scanner: Box<dyn MarkupScanner>,
}

impl ExtractionService {
    pub fn new(scanner: Box<dyn MarkupScanner>) -> Self {
        Self { scanner }
    }

    /// Extracts every recoverable comment. Never fails: posts that cannot be
    /// resolved are counted in the report and left out.
    pub fn extract(&self, markup: &str) -> Extraction {
        let mut report = ExtractionReport::default();
        let threads = self.index_threads(markup, &mut report);

        let mut comments = Vec::new();
        for block in self.scanner.find_blocks(markup, POST_BLOCK) {
            report.posts_seen += 1;
            let post = self.read_post(block.id, &block.body);
            match normalize_post(&post, &threads) {
                Ok((comment, timestamp_missing)) => {
                    if timestamp_missing {
                        report.missing_timestamps += 1;
                    }
                    comments.push(comment);
                }
                Err(reason) => {
                    debug!(
                        post_id = post.post_id.as_deref().unwrap_or("?"),
                        reason = reason.label(),
                        "dropping post"
                    );
                    report.record_drop(reason);
                }
            }
        }

        sort_chronologically(&mut comments);
        info!(
            threads = report.threads_indexed,
            posts = report.posts_seen,
            kept = comments.len(),
            "extraction finished"
        );
        Extraction { comments, report }
    }

    /// Maps thread id to page url; threads without a link are skipped
    fn index_threads(&self, markup: &str, report: &mut ExtractionReport) -> HashMap<String, String> {
        let mut threads = HashMap::new();
        for block in self.scanner.find_blocks(markup, THREAD_BLOCK) {
            let link = self
                .scanner
                .find_field(&block.body, FieldQuery::Text("link"))
                .filter(|link| !link.is_empty());
            match (block.id, link) {
                (Some(thread_id), Some(page_url)) => {
                    let thread = RawThread { thread_id, page_url };
                    threads.insert(thread.thread_id, thread.page_url);
                }
                _ => report.threads_without_link += 1,
            }
        }
        report.threads_indexed = threads.len();
        threads
    }

    fn read_post(&self, post_id: Option<String>, body: &str) -> RawPost {
        let text = |name| self.scanner.find_field(body, FieldQuery::Text(name));
        let flag = |name| text(name).is_some_and(|value| value == "true");
        RawPost {
            post_id,
            thread_id: self.scanner.find_field(
                body,
                FieldQuery::Attribute {
                    tag: THREAD_BLOCK,
                    attr: IDENTIFIER_ATTR,
                },
            ),
            raw_message: self.scanner.find_field(body, FieldQuery::Markup("message")),
            created_at: text("createdAt"),
            author_name: text("name"),
            author_email: text("email"),
            is_deleted: flag("isDeleted"),
            is_spam: flag("isSpam"),
        }
    }
}

/// Builds the output record for one post, or says why there is none.
/// The flag is set when `created_at` had to be invented.
fn normalize_post(
    post: &RawPost,
    threads: &HashMap<String, String>,
) -> std::result::Result<(Comment, bool), DropReason> {
    if post.is_deleted {
        return Err(DropReason::Deleted);
    }
    if post.is_spam {
        return Err(DropReason::Spam);
    }
    let url = post
        .thread_id
        .as_ref()
        .and_then(|thread_id| threads.get(thread_id))
        .ok_or(DropReason::UnknownThread)?;
    let message = post
        .raw_message
        .as_deref()
        .filter(|message| !message.trim().is_empty())
        .ok_or(DropReason::EmptyMessage)?;

    // Tag-only messages clean down to nothing
    let content = clean_message(message);
    if content.is_empty() {
        return Err(DropReason::EmptyMessage);
    }

    let created_at = post.created_at.clone().filter(|value| !value.is_empty());
    let timestamp_missing = created_at.is_none();
    let comment = Comment {
        url: url.clone(),
        name: post
            .author_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string()),
        email: post.author_email.clone().filter(|email| !email.is_empty()),
        content,
        created_at: created_at.unwrap_or_else(now_timestamp),
    };
    Ok((comment, timestamp_missing))
}

/// Oldest first; stable, so already sorted input is left untouched
pub fn sort_chronologically(comments: &mut [Comment]) {
    comments.sort_by(|a, b| compare_timestamps(&a.created_at, &b.created_at));
}

/// Outcome of a `migrate` run
#[derive(Debug)]
pub struct MigrationOutcome {
    pub extraction: Extraction,
    pub bundle_path: PathBuf,
}

/// Reads an export, extracts comments and writes the bundle
pub struct MigrationService {
    export_source: Box<dyn ExportSource>,
    extractor: ExtractionService,
    bundle_store: Box<dyn BundleStore>,
    source_tag: String,
    strict: bool,
}

impl MigrationService {
    pub fn new(
        export_source: Box<dyn ExportSource>,
        scanner: Box<dyn MarkupScanner>,
        bundle_store: Box<dyn BundleStore>,
        source_tag: impl Into<String>,
    ) -> Self {
        Self {
            export_source,
            extractor: ExtractionService::new(scanner),
            bundle_store,
            source_tag: source_tag.into(),
            strict: false,
        }
    }

    /// Fail instead of writing a bundle when posts were lost to an unknown
    /// thread or an empty message
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn execute_migration(&self, export_path: &Path, bundle_path: &Path) -> Result<MigrationOutcome> {
        let markup = self.export_source.read_export(export_path)?;
        let extraction = self.extractor.extract(&markup);
        let report = &extraction.report;

        for reason in [
            DropReason::Deleted,
            DropReason::Spam,
            DropReason::UnknownThread,
            DropReason::EmptyMessage,
        ] {
            let dropped = report.dropped(reason);
            if dropped > 0 && reason.is_data_loss() {
                warn!(count = dropped, reason = reason.label(), "posts dropped");
            } else if dropped > 0 {
                info!(count = dropped, reason = reason.label(), "posts skipped");
            }
        }
        if report.threads_without_link > 0 {
            warn!(count = report.threads_without_link, "threads without a link were not indexed");
        }
        if report.missing_timestamps > 0 {
            warn!(
                count = report.missing_timestamps,
                "comments had no createdAt and were stamped with the current time"
            );
        }

        if self.strict && report.data_loss() > 0 {
            return Err(MigrationError::MalformedRecords {
                dropped: report.data_loss(),
            });
        }

        let bundle = ExportBundle::new(self.source_tag.clone(), extraction.comments.clone());
        self.bundle_store.write_bundle(bundle_path, &bundle)?;
        info!(path = %bundle_path.display(), comments = bundle.total_comments, "bundle written");

        Ok(MigrationOutcome {
            extraction,
            bundle_path: bundle_path.to_path_buf(),
        })
    }
}

/// Renders comments as a transactional batch of inserts
#[derive(Debug, Clone)]
pub struct StatementGenerator {
    table: String,
}

impl Default for StatementGenerator {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl StatementGenerator {
    pub fn new(table: &str) -> Result<Self> {
        if !is_sql_identifier(table) {
            return Err(MigrationError::InvalidIdentifier(table.to_string()));
        }
        Ok(Self {
            table: table.to_string(),
        })
    }

    pub fn generate(&self, comments: &[Comment]) -> StatementBatch {
        let mut statements = Vec::with_capacity(comments.len() + 2);
        statements.push("BEGIN TRANSACTION;".to_string());
        for comment in comments {
            statements.push(format!(
                "INSERT INTO {} (url, name, email, content, created_at) VALUES ({}, {}, {}, {}, {});",
                self.table,
                sql_literal(&comment.url),
                sql_literal(&comment.name),
                optional_sql_literal(comment.email.as_deref()),
                sql_literal(&comment.content),
                sql_literal(&comment.created_at),
            ));
        }
        statements.push("COMMIT;".to_string());
        StatementBatch::from_statements(statements)
    }
}

/// Statements for the default `comments` table
pub fn generate_statements(comments: &[Comment]) -> StatementBatch {
    StatementGenerator::default().generate(comments)
}

/// Outcome of an `import` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub comments: usize,
    pub artifact: PathBuf,
    pub executed: bool,
}

/// A loaded bundle and its batch, ready to be written to `artifact`
#[derive(Debug, Clone)]
pub struct PreparedImport {
    pub comments: usize,
    pub batch: StatementBatch,
    pub artifact: PathBuf,
}

/// Loads a bundle, writes the statement artifact and optionally executes it
pub struct ImportService {
    bundle_store: Box<dyn BundleStore>,
    statement_writer: Box<dyn StatementWriter>,
    executor: Box<dyn StatementExecutor>,
    generator: StatementGenerator,
}

impl ImportService {
    pub fn new(
        bundle_store: Box<dyn BundleStore>,
        statement_writer: Box<dyn StatementWriter>,
        executor: Box<dyn StatementExecutor>,
        generator: StatementGenerator,
    ) -> Self {
        Self {
            bundle_store,
            statement_writer,
            executor,
            generator,
        }
    }

    pub fn execute_import(&self, bundle_path: &Path, dry_run: bool) -> Result<ImportOutcome> {
        let prepared = self.prepare_import(bundle_path)?;
        self.persist(&prepared.batch, &prepared.artifact, dry_run)?;

        Ok(ImportOutcome {
            comments: prepared.comments,
            artifact: prepared.artifact,
            executed: !dry_run,
        })
    }

    /// Loads the bundle and builds the batch. Nothing is written yet.
    pub fn prepare_import(&self, bundle_path: &Path) -> Result<PreparedImport> {
        let comments = self.bundle_store.read_comments(bundle_path)?;
        if comments.is_empty() {
            return Err(MigrationError::EmptyResult(bundle_path.to_path_buf()));
        }
        info!(path = %bundle_path.display(), comments = comments.len(), "bundle loaded");

        Ok(PreparedImport {
            comments: comments.len(),
            batch: self.generator.generate(&comments),
            artifact: artifact_path_for(bundle_path),
        })
    }

    /// Writes the artifact, then runs it unless `dry_run`. Returns the number
    /// of inserts in the batch. The artifact always exists before execution
    /// starts, so a failed run can be retried by hand.
    pub fn persist(&self, batch: &StatementBatch, artifact: &Path, dry_run: bool) -> Result<usize> {
        self.write_artifact(batch, artifact)?;
        if !dry_run {
            self.execute_artifact(artifact)?;
        }
        Ok(batch.insert_count())
    }

    pub fn write_artifact(&self, batch: &StatementBatch, artifact: &Path) -> Result<()> {
        self.statement_writer.write_statements(artifact, batch)?;
        info!(path = %artifact.display(), statements = batch.len(), "statement file written");
        Ok(())
    }

    /// Runs an artifact that is already on disk. Every failure comes back as
    /// `ExecutionFailed` naming the artifact.
    pub fn execute_artifact(&self, artifact: &Path) -> Result<()> {
        self.executor.execute(artifact).map_err(|err| match err {
            MigrationError::ExecutionFailed { .. } => err,
            other => MigrationError::ExecutionFailed {
                artifact: artifact.to_path_buf(),
                reason: other.to_string(),
            },
        })
    }

    /// Manual command for applying `artifact` with the configured executor
    pub fn manual_command(&self, artifact: &Path) -> String {
        self.executor.describe(artifact)
    }
}
