use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use command_adapter::{CommandStatementExecutor, DEFAULT_CLIENT, DEFAULT_DATABASE};
use file_adapter::{FsExportSource, JsonBundleStore, SqlFileWriter};
use markup_adapter::RegexMarkupScanner;
use migration_core::application::{
    ImportService, MigrationOutcome, MigrationService, StatementGenerator, DEFAULT_TABLE,
};
use migration_core::domain::{DropReason, DEFAULT_SOURCE};
use migration_core::ports::StatementExecutor;
use migration_core::utils::bundle_path_for;
use sqlite_adapter::SqliteStatementExecutor;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Pages listed individually in the migrate summary
const TOP_PAGES: usize = 10;

/// Migrates a Disqus comment export into SQL load statements
#[derive(Parser, Debug)]
#[command(name = "comment-migrate")]
#[command(about = "Converts a comment export to JSON and loads it into a SQL database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract comments from an XML export into a JSON bundle
    Migrate(MigrateArgs),
    /// Generate SQL from a JSON bundle and execute it
    Import(ImportArgs),
}

#[derive(Args, Debug)]
struct MigrateArgs {
    /// Path to the XML export
    export_file: Option<PathBuf>,

    /// Where to write the bundle (defaults to the export path with .json)
    output_file: Option<PathBuf>,

    /// Fail when posts reference unknown threads or have empty messages
    #[arg(long)]
    strict: bool,

    /// Source tag recorded in the bundle
    #[arg(long, default_value = DEFAULT_SOURCE)]
    source: String,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Path to the JSON bundle (or a bare JSON array of comments)
    bundle_file: Option<PathBuf>,

    /// Generate the SQL file without executing it
    #[arg(long)]
    dry_run: bool,

    /// Target database name passed to the client
    #[arg(long, default_value = DEFAULT_DATABASE)]
    database: String,

    /// Database client command line; the database and --file=<sql> are appended
    #[arg(long, default_value = DEFAULT_CLIENT)]
    client: String,

    /// Directory to run the client from
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Execute against a local SQLite file instead of the client
    #[arg(long, value_name = "DB_FILE")]
    sqlite: Option<PathBuf>,

    /// Create the target table in the SQLite file if missing
    #[arg(long, requires = "sqlite")]
    init_schema: bool,

    /// Target table name
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Migrate(args) => run_migrate(args),
        Commands::Import(args) => run_import(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_migrate(args: MigrateArgs) -> Result<()> {
    let Some(export_file) = args.export_file else {
        println!("Usage: comment-migrate migrate <export.xml> [output.json] [--strict]");
        println!();
        println!("To export from Disqus:");
        println!("  1. Go to https://disqus.com/admin/");
        println!("  2. Select your site > Moderation > Export");
        println!("  3. Download the XML file");
        std::process::exit(1);
    };
    let output_file = args
        .output_file
        .unwrap_or_else(|| bundle_path_for(&export_file));

    let service = MigrationService::new(
        Box::new(FsExportSource),
        Box::new(RegexMarkupScanner::default()),
        Box::new(JsonBundleStore),
        args.source,
    )
    .strict(args.strict);

    println!("Reading {}...", export_file.display());
    let outcome = service.execute_migration(&export_file, &output_file)?;
    info!(bundle = %outcome.bundle_path.display(), "migration finished");
    print_migration_summary(&outcome);
    Ok(())
}

fn print_migration_summary(outcome: &MigrationOutcome) {
    let extraction = &outcome.extraction;
    let report = &extraction.report;
    let pages = extraction.page_counts();

    println!();
    println!(
        "Found {} comments across {} pages:",
        extraction.comments.len(),
        pages.len()
    );
    for (url, count) in pages.iter().take(TOP_PAGES) {
        println!("  {} comments: {}", count, url);
    }
    if pages.len() > TOP_PAGES {
        println!("  ... and {} more pages", pages.len() - TOP_PAGES);
    }

    if report.total_dropped() > 0 {
        let parts: Vec<String> = [
            DropReason::Deleted,
            DropReason::Spam,
            DropReason::UnknownThread,
            DropReason::EmptyMessage,
        ]
        .into_iter()
        .filter(|reason| report.dropped(*reason) > 0)
        .map(|reason| format!("{} {}", report.dropped(reason), reason.label()))
        .collect();
        println!(
            "\nSkipped {} of {} posts: {}",
            report.total_dropped(),
            report.posts_seen,
            parts.join(", ")
        );
    }
    if report.missing_timestamps > 0 {
        println!(
            "{} comments had no timestamp and were dated now",
            report.missing_timestamps
        );
    }

    println!("\nWritten to {}", outcome.bundle_path.display());
    println!("\nNext steps:");
    println!("  1. Review the JSON file");
    println!(
        "  2. Import: comment-migrate import {}",
        outcome.bundle_path.display()
    );
}

fn build_executor(args: &ImportArgs) -> Result<Box<dyn StatementExecutor>> {
    if let Some(db) = &args.sqlite {
        let executor = SqliteStatementExecutor::new(db);
        let executor = if args.init_schema {
            executor.with_schema(&args.table)?
        } else {
            executor
        };
        return Ok(Box::new(executor));
    }

    let mut executor = CommandStatementExecutor::parse(&args.client, args.database.as_str())
        .context("--client must name a program")?;
    if let Some(dir) = &args.workdir {
        executor = executor.working_dir(dir);
    }
    Ok(Box::new(executor))
}

fn run_import(args: ImportArgs) -> Result<()> {
    let Some(bundle_file) = args.bundle_file.clone() else {
        println!("Usage: comment-migrate import <comments.json> [--dry-run]");
        println!();
        println!("Options:");
        println!("  --dry-run  Generate SQL file without executing");
        std::process::exit(1);
    };

    let generator = StatementGenerator::new(&args.table)?;
    let service = ImportService::new(
        Box::new(JsonBundleStore),
        Box::new(SqlFileWriter),
        build_executor(&args)?,
        generator,
    );

    println!("Reading {}...", bundle_file.display());
    let prepared = service.prepare_import(&bundle_file)?;
    println!("Found {} comments to import", prepared.comments);

    service.write_artifact(&prepared.batch, &prepared.artifact)?;
    println!("Generated {}", prepared.artifact.display());

    if args.dry_run {
        info!(artifact = %prepared.artifact.display(), "dry run, skipping execution");
        println!("\n--dry-run specified, not executing SQL");
        println!("To import manually, run:");
        println!("  {}", service.manual_command(&prepared.artifact));
        return Ok(());
    }

    if let Err(e) = service.execute_artifact(&prepared.artifact) {
        if let Some(artifact) = e.artifact() {
            print_retry_hint(&service, artifact);
        }
        return Err(e.into());
    }
    info!(comments = prepared.comments, "import finished");
    println!("\nSuccessfully imported {} comments!", prepared.comments);
    Ok(())
}

fn print_retry_hint(service: &ImportService, artifact: &Path) {
    eprintln!("\nError executing SQL. You can try manually:");
    eprintln!("  {}", service.manual_command(artifact));
}
