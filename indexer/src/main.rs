use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fti_core::{open_for_read, sync_with, Language, SyncOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "fti")]
#[command(about = "Incremental full-text index over a directory tree", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Common {
    /// Index directory
    #[arg(short, long, env = "FTI_INDEX", default_value = ".fti")]
    index: PathBuf,
    /// Log progress to stderr
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add new and modified files below the source directory to the index
    Index {
        #[command(flatten)]
        common: Common,
        /// Directory to index
        #[arg(short, long, default_value = ".")]
        source: PathBuf,
        /// Also index version-control metadata directories such as .git
        #[arg(short = 'G', long = "git", default_value_t = false)]
        include_vcs_dirs: bool,
        /// Two-letter stemming language code
        #[arg(long, default_value = "en")]
        language: Language,
    },
    /// Print the ids of matching documents, best match first
    Search {
        #[command(flatten)]
        common: Common,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        /// Number of leading results to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Query terms; several terms must all match
        #[arg(required = true)]
        terms: Vec<String>,
    },
}

impl Commands {
    fn common(&self) -> &Common {
        match self {
            Commands::Index { common, .. } | Commands::Search { common, .. } => common,
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.command.common().verbose);

    match cli.command {
        Commands::Index { common, source, include_vcs_dirs, language } => {
            let options = SyncOptions::new(include_vcs_dirs);
            let report = sync_with(&source, &common.index, language, options)
                .with_context(|| format!("indexing {} into {}", source.display(), common.index.display()))?;
            tracing::info!(
                changed = report.changed(),
                added = report.added,
                updated = report.updated,
                skipped = report.skipped,
                failed = report.failures.len(),
                "index updated"
            );
            Ok(())
        }
        Commands::Search { common, limit, offset, terms } => search(&common.index, &terms.join(" "), offset, limit),
    }
}

fn search(index: &Path, query: &str, offset: usize, limit: usize) -> Result<()> {
    let session = open_for_read(index).with_context(|| format!("opening index {}", index.display()))?;
    let results = session.search(query, offset, limit).context("searching")?;
    if let Some(diagnostic) = &results.diagnostic {
        eprintln!("{diagnostic}");
    }
    if results.is_exact {
        tracing::info!(matches = results.matches, "found {} results", results.matches);
    } else {
        tracing::info!(matches = results.matches, "found approximately {} results", results.matches);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for id in results.ids() {
        writeln!(out, "{id}")?;
    }
    out.flush()?;
    session.close();
    Ok(())
}
