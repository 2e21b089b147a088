use std::collections::HashSet;
use std::io::{BufRead, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use ghoststack_brain::hash_cache::HASH_CACHE_FILE;
use ghoststack_brain::{index_db_path, CodeIndex, EmbeddingModel, Ingestor, VectorStore};
use ghoststack_core::{config_path, state_dir, GhostConfig, OutputFormat, STATE_DIR};
use ghoststack_review::changes::{
    current_branch, diff_against, parse_numstat, read_numstat, repo_root,
};
use ghoststack_review::ImpactAnalyzer;

#[derive(Parser)]
#[command(
    name = "gs",
    version,
    about = "Local semantic code index and hidden-impact review",
    long_about = "GhostStack indexes your repository into a local vector store and uses it to\n\
                   find files that are semantically related to a change but not part of it.\n\n\
                   Examples:\n  \
                     gs init                         Create .ghoststack/ with a default config\n  \
                     gs brain index                  Index new and changed files\n  \
                     gs brain search 'retry policy'  Search the index\n  \
                     gs review --base main           Review HEAD against main"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Repository path (default: current directory)
    #[arg(long, global = true, default_value = ".")]
    repo: PathBuf,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable verbose (debug) logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize GhostStack in a repository
    #[command(long_about = "Initialize GhostStack in a repository.\n\n\
        Creates .ghoststack/config.toml with a commented default configuration and\n\
        adds .ghoststack/ to .gitignore. Fails if the config already exists.")]
    Init {
        /// Default base branch for reviews
        #[arg(long, short, default_value = "main")]
        base: String,
    },
    /// Manage the code index
    Brain {
        #[command(subcommand)]
        command: BrainCommand,
    },
    /// Find files impacted by your changes but not part of them
    #[command(long_about = "Find files impacted by your changes but not part of them.\n\n\
        Diffs HEAD against a base revision, looks up each changed file in the code index,\n\
        and reports semantically similar files outside the change with a risk level.\n\n\
        Examples:\n  gs review\n  gs review --base develop --related 10\n  git diff --numstat main | gs review --numstat -")]
    Review {
        /// Base revision to compare against (default: review.base_branch)
        #[arg(long, short)]
        base: Option<String>,

        /// Read changed files from `git diff --numstat` output ('-' for stdin)
        #[arg(long)]
        numstat: Option<PathBuf>,

        /// Related files to request per changed file (default: review.related)
        #[arg(long, short)]
        related: Option<usize>,
    },
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum BrainCommand {
    /// Index new and changed source files
    #[command(long_about = "Index new and changed source files.\n\n\
        Files whose content hash is unchanged since the last run are skipped.\n\
        Use --force to re-chunk every file; unchanged chunks are still not re-embedded.")]
    Index {
        /// Re-index every file even if unchanged
        #[arg(long, short)]
        force: bool,
    },
    /// Show index location and size
    Status,
    /// Search the index
    Search {
        /// Natural-language or code query
        query: String,

        /// Maximum results to return
        #[arg(long, short = 'n', default_value = "10")]
        limit: usize,

        /// File paths to leave out of the results
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Remove files that no longer exist from the index
    Prune,
    /// Delete every indexed document
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

const DEFAULT_CONFIG: &str = r#"# GhostStack Configuration

[brain]
# chunk_size = 2000       # window size in characters
# chunk_overlap = 200     # overlap between consecutive windows
# max_file_size = 500000  # files larger than this (bytes) are not indexed

[embedding]
# provider = "openai"     # "openai", "voyage", or "hash" (offline, not semantic)
# model = "text-embedding-3-small"
# dimensions = 384
# api_key = "..."         # or set OPENAI_API_KEY / VOYAGE_API_KEY
# base_url = "https://api.openai.com/v1"

[review]
base_branch = "{base}"
# related = 5
"#;

const GITIGNORE_ENTRY: &str = ".ghoststack/";

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help().into_diagnostic()?;
        return Ok(());
    };

    let root = resolve_root(&cli.repo)?;
    tracing::debug!(root = %root.display(), format = %cli.format, "starting");

    match command {
        Command::Init { base } => run_init(&root, &base, cli.format),
        Command::Brain { command } => run_brain(command, &root, cli.format),
        Command::Review {
            base,
            numstat,
            related,
        } => run_review(&root, base, numstat, related, cli.format),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "gs", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// The enclosing git work tree, or the path itself outside of git.
fn resolve_root(path: &Path) -> Result<PathBuf> {
    match repo_root(path) {
        Ok(root) => Ok(root),
        Err(_) => std::fs::canonicalize(path).into_diagnostic(),
    }
}

fn require_init(root: &Path) -> Result<GhostConfig> {
    if !state_dir(root).is_dir() {
        miette::bail!(
            help = "Run `gs init` in the repository root first",
            "GhostStack is not initialized in {}",
            root.display()
        );
    }
    Ok(GhostConfig::load_or_default(root)?)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn run_init(root: &Path, base: &str, format: OutputFormat) -> Result<()> {
    let path = config_path(root);
    if path.exists() {
        miette::bail!(
            help = "Edit the existing file or delete it to start over",
            "{STATE_DIR}/config.toml already exists"
        );
    }

    std::fs::create_dir_all(state_dir(root)).into_diagnostic()?;
    std::fs::write(&path, DEFAULT_CONFIG.replace("{base}", base)).into_diagnostic()?;
    let gitignore_updated = ensure_gitignore(root)?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "status": "success",
            "path": root.display().to_string(),
            "config": path.display().to_string(),
            "baseBranch": base,
            "gitignoreUpdated": gitignore_updated,
        }))?,
        _ => {
            println!("Created {STATE_DIR}/config.toml (base branch: {base})");
            if gitignore_updated {
                println!("Added {GITIGNORE_ENTRY} to .gitignore");
            }
        }
    }
    Ok(())
}

/// Append the state directory to `.gitignore`. Returns whether the file changed.
fn ensure_gitignore(root: &Path) -> Result<bool> {
    let path = root.join(".gitignore");
    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).into_diagnostic(),
    };
    if existing.lines().any(|l| l.trim() == GITIGNORE_ENTRY) {
        return Ok(false);
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .into_diagnostic()?;
    if !existing.is_empty() {
        let sep = if existing.ends_with('\n') { "\n" } else { "\n\n" };
        file.write_all(sep.as_bytes()).into_diagnostic()?;
    }
    writeln!(file, "# GhostStack local data\n{GITIGNORE_ENTRY}").into_diagnostic()?;
    Ok(true)
}

fn run_brain(command: BrainCommand, root: &Path, format: OutputFormat) -> Result<()> {
    let config = require_init(root)?;
    let db_path = index_db_path(root);

    match command {
        BrainCommand::Index { force } => {
            let store = VectorStore::open(&db_path)?;
            let model = EmbeddingModel::from_config(&config.embedding)?;
            let mut ingestor =
                Ingestor::new(root, CodeIndex::new(&store, &model), config.brain.clone());

            let progress = (format == OutputFormat::Text && std::io::stderr().is_terminal())
                .then(|| {
                    indicatif::ProgressStyle::with_template(
                        "{spinner:.cyan} [{pos}/{len}] {wide_msg}",
                    )
                    .map(|style| indicatif::ProgressBar::new(0).with_style(style))
                })
                .transpose()
                .into_diagnostic()?;

            let stats = ingestor.index_all(force, |path, current, total| {
                if let Some(pb) = &progress {
                    pb.set_length(total as u64);
                    pb.set_position(current as u64);
                    pb.set_message(path.to_string());
                }
            })?;
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "status": "success",
                    "filesScanned": stats.files_scanned,
                    "filesIndexed": stats.files_indexed,
                    "chunksTotal": stats.chunks_total,
                    "fallbackEmbeddings": model.is_fallback(),
                }))?,
                OutputFormat::Markdown => {
                    println!("## Indexing complete\n");
                    println!("| Files scanned | Files indexed | Chunks |");
                    println!("|---|---|---|");
                    println!(
                        "| {} | {} | {} |",
                        stats.files_scanned, stats.files_indexed, stats.chunks_total
                    );
                }
                OutputFormat::Text => {
                    println!("Indexing complete");
                    println!("  files scanned: {}", stats.files_scanned);
                    println!("  files indexed: {}", stats.files_indexed);
                    println!("  chunks:        {}", stats.chunks_total);
                }
            }
            if model.is_fallback() && format != OutputFormat::Json {
                eprintln!(
                    "note: no embedding backend available, using hash embeddings (search is not semantic)"
                );
            }
        }
        BrainCommand::Status => {
            if !db_path.exists() {
                match format {
                    OutputFormat::Json => print_json(&serde_json::json!({
                        "initialized": false,
                        "documents": 0,
                        "path": db_path.display().to_string(),
                    }))?,
                    _ => {
                        println!("Code index not created yet");
                        println!("Run `gs brain index` to create it");
                    }
                }
                return Ok(());
            }

            let store = VectorStore::open(&db_path)?;
            let stats = store.stats()?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "initialized": true,
                    "documents": stats.documents,
                    "files": stats.files,
                    "sizeBytes": stats.size_bytes,
                    "dimensions": stats.dimensions,
                    "path": db_path.display().to_string(),
                }))?,
                _ => {
                    println!("Code index active");
                    println!("  documents:  {}", stats.documents);
                    println!("  files:      {}", stats.files);
                    println!("  size:       {} KB", stats.size_bytes / 1024);
                    if let Some(dims) = stats.dimensions {
                        println!("  dimensions: {dims}");
                    }
                    println!("  path:       {}", db_path.display());
                }
            }
        }
        BrainCommand::Search {
            query,
            limit,
            exclude,
        } => {
            let store = VectorStore::open(&db_path)?;
            if store.count()? == 0 {
                miette::bail!(
                    help = "Run `gs brain index` first",
                    "The code index is empty"
                );
            }
            let model = EmbeddingModel::from_config(&config.embedding)?;
            let index = CodeIndex::new(&store, &model);

            let excluded: HashSet<String> = exclude.into_iter().collect();
            let excluded = (!excluded.is_empty()).then_some(&excluded);
            let results = index.search(&query, limit, excluded)?;

            match format {
                OutputFormat::Json => print_json(&results)?,
                OutputFormat::Markdown => {
                    println!("## Results for `{query}`\n");
                    for hit in &results {
                        println!(
                            "- `{}` ({}) — distance {:.3}",
                            hit.file_path, hit.chunk_id, hit.distance
                        );
                    }
                }
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results.");
                    }
                    for hit in &results {
                        let preview = hit.content.lines().find(|l| !l.trim().is_empty());
                        println!("{:.3}  {} :: {}", hit.distance, hit.file_path, hit.chunk_id);
                        if let Some(line) = preview {
                            println!("       {}", line.trim());
                        }
                    }
                }
            }
        }
        BrainCommand::Prune => {
            let store = VectorStore::open(&db_path)?;
            let model = EmbeddingModel::from_config(&config.embedding)?;
            let mut ingestor =
                Ingestor::new(root, CodeIndex::new(&store, &model), config.brain.clone());
            let removed = ingestor.remove_deleted_files()?;

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "status": "success",
                    "filesRemoved": removed,
                }))?,
                _ => println!("Removed {removed} deleted file(s) from the index"),
            }
        }
        BrainCommand::Clear { yes } => {
            if !db_path.exists() {
                println!("Index does not exist");
                return Ok(());
            }
            if !yes && !confirm("Clear all indexed documents?")? {
                println!("Cancelled");
                return Ok(());
            }

            let store = VectorStore::open(&db_path)?;
            store.reset()?;
            // Without this the next `brain index` would consider every file unchanged.
            let cache = state_dir(root).join(HASH_CACHE_FILE);
            if cache.exists() {
                std::fs::remove_file(&cache).into_diagnostic()?;
            }

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "status": "success" }))?,
                _ => println!("Index cleared"),
            }
        }
    }

    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        miette::bail!(
            help = "Pass --yes to confirm non-interactively",
            "Refusing to clear the index without confirmation"
        );
    }
    eprint!("{question} [y/N] ");
    std::io::stderr().flush().into_diagnostic()?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .into_diagnostic()?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn run_review(
    root: &Path,
    base: Option<String>,
    numstat: Option<PathBuf>,
    related: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let config = require_init(root)?;

    let (changed, base_label, head) = match numstat {
        Some(path) if path.as_os_str() == "-" => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .into_diagnostic()?;
            (parse_numstat(&buf), base, None)
        }
        Some(path) => (read_numstat(&path)?, base, None),
        None => {
            let head = current_branch(root)?;
            let base = base.unwrap_or_else(|| config.review.base_branch.clone());
            (diff_against(root, &base)?, Some(base), Some(head))
        }
    };

    if changed.is_empty() {
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "status": "success",
                "message": "No changes detected",
                "base": base_label,
                "head": head,
            }))?,
            _ => println!("No changes detected"),
        }
        return Ok(());
    }

    let db_path = index_db_path(root);
    let store = if db_path.exists() {
        VectorStore::open(&db_path)?
    } else {
        VectorStore::in_memory()?
    };
    if store.count()? == 0 {
        eprintln!("warning: code index is empty, run `gs brain index` to detect hidden impact");
    }
    let model = EmbeddingModel::from_config(&config.embedding)?;
    let analyzer = ImpactAnalyzer::new(CodeIndex::new(&store, &model));

    let k = related.unwrap_or(config.review.related);
    let mut report = analyzer.find_related(&changed, k)?;
    if let Some(base) = base_label {
        report = report.with_base(base);
    }
    if let Some(head) = head {
        report = report.with_head(head);
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Markdown => println!("{}", report.to_markdown()),
        OutputFormat::Text => println!("{report}"),
    }
    Ok(())
}
