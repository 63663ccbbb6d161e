use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use errata::corpus::{
    load_from_path, repair_file, Corpus, Entry, ErrataRecorder, RepairOptions, RepairResult,
};
use errata::operation::unescape;
use errata::pattern::{PatternCorrector, PatternLearner};
use errata::settings::{self, Settings};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "errata")]
#[command(about = "Replay recorded corrections against text files", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $ERRATA_CONFIG, then ./errata.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply recorded corrections to files
    Apply {
        /// Errata corpus (XML)
        #[arg(short, long)]
        corpus: Option<PathBuf>,

        /// Corpus key to use instead of each file's name
        #[arg(short, long)]
        key: Option<String>,

        /// Repair every corpus file that records a path
        #[arg(long, conflicts_with_all = ["files", "key"])]
        all: bool,

        /// Dry run - show what would be changed without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,

        /// Files (or directories of files) to repair
        #[arg(required_unless_present = "all")]
        files: Vec<PathBuf>,
    },

    /// Report which files would change, without modifying them
    Status {
        #[arg(short, long)]
        corpus: Option<PathBuf>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List corpus keys and their entry counts
    List {
        #[arg(short, long)]
        corpus: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Append one replacement to a corpus
    Record {
        #[arg(short, long)]
        corpus: Option<PathBuf>,

        #[arg(short, long)]
        key: String,

        /// 1-based line the found text starts on
        #[arg(short, long)]
        line: usize,

        /// Text to find (`\n` for a line break)
        #[arg(long)]
        find: String,

        /// Replacement text (`\n` for a line break)
        #[arg(long)]
        replace: String,

        #[arg(long)]
        comment: Option<String>,
    },

    /// Learn the contexts corpus anchors appear in
    Learn {
        #[arg(short, long)]
        corpus: Option<PathBuf>,

        /// Pattern table to update
        #[arg(short, long)]
        table: Option<PathBuf>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Guess where an anchor belongs in a file from learned contexts
    Locate {
        #[arg(short, long)]
        table: Option<PathBuf>,

        /// Anchor text to relocate
        #[arg(short, long)]
        anchor: String,

        file: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cwd = env::current_dir()?;
    let settings = settings::resolve(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Apply {
            corpus,
            key,
            all,
            dry_run,
            diff,
            json,
            files,
        } => cmd_apply(
            &settings,
            corpus,
            ApplyArgs {
                key,
                all,
                dry_run,
                diff,
                json,
            },
            files,
        ),
        Commands::Status { corpus, files } => cmd_status(&settings, corpus, files),
        Commands::List { corpus, json } => cmd_list(&settings, corpus, json),
        Commands::Record {
            corpus,
            key,
            line,
            find,
            replace,
            comment,
        } => cmd_record(&settings, corpus, &key, line, &find, &replace, comment),
        Commands::Learn {
            corpus,
            table,
            files,
        } => cmd_learn(&settings, corpus, table, files),
        Commands::Locate {
            table,
            anchor,
            file,
        } => cmd_locate(&settings, table, &anchor, &file),
    }
}

/// Logs go to stderr, filtered by `ERRATA_LOG` (default `errata=info`).
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("ERRATA_LOG").unwrap_or_else(|_| EnvFilter::new("errata=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the corpus path.
///
/// Priority order:
/// 1. Explicit --corpus flag
/// 2. ERRATA_CORPUS environment variable
/// 3. `corpus` in the settings file
fn resolve_corpus(settings: &Settings, cli_corpus: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = cli_corpus {
        return Ok(path);
    }

    if let Ok(env_path) = env::var("ERRATA_CORPUS") {
        if !env_path.is_empty() {
            return Ok(PathBuf::from(env_path));
        }
    }

    if let Some(path) = &settings.corpus {
        return Ok(path.clone());
    }

    anyhow::bail!(
        "{}\n{}\n  {}\n  {}\n  {}",
        "No errata corpus given.".red(),
        "Try one of:".bold(),
        "1. Pass it explicitly: errata apply --corpus errata.xml <FILES>",
        "2. Set environment variable: export ERRATA_CORPUS=/path/to/errata.xml",
        "3. Add `corpus = \"errata.xml\"` to errata.toml"
    )
}

fn resolve_table(settings: &Settings, cli_table: Option<PathBuf>) -> Result<PathBuf> {
    cli_table
        .or_else(|| settings.pattern_table.clone())
        .context("No pattern table given: pass --table or set `pattern_table` in errata.toml")
}

fn load_corpus(path: &Path) -> Result<Corpus> {
    let corpus = load_from_path(path)?;
    tracing::debug!(
        corpus = %path.display(),
        files = corpus.files.len(),
        entries = corpus.entry_count(),
        "corpus loaded"
    );
    Ok(corpus)
}

/// Expand directories one level deep; plain paths pass through.
fn collect_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() {
                found.push(entry.path().to_path_buf());
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// The corpus key of a file: its name.
fn default_key(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .with_context(|| format!("cannot derive a corpus key from {}", path.display()))
}

/// Helper: Show unified diff between original and repaired content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (repaired)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);
    for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
        println!("{}", hunk.header().to_string().cyan());
        for change in hunk.iter_changes() {
            let line = match change.tag() {
                ChangeTag::Delete => format!("-{}", change).red(),
                ChangeTag::Insert => format!("+{}", change).green(),
                ChangeTag::Equal => format!(" {}", change).normal(),
            };
            print!("{}", line);
            if change.missing_newline() {
                println!();
            }
        }
    }
}

struct ApplyArgs {
    key: Option<String>,
    all: bool,
    dry_run: bool,
    diff: bool,
    json: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FileReport {
    Done(RepairResult),
    Failed {
        status: &'static str,
        file: PathBuf,
        error: String,
    },
}

fn cmd_apply(
    settings: &Settings,
    corpus: Option<PathBuf>,
    args: ApplyArgs,
    files: Vec<PathBuf>,
) -> Result<()> {
    let corpus_path = resolve_corpus(settings, corpus)?;
    let corpus = load_corpus(&corpus_path)?;

    let targets: Vec<(PathBuf, String)> = if args.all {
        // Recorded paths are relative to the corpus file
        let base = corpus_path.parent().unwrap_or(Path::new(""));
        corpus
            .files
            .iter()
            .filter_map(|(key, file)| {
                file.path
                    .as_ref()
                    .map(|path| (base.join(path), key.clone()))
            })
            .collect()
    } else {
        let files = collect_files(&files)?;
        if args.key.is_some() && files.len() > 1 {
            anyhow::bail!("--key applies to a single file, got {}", files.len());
        }
        files
            .into_iter()
            .map(|file| {
                let key = match &args.key {
                    Some(key) => key.clone(),
                    None => default_key(&file)?,
                };
                Ok((file, key))
            })
            .collect::<Result<_>>()?
    };

    if targets.is_empty() {
        anyhow::bail!("Nothing to repair");
    }

    let options = RepairOptions {
        dry_run: args.dry_run,
        backup_suffix: settings.backup_suffix().map(str::to_owned),
    };

    if !args.json {
        println!("Corpus: {}", corpus_path.display());
        if args.dry_run {
            println!("{}", "[DRY RUN - showing what would be repaired]".cyan());
        }
        println!();
    }

    let mut reports = Vec::new();
    let mut total_repaired = 0;
    let mut total_unchanged = 0;
    let mut total_missing = 0;
    let mut total_failed = 0;

    for (file, key) in targets {
        match repair_file(&corpus, &file, &key, &options) {
            Ok(result) => {
                match &result {
                    RepairResult::Repaired {
                        file,
                        backup,
                        original,
                        repaired,
                    } => {
                        total_repaired += 1;
                        if !args.json {
                            let verb = if args.dry_run { "Would repair" } else { "Repaired" };
                            println!("{} {} {}", "✓".green(), verb, file.display());
                            if let Some(backup) = backup {
                                println!("  {}", format!("backup: {}", backup.display()).dimmed());
                            }
                            if args.diff {
                                display_diff(file, original, repaired);
                            }
                        }
                    }
                    RepairResult::Unchanged { file } => {
                        total_unchanged += 1;
                        if !args.json {
                            println!("{} Unchanged {}", "⊙".yellow(), file.display());
                        }
                    }
                    RepairResult::NotInCorpus { file, key } => {
                        total_missing += 1;
                        if !args.json {
                            println!(
                                "{} {}: no errata for '{}'",
                                "⊘".cyan(),
                                file.display(),
                                key
                            );
                        }
                    }
                }
                reports.push(FileReport::Done(result));
            }
            Err(e) => {
                total_failed += 1;
                if !args.json {
                    eprintln!("{} {}", "✗".red(), e);
                }
                reports.push(FileReport::Failed {
                    status: "failed",
                    file,
                    error: e.to_string(),
                });
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!();
        println!("{}", "Summary:".bold());
        println!("  {} repaired", format!("{}", total_repaired).green());
        println!("  {} unchanged", format!("{}", total_unchanged).yellow());
        println!("  {} not in corpus", format!("{}", total_missing).cyan());
        println!("  {} failed", format!("{}", total_failed).red());
    }

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_status(settings: &Settings, corpus: Option<PathBuf>, files: Vec<PathBuf>) -> Result<()> {
    let corpus_path = resolve_corpus(settings, corpus)?;
    let corpus = load_corpus(&corpus_path)?;
    let options = RepairOptions {
        dry_run: true,
        backup_suffix: None,
    };

    let mut pending = Vec::new();
    let mut clean = Vec::new();
    let mut missing = Vec::new();
    let mut failed = Vec::new();

    for file in collect_files(&files)? {
        let key = default_key(&file)?;
        match repair_file(&corpus, &file, &key, &options) {
            Ok(RepairResult::Repaired { file, .. }) => pending.push(file),
            Ok(RepairResult::Unchanged { file }) => clean.push(file),
            Ok(RepairResult::NotInCorpus { file, .. }) => missing.push(file),
            Err(e) => failed.push((file, e.to_string())),
        }
    }

    println!("{}", "Errata Status Report".bold());
    println!("Corpus: {}", corpus_path.display());
    println!();

    let sections: [(&str, colored::ColoredString, &Vec<PathBuf>); 3] = [
        ("⊙", "NEEDS REPAIR".yellow().bold(), &pending),
        ("✓", "UP TO DATE".green().bold(), &clean),
        ("⊘", "NOT IN CORPUS".cyan().bold(), &missing),
    ];
    for (mark, title, files) in sections {
        if files.is_empty() {
            continue;
        }
        println!("{} {} ({} files)", mark, title, files.len());
        for file in files {
            println!("  - {}", file.display());
        }
        println!();
    }

    if !failed.is_empty() {
        println!(
            "{} {} ({} files)",
            "✗".red(),
            "FAILED".red().bold(),
            failed.len()
        );
        for (file, reason) in &failed {
            println!("  - {} ({})", file.display(), reason.dimmed());
        }
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Serialize)]
struct ListItem<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    entries: usize,
    errata: &'a [Entry],
}

fn cmd_list(settings: &Settings, corpus: Option<PathBuf>, json: bool) -> Result<()> {
    let corpus_path = resolve_corpus(settings, corpus)?;
    let corpus = load_corpus(&corpus_path)?;

    let items: Vec<ListItem<'_>> = corpus
        .files
        .iter()
        .map(|(key, file)| ListItem {
            key,
            path: file.path.as_deref(),
            entries: file.entries.len(),
            errata: &file.entries,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!("{}", "Errata".bold());
    println!("Corpus: {}", corpus_path.display());
    println!();

    if items.is_empty() {
        println!("{}", "  No files in corpus".yellow());
        return Ok(());
    }

    for item in &items {
        let plural = if item.entries == 1 { "entry" } else { "entries" };
        match item.path {
            Some(path) => println!(
                "  {} ({} {}) {}",
                item.key.cyan(),
                item.entries,
                plural,
                path.dimmed()
            ),
            None => println!("  {} ({} {})", item.key.cyan(), item.entries, plural),
        }
    }
    println!();
    println!("{} entries in {} files", corpus.entry_count(), items.len());

    Ok(())
}

fn cmd_record(
    settings: &Settings,
    corpus: Option<PathBuf>,
    key: &str,
    line: usize,
    find: &str,
    replace: &str,
    comment: Option<String>,
) -> Result<()> {
    let corpus_path = resolve_corpus(settings, corpus)?;

    let mut recorder = ErrataRecorder::new();
    recorder.record(
        key,
        line,
        &unescape(find),
        &unescape(replace),
        comment.as_deref(),
    );
    recorder.flush_to_path(&corpus_path)?;

    println!(
        "{} Recorded {} line {} in {}",
        "✓".green(),
        key.cyan(),
        line,
        corpus_path.display()
    );
    Ok(())
}

fn cmd_learn(
    settings: &Settings,
    corpus: Option<PathBuf>,
    table: Option<PathBuf>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let corpus_path = resolve_corpus(settings, corpus)?;
    let table = resolve_table(settings, table)?;
    let corpus = load_corpus(&corpus_path)?;

    let learner = PatternLearner::new();
    if table.exists() {
        learner.load(&table)?;
    }

    let mut observed = 0;
    for file in collect_files(&files)? {
        let key = default_key(&file)?;
        let Some(errata) = corpus.get(&key) else {
            println!("{} {}: no errata for '{}'", "⊘".cyan(), file.display(), key);
            continue;
        };

        let text = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?
            .replace("\r\n", "\n");
        let seen: usize = errata
            .entries
            .iter()
            .map(|entry| learner.observe_all(&text, &unescape(entry.operation.find())))
            .sum();

        println!("{} {}: {} anchors observed", "✓".green(), file.display(), seen);
        observed += seen;
    }

    learner.flush(&table)?;
    println!();
    println!(
        "{} observations, {} patterns in {}",
        observed,
        learner.store().len(),
        table.display()
    );
    Ok(())
}

fn cmd_locate(
    settings: &Settings,
    table: Option<PathBuf>,
    anchor: &str,
    file: &Path,
) -> Result<()> {
    let table = resolve_table(settings, table)?;
    let corrector = PatternCorrector::from_path(&table)?;

    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?
        .replace("\r\n", "\n");

    let Some(best) = corrector.find_best_position(&text, &unescape(anchor)) else {
        eprintln!(
            "{}",
            format!("No learned context for '{}' matches {}", anchor, file.display()).yellow()
        );
        std::process::exit(1);
    };

    let before = &text[..best.offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    let column = before[line_start..].chars().count() + 1;

    println!(
        "{}:{}:{} (probability {:.2}, context {}, seen {} times)",
        file.display(),
        line,
        column,
        best.probability,
        best.context.cyan(),
        best.count
    );
    Ok(())
}
