//! Errata applicator - replays a file's recorded corrections in order
//!
//! Entries run in authored order against the same line buffer, so each entry
//! sees the line numbers left behind by the entries before it. There is no
//! drift compensation: a corpus that grows or shrinks a file above a later
//! entry must address that entry by its post-mutation line number (or be
//! authored bottom-to-top).

use crate::corpus::schema::{Corpus, Position};
use crate::edit::{write_with_backup, EditError, LineBuffer};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of replaying a corpus against one text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "Repair carries the corrected text"]
pub struct Repair {
    /// `true` when `text` differs from the input
    pub changed: bool,
    pub text: String,
}

/// How [`repair_file`] persists a changed file.
#[derive(Debug, Clone, Default)]
pub struct RepairOptions {
    /// Compute the result without touching the file
    pub dry_run: bool,
    /// Keep the previous content at `<file><suffix>` before overwriting
    pub backup_suffix: Option<String>,
}

/// Result of repairing one file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
#[must_use = "RepairResult should be checked for changed/unchanged"]
pub enum RepairResult {
    /// The file was rewritten (or would be, in a dry run)
    Repaired {
        file: PathBuf,
        backup: Option<PathBuf>,
        #[serde(skip)]
        original: String,
        #[serde(skip)]
        repaired: String,
    },
    /// The corpus has entries for the file but none of them changed it
    Unchanged { file: PathBuf },
    /// The corpus has no entries under the file's key
    NotInCorpus { file: PathBuf, key: String },
}

impl fmt::Display for RepairResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairResult::Repaired { file, .. } => write!(f, "Repaired {}", file.display()),
            RepairResult::Unchanged { file } => write!(f, "Unchanged {}", file.display()),
            RepairResult::NotInCorpus { file, key } => {
                write!(f, "No errata for '{}' ({})", key, file.display())
            }
        }
    }
}

/// Errors while repairing a file on disk.
#[derive(Debug)]
pub enum RepairError {
    /// Reading the file failed
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// An entry addressed lines outside the file, or writing failed
    Edit { path: PathBuf, source: EditError },
}

impl fmt::Display for RepairError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            RepairError::Edit { path, source } => {
                write!(f, "cannot repair {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for RepairError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepairError::Io { source, .. } => Some(source),
            RepairError::Edit { source, .. } => Some(source),
        }
    }
}

/// Replay every entry recorded under `key` against `original`.
///
/// Line endings are normalized to `\n` first. An absent key leaves the text
/// untouched. Anchors that are not found are skipped silently; entries that
/// address lines outside the buffer fail the whole repair.
pub fn try_repair(corpus: &Corpus, key: &str, original: &str) -> Result<Repair, EditError> {
    let Some(file) = corpus.get(key) else {
        log_unknown_key(corpus, key);
        return Ok(Repair {
            changed: false,
            text: original.to_string(),
        });
    };

    let normalized = original.replace("\r\n", "\n");
    let mut buffer = LineBuffer::parse(&normalized);

    for (idx, entry) in file.entries.iter().enumerate() {
        let applied = match entry.position {
            Position::Single { line, count } => {
                entry.operation.execute_at(&mut buffer, line, count)?
            }
            Position::Range { from, to } => entry.operation.execute_for(&mut buffer, from, to)?,
        };
        debug!(
            key,
            entry = idx + 1,
            position = %entry.position,
            operation = entry.operation.kind(),
            applied,
            "errata entry"
        );
    }

    let text = buffer.render();
    Ok(Repair {
        changed: text != original,
        text,
    })
}

/// Read `path`, repair it with the entries recorded under `key`, and write
/// the result back when it changed.
pub fn repair_file(
    corpus: &Corpus,
    path: &Path,
    key: &str,
    options: &RepairOptions,
) -> Result<RepairResult, RepairError> {
    if corpus.get(key).is_none() {
        log_unknown_key(corpus, key);
        return Ok(RepairResult::NotInCorpus {
            file: path.to_path_buf(),
            key: key.to_string(),
        });
    }

    let original = fs::read_to_string(path).map_err(|source| RepairError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let repair = try_repair(corpus, key, &original).map_err(|source| RepairError::Edit {
        path: path.to_path_buf(),
        source,
    })?;

    if !repair.changed {
        debug!(file = %path.display(), "unchanged");
        return Ok(RepairResult::Unchanged {
            file: path.to_path_buf(),
        });
    }

    let backup = if options.dry_run {
        None
    } else {
        let backup = write_with_backup(
            path,
            repair.text.as_bytes(),
            options.backup_suffix.as_deref(),
        )
        .map_err(|source| RepairError::Edit {
            path: path.to_path_buf(),
            source,
        })?;
        info!(file = %path.display(), backup = ?backup, "repaired");
        backup
    };

    Ok(RepairResult::Repaired {
        file: path.to_path_buf(),
        backup,
        original,
        repaired: repair.text,
    })
}

fn log_unknown_key(corpus: &Corpus, key: &str) {
    let closest = corpus.keys_closest_to(key, 3);
    if closest.is_empty() {
        debug!(key, "no errata recorded");
    } else {
        warn!(key, ?closest, "no errata recorded; similar keys exist");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::schema::Entry;
    use crate::operation::Operation;

    fn corpus_with(key: &str, entries: Vec<Entry>) -> Corpus {
        let mut corpus = Corpus::default();
        for entry in entries {
            corpus.push(key, entry);
        }
        corpus
    }

    fn replace(line: usize, find: &str, replace: &str) -> Entry {
        Entry::new(
            Position::line(line),
            Operation::Replace {
                find: find.to_string(),
                replace: replace.to_string(),
            },
        )
    }

    #[test]
    fn test_try_repair_grows_file() {
        let corpus = corpus_with("a.txt", vec![replace(2, "line2", "LINE2\\nEXTRA")]);
        let repair = try_repair(&corpus, "a.txt", "line1\nline2\nline3\n").unwrap();

        assert!(repair.changed);
        assert_eq!(repair.text, "line1\nLINE2\nEXTRA\nline3\n");
    }

    #[test]
    fn test_try_repair_missing_anchor_unchanged() {
        let corpus = corpus_with("a.txt", vec![replace(2, "line9", "x")]);
        let repair = try_repair(&corpus, "a.txt", "line1\nline2\nline3\n").unwrap();

        assert!(!repair.changed);
        assert_eq!(repair.text, "line1\nline2\nline3\n");
    }

    #[test]
    fn test_try_repair_unknown_key() {
        let corpus = corpus_with("a.txt", vec![replace(1, "x", "y")]);
        let repair = try_repair(&corpus, "b.txt", "x\n").unwrap();

        assert!(!repair.changed);
        assert_eq!(repair.text, "x\n");
    }

    #[test]
    fn test_try_repair_normalizes_crlf() {
        let corpus = corpus_with("a.txt", vec![replace(2, "teh", "the")]);
        let repair = try_repair(&corpus, "a.txt", "one\r\nteh end\r\n").unwrap();
        assert!(repair.changed);
        assert_eq!(repair.text, "one\nthe end\n");

        // Normalization alone counts as a change
        let untouched = try_repair(&corpus, "a.txt", "one\r\ntwo\r\n").unwrap();
        assert!(untouched.changed);
        assert_eq!(untouched.text, "one\ntwo\n");
    }

    #[test]
    fn test_try_repair_bounds_error() {
        let corpus = corpus_with("a.txt", vec![replace(9, "x", "y")]);
        let result = try_repair(&corpus, "a.txt", "x\n");
        assert!(matches!(result, Err(EditError::LineOutOfBounds { .. })));
    }

    #[test]
    fn test_entries_apply_in_authored_order() {
        let corpus = corpus_with(
            "a.txt",
            vec![replace(1, "a", "b"), replace(1, "b", "c")],
        );
        let repair = try_repair(&corpus, "a.txt", "a\n").unwrap();
        assert_eq!(repair.text, "c\n");

        let reversed = corpus_with(
            "a.txt",
            vec![replace(1, "b", "c"), replace(1, "a", "b")],
        );
        let repair = try_repair(&reversed, "a.txt", "a\n").unwrap();
        assert_eq!(repair.text, "b\n");
    }

    #[test]
    fn test_repair_file_writes_backup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "line1\nteh\n").unwrap();
        let corpus = corpus_with("a.txt", vec![replace(2, "teh", "the")]);

        let options = RepairOptions {
            dry_run: false,
            backup_suffix: Some(".bak".to_string()),
        };
        let result = repair_file(&corpus, &path, "a.txt", &options).unwrap();

        assert!(matches!(result, RepairResult::Repaired { backup: Some(_), .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "line1\nthe\n");
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("a.txt.bak")).unwrap(),
            "line1\nteh\n"
        );

        let again = repair_file(&corpus, &path, "a.txt", &options).unwrap();
        assert!(matches!(again, RepairResult::Unchanged { .. }));
    }

    #[test]
    fn test_repair_file_dry_run_leaves_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "teh\n").unwrap();
        let corpus = corpus_with("a.txt", vec![replace(1, "teh", "the")]);

        let options = RepairOptions {
            dry_run: true,
            backup_suffix: Some(".bak".to_string()),
        };
        let result = repair_file(&corpus, &path, "a.txt", &options).unwrap();

        match result {
            RepairResult::Repaired {
                backup, repaired, ..
            } => {
                assert!(backup.is_none());
                assert_eq!(repaired, "the\n");
            }
            other => panic!("expected Repaired, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "teh\n");
        assert!(!temp_dir.path().join("a.txt.bak").exists());
    }

    #[test]
    fn test_repair_file_not_in_corpus() {
        let corpus = Corpus::default();
        let result = repair_file(
            &corpus,
            Path::new("/nonexistent/a.txt"),
            "a.txt",
            &RepairOptions::default(),
        )
        .unwrap();
        assert!(matches!(result, RepairResult::NotInCorpus { .. }));
    }

    #[test]
    fn test_repair_result_display() {
        let unchanged = RepairResult::Unchanged {
            file: PathBuf::from("/tmp/a.txt"),
        };
        assert!(unchanged.to_string().contains("Unchanged"));

        let missing = RepairResult::NotInCorpus {
            file: PathBuf::from("/tmp/a.txt"),
            key: "a.txt".to_string(),
        };
        assert!(missing.to_string().contains("No errata for 'a.txt'"));
    }
}
