use crate::operation::Operation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Every recorded correction, keyed by file identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub files: BTreeMap<String, FileErrata>,
}

/// Ordered corrections for one logical file.
///
/// Entries are applied in the order they appear here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileErrata {
    /// Location of the file on disk, when the corpus records one.
    pub path: Option<String>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub position: Position,
    pub operation: Operation,
}

/// Where an entry's operation is applied. Line numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Position {
    Single { line: usize, count: usize },
    Range { from: Option<usize>, to: Option<usize> },
}

impl Position {
    pub fn line(line: usize) -> Self {
        Position::Single { line, count: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Single { line, count: 1 } => write!(f, "line {line}"),
            Position::Single { line, count } => {
                write!(f, "lines {line}-{}", line + count.saturating_sub(1))
            }
            Position::Range { from, to } => {
                let from = from.map_or_else(|| "start".to_string(), |n| n.to_string());
                let to = to.map_or_else(|| "end".to_string(), |n| n.to_string());
                write!(f, "range {from}..={to}")
            }
        }
    }
}

impl Entry {
    pub fn new(position: Position, operation: Operation) -> Self {
        Self {
            comment: None,
            position,
            operation,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl Corpus {
    pub fn get(&self, key: &str) -> Option<&FileErrata> {
        self.files.get(key)
    }

    /// Append entries for `key`, creating the file record when absent.
    pub fn push(&mut self, key: impl Into<String>, entry: Entry) {
        self.files.entry(key.into()).or_default().entries.push(entry);
    }

    pub fn entry_count(&self) -> usize {
        self.files.values().map(|file| file.entries.len()).sum()
    }

    /// Known keys ordered by similarity to `key`, best first.
    pub fn keys_closest_to(&self, key: &str, limit: usize) -> Vec<&str> {
        let mut scored: Vec<(f64, &str)> = self
            .files
            .keys()
            .map(|known| (strsim::normalized_levenshtein(key, known), known.as_str()))
            .filter(|(score, _)| *score > 0.5)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().take(limit).map(|(_, k)| k).collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for (key, file) in &self.files {
            if key.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    file: None,
                    entry: None,
                    field: "name",
                });
            }

            for (idx, entry) in file.entries.iter().enumerate() {
                let at = Some(idx + 1);

                if entry.operation.find().is_empty() {
                    issues.push(ValidationIssue::MissingField {
                        file: Some(key.clone()),
                        entry: at,
                        field: "find",
                    });
                }

                match entry.position {
                    Position::Single { line, count } => {
                        if line == 0 {
                            issues.push(ValidationIssue::InvalidPosition {
                                file: key.clone(),
                                entry: idx + 1,
                                message: "line numbers start at 1".to_string(),
                            });
                        }
                        if count == 0 {
                            issues.push(ValidationIssue::InvalidPosition {
                                file: key.clone(),
                                entry: idx + 1,
                                message: "an entry must span at least one line".to_string(),
                            });
                        }
                    }
                    Position::Range { from, to } => {
                        if from == Some(0) || to == Some(0) {
                            issues.push(ValidationIssue::InvalidPosition {
                                file: key.clone(),
                                entry: idx + 1,
                                message: "line numbers start at 1".to_string(),
                            });
                        }
                        if let (Some(from), Some(to)) = (from, to) {
                            if from > to {
                                issues.push(ValidationIssue::InvalidPosition {
                                    file: key.clone(),
                                    entry: idx + 1,
                                    message: format!("range starts after it ends ({from} > {to})"),
                                });
                            }
                        }
                    }
                }
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        file: Option<String>,
        entry: Option<usize>,
        field: &'static str,
    },
    InvalidPosition {
        file: String,
        entry: usize,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { file, entry, field } => match (file, entry) {
                (Some(file), Some(entry)) => {
                    write!(f, "'{file}' entry #{entry} missing required field '{field}'")
                }
                (Some(file), None) => write!(f, "'{file}' missing required field '{field}'"),
                _ => write!(f, "file missing required field '{field}'"),
            },
            ValidationIssue::InvalidPosition {
                file,
                entry,
                message,
            } => write!(f, "'{file}' entry #{entry} has an invalid position: {message}"),
        }
    }
}
