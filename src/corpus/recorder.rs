//! Collects corrections as they are authored and flushes them into a corpus.

use crate::corpus::loader::{load_from_path, CorpusError};
use crate::corpus::schema::{Corpus, Entry, Position};
use crate::corpus::writer::save_to_path;
use crate::operation::{escape, Operation};
use std::path::Path;
use tracing::info;

#[derive(Debug, Default)]
pub struct ErrataRecorder {
    pending: Vec<(String, Entry)>,
}

impl ErrataRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a replacement of `found` (starting at 1-based `line`) by
    /// `replacement`. Real newlines are stored escaped, and the entry spans
    /// as many lines as `found` does.
    pub fn record(
        &mut self,
        key: impl Into<String>,
        line: usize,
        found: &str,
        replacement: &str,
        comment: Option<&str>,
    ) {
        let count = 1 + found.strip_suffix('\n').unwrap_or(found).matches('\n').count();
        let entry = Entry {
            comment: comment.map(str::to_owned),
            position: Position::Single { line, count },
            operation: Operation::Replace {
                find: escape(found).into_owned(),
                replace: escape(replacement).into_owned(),
            },
        };
        self.pending.push((key.into(), entry));
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Append every pending entry to `corpus`, in recording order.
    pub fn flush_into(&mut self, corpus: &mut Corpus) -> usize {
        let flushed = self.pending.len();
        for (key, entry) in self.pending.drain(..) {
            corpus.push(key, entry);
        }
        flushed
    }

    /// Append pending entries to the corpus stored at `path` (created when
    /// missing) and save it. Nothing is written when nothing is pending.
    pub fn flush_to_path(&mut self, path: impl AsRef<Path>) -> Result<usize, CorpusError> {
        let path = path.as_ref();
        if self.pending.is_empty() {
            return Ok(0);
        }

        let mut corpus = if path.exists() {
            load_from_path(path)?
        } else {
            Corpus::default()
        };
        // A bad recording must never reach disk
        let mut staged = Corpus::default();
        for (key, entry) in &self.pending {
            staged.push(key.clone(), entry.clone());
        }
        staged
            .validate()
            .map_err(|source| CorpusError::Validation {
                path: Some(path.to_path_buf()),
                source,
            })?;

        let flushed = self.flush_into(&mut corpus);
        save_to_path(&corpus, path)?;
        info!(path = %path.display(), flushed, "errata recorded");
        Ok(flushed)
    }
}
