use crate::edit::atomic_write;
use crate::pattern::abstraction::{create_pattern, head_chars, tail_chars};
use crate::pattern::store::{PatternError, PatternStore};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Longest context, in pattern characters, kept on either side of an anchor.
pub const MAX_CONTEXT_LEN: usize = 5;

/// Accumulates the contexts anchors are found in.
///
/// Observation takes `&self`, so one learner can be shared between threads.
#[derive(Debug, Default)]
pub struct PatternLearner {
    store: PatternStore,
}

impl PatternLearner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    pub fn into_store(self) -> PatternStore {
        self.store
    }

    /// Record one (pre, main, post) observation. All three are patterns.
    pub fn notify(&self, pre: &str, main: &str, post: &str) {
        self.store.add(pre, main, post);
    }

    /// Observe the anchor occupying bytes `start..end` of `text`.
    ///
    /// Contexts come from the same line as the anchor: the pattern of the
    /// text before it on its first line and after it on its last line.
    pub fn observe(&self, text: &str, start: usize, end: usize) -> Result<(), PatternError> {
        if start > end
            || end > text.len()
            || !text.is_char_boundary(start)
            || !text.is_char_boundary(end)
        {
            return Err(PatternError::InvalidSpan {
                start,
                end,
                len: text.len(),
            });
        }

        let line_start = text[..start].rfind('\n').map_or(0, |idx| idx + 1);
        let line_end = text[end..].find('\n').map_or(text.len(), |idx| end + idx);

        let main = create_pattern(&text[start..end]);
        let pre = create_pattern(&text[line_start..start]);
        let post = create_pattern(&text[end..line_end]);

        self.notify(
            tail_chars(&pre, MAX_CONTEXT_LEN),
            &main,
            head_chars(&post, MAX_CONTEXT_LEN),
        );
        Ok(())
    }

    /// Observe every occurrence of `anchor` in `text`. Returns how many were
    /// found.
    pub fn observe_all(&self, text: &str, anchor: &str) -> usize {
        if anchor.is_empty() {
            return 0;
        }
        let mut seen = 0;
        for (start, found) in text.match_indices(anchor) {
            // match_indices yields char-aligned, in-bounds spans
            if self.observe(text, start, start + found.len()).is_ok() {
                seen += 1;
            }
        }
        debug!(anchor, seen, "observed anchor");
        seen
    }

    /// Persist the learned table at `path`, atomically.
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<(), PatternError> {
        let path = path.as_ref();
        let table = self.store.to_table();
        atomic_write(path, table.as_bytes()).map_err(|source| PatternError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), patterns = self.store.len(), "pattern table written");
        Ok(())
    }

    /// Replace what has been learned with the table stored at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<usize, PatternError> {
        let path = path.as_ref();
        let table = fs::read_to_string(path).map_err(|source| PatternError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records = self.store.load_table(&table)?;
        debug!(path = %path.display(), records, "pattern table loaded");
        Ok(records)
    }

    pub fn clear(&self) {
        self.store.clear();
    }
}
