//! Frequency tables of the contexts seen around each main pattern.
//!
//! The store is shared between observing threads. Each main pattern owns two
//! concurrent counter maps (contexts seen before it and after it), so
//! observations of unrelated patterns never contend.
//!
//! Persisted form, one record per line:
//!
//! ```text
//! <context>[<main>]\t<count>     context seen before <main>
//! [<main>]<context>\t<count>     context seen after <main>
//! ```
//!
//! Both patterns are written with [`encode_pattern`]. Records are grouped by
//! main pattern, pre-contexts first, each side ordered by descending count.

use crate::edit::EditError;
use crate::pattern::abstraction::{decode_pattern, encode_pattern};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("dangling escape at end of pattern")]
    DanglingEscape,

    #[error("unknown escape {sequence} at position {position}")]
    UnknownEscape { sequence: String, position: usize },

    #[error("unescaped bracket at position {position}")]
    UnescapedBracket { position: usize },

    #[error("line {line}: {message}")]
    Record { line: usize, message: String },

    #[error("byte span {start}..{end} does not fit a text of {len} bytes")]
    InvalidSpan { start: usize, end: usize, len: usize },

    #[error("failed to read pattern table {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write pattern table {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },
}

/// Which side of the main pattern a context was seen on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Pre,
    Post,
}

/// Context → occurrence count, ordered by context for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: BTreeMap<String, u64>,
}

impl FrequencyTable {
    pub fn get(&self, context: &str) -> u64 {
        self.counts.get(context).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries by descending count, then by context.
    pub fn by_count(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self
            .counts
            .iter()
            .map(|(context, count)| (context.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Snapshot of everything seen around one main pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternContexts {
    pub pre: FrequencyTable,
    pub post: FrequencyTable,
}

#[derive(Debug, Default)]
struct ContextCounters {
    pre: DashMap<String, AtomicU64>,
    post: DashMap<String, AtomicU64>,
}

impl ContextCounters {
    fn side(&self, side: Side) -> &DashMap<String, AtomicU64> {
        match side {
            Side::Pre => &self.pre,
            Side::Post => &self.post,
        }
    }

    fn snapshot(&self) -> PatternContexts {
        PatternContexts {
            pre: freeze(&self.pre),
            post: freeze(&self.post),
        }
    }
}

fn freeze(counters: &DashMap<String, AtomicU64>) -> FrequencyTable {
    FrequencyTable {
        counts: counters
            .iter()
            .map(|r| (r.key().clone(), r.value().load(Ordering::Relaxed)))
            .collect(),
    }
}

fn bump(counters: &DashMap<String, AtomicU64>, context: &str, by: u64) {
    if let Some(counter) = counters.get(context) {
        counter.fetch_add(by, Ordering::Relaxed);
        return;
    }
    counters
        .entry(context.to_string())
        .or_insert_with(|| AtomicU64::new(0))
        .fetch_add(by, Ordering::Relaxed);
}

/// Thread-safe main pattern → context frequency store.
#[derive(Debug, Default)]
pub struct PatternStore {
    mains: DashMap<String, ContextCounters>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observation of `pre` before and `post` after `main`.
    ///
    /// An empty `main` is ignored, as is an empty context on either side.
    pub fn add(&self, pre: &str, main: &str, post: &str) {
        self.add_count(Side::Pre, main, pre, 1);
        self.add_count(Side::Post, main, post, 1);
    }

    /// Add `count` observations of `context` on one side of `main`.
    pub fn add_count(&self, side: Side, main: &str, context: &str, count: u64) {
        if main.is_empty() || context.is_empty() || count == 0 {
            return;
        }
        if let Some(counters) = self.mains.get(main) {
            bump(counters.side(side), context, count);
            return;
        }
        let counters = self.mains.entry(main.to_string()).or_default();
        bump(counters.side(side), context, count);
    }

    /// Number of distinct main patterns.
    pub fn len(&self) -> usize {
        self.mains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mains.is_empty()
    }

    pub fn contexts(&self, main: &str) -> Option<PatternContexts> {
        self.mains.get(main).map(|counters| counters.snapshot())
    }

    /// Consistent copy of the whole store, ordered by main pattern.
    pub fn snapshot(&self) -> BTreeMap<String, PatternContexts> {
        self.mains
            .iter()
            .map(|r| (r.key().clone(), r.value().snapshot()))
            .collect()
    }

    pub fn clear(&self) {
        self.mains.clear();
    }

    /// Render the store in its persisted form.
    pub fn to_table(&self) -> String {
        let mut table = String::new();
        for (main, contexts) in self.snapshot() {
            let main = encode_pattern(&main);
            for (context, count) in contexts.pre.by_count() {
                table.push_str(&format!("{}[{}]\t{}\n", encode_pattern(context), main, count));
            }
            for (context, count) in contexts.post.by_count() {
                table.push_str(&format!("[{}]{}\t{}\n", main, encode_pattern(context), count));
            }
        }
        table
    }

    /// Replace the store's content with the records in `table`.
    ///
    /// Nothing is replaced when any record is malformed.
    pub fn load_table(&self, table: &str) -> Result<usize, PatternError> {
        let mut records = Vec::new();
        for (idx, raw) in table.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            records.push(parse_record(line).map_err(|message| PatternError::Record {
                line: idx + 1,
                message,
            })?);
        }

        self.clear();
        for record in &records {
            self.add_count(record.side, &record.main, &record.context, record.count);
        }
        Ok(records.len())
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Record {
    side: Side,
    main: String,
    context: String,
    count: u64,
}

fn parse_record(line: &str) -> Result<Record, String> {
    let (body, count) = line
        .rsplit_once('\t')
        .ok_or_else(|| "missing tab before count".to_string())?;
    let count: u64 = count
        .trim()
        .parse()
        .map_err(|_| format!("invalid count '{}'", count.trim()))?;
    if count == 0 {
        return Err("count must be positive".to_string());
    }

    let (open, close) = brackets(body)?;
    let main = &body[open + 1..close];
    let (side, context) = if open == 0 {
        (Side::Post, &body[close + 1..])
    } else if close + 1 == body.len() {
        (Side::Pre, &body[..open])
    } else {
        return Err("main pattern must open or close the record".to_string());
    };

    if main.is_empty() || context.is_empty() {
        return Err("record needs both a main pattern and a context".to_string());
    }

    let decode = |encoded: &str| decode_pattern(encoded).map_err(|e| e.to_string());
    Ok(Record {
        side,
        main: decode(main)?,
        context: decode(context)?,
        count,
    })
}

/// Byte offsets of the single unescaped `[` and `]` in `body`.
fn brackets(body: &str) -> Result<(usize, usize), String> {
    let mut open = None;
    let mut close = None;
    let mut escaped = false;

    for (offset, c) in body.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if open.is_none() => open = Some(offset),
            ']' if open.is_some() && close.is_none() => close = Some(offset),
            '[' | ']' => return Err(format!("unexpected '{c}' at byte {offset}")),
            _ => {}
        }
    }

    match (open, close) {
        (Some(open), Some(close)) => Ok((open, close)),
        _ => Err("missing [main] pattern".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::abstraction::{create_pattern, MARKER};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_add_counts_both_sides() {
        let store = PatternStore::new();
        store.add("a", "M", "b");
        store.add("a", "M", "c");
        store.add("", "M", "c");

        let contexts = store.contexts("M").unwrap();
        assert_eq!(contexts.pre.get("a"), 2);
        assert_eq!(contexts.pre.total(), 2);
        assert_eq!(contexts.post.get("b"), 1);
        assert_eq!(contexts.post.get("c"), 2);
        assert_eq!(contexts.pre.get(""), 0);
    }

    #[test]
    fn test_empty_main_ignored() {
        let store = PatternStore::new();
        store.add("a", "", "b");
        assert!(store.is_empty());
        assert!(store.contexts("").is_none());
    }

    #[test]
    fn test_by_count_orders_descending() {
        let store = PatternStore::new();
        for context in ["x", "y", "y", "z", "z"] {
            store.add(context, "M", "");
        }
        let contexts = store.contexts("M").unwrap();
        assert_eq!(contexts.pre.by_count(), vec![("y", 2), ("z", 2), ("x", 1)]);
    }

    #[test]
    fn test_table_layout() {
        let main = create_pattern("Fig");
        let store = PatternStore::new();
        store.add(&create_pattern("see "), &main, &create_pattern(" 3"));
        store.add(&create_pattern("see "), &main, &create_pattern("."));
        store.add(&create_pattern("("), &main, &create_pattern("."));

        assert_eq!(
            store.to_table(),
            "*\\s[*]\t2\n([*]\t1\n[*].\t2\n[*]\\s*\t1\n"
        );
    }

    #[test]
    fn test_table_round_trip() {
        let store = PatternStore::new();
        store.add(&create_pattern("a [b] "), &create_pattern("x*y"), "#");
        store.add("\t", &create_pattern("2.1"), &create_pattern(", z"));

        let reloaded = PatternStore::new();
        assert_eq!(reloaded.load_table(&store.to_table()).unwrap(), 4);
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[test]
    fn test_load_skips_comments_and_replaces_content() {
        let store = PatternStore::new();
        store.add("old", "M", "old");

        let table = "# learned contexts\n\n*.[*]\t3\n";
        assert_eq!(store.load_table(table).unwrap(), 1);
        assert_eq!(store.len(), 1);

        let marker = MARKER.to_string();
        let contexts = store.contexts(&marker).unwrap();
        assert_eq!(contexts.pre.get(&format!("{MARKER}.")), 3);
    }

    #[test]
    fn test_load_reports_line_of_bad_record() {
        let store = PatternStore::new();
        store.add("keep", "M", "keep");

        let table = "*[*]\t1\n*[*]*\t1\n";
        let err = store.load_table(table).unwrap_err();
        assert!(matches!(err, PatternError::Record { line: 2, .. }));
        // Failed loads leave the store untouched
        assert_eq!(store.contexts("M").unwrap().pre.get("keep"), 1);

        for bad in ["*[*]", "*[*]\tmany", "*[*]\t0", "[*]\t1", "*\t1", "*[*][*]\t1"] {
            assert!(store.load_table(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_concurrent_adds() {
        let store = Arc::new(PatternStore::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        store.add("pre", "M", "post");
                        store.add("pre", &format!("M{}", worker % 2), "post");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.contexts("M").unwrap().pre.get("pre"), 4000);
        assert_eq!(store.contexts("M0").unwrap().post.get("post"), 2000);
        assert_eq!(store.len(), 3);
    }
}
