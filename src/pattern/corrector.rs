use crate::pattern::abstraction::{create_pattern, encode_pattern, map_pattern};
use crate::pattern::learner::MAX_CONTEXT_LEN;
use crate::pattern::store::{PatternError, PatternStore};
use crate::pattern::PatternLearner;
use std::path::Path;
use tracing::debug;

/// Where an anchor most likely starts in a candidate text.
#[derive(Debug, Clone, PartialEq)]
pub struct BestPosition {
    /// Byte offset in the candidate just past the matched context
    pub offset: usize,
    /// The matched pre-context, encoded
    pub context: String,
    /// How often the context was seen before the anchor
    pub count: u64,
    /// `count` over every pre-context observation of the anchor
    pub probability: f64,
}

/// Relocates anchors in drifted text using learned contexts.
#[derive(Debug, Default)]
pub struct PatternCorrector {
    store: PatternStore,
}

impl PatternCorrector {
    pub fn new(store: PatternStore) -> Self {
        Self { store }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PatternError> {
        let learner = PatternLearner::new();
        learner.load(path)?;
        Ok(Self::new(learner.into_store()))
    }

    pub fn store(&self) -> &PatternStore {
        &self.store
    }

    /// Find the most frequently seen pre-context of `main` inside
    /// `candidate`.
    ///
    /// `main` may be given as raw anchor text or as its pattern. Every
    /// substring of up to [`MAX_CONTEXT_LEN`] pattern characters is scored by
    /// its count; ties go to the longer context, then the earlier one.
    pub fn find_best_position(&self, candidate: &str, main: &str) -> Option<BestPosition> {
        let main = create_pattern(main);
        let contexts = self.store.contexts(&main)?;
        let total = contexts.pre.total();
        if total == 0 {
            return None;
        }

        let map = map_pattern(candidate);
        let chars: Vec<(usize, char)> = map.pattern().char_indices().collect();
        let pattern = map.pattern();

        // (count, length, first char index)
        let mut best: Option<(u64, usize, usize)> = None;
        for first in 0..chars.len() {
            for len in 1..=MAX_CONTEXT_LEN.min(chars.len() - first) {
                let from = chars[first].0;
                let to = chars.get(first + len).map_or(pattern.len(), |(idx, _)| *idx);
                let count = contexts.pre.get(&pattern[from..to]);
                if count == 0 {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((best_count, best_len, _)) => (count, len) > (best_count, best_len),
                };
                if better {
                    best = Some((count, len, first));
                }
            }
        }

        let (count, len, first) = best?;
        let last = first + len - 1;
        let offset = map.span(last)?.end;
        let from = chars[first].0;
        let to = chars.get(last + 1).map_or(pattern.len(), |(idx, _)| *idx);
        let context = encode_pattern(&pattern[from..to]);
        let probability = count as f64 / total as f64;

        debug!(%context, offset, count, probability, "best anchor position");
        Some(BestPosition {
            offset,
            context,
            count,
            probability,
        })
    }
}
