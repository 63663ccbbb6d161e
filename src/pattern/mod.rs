pub mod abstraction;
pub mod corrector;
pub mod learner;
pub mod store;

pub use abstraction::{
    create_pattern, decode_pattern, encode_pattern, map_pattern, PatternMap, MARKER,
};
pub use corrector::{BestPosition, PatternCorrector};
pub use learner::{PatternLearner, MAX_CONTEXT_LEN};
pub use store::{FrequencyTable, PatternContexts, PatternError, PatternStore, Side};
