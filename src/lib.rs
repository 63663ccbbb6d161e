//! Errata: replay recorded text corrections against line-oriented files
//!
//! A corpus records, per file, an ordered list of literal corrections
//! (replace, move, insert, remove) addressed by line number or line range.
//! Replaying the corpus against a file yields the corrected text and whether
//! anything changed.
//!
//! # Architecture
//!
//! - [`edit`]: the mutable [`LineBuffer`] every operation works on, plus
//!   backup-then-atomic-write persistence
//! - [`operation`]: the [`Operation`] sum type and its execution
//! - [`corpus`]: the data model, its XML form, and the apply routine
//! - [`pattern`]: structural fingerprints of text and a learned table of the
//!   contexts anchors occur in, used to relocate anchors in drifted text
//! - [`settings`]: optional `errata.toml`
//!
//! # Example
//!
//! ```
//! use errata::corpus::{load_from_str, try_repair};
//!
//! let corpus = load_from_str(
//!     r#"<errata>
//!          <file name="notes.txt">
//!            <line number="2"><find>line2</find><replace>LINE2\nEXTRA</replace></line>
//!          </file>
//!        </errata>"#,
//! )?;
//!
//! let repair = try_repair(&corpus, "notes.txt", "line1\nline2\nline3\n")?;
//! assert!(repair.changed);
//! assert_eq!(repair.text, "line1\nLINE2\nEXTRA\nline3\n");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod corpus;
pub mod edit;
pub mod operation;
pub mod pattern;
pub mod settings;

// Re-exports
pub use corpus::{
    load_from_path, load_from_str, repair_file, save_to_path, save_to_string, try_repair, Corpus,
    CorpusError, Entry, ErrataRecorder, FileErrata, Position, Repair, RepairError, RepairOptions,
    RepairResult,
};
pub use edit::{EditError, LineBuffer};
pub use operation::Operation;
pub use pattern::{
    create_pattern, encode_pattern, BestPosition, PatternCorrector, PatternError, PatternLearner,
    PatternStore,
};
pub use settings::{Settings, SettingsError};
