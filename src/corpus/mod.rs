pub mod applicator;
pub mod loader;
pub mod recorder;
pub mod schema;
pub mod writer;

pub use applicator::{repair_file, try_repair, Repair, RepairError, RepairOptions, RepairResult};
pub use loader::{load_from_path, load_from_str, CorpusError, ParseError};
pub use recorder::ErrataRecorder;
pub use schema::{Corpus, Entry, FileErrata, Position, ValidationError, ValidationIssue};
pub use writer::{save_to_path, save_to_string};
