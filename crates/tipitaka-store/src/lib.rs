//! Tipitaka Store — SQLite storage for the Chunk → SubChunk → Sentence corpus hierarchy.

pub mod audit;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use audit::{audit, AuditReport};
pub use sqlite::CorpusStore;
pub use types::*;
