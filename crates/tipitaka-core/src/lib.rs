//! Tipitaka Core — error taxonomy, configuration and data paths.

pub mod config;
pub mod error;

pub use config::{CorpusConfig, DataPaths, OrderPolicy};
pub use error::{Error, Result};
