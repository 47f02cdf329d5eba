//! Crate-wide error taxonomy.
//!
//! Per-document extraction failures and embedding-backend unavailability are
//! handled locally with fallbacks and never surface here; this enum covers
//! the conditions that must reach the caller.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("books directory {0} does not exist")]
    MissingBooksDir(PathBuf),

    #[error("no readable chunks could be built from {books_dir}")]
    EmptyCorpus { books_dir: PathBuf },

    #[error("chunk sequence has {chunks} entries but embedding matrix has {rows} rows")]
    PairMismatch { chunks: usize, rows: usize },

    #[error("embedding backend error: {0}")]
    Embedding(String),

    #[error("invalid chapter pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
