//! Page-level retrieval over a shelf of PDF books.
//!
//! This crate provides:
//! - Multi-strategy PDF text extraction with readability gating
//! - Chapter tagging via an extensible heading-pattern table
//! - Deterministic page-level chunking
//! - A persisted chunk/vector pair with local sentence embeddings
//! - Cosine-similarity retrieval with a keyword-overlap fallback
//!
//! [`CorpusManager`] owns the build lifecycle and the loaded snapshot;
//! build once offline, query many times read-only.

pub mod chapter_tagger;
pub mod config;
pub mod corpus_manager;
pub mod document_chunker;
pub mod embedding;
pub mod embedding_index;
pub mod error;
pub mod pdf_extractor;
pub mod retrieval;

pub use chapter_tagger::{ChapterPatterns, TaggedPage, DEFAULT_CHAPTER_LABEL};
pub use config::RagConfig;
pub use corpus_manager::{CorpusManager, CorpusStats};
pub use document_chunker::Chunk;
pub use embedding::EmbeddingBackend;
pub use embedding_index::{CorpusSnapshot, EmbeddingIndex, EmbeddingMatrix};
pub use error::{RagError, Result};
pub use pdf_extractor::{PageRecord, PdfExtractor};
pub use retrieval::SearchResult;
