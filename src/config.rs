//! Corpus configuration.
//!
//! Every heuristic threshold of the build pipeline lives here. The values
//! were tuned against a shelf of scanned-and-reflowed investment books and
//! are not known to be optimal; deployments with different material are
//! expected to override them via a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RagConfig {
    /// Directory scanned for `*.pdf` documents.
    pub books_dir: PathBuf,
    /// Directory holding the persisted chunk/vector pair.
    pub cache_dir: PathBuf,
    /// Sentence-embedding model identifier. Changing this invalidates any
    /// stored vectors; they are rebuilt on the next load.
    pub embedding_model: String,
    /// When false, no embedding backend is initialized and retrieval runs
    /// on keyword overlap only.
    pub embedding_enabled: bool,
    /// Minimum fraction of readable tokens (among the first 20) for a page
    /// to be accepted. Strictly greater-than.
    pub readable_ratio: f32,
    /// Minimum cleaned page length in characters. Strictly greater-than.
    pub min_page_chars: usize,
    /// Pages shorter than this after cleaning produce no chunk.
    pub min_chunk_chars: usize,
    /// If the primary PDF backend yields fewer readable pages than this,
    /// the secondary backend is tried as well.
    pub fallback_page_threshold: usize,
    /// How many leading lines of a page are scanned for chapter headings.
    pub heading_scan_lines: usize,
    /// Additional heading patterns, tried after the built-in set.
    pub extra_chapter_patterns: Vec<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            books_dir: PathBuf::from("Books"),
            cache_dir: PathBuf::from("cache/rag"),
            embedding_model: "all-minilm-l6-v2".to_string(),
            embedding_enabled: true,
            readable_ratio: 0.3,
            min_page_chars: 50,
            min_chunk_chars: 100,
            fallback_page_threshold: 5,
            heading_scan_lines: 5,
            extra_chapter_patterns: Vec::new(),
        }
    }
}

impl RagConfig {
    /// Load a config from a TOML file. Missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert_eq!(config.books_dir, PathBuf::from("Books"));
        assert_eq!(config.min_chunk_chars, 100);
        assert!(config.embedding_enabled);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "books_dir = \"/srv/library\"\nreadable_ratio = 0.25\nembedding_enabled = false"
        )
        .unwrap();

        let config = RagConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.books_dir, PathBuf::from("/srv/library"));
        assert_eq!(config.readable_ratio, 0.25);
        assert!(!config.embedding_enabled);
        // untouched keys keep their defaults
        assert_eq!(config.min_page_chars, 50);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "boks_dir = \"typo\"").unwrap();
        assert!(RagConfig::from_toml_file(file.path()).is_err());
    }
}
