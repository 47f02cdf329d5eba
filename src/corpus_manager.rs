//! Corpus lifecycle orchestration.
//!
//! One explicitly owned `CorpusManager` instance runs the build pipeline
//! (extract, tag, chunk, embed, persist) at most once per corpus version
//! and holds the loaded snapshot for the rest of the process lifetime.
//! It is the only component that decides when to rebuild; retrieval reads
//! the snapshot and never mutates it.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::Serialize;

use crate::chapter_tagger::{tag_chapters, ChapterPatterns};
use crate::config::RagConfig;
use crate::document_chunker::{build_chunks, Chunk};
use crate::embedding::EmbeddingBackend;
use crate::embedding_index::{EmbeddingIndex, EmbeddingMatrix};
use crate::error::{RagError, Result};
use crate::pdf_extractor::PdfExtractor;
use crate::retrieval::{self, SearchResult};

/// Build-time summary of the loaded corpus.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub books: usize,
    pub chunks: usize,
    pub total_words: usize,
    pub mean_words_per_chunk: f64,
    pub embedded_rows: usize,
    pub embedding_dim: Option<usize>,
}

pub struct CorpusManager {
    config: RagConfig,
    patterns: ChapterPatterns,
    index: EmbeddingIndex,
    backend: Option<EmbeddingBackend>,
    chunks: Vec<Chunk>,
    vectors: Option<EmbeddingMatrix>,
    ready: bool,
}

impl CorpusManager {
    /// Construct a manager. An embedding backend that fails to initialize
    /// degrades the corpus to keyword retrieval instead of failing here.
    pub fn new(config: RagConfig) -> Result<Self> {
        let patterns = ChapterPatterns::with_extra(&config.extra_chapter_patterns)?;

        let backend = if config.embedding_enabled {
            match EmbeddingBackend::init(&config.embedding_model) {
                Ok(backend) => {
                    info!("initialized embedding backend ({})", backend.model_id());
                    Some(backend)
                }
                Err(e) => {
                    warn!("embedding backend unavailable ({}), keyword search only", e);
                    None
                }
            }
        } else {
            None
        };

        let index = EmbeddingIndex::new(config.cache_dir.clone());

        Ok(Self {
            config,
            patterns,
            index,
            backend,
            chunks: Vec::new(),
            vectors: None,
            ready: false,
        })
    }

    /// Load or build the corpus. Idempotent; subsequent calls return
    /// immediately. When stored chunks exist but vectors do not, only the
    /// vectors are recomputed and the pair is re-persisted together.
    pub fn ensure_ready(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let expected_model = self.backend.as_ref().map(|b| b.model_id().to_string());

        if let Some(snapshot) = self.index.load(expected_model.as_deref())? {
            self.chunks = snapshot.chunks;
            self.vectors = snapshot.vectors;

            if self.vectors.is_none() {
                if let Some(backend) = self.backend.as_ref() {
                    info!("computing missing embeddings for existing chunks");
                    match self.index.build(backend, &self.chunks) {
                        Ok(matrix) => {
                            self.index
                                .persist(&self.chunks, Some(&matrix), Some(backend.model_id()))?;
                            self.vectors = Some(matrix);
                        }
                        Err(e) => {
                            warn!("embedding rebuild failed ({}), keyword search only", e);
                        }
                    }
                }
            }
        } else {
            info!("creating new corpus from {}", self.config.books_dir.display());
            let chunks = self.build_corpus()?;

            let vectors = match self.backend.as_ref() {
                Some(backend) => match self.index.build(backend, &chunks) {
                    Ok(matrix) => Some(matrix),
                    Err(e) => {
                        warn!("embedding computation failed ({}), keyword search only", e);
                        None
                    }
                },
                None => {
                    warn!("cannot compute embeddings, backend unavailable");
                    None
                }
            };

            self.index
                .persist(&chunks, vectors.as_ref(), expected_model.as_deref())?;
            self.chunks = chunks;
            self.vectors = vectors;
        }

        self.ready = true;
        Ok(())
    }

    /// Load the persisted pair without ever triggering a build. Returns
    /// false when no corpus has been persisted yet. Missing vectors are
    /// left missing; this path is strictly read-only.
    pub fn try_load(&mut self) -> Result<bool> {
        if self.ready {
            return Ok(true);
        }
        let expected_model = self.backend.as_ref().map(|b| b.model_id().to_string());
        match self.index.load(expected_model.as_deref())? {
            Some(snapshot) => {
                self.chunks = snapshot.chunks;
                self.vectors = snapshot.vectors;
                self.ready = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Discard the persisted pair and rebuild from the books directory.
    pub fn rebuild(&mut self) -> Result<()> {
        self.index.clear()?;
        self.chunks.clear();
        self.vectors = None;
        self.ready = false;
        self.ensure_ready()
    }

    /// Search the corpus. The semantic path is used when both the backend
    /// and the matrix are present; any failure there falls back to keyword
    /// overlap. Never raises: an empty query or corpus yields an empty list.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        if self.chunks.is_empty() || query.trim().is_empty() {
            return Vec::new();
        }

        if let (Some(backend), Some(matrix)) = (self.backend.as_ref(), self.vectors.as_ref()) {
            match retrieval::semantic_search(backend, matrix, &self.chunks, query, top_k) {
                Ok(results) => return results,
                Err(e) => {
                    warn!("semantic search failed ({}), falling back to keyword overlap", e);
                }
            }
        }

        retrieval::keyword_search(&self.chunks, query, top_k)
    }

    /// Retrieve reference material for an externally synthesized theme
    /// string; same algorithm as `search`, different entry point for the
    /// analysis layer.
    pub fn retrieve_by_theme(&self, themes: &str, top_k: usize) -> Vec<SearchResult> {
        let results = self.search(themes, top_k);
        let preview: String = themes.chars().take(50).collect();
        info!("retrieved {} chunks for themes: {}...", results.len(), preview);
        results
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn stats(&self) -> CorpusStats {
        let books: HashSet<&str> = self.chunks.iter().map(|c| c.book_name.as_str()).collect();
        let total_words: usize = self.chunks.iter().map(|c| c.word_count).sum();
        let mean = if self.chunks.is_empty() {
            0.0
        } else {
            total_words as f64 / self.chunks.len() as f64
        };
        CorpusStats {
            books: books.len(),
            chunks: self.chunks.len(),
            total_words,
            mean_words_per_chunk: mean,
            embedded_rows: self.vectors.as_ref().map(|m| m.rows()).unwrap_or(0),
            embedding_dim: self.vectors.as_ref().map(|m| m.dim()),
        }
    }

    /// Run extract, tag, and chunk over every PDF in the books directory.
    /// Unprocessable documents are skipped; an entirely empty result is the
    /// one terminal build error.
    fn build_corpus(&self) -> Result<Vec<Chunk>> {
        let paths = self.collect_pdf_paths()?;
        info!(
            "found {} PDF files in {}",
            paths.len(),
            self.config.books_dir.display()
        );

        let extractor = PdfExtractor::from_config(&self.config);
        let mut all_chunks = Vec::new();

        for path in &paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            info!("processing {}...", name);

            let Some(pages) = extractor.extract_document(path) else {
                continue;
            };
            let tagged = tag_chapters(pages, &self.patterns, self.config.heading_scan_lines);
            let chunks = build_chunks(tagged, self.config.min_chunk_chars);
            info!("created {} chunks from {}", chunks.len(), name);
            all_chunks.extend(chunks);
        }

        if all_chunks.is_empty() {
            return Err(RagError::EmptyCorpus {
                books_dir: self.config.books_dir.clone(),
            });
        }
        Ok(all_chunks)
    }

    /// PDFs in lexicographic filename order, so chunk order (and with it
    /// the embedding row order) is deterministic across platforms.
    fn collect_pdf_paths(&self) -> Result<Vec<PathBuf>> {
        let books_dir = &self.config.books_dir;
        if !books_dir.exists() {
            return Err(RagError::MissingBooksDir(books_dir.clone()));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(books_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                        .unwrap_or(false)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_chunker::chunk_id;
    use crate::embedding_index::EmbeddingIndex;

    fn test_config(dir: &std::path::Path) -> RagConfig {
        RagConfig {
            books_dir: dir.join("books"),
            cache_dir: dir.join("cache"),
            embedding_enabled: false,
            ..RagConfig::default()
        }
    }

    fn seed_chunk(book: &str, page: u32, text: &str) -> Chunk {
        Chunk {
            id: chunk_id(book, page),
            text: text.to_string(),
            book_name: book.to_string(),
            chapter: "Introduction".to_string(),
            page_number: page,
            file_path: format!("{book}.pdf"),
            word_count: text.split_whitespace().count(),
        }
    }

    #[test]
    fn test_missing_books_dir_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = CorpusManager::new(test_config(dir.path())).unwrap();
        assert!(matches!(
            manager.ensure_ready(),
            Err(RagError::MissingBooksDir(_))
        ));
    }

    #[test]
    fn test_empty_books_dir_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("books")).unwrap();
        let mut manager = CorpusManager::new(test_config(dir.path())).unwrap();
        assert!(matches!(
            manager.ensure_ready(),
            Err(RagError::EmptyCorpus { .. })
        ));
    }

    #[test]
    fn test_ensure_ready_loads_persisted_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let chunks = vec![
            seed_chunk("habits", 1, "small daily improvements compound over long periods"),
            seed_chunk("habits", 2, "systems matter more than goals for lasting change"),
        ];
        EmbeddingIndex::new(config.cache_dir.clone())
            .persist(&chunks, None, None)
            .unwrap();

        let mut manager = CorpusManager::new(config).unwrap();
        manager.ensure_ready().unwrap();
        assert!(manager.is_ready());
        assert_eq!(manager.chunks().len(), 2);

        // idempotent second call
        manager.ensure_ready().unwrap();
        assert_eq!(manager.chunks().len(), 2);
    }

    #[test]
    fn test_search_falls_back_to_keyword_without_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        let chunks = vec![
            seed_chunk("habits", 1, "small daily improvements compound over long periods"),
            seed_chunk("habits", 2, "completely different subject matter entirely"),
        ];
        EmbeddingIndex::new(config.cache_dir.clone())
            .persist(&chunks, None, None)
            .unwrap();

        let mut manager = CorpusManager::new(config).unwrap();
        manager.ensure_ready().unwrap();

        let results = manager.search("daily improvements", 5);
        assert_eq!(results[0].chunk.page_number, 1);
        assert!(results[0].relevance_score > 0.0);
    }

    #[test]
    fn test_search_empty_query_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        EmbeddingIndex::new(config.cache_dir.clone())
            .persist(&[seed_chunk("habits", 1, "some text")], None, None)
            .unwrap();

        let mut manager = CorpusManager::new(config).unwrap();
        manager.ensure_ready().unwrap();
        assert!(manager.search("", 5).is_empty());
        assert!(manager.search("   ", 5).is_empty());
    }

    #[test]
    fn test_search_before_ready_returns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CorpusManager::new(test_config(dir.path())).unwrap();
        assert!(manager.search("anything", 5).is_empty());
    }

    #[test]
    fn test_try_load_does_not_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = CorpusManager::new(test_config(dir.path())).unwrap();
        assert!(!manager.try_load().unwrap());
        assert!(!manager.is_ready());
    }

    #[test]
    fn test_stats_counts_distinct_books() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let chunks = vec![
            seed_chunk("book-a", 1, "one two three four"),
            seed_chunk("book-a", 2, "five six"),
            seed_chunk("book-b", 1, "seven eight nine ten eleven twelve"),
        ];
        EmbeddingIndex::new(config.cache_dir.clone())
            .persist(&chunks, None, None)
            .unwrap();

        let mut manager = CorpusManager::new(config).unwrap();
        manager.ensure_ready().unwrap();
        let stats = manager.stats();
        assert_eq!(stats.books, 2);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.total_words, 12);
        assert!((stats.mean_words_per_chunk - 4.0).abs() < 1e-9);
        assert_eq!(stats.embedded_rows, 0);
        assert_eq!(stats.embedding_dim, None);
    }

    #[test]
    fn test_retrieve_by_theme_matches_search() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        EmbeddingIndex::new(config.cache_dir.clone())
            .persist(
                &[seed_chunk("habits", 1, "rising rates pressure growth valuations")],
                None,
                None,
            )
            .unwrap();

        let mut manager = CorpusManager::new(config).unwrap();
        manager.ensure_ready().unwrap();

        let themed = manager.retrieve_by_theme("rising rates and growth", 3);
        let searched = manager.search("rising rates and growth", 3);
        assert_eq!(themed.len(), searched.len());
        assert_eq!(themed[0].relevance_score, searched[0].relevance_score);
    }
}
