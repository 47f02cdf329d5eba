//! Chunk construction from tagged pages.
//!
//! Each surviving page becomes exactly one chunk. Identity is derived from
//! the (book, page) pair rather than the text, so extraction changes never
//! change a chunk's id and re-ingesting the same document overwrites rather
//! than duplicates.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chapter_tagger::TaggedPage;

/// One retrievable unit of text, scoped to a single source page.
/// Immutable once created; replaced wholesale on corpus rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub book_name: String,
    pub chapter: String,
    pub page_number: u32,
    pub file_path: String,
    pub word_count: usize,
}

/// Deterministic chunk identifier for a (book, page) pair.
pub fn chunk_id(book_name: &str, page_number: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}_page_{}", book_name, page_number).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Map tagged pages to chunks, dropping pages below the minimum length.
/// Input order is preserved; it later becomes the embedding row order.
pub fn build_chunks(pages: Vec<TaggedPage>, min_chunk_chars: usize) -> Vec<Chunk> {
    pages
        .into_iter()
        .filter(|tagged| tagged.page.text.chars().count() >= min_chunk_chars)
        .map(|tagged| {
            let page = tagged.page;
            Chunk {
                id: chunk_id(&page.book_name, page.page_number),
                word_count: page.text.split_whitespace().count(),
                text: page.text,
                book_name: page.book_name,
                chapter: tagged.chapter,
                page_number: page.page_number,
                file_path: page.file_path.to_string_lossy().into_owned(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_extractor::PageRecord;
    use std::path::PathBuf;

    fn tagged(text: &str, page_number: u32) -> TaggedPage {
        TaggedPage {
            page: PageRecord {
                book_name: "security-analysis".to_string(),
                page_number,
                text: text.to_string(),
                file_path: PathBuf::from("books/security-analysis.pdf"),
            },
            chapter: "CHAPTER 1".to_string(),
        }
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = chunk_id("security-analysis", 12);
        let b = chunk_id("security-analysis", 12);
        assert_eq!(a, b);
        assert_ne!(a, chunk_id("security-analysis", 13));
        assert_ne!(a, chunk_id("intelligent-investor", 12));
    }

    #[test]
    fn test_chunk_id_ignores_text() {
        let long = tagged(&"word ".repeat(40), 7);
        let chunks_a = build_chunks(vec![long.clone()], 100);

        let mut edited = long;
        edited.page.text.push_str("extraction logic changed");
        let chunks_b = build_chunks(vec![edited], 100);

        assert_eq!(chunks_a[0].id, chunks_b[0].id);
        assert_ne!(chunks_a[0].text, chunks_b[0].text);
    }

    #[test]
    fn test_short_pages_are_dropped() {
        let short = tagged("too short to be a chunk", 1);
        let long = tagged(&"sufficiently long page text ".repeat(5), 2);
        let chunks = build_chunks(vec![short, long], 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_number, 2);
    }

    #[test]
    fn test_word_count_and_metadata() {
        let chunks = build_chunks(vec![tagged(&"alpha beta ".repeat(10), 3)], 100);
        assert_eq!(chunks[0].word_count, 20);
        assert_eq!(chunks[0].book_name, "security-analysis");
        assert_eq!(chunks[0].chapter, "CHAPTER 1");
        assert_eq!(chunks[0].file_path, "books/security-analysis.pdf");
    }

    #[test]
    fn test_order_preserved() {
        let pages: Vec<TaggedPage> = (1..=4)
            .map(|n| tagged(&format!("page number {} ", n).repeat(12), n))
            .collect();
        let chunks = build_chunks(pages, 100);
        let numbers: Vec<u32> = chunks.iter().map(|c| c.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }
}
