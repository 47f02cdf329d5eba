//! Relevance scoring and ranking.
//!
//! Two paths produce the same result shape: cosine similarity over the
//! embedding matrix when vectors are available, lowercase token overlap
//! when they are not. Both sort descending with ties broken by original
//! chunk order, and both return an empty list for an empty query or corpus.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::document_chunker::Chunk;
use crate::embedding::EmbeddingBackend;
use crate::embedding_index::EmbeddingMatrix;
use crate::error::{RagError, Result};

/// A chunk with its relevance to one query. Cosine scores fall in [-1, 1],
/// keyword-overlap scores in [0, 1]. `rank` is 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub relevance_score: f32,
    pub rank: usize,
}

/// Normalized dot product of two vectors; 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Encode the query and rank every chunk by cosine similarity.
pub fn semantic_search(
    backend: &EmbeddingBackend,
    matrix: &EmbeddingMatrix,
    chunks: &[Chunk],
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    let query_vector = backend.encode_one(query)?;
    search_by_vector(&query_vector, matrix, chunks, top_k)
}

/// Rank chunks against an already-encoded query vector. Row i of the
/// matrix is scored for chunk i; the caller guarantees that pairing.
pub fn search_by_vector(
    query_vector: &[f32],
    matrix: &EmbeddingMatrix,
    chunks: &[Chunk],
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if chunks.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }
    if matrix.rows() != chunks.len() {
        return Err(RagError::PairMismatch {
            chunks: chunks.len(),
            rows: matrix.rows(),
        });
    }
    if matrix.dim() != query_vector.len() {
        return Err(RagError::Embedding(format!(
            "query vector dimension {} does not match index dimension {}",
            query_vector.len(),
            matrix.dim()
        )));
    }

    let scores: Vec<f32> = (0..matrix.rows())
        .map(|i| cosine_similarity(query_vector, matrix.row(i)))
        .collect();
    Ok(take_top(&scores, chunks, top_k))
}

/// Fallback scoring: |query tokens ∩ chunk tokens| / |query tokens|.
/// Chunks with no overlap score exactly 0 and stay eligible, ordered last.
pub fn keyword_search(chunks: &[Chunk], query: &str, top_k: usize) -> Vec<SearchResult> {
    let query_tokens: HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if query_tokens.is_empty() || chunks.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let query_len = query_tokens.len() as f32;
    let scores: Vec<f32> = chunks
        .iter()
        .map(|chunk| {
            let lowered = chunk.text.to_lowercase();
            let chunk_tokens: HashSet<&str> = lowered.split_whitespace().collect();
            let common = query_tokens
                .iter()
                .filter(|token| chunk_tokens.contains(token.as_str()))
                .count();
            common as f32 / query_len
        })
        .collect();

    take_top(&scores, chunks, top_k)
}

/// Stable descending selection of the top k scored chunks.
fn take_top(scores: &[f32], chunks: &[Chunk], top_k: usize) -> Vec<SearchResult> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    order.truncate(top_k);

    order
        .into_iter()
        .enumerate()
        .map(|(i, idx)| SearchResult {
            chunk: chunks[idx].clone(),
            relevance_score: scores[idx],
            rank: i + 1,
        })
        .collect()
}
