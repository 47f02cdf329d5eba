//! The persisted chunk/vector pair.
//!
//! Two artifacts live in the cache directory: `chunks.json` (the ordered
//! chunk sequence) and `embeddings.bin` (one f32 row per chunk, same order).
//! Row i of the matrix and position i of the sequence must always describe
//! the same chunk. That correspondence is positional, so the vector artifact
//! carries a fingerprint of the ordered chunk ids and the model identifier;
//! any mismatch on load demotes the vectors to absent instead of serving
//! wrong rankings.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use sha2::{Digest, Sha256};

use crate::document_chunker::Chunk;
use crate::embedding::EmbeddingBackend;
use crate::error::{RagError, Result};

pub const CHUNKS_FILE: &str = "chunks.json";
pub const VECTORS_FILE: &str = "embeddings.bin";

/// Magic prefix of the vector artifact; the trailing byte is the format
/// version.
const VECTORS_MAGIC: &[u8; 8] = b"BKRGVEC\x01";

/// Row-major f32 matrix with a fixed column count.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if dim == 0 {
            return Err(RagError::Embedding(
                "embedding backend produced empty vectors".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in &rows {
            if row.len() != dim {
                return Err(RagError::Embedding(format!(
                    "ragged embedding output: expected dimension {}, got {}",
                    dim,
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { dim, data })
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    fn data(&self) -> &[f32] {
        &self.data
    }
}

/// What a load produces: chunks always, vectors only when the stored pair
/// is intact.
pub struct CorpusSnapshot {
    pub chunks: Vec<Chunk>,
    pub vectors: Option<EmbeddingMatrix>,
}

pub struct EmbeddingIndex {
    cache_dir: PathBuf,
}

impl EmbeddingIndex {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn chunks_path(&self) -> PathBuf {
        self.cache_dir.join(CHUNKS_FILE)
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.cache_dir.join(VECTORS_FILE)
    }

    /// Encode every chunk. The result has exactly one row per chunk, in
    /// chunk order.
    pub fn build(&self, backend: &EmbeddingBackend, chunks: &[Chunk]) -> Result<EmbeddingMatrix> {
        info!("computing embeddings for {} chunks", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let rows = backend.encode(texts)?;
        if rows.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "backend returned {} vectors for {} chunks",
                rows.len(),
                chunks.len()
            )));
        }
        let matrix = EmbeddingMatrix::from_rows(rows)?;
        info!(
            "computed embeddings: {} rows x {} dims",
            matrix.rows(),
            matrix.dim()
        );
        Ok(matrix)
    }

    /// Write the pair. Both artifacts go through temp-file renames so a
    /// crash never leaves a half-written file next to a current one. With
    /// `vectors` absent any stale vector artifact is removed; a lone
    /// chunk file unambiguously means "vectors need rebuild".
    pub fn persist(
        &self,
        chunks: &[Chunk],
        vectors: Option<&EmbeddingMatrix>,
        model_id: Option<&str>,
    ) -> Result<()> {
        if let Some(matrix) = vectors {
            if matrix.rows() != chunks.len() {
                return Err(RagError::PairMismatch {
                    chunks: chunks.len(),
                    rows: matrix.rows(),
                });
            }
        }

        fs::create_dir_all(&self.cache_dir)?;

        let chunks_tmp = self.cache_dir.join(format!("{CHUNKS_FILE}.tmp"));
        fs::write(&chunks_tmp, serde_json::to_vec_pretty(chunks)?)?;
        fs::rename(&chunks_tmp, self.chunks_path())?;

        match vectors {
            Some(matrix) => {
                let vectors_tmp = self.cache_dir.join(format!("{VECTORS_FILE}.tmp"));
                write_vectors_file(
                    &vectors_tmp,
                    matrix,
                    &chunk_fingerprint(chunks),
                    model_id.unwrap_or(""),
                    chrono::Utc::now().timestamp(),
                )?;
                fs::rename(&vectors_tmp, self.vectors_path())?;
                info!(
                    "saved {} chunks and a {}x{} embedding matrix",
                    chunks.len(),
                    matrix.rows(),
                    matrix.dim()
                );
            }
            None => {
                if self.vectors_path().exists() {
                    fs::remove_file(self.vectors_path())?;
                }
                info!("saved {} chunks (no embeddings)", chunks.len());
            }
        }

        Ok(())
    }

    /// Load the stored pair. `None` means no usable chunk sequence exists
    /// and the corpus must be rebuilt from source documents. Vectors that
    /// fail any pairing check come back as absent.
    pub fn load(&self, expected_model: Option<&str>) -> Result<Option<CorpusSnapshot>> {
        let chunks_path = self.chunks_path();
        if !chunks_path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&chunks_path)?;
        let chunks: Vec<Chunk> = match serde_json::from_slice(&bytes) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(
                    "chunk store {} is unreadable ({}), rebuilding corpus",
                    chunks_path.display(),
                    e
                );
                return Ok(None);
            }
        };
        if chunks.is_empty() {
            return Ok(None);
        }

        let vectors = self.load_vectors_for(&chunks, expected_model)?;
        info!(
            "loaded {} chunks from cache ({})",
            chunks.len(),
            if vectors.is_some() {
                "with embeddings"
            } else {
                "embeddings absent"
            }
        );
        Ok(Some(CorpusSnapshot { chunks, vectors }))
    }

    fn load_vectors_for(
        &self,
        chunks: &[Chunk],
        expected_model: Option<&str>,
    ) -> Result<Option<EmbeddingMatrix>> {
        let path = self.vectors_path();
        if !path.exists() {
            return Ok(None);
        }

        let Some(artifact) = read_vectors_file(&path)? else {
            warn!("vector artifact {} is malformed, ignoring it", path.display());
            return Ok(None);
        };

        if artifact.matrix.rows() != chunks.len() {
            warn!(
                "vector artifact has {} rows for {} chunks, ignoring it",
                artifact.matrix.rows(),
                chunks.len()
            );
            return Ok(None);
        }
        if artifact.fingerprint != chunk_fingerprint(chunks) {
            warn!("vector artifact does not match the stored chunk sequence, ignoring it");
            return Ok(None);
        }
        if let Some(model) = expected_model {
            if artifact.model_id != model {
                warn!(
                    "vector artifact was built with model '{}', expected '{}', ignoring it",
                    artifact.model_id, model
                );
                return Ok(None);
            }
        }

        Ok(Some(artifact.matrix))
    }

    /// Remove both artifacts, forcing the next load to rebuild.
    pub fn clear(&self) -> Result<()> {
        for path in [self.chunks_path(), self.vectors_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Fingerprint of the ordered chunk id sequence. Stored inside the vector
/// artifact so the pair cannot drift apart unnoticed.
pub fn chunk_fingerprint(chunks: &[Chunk]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().into()
}

struct VectorsArtifact {
    matrix: EmbeddingMatrix,
    fingerprint: [u8; 32],
    model_id: String,
    #[allow(dead_code)]
    built_at: i64,
}

fn write_vectors_file(
    path: &Path,
    matrix: &EmbeddingMatrix,
    fingerprint: &[u8; 32],
    model_id: &str,
    built_at: i64,
) -> Result<()> {
    let mut buf =
        Vec::with_capacity(64 + model_id.len() + matrix.data().len() * std::mem::size_of::<f32>());
    buf.extend_from_slice(VECTORS_MAGIC);
    buf.extend_from_slice(&(model_id.len() as u16).to_le_bytes());
    buf.extend_from_slice(model_id.as_bytes());
    buf.extend_from_slice(&(matrix.rows() as u32).to_le_bytes());
    buf.extend_from_slice(&(matrix.dim() as u32).to_le_bytes());
    buf.extend_from_slice(fingerprint);
    buf.extend_from_slice(&built_at.to_le_bytes());
    for value in matrix.data() {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, buf)?;
    Ok(())
}

/// `Ok(None)` when the file does not parse; a malformed artifact is treated
/// as absent vectors, never as an error that blocks the corpus.
fn read_vectors_file(path: &Path) -> Result<Option<VectorsArtifact>> {
    let bytes = fs::read(path)?;
    Ok(parse_vectors_file(&bytes))
}

fn parse_vectors_file(bytes: &[u8]) -> Option<VectorsArtifact> {
    fn take<'a>(bytes: &'a [u8], offset: &mut usize, n: usize) -> Option<&'a [u8]> {
        let slice = bytes.get(*offset..offset.checked_add(n)?)?;
        *offset += n;
        Some(slice)
    }

    let mut offset = 0usize;

    if take(bytes, &mut offset, VECTORS_MAGIC.len())? != VECTORS_MAGIC {
        return None;
    }

    let model_len = u16::from_le_bytes(take(bytes, &mut offset, 2)?.try_into().ok()?) as usize;
    let model_id = String::from_utf8(take(bytes, &mut offset, model_len)?.to_vec()).ok()?;

    let rows = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().ok()?) as usize;
    let dim = u32::from_le_bytes(take(bytes, &mut offset, 4)?.try_into().ok()?) as usize;

    let fingerprint: [u8; 32] = take(bytes, &mut offset, 32)?.try_into().ok()?;
    let built_at = i64::from_le_bytes(take(bytes, &mut offset, 8)?.try_into().ok()?);

    if dim == 0 || rows == 0 {
        return None;
    }
    let expected = rows.checked_mul(dim)?.checked_mul(4)?;
    let payload = bytes.get(offset..)?;
    if payload.len() != expected {
        return None;
    }

    let data: Vec<f32> = payload
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Some(VectorsArtifact {
        matrix: EmbeddingMatrix { dim, data },
        fingerprint,
        model_id,
        built_at,
    })
}
