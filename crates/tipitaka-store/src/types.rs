//! Row types for chunks, sub-chunks and sentences, plus tree and batch shapes.

use serde::{Deserialize, Serialize};

/// A top-level text unit (e.g., a sutta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub pali_text: String,
    pub token_count: i64,
    pub order_idx: i64,
}

/// A subdivision of exactly one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChunk {
    pub sub_chunk_id: String,
    pub chunk_id: String,
    pub pali_text: String,
    pub token_count: i64,
    pub order_idx: i64,
}

/// A subdivision of exactly one sub-chunk; the finest stored granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    pub sentence_id: String,
    pub sub_chunk_id: String,
    pub pali_text: String,
    pub order_idx: i64,
}

/// A sub-chunk with its ordered sentences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubChunkTree {
    pub sub_chunk: SubChunk,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

/// A chunk with its full subtree. One JSON Lines record in import/export bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTree {
    pub chunk: Chunk,
    #[serde(default)]
    pub sub_chunks: Vec<SubChunkTree>,
}

impl ChunkTree {
    /// Number of rows the tree occupies across all three tables.
    pub fn row_count(&self) -> usize {
        1 + self
            .sub_chunks
            .iter()
            .map(|sc| 1 + sc.sentences.len())
            .sum::<usize>()
    }
}

/// Rows to insert in a single transaction, in any order across levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusBatch {
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub sub_chunks: Vec<SubChunk>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

impl CorpusBatch {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.sub_chunks.is_empty() && self.sentences.is_empty()
    }

    /// Flatten a tree into the batch.
    pub fn push_tree(&mut self, tree: &ChunkTree) {
        self.chunks.push(tree.chunk.clone());
        for sc in &tree.sub_chunks {
            self.sub_chunks.push(sc.sub_chunk.clone());
            self.sentences.extend(sc.sentences.iter().cloned());
        }
    }
}

impl From<&ChunkTree> for CorpusBatch {
    fn from(tree: &ChunkTree) -> Self {
        let mut batch = CorpusBatch::default();
        batch.push_tree(tree);
        batch
    }
}

/// One row of the flattened chunk/sub-chunk/sentence join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WideRow {
    pub chunk_id: String,
    pub chunk_text: String,
    pub sub_chunk_id: String,
    pub sub_chunk_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentence_text: Option<String>,
}

/// Rows removed by a cascading chunk delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeReport {
    pub chunks: usize,
    pub sub_chunks: usize,
    pub sentences: usize,
}

impl CascadeReport {
    pub fn is_empty(&self) -> bool {
        self.chunks == 0
    }
}

/// Rows written by a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub chunks: usize,
    pub sub_chunks: usize,
    pub sentences: usize,
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_chunks: i64,
    pub total_sub_chunks: i64,
    pub total_sentences: i64,
    pub total_tokens: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}
