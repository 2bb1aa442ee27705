//! Core data models for the knowledge-base pipeline.
//!
//! These types represent the documents, chunks, and agents that flow
//! through import and retrieval.

use serde::Serialize;

/// A source document. Immutable once chunked; re-importing the same
/// source with changed content replaces its chunks.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    /// Stable identity across re-imports (e.g. a file path). Documents
    /// imported without one are always treated as new.
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub content: String,
    /// SHA-256 of `content`, used to skip re-import of unchanged text.
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub metadata: serde_json::Value,
}

/// A stored fragment of a document's text paired with its embedding.
/// The unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Position within the document: unique per document, contiguous
    /// from 0, assigned by the store at append time.
    pub sequence: i64,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// An agent permitted to retrieve from a scoped set of documents.
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Document ids this agent may retrieve from. Ids with no matching
    /// document silently contribute no results.
    pub knowledge_document_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A ranked chunk returned from retrieval.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub sequence: i64,
    pub content: String,
    /// Cosine similarity to the query vector.
    pub score: f64,
}
