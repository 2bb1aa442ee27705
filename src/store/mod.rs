//! Storage abstraction for the knowledge base.
//!
//! The [`Store`] trait defines all storage operations needed by the
//! import and retrieval pipeline, enabling pluggable backends. The
//! production backend is [`sqlite::SqliteStore`]; [`memory::InMemoryStore`]
//! backs unit tests. Constructing the store explicitly and passing it in
//! (rather than a module-global client) is what lets tests substitute a
//! fake backend.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Agent, Chunk, Document, RetrievedChunk};

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or update a document |
/// | [`append_chunk`](Store::append_chunk) | Append one chunk with a store-assigned sequence |
/// | [`similarity_search`](Store::similarity_search) | Cosine top-K over a document id set |
/// | [`upsert_agent`](Store::upsert_agent) | Insert or update an agent record |
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a document, or update it in place when the id exists.
    async fn upsert_document(&self, doc: &Document) -> Result<()>;

    /// Retrieve a document by id.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Retrieve a document by its stable source identity.
    async fn find_document_by_source(&self, source_id: &str) -> Result<Option<Document>>;

    /// List all documents, newest first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Delete a document and (via cascade) its chunks. Returns whether a
    /// row was removed.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Delete all chunks belonging to a document. Returns the count.
    async fn delete_chunks(&self, document_id: &str) -> Result<u64>;

    /// Append a single chunk. The store assigns a fresh id and the next
    /// per-document sequence number (`MAX(sequence) + 1`, starting at 0).
    async fn append_chunk(
        &self,
        document_id: &str,
        content: &str,
        embedding: &[f32],
        metadata: &serde_json::Value,
    ) -> Result<Chunk>;

    /// All chunks for a document, in sequence order.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// All chunks in the store. Used by re-embedding.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;

    /// Replace the stored embedding of a chunk.
    async fn update_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()>;

    /// Insert an agent, or update its document set when the name exists.
    async fn upsert_agent(&self, agent: &Agent) -> Result<()>;

    /// Retrieve an agent by name or id.
    async fn get_agent(&self, name_or_id: &str) -> Result<Option<Agent>>;

    /// List all agents by name.
    async fn list_agents(&self) -> Result<Vec<Agent>>;

    /// Rank chunks within the given document set by cosine similarity to
    /// `query_vec`, descending; ties break by ascending sequence, then
    /// chunk id. Returns at most `limit` results. An empty document set
    /// yields no results.
    async fn similarity_search(
        &self,
        query_vec: &[f32],
        document_ids: &[String],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// Deterministic ranking shared by all backends: score descending,
/// sequence ascending, chunk id ascending.
pub(crate) fn rank_candidates(
    mut candidates: Vec<RetrievedChunk>,
    limit: usize,
) -> Vec<RetrievedChunk> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.sequence.cmp(&b.sequence))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(limit);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(chunk_id: &str, sequence: i64, score: f64) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            sequence,
            content: String::new(),
            score,
        }
    }

    #[test]
    fn test_rank_score_descending() {
        let ranked = rank_candidates(
            vec![candidate("a", 0, 0.1), candidate("b", 1, 0.9)],
            10,
        );
        assert_eq!(ranked[0].chunk_id, "b");
    }

    #[test]
    fn test_rank_ties_by_sequence_then_id() {
        let ranked = rank_candidates(
            vec![
                candidate("z", 2, 0.5),
                candidate("y", 1, 0.5),
                candidate("x", 1, 0.5),
            ],
            10,
        );
        let order: Vec<&str> = ranked.iter().map(|c| c.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_rank_truncates() {
        let ranked = rank_candidates(
            (0..10).map(|i| candidate(&format!("c{}", i), i, 1.0)).collect(),
            3,
        );
        assert_eq!(ranked.len(), 3);
    }
}
