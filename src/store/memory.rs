//! In-memory [`Store`] implementation for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored vectors,
//! with the same deterministic ranking as the SQLite backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Agent, Chunk, Document, RetrievedChunk};

use super::{rank_candidates, Store};

/// In-memory store for unit tests.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<Chunk>>,
    agents: RwLock<HashMap<String, Agent>>,
    /// When set, the next append fails with this message. Lets tests force
    /// a storage failure without a real backend outage.
    fail_next_append: RwLock<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            agents: RwLock::new(HashMap::new()),
            fail_next_append: RwLock::new(None),
        }
    }

    pub fn fail_next_append(&self, message: impl Into<String>) {
        *self.fail_next_append.write().unwrap() = Some(message.into());
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn document_count(&self) -> usize {
        self.docs.read().unwrap().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        self.docs.write().unwrap().insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn find_document_by_source(&self, source_id: &str) -> Result<Option<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .values()
            .find(|d| d.source_id.as_deref() == Some(source_id))
            .cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self.docs.read().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(docs)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed = self.docs.write().unwrap().remove(id).is_some();
        if removed {
            self.chunks.write().unwrap().retain(|c| c.document_id != id);
        }
        Ok(removed)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let mut chunks = self.chunks.write().unwrap();
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn append_chunk(
        &self,
        document_id: &str,
        content: &str,
        embedding: &[f32],
        metadata: &serde_json::Value,
    ) -> Result<Chunk> {
        if let Some(message) = self.fail_next_append.write().unwrap().take() {
            return Err(Error::Insert(sqlx::Error::Protocol(message)));
        }

        let mut chunks = self.chunks.write().unwrap();
        let sequence = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .map(|c| c.sequence + 1)
            .max()
            .unwrap_or(0);

        let chunk = Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            sequence,
            content: content.to_string(),
            embedding: embedding.to_vec(),
            metadata: metadata.clone(),
        };
        chunks.push(chunk.clone());
        Ok(chunk)
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut out: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.sequence);
        Ok(out)
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let mut out: Vec<Chunk> = self.chunks.read().unwrap().clone();
        out.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(out)
    }

    async fn update_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        let mut chunks = self.chunks.write().unwrap();
        match chunks.iter_mut().find(|c| c.id == chunk_id) {
            Some(chunk) => {
                chunk.embedding = embedding.to_vec();
                Ok(())
            }
            None => Err(Error::not_found("chunk", chunk_id)),
        }
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        self.agents
            .write()
            .unwrap()
            .insert(agent.name.clone(), agent.clone());
        Ok(())
    }

    async fn get_agent(&self, name_or_id: &str) -> Result<Option<Agent>> {
        let agents = self.agents.read().unwrap();
        Ok(agents
            .get(name_or_id)
            .or_else(|| agents.values().find(|a| a.id == name_or_id))
            .cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut out: Vec<Agent> = self.agents.read().unwrap().values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn similarity_search(
        &self,
        query_vec: &[f32],
        document_ids: &[String],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<RetrievedChunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| document_ids.contains(&c.document_id))
            .map(|c| RetrievedChunk {
                chunk_id: c.id.clone(),
                document_id: c.document_id.clone(),
                sequence: c.sequence,
                content: c.content.clone(),
                score: cosine_similarity(query_vec, &c.embedding) as f64,
            })
            .collect();

        Ok(rank_candidates(candidates, limit))
    }
}
