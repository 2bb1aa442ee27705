//! SQLite [`Store`] backend.
//!
//! Embeddings are stored as little-endian f32 BLOBs. Sequence numbers are
//! assigned inside the append transaction; `UNIQUE(document_id, sequence)`
//! turns racing same-document appends into explicit insert errors.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Agent, Chunk, Document, RetrievedChunk};

use super::{rank_candidates, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn document_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
    let metadata_json: String = row.get("metadata_json");
    Ok(Document {
        id: row.get("id"),
        source_id: row.get("source_id"),
        title: row.get("title"),
        content: row.get("content"),
        content_hash: row.get("content_hash"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        metadata: serde_json::from_str(&metadata_json)?,
    })
}

fn chunk_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
    let blob: Vec<u8> = row.get("embedding");
    let metadata_json: String = row.get("metadata_json");
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        sequence: row.get("sequence"),
        content: row.get("content"),
        embedding: blob_to_vec(&blob),
        metadata: serde_json::from_str(&metadata_json)?,
    })
}

fn agent_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Agent> {
    let ids_json: String = row.get("knowledge_document_ids_json");
    Ok(Agent {
        id: row.get("id"),
        name: row.get("name"),
        knowledge_document_ids: serde_json::from_str(&ids_json)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let metadata_json = serde_json::to_string(&doc.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO documents (id, source_id, title, content, content_hash, created_at, updated_at, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                title = excluded.title,
                content = excluded.content,
                content_hash = excluded.content_hash,
                updated_at = excluded.updated_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source_id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.content_hash)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(&metadata_json)
        .execute(&self.pool)
        .await
        .map_err(Error::Insert)?;

        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn find_document_by_source(&self, source_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query("SELECT * FROM documents ORDER BY updated_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn append_chunk(
        &self,
        document_id: &str,
        content: &str,
        embedding: &[f32],
        metadata: &serde_json::Value,
    ) -> Result<Chunk> {
        let id = Uuid::new_v4().to_string();
        let blob = vec_to_blob(embedding);
        let metadata_json = serde_json::to_string(metadata)?;

        let mut tx = self.pool.begin().await?;

        let sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence) + 1, 0) FROM chunks WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO chunks (id, document_id, sequence, content, embedding, metadata_json) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(document_id)
        .bind(sequence)
        .bind(content)
        .bind(&blob)
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await
        .map_err(Error::Insert)?;

        tx.commit().await?;

        Ok(Chunk {
            id,
            document_id: document_id.to_string(),
            sequence,
            content: content.to_string(),
            embedding: embedding.to_vec(),
            metadata: metadata.clone(),
        })
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks WHERE document_id = ? ORDER BY sequence ASC")
            .bind(document_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query("SELECT * FROM chunks ORDER BY document_id ASC, sequence ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn update_chunk_embedding(&self, chunk_id: &str, embedding: &[f32]) -> Result<()> {
        let blob = vec_to_blob(embedding);
        let result = sqlx::query("UPDATE chunks SET embedding = ? WHERE id = ?")
            .bind(&blob)
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("chunk", chunk_id));
        }
        Ok(())
    }

    async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        let ids_json = serde_json::to_string(&agent.knowledge_document_ids)?;
        sqlx::query(
            r#"
            INSERT INTO agents (id, name, knowledge_document_ids_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                knowledge_document_ids_json = excluded.knowledge_document_ids_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(&ids_json)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Insert)?;

        Ok(())
    }

    async fn get_agent(&self, name_or_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE name = ? OR id = ?")
            .bind(name_or_id)
            .bind(name_or_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(agent_from_row).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(agent_from_row).collect()
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

        let placeholders = vec!["?"; document_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, document_id, sequence, content, embedding FROM chunks \
             WHERE document_id IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in document_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let candidates: Vec<RetrievedChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                RetrievedChunk {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    sequence: row.get("sequence"),
                    content: row.get("content"),
                    score: cosine_similarity(query_vec, &vec) as f64,
                }
            })
            .collect();

        Ok(rank_candidates(candidates, limit))
    }
}
