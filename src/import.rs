//! Document import pipeline.
//!
//! Coordinates the full flow: content → split → embed → append, one chunk
//! at a time in document order. The store assigns sequence numbers at
//! append time, so chunk ordering always reflects input order. Unchanged
//! content (same SHA-256) is skipped; empty content writes nothing at all.
//!
//! A provider failure mid-import surfaces the error and leaves earlier
//! chunks persisted; re-importing the document replaces all its chunks.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::split_text;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, Document};
use crate::store::Store;

/// Persists one text fragment with its embedding.
pub struct ChunkWriter {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl ChunkWriter {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, provider }
    }

    /// Embed `content` and append it as the next chunk of `document_id`.
    ///
    /// The returned chunk carries the store-assigned id and sequence.
    pub async fn save_chunk(
        &self,
        document_id: &str,
        content: &str,
        metadata: &serde_json::Value,
    ) -> Result<Chunk> {
        if content.trim().is_empty() {
            return Err(Error::BadRequest("chunk content must not be empty".into()));
        }

        let embedding = embed_query(self.provider.as_ref(), content).await?;
        if embedding.len() != self.provider.dims() {
            return Err(Error::DimensionMismatch {
                expected: self.provider.dims(),
                actual: embedding.len(),
            });
        }

        let chunk = self
            .store
            .append_chunk(document_id, content, &embedding, metadata)
            .await?;
        debug!(document_id, sequence = chunk.sequence, "chunk written");
        Ok(chunk)
    }
}

/// Outcome of importing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Content was empty or whitespace-only; nothing was written.
    Empty,
    /// A document with the same source identity and content hash already
    /// exists; nothing was written.
    Unchanged { document_id: String },
    Imported { document_id: String, chunks: usize },
}

/// Splits incoming documents and writes their chunks.
pub struct Importer {
    store: Arc<dyn Store>,
    writer: ChunkWriter,
    max_tokens: usize,
}

impl Importer {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        max_tokens: usize,
    ) -> Self {
        let writer = ChunkWriter::new(store.clone(), provider);
        Self {
            store,
            writer,
            max_tokens,
        }
    }

    /// Import one document: upsert the row, replace any prior chunks, and
    /// write one chunk per split piece in order.
    pub async fn import_document(
        &self,
        source_id: Option<&str>,
        title: Option<&str>,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<ImportOutcome> {
        if content.trim().is_empty() {
            return Ok(ImportOutcome::Empty);
        }

        let content_hash = hash_text(content);

        let existing = match source_id {
            Some(sid) => self.store.find_document_by_source(sid).await?,
            None => None,
        };

        if let Some(ref doc) = existing {
            if doc.content_hash == content_hash {
                debug!(document_id = %doc.id, "content unchanged, skipping");
                return Ok(ImportOutcome::Unchanged {
                    document_id: doc.id.clone(),
                });
            }
        }

        let now = Utc::now().timestamp();
        let doc = Document {
            id: existing
                .as_ref()
                .map(|d| d.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            source_id: source_id.map(str::to_string),
            title: title.map(str::to_string),
            content: content.to_string(),
            content_hash,
            created_at: existing.as_ref().map(|d| d.created_at).unwrap_or(now),
            updated_at: now,
            metadata,
        };

        self.store.upsert_document(&doc).await?;
        self.store.delete_chunks(&doc.id).await?;

        let pieces = split_text(content, self.max_tokens);
        let empty_meta = serde_json::json!({});
        for piece in &pieces {
            self.writer.save_chunk(&doc.id, piece, &empty_meta).await?;
        }

        info!(document_id = %doc.id, chunks = pieces.len(), "document imported");
        Ok(ImportOutcome::Imported {
            document_id: doc.id,
            chunks: pieces.len(),
        })
    }
}

/// CLI entry: import a file, or every `.md`/`.txt` file under a directory.
pub async fn run_import(
    importer: &Importer,
    path: &Path,
    title_override: Option<&str>,
) -> Result<()> {
    let files = collect_files(path)?;

    let mut imported = 0u64;
    let mut unchanged = 0u64;
    let mut empty = 0u64;
    let mut chunks_written = 0u64;

    for file in &files {
        let content = std::fs::read_to_string(file)
            .map_err(|e| Error::BadRequest(format!("cannot read {}: {}", file.display(), e)))?;
        let title = title_override
            .map(str::to_string)
            .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()));
        let source_id = file.display().to_string();

        match importer
            .import_document(
                Some(&source_id),
                title.as_deref(),
                &content,
                serde_json::json!({}),
            )
            .await?
        {
            ImportOutcome::Empty => empty += 1,
            ImportOutcome::Unchanged { .. } => unchanged += 1,
            ImportOutcome::Imported { document_id, chunks } => {
                println!("  {} -> {}", file.display(), document_id);
                imported += 1;
                chunks_written += chunks as u64;
            }
        }
    }

    println!("import {}", path.display());
    println!("  files found: {}", files.len());
    println!("  documents imported: {}", imported);
    println!("  documents unchanged: {}", unchanged);
    println!("  documents skipped (empty): {}", empty);
    println!("  chunks written: {}", chunks_written);
    println!("ok");
    Ok(())
}

fn collect_files(path: &Path) -> Result<Vec<std::path::PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(Error::BadRequest(format!(
            "no such file or directory: {}",
            path.display()
        )));
    }

    let mut files: Vec<std::path::PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("md") | Some("txt")
            )
        })
        .collect();
    files.sort();
    Ok(files)
}

/// CLI entry: re-embed every stored chunk with the configured provider.
/// Used after switching embedding models. Batch failures are counted,
/// not fatal.
pub async fn run_reembed(
    store: &dyn Store,
    provider: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<()> {
    let chunks = store.all_chunks().await?;

    if chunks.is_empty() {
        println!("embed rebuild");
        println!("  no chunks to embed");
        return Ok(());
    }

    let total = chunks.len();
    let mut embedded = 0u64;
    let mut failed = 0u64;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

        match provider.embed_batch(&texts).await {
            Ok(vectors) => {
                for (chunk, vec) in batch.iter().zip(vectors.iter()) {
                    store.update_chunk_embedding(&chunk.id, vec).await?;
                    embedded += 1;
                }
            }
            Err(e) => {
                warn!(error = %e, "embedding batch failed");
                failed += batch.len() as u64;
            }
        }
    }

    println!("embed rebuild");
    println!("  total chunks: {}", total);
    println!("  embedded: {}", embedded);
    println!("  failed: {}", failed);
    Ok(())
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::HashingProvider;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    fn test_provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingProvider::new(&EmbeddingConfig {
            provider: "hashing".into(),
            dims: Some(64),
            ..Default::default()
        }))
    }

    fn importer(store: Arc<InMemoryStore>) -> Importer {
        Importer::new(store, test_provider(), 700)
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let imp = importer(store.clone());

        let outcome = imp
            .import_document(Some("a.md"), None, "", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, ImportOutcome::Empty);
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.chunk_count(), 0);
    }

    #[tokio::test]
    async fn test_import_persists_content_and_document_id() {
        let store = Arc::new(InMemoryStore::new());
        let imp = importer(store.clone());

        let outcome = imp
            .import_document(
                Some("pricing.md"),
                Some("Pricing"),
                "Chattalyst costs $50/month and supports WhatsApp, Telegram.",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let doc_id = match outcome {
            ImportOutcome::Imported { document_id, chunks } => {
                assert_eq!(chunks, 1);
                document_id
            }
            other => panic!("unexpected outcome: {:?}", other),
        };

        let chunks = store.chunks_for_document(&doc_id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_id, doc_id);
        assert_eq!(
            chunks[0].content,
            "Chattalyst costs $50/month and supports WhatsApp, Telegram."
        );
        assert_eq!(chunks[0].sequence, 0);
        assert_eq!(chunks[0].embedding.len(), 64);
    }

    #[tokio::test]
    async fn test_sequences_contiguous_in_input_order() {
        let store = Arc::new(InMemoryStore::new());
        let imp = Importer::new(store.clone(), test_provider(), 5);

        let text = "First piece of text here.\n\nSecond piece of text here.\n\nThird piece of text here.";
        let outcome = imp
            .import_document(Some("d.md"), None, text, serde_json::json!({}))
            .await
            .unwrap();
        let doc_id = match outcome {
            ImportOutcome::Imported { document_id, chunks } => {
                assert!(chunks > 1);
                document_id
            }
            other => panic!("unexpected outcome: {:?}", other),
        };

        let chunks = store.chunks_for_document(&doc_id).await.unwrap();
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i as i64);
        }
        assert!(chunks[0].content.contains("First"));
    }

    #[tokio::test]
    async fn test_unchanged_content_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let imp = importer(store.clone());

        let first = imp
            .import_document(Some("a.md"), None, "Stable text.", serde_json::json!({}))
            .await
            .unwrap();
        let doc_id = match first {
            ImportOutcome::Imported { document_id, .. } => document_id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let second = imp
            .import_document(Some("a.md"), None, "Stable text.", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(
            second,
            ImportOutcome::Unchanged {
                document_id: doc_id
            }
        );
        assert_eq!(store.chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_content_replaces_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let imp = importer(store.clone());

        imp.import_document(Some("a.md"), None, "Old text.", serde_json::json!({}))
            .await
            .unwrap();
        let outcome = imp
            .import_document(Some("a.md"), None, "New text entirely.", serde_json::json!({}))
            .await
            .unwrap();

        let doc_id = match outcome {
            ImportOutcome::Imported { document_id, .. } => document_id,
            other => panic!("unexpected outcome: {:?}", other),
        };
        let chunks = store.chunks_for_document(&doc_id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "New text entirely.");
        assert_eq!(store.chunk_count(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_no_partial_chunk() {
        let store = Arc::new(InMemoryStore::new());
        let imp = importer(store.clone());

        store.fail_next_append("disk full");
        let err = imp
            .import_document(Some("a.md"), None, "Some text.", serde_json::json!({}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Insert(_)));
        assert_eq!(store.chunk_count(), 0);
    }

    struct WrongDimsProvider;

    #[async_trait]
    impl EmbeddingProvider for WrongDimsProvider {
        fn model_name(&self) -> &str {
            "wrong-dims"
        }
        fn dims(&self) -> usize {
            8
        }
        async fn embed_batch(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0f32; 4]).collect())
        }
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let writer = ChunkWriter::new(store.clone(), Arc::new(WrongDimsProvider));
        let err = writer
            .save_chunk("d1", "text", &serde_json::json!({}))
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 8,
                actual: 4
            }
        ));
        assert_eq!(store.chunk_count(), 0);
    }
}
