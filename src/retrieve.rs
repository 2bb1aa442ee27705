//! Agent-scoped similarity retrieval.
//!
//! Resolves the agent's permitted document set, embeds the query, and
//! ranks chunks inside that set by cosine similarity. A chunk outside the
//! agent's `knowledge_document_ids` can never appear in the results; ids
//! referencing missing documents simply match nothing.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::RetrievedChunk;
use crate::store::Store;

pub struct Retriever {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        default_top_k: usize,
    ) -> Self {
        Self {
            store,
            provider,
            default_top_k,
        }
    }

    /// Retrieve the top-K chunks for a query, scoped to an agent's
    /// document set. Ranked by similarity descending; ties break by
    /// ascending sequence, then chunk id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no agent matches `agent`; provider and
    /// storage errors propagate with their kind intact.
    pub async fn retrieve(
        &self,
        agent: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>> {
        let agent = self
            .store
            .get_agent(agent)
            .await?
            .ok_or_else(|| Error::not_found("agent", agent))?;

        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if agent.knowledge_document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = embed_query(self.provider.as_ref(), query).await?;
        let limit = top_k.unwrap_or(self.default_top_k);

        let results = self
            .store
            .similarity_search(&query_vec, &agent.knowledge_document_ids, limit)
            .await?;

        debug!(
            agent = %agent.name,
            documents = agent.knowledge_document_ids.len(),
            results = results.len(),
            "retrieval complete"
        );
        Ok(results)
    }
}

/// CLI entry: run a retrieval query and print ranked results.
pub async fn run_retrieve(
    retriever: &Retriever,
    agent: &str,
    query: &str,
    top_k: Option<usize>,
) -> Result<()> {
    let results = retriever.retrieve(agent, query, top_k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let excerpt: String = result.content.chars().take(240).collect();
        println!(
            "{}. [{:.3}] {} #{}",
            i + 1,
            result.score,
            result.document_id,
            result.sequence
        );
        println!("    \"{}\"", excerpt.replace('\n', " ").trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::HashingProvider;
    use crate::import::Importer;
    use crate::models::Agent;
    use crate::store::memory::InMemoryStore;

    fn test_provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingProvider::new(&EmbeddingConfig {
            provider: "hashing".into(),
            dims: Some(128),
            ..Default::default()
        }))
    }

    async fn agent_for(store: &InMemoryStore, name: &str, doc_ids: Vec<String>) {
        store
            .upsert_agent(&Agent {
                id: format!("{}-id", name),
                name: name.to_string(),
                knowledge_document_ids: doc_ids,
                created_at: 0,
                updated_at: 0,
            })
            .await
            .unwrap();
    }

    async fn import(store: Arc<InMemoryStore>, source: &str, text: &str) -> String {
        let importer = Importer::new(store, test_provider(), 700);
        match importer
            .import_document(Some(source), None, text, serde_json::json!({}))
            .await
            .unwrap()
        {
            crate::import::ImportOutcome::Imported { document_id, .. } => document_id,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let retriever = Retriever::new(store, test_provider(), 8);
        let err = retriever.retrieve("ghost", "query", None).await.err().unwrap();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_query_yields_nothing() {
        let store = Arc::new(InMemoryStore::new());
        agent_for(&store, "a", vec!["d1".into()]).await;
        let retriever = Retriever::new(store, test_provider(), 8);
        assert!(retriever.retrieve("a", "   ", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_without_documents_yields_nothing() {
        let store = Arc::new(InMemoryStore::new());
        agent_for(&store, "a", vec![]).await;
        let retriever = Retriever::new(store, test_provider(), 8);
        assert!(retriever.retrieve("a", "query", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_ids_silently_match_nothing() {
        let store = Arc::new(InMemoryStore::new());
        agent_for(&store, "a", vec!["never-imported".into()]).await;
        let retriever = Retriever::new(store, test_provider(), 8);
        assert!(retriever.retrieve("a", "query", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_never_leaves_agent_scope() {
        let store = Arc::new(InMemoryStore::new());
        let d1 = import(
            store.clone(),
            "pricing.md",
            "Chattalyst costs $50/month and supports WhatsApp, Telegram.",
        )
        .await;
        let d2 = import(
            store.clone(),
            "gardening.md",
            "Tomatoes grow best in full sun with regular watering.",
        )
        .await;

        agent_for(&store, "scoped", vec![d1.clone()]).await;
        let retriever = Retriever::new(store, test_provider(), 50);

        // Query deliberately matching the out-of-scope document.
        let results = retriever
            .retrieve("scoped", "How do tomatoes grow?", None)
            .await
            .unwrap();
        for r in &results {
            assert_eq!(r.document_id, d1);
            assert_ne!(r.document_id, d2);
        }
    }

    #[tokio::test]
    async fn test_round_trip_returns_matching_chunk_first() {
        let store = Arc::new(InMemoryStore::new());
        let d1 = import(
            store.clone(),
            "pricing.md",
            "Chattalyst costs $50/month and supports WhatsApp, Telegram.",
        )
        .await;
        let d2 = import(
            store.clone(),
            "gardening.md",
            "Tomatoes grow best in full sun with regular watering.",
        )
        .await;

        agent_for(&store, "support", vec![d1.clone(), d2]).await;
        let retriever = Retriever::new(store, test_provider(), 8);

        let results = retriever
            .retrieve("support", "What does Chattalyst cost?", None)
            .await
            .unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].document_id, d1);
        assert!(results[0].content.contains("$50/month"));
    }

    #[tokio::test]
    async fn test_equal_scores_rank_by_sequence() {
        let store = Arc::new(InMemoryStore::new());
        let provider = test_provider();

        // Identical content pieces embed identically, forcing a tie.
        store
            .upsert_document(&crate::models::Document {
                id: "d1".into(),
                source_id: None,
                title: None,
                content: String::new(),
                content_hash: String::new(),
                created_at: 0,
                updated_at: 0,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
        let vec = provider
            .embed_batch(&["same text".to_string()])
            .await
            .unwrap()
            .remove(0);
        for _ in 0..3 {
            store
                .append_chunk("d1", "same text", &vec, &serde_json::json!({}))
                .await
                .unwrap();
        }

        agent_for(&store, "a", vec!["d1".into()]).await;
        let retriever = Retriever::new(store, provider, 8);
        let results = retriever.retrieve("a", "same text", None).await.unwrap();
        let sequences: Vec<i64> = results.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let store = Arc::new(InMemoryStore::new());
        // Small max_tokens so each paragraph becomes its own chunk.
        let importer = Importer::new(store.clone(), test_provider(), 8);
        let outcome = importer
            .import_document(
                Some("faq.md"),
                None,
                "Billing happens every month.\n\nSupport answers within a day.\n\nTrials last two weeks.",
                serde_json::json!({}),
            )
            .await
            .unwrap();
        let d1 = match outcome {
            crate::import::ImportOutcome::Imported { document_id, chunks } => {
                assert_eq!(chunks, 3);
                document_id
            }
            other => panic!("unexpected outcome: {:?}", other),
        };
        agent_for(&store, "a", vec![d1]).await;

        let retriever = Retriever::new(store, test_provider(), 8);
        let results = retriever
            .retrieve("a", "billing support trials", Some(2))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }
}
