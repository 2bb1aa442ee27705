//! Agent records.
//!
//! An agent is a named entity scoped to a set of document ids
//! (`knowledge_document_ids`); retrieval only ever searches inside that
//! set. Referencing a document id that does not exist is allowed — such
//! ids silently contribute no results at query time.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::Agent;
use crate::store::Store;

/// Create an agent, or replace the document set of an existing one with
/// the same name.
pub async fn create_agent(
    store: &dyn Store,
    name: &str,
    knowledge_document_ids: Vec<String>,
) -> Result<Agent> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest("agent name must not be empty".into()));
    }
    if knowledge_document_ids.iter().any(|id| id.trim().is_empty()) {
        return Err(Error::BadRequest(
            "knowledge_document_ids must not contain empty ids".into(),
        ));
    }

    let now = Utc::now().timestamp();
    let agent = match store.get_agent(name).await? {
        Some(existing) => Agent {
            knowledge_document_ids,
            updated_at: now,
            ..existing
        },
        None => Agent {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            knowledge_document_ids,
            created_at: now,
            updated_at: now,
        },
    };

    store.upsert_agent(&agent).await?;
    Ok(agent)
}

/// CLI entry: create or update an agent and print a summary.
pub async fn run_agent_create(
    store: &dyn Store,
    name: &str,
    document_ids: Vec<String>,
) -> Result<()> {
    let agent = create_agent(store, name, document_ids).await?;
    println!("agent '{}'", agent.name);
    println!("  id: {}", agent.id);
    println!("  documents: {}", agent.knowledge_document_ids.len());
    println!("ok");
    Ok(())
}

/// CLI entry: list agents with their document counts.
pub async fn run_agent_list(store: &dyn Store) -> Result<()> {
    let agents = store.list_agents().await?;
    if agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }
    for agent in agents {
        println!(
            "{}  ({} documents)",
            agent.name,
            agent.knowledge_document_ids.len()
        );
        for id in &agent.knowledge_document_ids {
            println!("    {}", id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_create_agent() {
        let store = InMemoryStore::new();
        let agent = create_agent(&store, "support-bot", vec!["d1".into(), "d2".into()])
            .await
            .unwrap();
        assert_eq!(agent.name, "support-bot");
        assert_eq!(agent.knowledge_document_ids, vec!["d1", "d2"]);

        let fetched = store.get_agent("support-bot").await.unwrap().unwrap();
        assert_eq!(fetched.id, agent.id);
    }

    #[tokio::test]
    async fn test_create_agent_empty_name_rejected() {
        let store = InMemoryStore::new();
        let err = create_agent(&store, "   ", vec![]).await.err().unwrap();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_update_keeps_identity() {
        let store = InMemoryStore::new();
        let first = create_agent(&store, "sales", vec!["d1".into()]).await.unwrap();
        let second = create_agent(&store, "sales", vec!["d2".into(), "d3".into()])
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.knowledge_document_ids, vec!["d2", "d3"]);
    }
}
