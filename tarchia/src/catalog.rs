/*!
Catalog abstraction: a document store keyed by collection name

Mirrors the reference implementation's `find`/`upsert`/`delete` document
store rather than a typed table/owner/view API, so the same trait serves
all three collections (`tables`, `owners`, `views`).
*/

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// An equality filter over a collection's documents: `{"table_id": "..."}`.
pub type Filter = HashMap<String, String>;

/// Persists catalog entries (tables, owners, views) as JSON documents.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns every document in `collection` matching `filter`.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>>;

    /// Inserts or replaces the document in `collection` matching `key`.
    async fn upsert(&self, collection: &str, key: &Filter, document: Value) -> Result<()>;

    /// Removes every document in `collection` matching `filter`.
    async fn delete(&self, collection: &str, filter: &Filter) -> Result<()>;

    /// Replaces the document in `collection` matching `key` with `document`,
    /// but only if `field` on the current document (or its absence, when
    /// `expected` is `None`) still equals `expected`. Returns whether the
    /// swap happened. This is the linearization point callers that need
    /// compare-and-set semantics (e.g. the commit engine) must use instead
    /// of `upsert`, which always overwrites unconditionally.
    async fn compare_and_swap(
        &self,
        collection: &str,
        key: &Filter,
        field: &str,
        expected: Option<&str>,
        document: Value,
    ) -> Result<bool>;
}

fn matches(document: &Value, filter: &Filter) -> bool {
    filter.iter().all(|(field, expected)| {
        document
            .get(field)
            .and_then(Value::as_str)
            .map(|actual| actual == expected)
            .unwrap_or(false)
    })
}

#[cfg(feature = "testutils")]
pub mod testutils {
    use super::*;
    use tokio::sync::Mutex;

    /// In-memory `Catalog` for engine tests: one `Vec<Value>` per collection.
    #[derive(Default)]
    pub struct InMemoryCatalog {
        collections: Mutex<HashMap<String, Vec<Value>>>,
    }

    #[async_trait]
    impl Catalog for InMemoryCatalog {
        async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
            let collections = self.collections.lock().await;
            Ok(collections
                .get(collection)
                .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
                .unwrap_or_default())
        }

        async fn upsert(&self, collection: &str, key: &Filter, document: Value) -> Result<()> {
            let mut collections = self.collections.lock().await;
            let docs = collections.entry(collection.to_string()).or_default();
            if let Some(existing) = docs.iter_mut().find(|d| matches(d, key)) {
                *existing = document;
            } else {
                docs.push(document);
            }
            Ok(())
        }

        async fn delete(&self, collection: &str, filter: &Filter) -> Result<()> {
            let mut collections = self.collections.lock().await;
            if let Some(docs) = collections.get_mut(collection) {
                docs.retain(|d| !matches(d, filter));
            }
            Ok(())
        }

        async fn compare_and_swap(
            &self,
            collection: &str,
            key: &Filter,
            field: &str,
            expected: Option<&str>,
            document: Value,
        ) -> Result<bool> {
            let mut collections = self.collections.lock().await;
            let docs = collections.entry(collection.to_string()).or_default();
            match docs.iter_mut().find(|d| matches(d, key)) {
                Some(existing) => {
                    let actual = existing.get(field).and_then(Value::as_str);
                    if actual == expected {
                        *existing = document;
                        Ok(true)
                    } else {
                        Ok(false)
                    }
                }
                None if expected.is_none() => {
                    docs.push(document);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::InMemoryCatalog;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_then_find_round_trips() {
        let catalog = InMemoryCatalog::default();
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "name": "orders"}))
            .await
            .unwrap();

        let found = catalog.find("tables", &key).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "orders");
    }

    #[tokio::test]
    async fn upsert_replaces_existing_document() {
        let catalog = InMemoryCatalog::default();
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "name": "orders"}))
            .await
            .unwrap();
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "name": "renamed"}))
            .await
            .unwrap();

        let found = catalog.find("tables", &key).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], "renamed");
    }

    #[tokio::test]
    async fn delete_removes_matching_documents() {
        let catalog = InMemoryCatalog::default();
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "name": "orders"}))
            .await
            .unwrap();
        catalog.delete("tables", &key).await.unwrap();

        let found = catalog.find("tables", &key).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn compare_and_swap_succeeds_when_expected_matches() {
        let catalog = InMemoryCatalog::default();
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "current_commit_sha": "a"}))
            .await
            .unwrap();

        let swapped = catalog
            .compare_and_swap(
                "tables",
                &key,
                "current_commit_sha",
                Some("a"),
                json!({"table_id": "t1", "current_commit_sha": "b"}),
            )
            .await
            .unwrap();
        assert!(swapped);

        let found = catalog.find("tables", &key).await.unwrap();
        assert_eq!(found[0]["current_commit_sha"], "b");
    }

    #[tokio::test]
    async fn compare_and_swap_fails_and_leaves_document_untouched_when_stale() {
        let catalog = InMemoryCatalog::default();
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "current_commit_sha": "a"}))
            .await
            .unwrap();

        // A second writer landed "b" first; this caller is still racing
        // against the stale read of "a" and must lose.
        catalog
            .compare_and_swap(
                "tables",
                &key,
                "current_commit_sha",
                Some("a"),
                json!({"table_id": "t1", "current_commit_sha": "b"}),
            )
            .await
            .unwrap();

        let swapped = catalog
            .compare_and_swap(
                "tables",
                &key,
                "current_commit_sha",
                Some("a"),
                json!({"table_id": "t1", "current_commit_sha": "c"}),
            )
            .await
            .unwrap();
        assert!(!swapped);

        let found = catalog.find("tables", &key).await.unwrap();
        assert_eq!(found[0]["current_commit_sha"], "b");
    }

    #[tokio::test]
    async fn compare_and_swap_inserts_when_expecting_absence() {
        let catalog = InMemoryCatalog::default();
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());

        let swapped = catalog
            .compare_and_swap(
                "tables",
                &key,
                "current_commit_sha",
                None,
                json!({"table_id": "t1", "current_commit_sha": "a"}),
            )
            .await
            .unwrap();
        assert!(swapped);

        let found = catalog.find("tables", &key).await.unwrap();
        assert_eq!(found[0]["current_commit_sha"], "a");
    }

    #[tokio::test]
    async fn many_concurrent_compare_and_swaps_against_the_same_parent_have_exactly_one_winner() {
        use std::sync::Arc;

        let catalog = Arc::new(InMemoryCatalog::default());
        let mut key = Filter::new();
        key.insert("table_id".to_string(), "t1".to_string());
        catalog
            .upsert("tables", &key, json!({"table_id": "t1", "current_commit_sha": "parent"}))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let catalog = catalog.clone();
            let mut key = Filter::new();
            key.insert("table_id".to_string(), "t1".to_string());
            handles.push(tokio::spawn(async move {
                catalog
                    .compare_and_swap(
                        "tables",
                        &key,
                        "current_commit_sha",
                        Some("parent"),
                        json!({"table_id": "t1", "current_commit_sha": format!("child-{i}")}),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one concurrent compare-and-swap should win");
    }
}
