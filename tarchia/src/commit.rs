/*!
The commit engine: the transactional state machine that turns staged file
additions/deletions into a new immutable manifest and atomically advances a
table's commit history.

Five operations form the transaction lifecycle (`start`, `stage`,
`truncate`, `abort`, `commit`); schema evolution is an adjacent operation on
the same [`Engine`] that mutates the catalog entry directly, without
producing a commit.
*/

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tarchia_spec::commit::Commit;
use tarchia_spec::manifest::ManifestEntry;
use tarchia_spec::schema::{self, Schema};
use tarchia_spec::table::{Table, TableEvent};
use tarchia_spec::transaction::Transaction;

use crate::catalog::{Catalog, Filter};
use crate::envelope::{encode_and_sign, verify_and_decode};
use crate::error::{Error, Result};
use crate::events::{Delivery, EventDispatcher};
use crate::history::HistoryTree;
use crate::manifest_codec::{build_manifest_entry, get_manifest, write_manifest, xor_checksums};
use crate::paths::{self, MAIN_BRANCH};
use crate::storage::Storage;

/// The outcome of a successful [`Engine::commit`]: the new head and the
/// URL a client can use to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub commit_sha: String,
    pub url: String,
}

/// Composes [`Storage`], [`Catalog`] and the transaction envelope into the
/// commit lifecycle. One `Engine` serves every table; per-table state lives
/// entirely in the catalog and storage backends it is handed.
pub struct Engine {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn Catalog>,
    dispatcher: EventDispatcher,
    signer_key: Vec<u8>,
    metadata_root: String,
}

impl Engine {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn Catalog>,
        dispatcher: EventDispatcher,
        signer_key: Vec<u8>,
        metadata_root: impl Into<String>,
    ) -> Self {
        Self { storage, catalog, dispatcher, signer_key, metadata_root: metadata_root.into() }
    }

    /// Starts a transaction against `parent`, which is either a commit sha
    /// or the literal `"head"`. Returns the signed envelope.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, owner: &str, table_name: &str, parent: &str) -> Result<String> {
        let table = self.load_table(owner, table_name).await?;

        let parent_commit_sha = if parent == "head" {
            table.current_commit_sha.clone()
        } else {
            Some(parent.to_string())
        };

        let (table_schema, encryption) = match &parent_commit_sha {
            Some(sha) => {
                let commit = self.load_commit(&table, sha).await?.ok_or_else(|| {
                    Error::Transaction(format!("parent commit {sha} not found"))
                })?;
                (commit.table_schema, commit.encryption)
            }
            None => (table.table_schema.clone(), None),
        };

        let now = Utc::now().timestamp();
        let transaction = Transaction {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            expires_at: now,
            table_id: table.table_id.clone(),
            table: table.name.clone(),
            owner: table.owner.clone(),
            encryption,
            table_schema,
            parent_commit_sha,
            additions: Vec::new(),
            deletions: Vec::new(),
            truncate: false,
        };

        encode_and_sign(&transaction, &self.signer_key)
    }

    /// Appends `paths` to the transaction's staged additions and re-signs
    /// it. Performs no Storage I/O.
    pub fn stage(&self, envelope: &str, paths: Vec<String>) -> Result<String> {
        let mut transaction = self.decode(envelope)?;
        transaction.additions.extend(paths);
        encode_and_sign(&transaction, &self.signer_key)
    }

    /// Marks the transaction as a full truncate of the table's file set.
    /// Additions must be empty beforehand: truncation and staged additions
    /// are exclusive, so a caller who staged first must re-`start`.
    pub fn truncate(&self, envelope: &str) -> Result<String> {
        let mut transaction = self.decode(envelope)?;
        if !transaction.additions.is_empty() {
            return Err(Error::Transaction(
                "cannot truncate a transaction with staged additions".to_string(),
            ));
        }
        transaction.truncate = true;
        transaction.additions.clear();
        transaction.deletions.clear();
        encode_and_sign(&transaction, &self.signer_key)
    }

    /// No-op; exists for conceptual completeness of the transaction
    /// lifecycle (a transaction the client discards needs no server call).
    pub fn abort(&self, envelope: &str) -> Result<()> {
        self.decode(envelope)?;
        Ok(())
    }

    /// The serialization point: validates the fast-forward precondition,
    /// builds the new manifest, writes the commit and history blobs, and
    /// advances the catalog entry. Fires `NEW_COMMIT` on success.
    #[tracing::instrument(skip(self, envelope))]
    pub async fn commit(&self, envelope: &str, message: &str) -> Result<CommitResult> {
        let transaction = self.decode(envelope)?;
        let table = self.load_table_by_id(&transaction.owner, &transaction.table_id).await?;
        tracing::info!(owner = %transaction.owner, table = %transaction.table, "starting commit");

        // Open Question 2 (spec.md §9): a transaction with a null parent
        // skips the fast-forward check entirely, so an "initial" transaction
        // can clobber a non-empty table. Preserved as observed.
        // TODO: require `table.current_commit_sha == transaction.parent_commit_sha`
        // unconditionally, including when parent_commit_sha is null.
        if let Some(parent) = &transaction.parent_commit_sha {
            if table.current_commit_sha.as_deref() != Some(parent.as_str()) {
                return Err(Error::Transaction("Commit out of date".to_string()));
            }
        }

        let old_manifest_path = match &transaction.parent_commit_sha {
            Some(sha) => self.load_commit(&table, sha).await?.and_then(|c| c.manifest_path),
            None => None,
        };
        let old_entries = if transaction.truncate {
            Vec::new()
        } else {
            get_manifest(old_manifest_path.as_deref(), self.storage.as_ref(), &[]).await?
        };

        let deletions: HashSet<&str> = transaction.deletions.iter().map(String::as_str).collect();
        let mut kept: Vec<ManifestEntry> = old_entries
            .into_iter()
            .filter(|entry| !deletions.contains(entry.file_path.as_str()))
            .collect();
        let present: HashSet<String> = kept.iter().map(|e| e.file_path.clone()).collect();

        for path in &transaction.additions {
            if present.contains(path) || deletions.contains(path.as_str()) {
                continue;
            }
            let entry = build_manifest_entry(path, &transaction.table_schema).await?;
            kept.push(entry);
        }

        let manifests_root =
            paths::manifests_root(&self.metadata_root, &transaction.owner, &transaction.table_id);
        let manifest_path = if kept.is_empty() {
            None
        } else {
            let manifest_path = paths::manifest_path(&manifests_root, &uuid::Uuid::new_v4().to_string());
            write_manifest(&manifest_path, self.storage.as_ref(), &kept).await?;
            Some(manifest_path)
        };

        let checksums: Vec<String> = kept.iter().map(|e| e.sha256_checksum.clone()).collect();
        let data_hash = xor_checksums(&checksums)?;

        let now_ms = Utc::now().timestamp_millis();
        let commit = Commit::new(
            data_hash,
            /* user */ "system".to_string(),
            message.to_string(),
            MAIN_BRANCH.to_string(),
            transaction.parent_commit_sha.clone(),
            now_ms,
            manifest_path,
            transaction.table_schema.clone(),
            transaction.encryption.clone(),
            transaction.additions.clone(),
            transaction.deletions.clone(),
        );

        let commits_root =
            paths::commits_root(&self.metadata_root, &transaction.owner, &transaction.table_id);
        let commit_path = paths::commit_path(&commits_root, &commit.commit_sha);
        self.storage
            .write_blob(&commit_path, serde_json::to_vec(&commit)?)
            .await?;

        let history_root =
            paths::history_root(&self.metadata_root, &transaction.owner, &transaction.table_id);
        let mut history_tree = match &table.current_history {
            Some(location) => match self.storage.read_blob(location).await? {
                Some(bytes) => HistoryTree::from_avro(&bytes, MAIN_BRANCH)?,
                None => HistoryTree::new(MAIN_BRANCH),
            },
            None => HistoryTree::new(MAIN_BRANCH),
        };
        history_tree.commit(commit.history_entry());
        let history_path = paths::history_path(&history_root, &uuid::Uuid::new_v4().to_string());
        self.storage
            .write_blob(&history_path, history_tree.to_avro()?)
            .await?;

        // Linearization point: the fast-forward rule above only reads a
        // snapshot of `table` taken before the manifest/commit/history I/O
        // above ran, so another commit could have landed against the same
        // parent in the meantime. The write below re-checks
        // `current_commit_sha` against that same parent atomically with
        // the write itself, so exactly one of two racing commits against
        // the same parent succeeds; the loser gets `TransactionError`
        // rather than silently losing the winner's commit.
        let mut updated_table = table.clone();
        updated_table.current_commit_sha = Some(commit.commit_sha.clone());
        updated_table.current_history = Some(history_path);
        updated_table.last_updated_ms = now_ms;

        // Open Question 2 (spec.md §9): a null parent bypasses the
        // precondition here too, matching the early check above — the
        // write lands unconditionally rather than re-validated as a CAS.
        match &transaction.parent_commit_sha {
            Some(parent) => {
                let swapped = self.compare_and_swap_table(&updated_table, Some(parent.as_str())).await?;
                if !swapped {
                    return Err(Error::Transaction("Commit out of date".to_string()));
                }
            }
            None => self.save_table(&updated_table).await?,
        }
        tracing::info!(commit_sha = %commit.commit_sha, "commit landed");

        self.trigger_new_commit(&updated_table, &commit);

        Ok(CommitResult {
            commit_sha: commit.commit_sha.clone(),
            url: format!("/v1/tables/{}/{}/commits/{}", transaction.owner, transaction.table, commit.commit_sha),
        })
    }

    /// Validates `new_schema` as an evolution of the table's current schema
    /// and upserts the catalog entry directly. Produces no commit.
    pub async fn update_schema(&self, owner: &str, table_name: &str, new_schema: Schema) -> Result<()> {
        let mut table = self.load_table(owner, table_name).await?;
        schema::validate_transition(&table.table_schema, &new_schema)?;
        table.table_schema = new_schema;
        table.last_updated_ms = Utc::now().timestamp_millis();
        self.save_table(&table).await
    }

    fn decode(&self, envelope: &str) -> Result<Transaction> {
        let now = Utc::now().timestamp();
        verify_and_decode(envelope, &self.signer_key, now)
    }

    async fn load_table(&self, owner: &str, table_name: &str) -> Result<Table> {
        let mut filter = Filter::new();
        filter.insert("owner".to_string(), owner.to_string());
        filter.insert("name".to_string(), table_name.to_string());
        self.find_one_table(filter, owner, table_name).await
    }

    async fn load_table_by_id(&self, owner: &str, table_id: &str) -> Result<Table> {
        let mut filter = Filter::new();
        filter.insert("owner".to_string(), owner.to_string());
        filter.insert("table_id".to_string(), table_id.to_string());
        self.find_one_table(filter, owner, table_id).await
    }

    async fn find_one_table(&self, filter: Filter, owner: &str, hint: &str) -> Result<Table> {
        let documents = self.catalog.find("tables", &filter).await?;
        let document = documents
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound("table".to_string(), format!("{owner}/{hint}")))?;
        Ok(serde_json::from_value(document)?)
    }

    async fn save_table(&self, table: &Table) -> Result<()> {
        let mut key = Filter::new();
        key.insert("table_id".to_string(), table.table_id.clone());
        let document: Value = serde_json::to_value(table)?;
        self.catalog.upsert("tables", &key, document).await
    }

    /// Writes `table` only if the catalog's current `current_commit_sha`
    /// still equals `expected_parent`. Returns whether the write happened.
    async fn compare_and_swap_table(&self, table: &Table, expected_parent: Option<&str>) -> Result<bool> {
        let mut key = Filter::new();
        key.insert("table_id".to_string(), table.table_id.clone());
        let document: Value = serde_json::to_value(table)?;
        self.catalog
            .compare_and_swap("tables", &key, "current_commit_sha", expected_parent, document)
            .await
    }

    async fn load_commit(&self, table: &Table, sha: &str) -> Result<Option<Commit>> {
        let commits_root = paths::commits_root(&self.metadata_root, &table.owner, &table.table_id);
        let commit_path = paths::commit_path(&commits_root, sha);
        match self.storage.read_blob(&commit_path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn trigger_new_commit(&self, table: &Table, commit: &Commit) {
        let payload = json!({
            "event": "NEW_COMMIT",
            "owner": table.owner,
            "table": table.name,
            "table_id": table.table_id,
            "commit_sha": commit.commit_sha,
        });
        for subscription in &table.subscriptions {
            if subscription.event == TableEvent::NewCommit {
                self.dispatcher.notify(Delivery { url: subscription.url.clone(), payload: payload.clone() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutils::InMemoryCatalog;
    use crate::storage::testutils::MemoryStorage;
    use tarchia_spec::schema::{Column, ColumnType};
    use tarchia_spec::table::{TableDisposition, TableVisibility};

    fn test_schema() -> Schema {
        Schema {
            columns: vec![Column {
                name: "id".to_string(),
                default: None,
                data_type: ColumnType::Long,
                required: false,
                description: String::new(),
                aliases: vec![],
            }],
        }
    }

    async fn seed_table(engine: &Engine, table_id: &str) -> Table {
        let table = Table {
            name: "orders".to_string(),
            steward: "alice".to_string(),
            owner: "acme".to_string(),
            table_id: table_id.to_string(),
            location: Some("memory://orders".to_string()),
            partitioning: None,
            last_updated_ms: 0,
            freshness_life_in_days: 0,
            retention_in_days: 0,
            permissions: vec![],
            visibility: TableVisibility::Private,
            description: String::new(),
            current_commit_sha: None,
            current_history: None,
            format_version: 1,
            disposition: TableDisposition::Snapshot,
            metadata: Default::default(),
            created_at: 0,
            table_schema: test_schema(),
            subscriptions: vec![],
        };
        engine.save_table(&table).await.unwrap();
        table
    }

    fn new_engine() -> Engine {
        let storage = Arc::new(MemoryStorage::default());
        let catalog = Arc::new(InMemoryCatalog::default());
        let dispatcher = EventDispatcher::spawn(reqwest::Client::new());
        Engine::new(storage, catalog, dispatcher, b"test-signer".to_vec(), "root".to_string())
    }

    #[tokio::test]
    async fn initial_commit_with_no_additions_has_no_manifest() {
        let engine = new_engine();
        seed_table(&engine, "t1").await;

        let envelope = engine.start("acme", "orders", "head").await.unwrap();
        let result = engine.commit(&envelope, "first commit").await.unwrap();

        let table = engine.load_table("acme", "orders").await.unwrap();
        assert_eq!(table.current_commit_sha.as_deref(), Some(result.commit_sha.as_str()));
    }

    #[tokio::test]
    async fn truncate_after_staged_additions_is_rejected() {
        let engine = new_engine();
        seed_table(&engine, "t1").await;

        let envelope = engine.start("acme", "orders", "head").await.unwrap();
        let envelope = engine.stage(&envelope, vec!["memory://a.parquet".to_string()]).unwrap();
        assert!(engine.truncate(&envelope).is_err());
    }

    #[tokio::test]
    async fn concurrent_commits_against_same_parent_exactly_one_wins() {
        let engine = new_engine();
        seed_table(&engine, "t1").await;

        let first = engine.start("acme", "orders", "head").await.unwrap();
        engine.commit(&first, "first").await.unwrap();

        // Two transactions both start from the same (now non-null) head.
        let envelope_a = engine.start("acme", "orders", "head").await.unwrap();
        let envelope_b = engine.start("acme", "orders", "head").await.unwrap();

        engine.commit(&envelope_a, "second").await.unwrap();
        let loser = engine.commit(&envelope_b, "conflicting second").await;
        assert!(loser.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn truly_concurrent_commits_against_same_parent_have_exactly_one_winner() {
        let engine = Arc::new(new_engine());
        seed_table(&engine, "t1").await;

        let first = engine.start("acme", "orders", "head").await.unwrap();
        engine.commit(&first, "first").await.unwrap();

        let mut handles = Vec::new();
        for message in ["from task a", "from task b", "from task c", "from task d"] {
            let engine = engine.clone();
            let envelope = engine.start("acme", "orders", "head").await.unwrap();
            handles.push(tokio::spawn(async move { engine.commit(&envelope, message).await }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        // The CAS at the linearization point guarantees exactly one winner
        // even when every commit races against the same stale read of the
        // parent; the rest must observe `current_commit_sha` has moved and
        // fail with `TransactionError` instead of silently overwriting it.
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn null_parent_transaction_can_clobber_a_non_empty_table() {
        // Open Question 2 (spec.md §9): the fast-forward check is skipped
        // whenever the transaction's parent is null, so a transaction
        // started before any commits existed can still land after the
        // table has moved on. Preserved, not "fixed".
        let engine = new_engine();
        seed_table(&engine, "t1").await;

        let stale_initial = engine.start("acme", "orders", "head").await.unwrap();
        let first = engine.start("acme", "orders", "head").await.unwrap();
        engine.commit(&first, "first").await.unwrap();

        assert!(engine.commit(&stale_initial, "clobbers the head").await.is_ok());
    }

    #[tokio::test]
    async fn schema_evolution_without_default_is_rejected() {
        let engine = new_engine();
        seed_table(&engine, "t1").await;

        let mut evolved = test_schema();
        evolved.columns.push(Column {
            name: "total".to_string(),
            default: None,
            data_type: ColumnType::Double,
            required: false,
            description: String::new(),
            aliases: vec![],
        });

        assert!(engine.update_schema("acme", "orders", evolved).await.is_err());
    }

    #[tokio::test]
    async fn schema_evolution_with_default_is_applied() {
        let engine = new_engine();
        seed_table(&engine, "t1").await;

        let mut evolved = test_schema();
        evolved.columns.push(Column {
            name: "total".to_string(),
            default: Some(serde_json::json!(0)),
            data_type: ColumnType::Double,
            required: false,
            description: String::new(),
            aliases: vec![],
        });

        engine.update_schema("acme", "orders", evolved.clone()).await.unwrap();
        let table = engine.load_table("acme", "orders").await.unwrap();
        assert_eq!(table.table_schema, evolved);
    }
}
