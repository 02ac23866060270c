/*!
Commit and history-entry records
*/

use serde_derive::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::schema::Schema;
use crate::transaction::EncryptionDetails;

/// A single, immutable commit against a table's history.
///
/// `commit_sha` is computed by [`Commit::new`] from the other fields and is
/// never set directly: `sha256(data_hash || message || user || branch ||
/// last_updated_ms || parent_commit_sha?)`, hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub data_hash: String,
    pub user: String,
    pub message: String,
    pub branch: String,
    pub parent_commit_sha: Option<String>,
    pub last_updated_ms: i64,
    pub manifest_path: Option<String>,
    pub table_schema: Schema,
    #[serde(default)]
    pub encryption: Option<EncryptionDetails>,
    pub commit_sha: String,
    #[serde(default)]
    pub added_files: Vec<String>,
    #[serde(default)]
    pub removed_files: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
impl Commit {
    /// Builds a commit, deriving `commit_sha` from its other fields.
    pub fn new(
        data_hash: String,
        user: String,
        message: String,
        branch: String,
        parent_commit_sha: Option<String>,
        last_updated_ms: i64,
        manifest_path: Option<String>,
        table_schema: Schema,
        encryption: Option<EncryptionDetails>,
        added_files: Vec<String>,
        removed_files: Vec<String>,
    ) -> Self {
        let commit_sha = calculate_hash(
            &data_hash,
            &message,
            &user,
            &branch,
            last_updated_ms,
            parent_commit_sha.as_deref(),
        );
        Self {
            data_hash,
            user,
            message,
            branch,
            parent_commit_sha,
            last_updated_ms,
            manifest_path,
            table_schema,
            encryption,
            commit_sha,
            added_files,
            removed_files,
        }
    }

    /// The slimmed record stored in the history tree's Merkle structure.
    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            sha: self.commit_sha.clone(),
            branch: self.branch.clone(),
            message: self.message.clone(),
            user: self.user.clone(),
            timestamp: self.last_updated_ms,
            parent_sha: self.parent_commit_sha.clone(),
        }
    }
}

fn calculate_hash(
    data_hash: &str,
    message: &str,
    user: &str,
    branch: &str,
    last_updated_ms: i64,
    parent_commit_sha: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data_hash.as_bytes());
    hasher.update(message.as_bytes());
    hasher.update(user.as_bytes());
    hasher.update(branch.as_bytes());
    hasher.update(last_updated_ms.to_string().as_bytes());
    if let Some(parent) = parent_commit_sha {
        hasher.update(parent.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// The record a [`Commit`] contributes to the history tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub sha: String,
    pub branch: String,
    pub message: String,
    pub user: String,
    pub timestamp: i64,
    #[serde(default)]
    pub parent_sha: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn empty_schema() -> Schema {
        Schema { columns: vec![] }
    }

    #[test]
    fn commit_sha_is_deterministic() {
        let a = Commit::new(
            "hash".into(),
            "alice".into(),
            "msg".into(),
            "main".into(),
            None,
            1000,
            None,
            empty_schema(),
            None,
            vec![],
            vec![],
        );
        let b = Commit::new(
            "hash".into(),
            "alice".into(),
            "msg".into(),
            "main".into(),
            None,
            1000,
            None,
            empty_schema(),
            None,
            vec![],
            vec![],
        );
        assert_eq!(a.commit_sha, b.commit_sha);
    }

    #[test]
    fn commit_sha_changes_with_parent() {
        let a = Commit::new(
            "hash".into(),
            "alice".into(),
            "msg".into(),
            "main".into(),
            None,
            1000,
            None,
            empty_schema(),
            None,
            vec![],
            vec![],
        );
        let b = Commit::new(
            "hash".into(),
            "alice".into(),
            "msg".into(),
            "main".into(),
            Some("parent".into()),
            1000,
            None,
            empty_schema(),
            None,
            vec![],
            vec![],
        );
        assert_ne!(a.commit_sha, b.commit_sha);
    }
}
