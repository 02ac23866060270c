/*!
In-flight transaction state
*/

use serde_derive::{Deserialize, Serialize};

use crate::schema::Schema;

/// Column-level encryption metadata carried by a table or transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionDetails {
    pub algorithm: String,
    pub key_id: String,
    pub fields: Vec<String>,
}

/// A transaction accumulating file additions and deletions against a
/// parent commit, before it is committed or aborted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub expires_at: i64,
    pub table_id: String,
    pub table: String,
    pub owner: String,
    #[serde(default)]
    pub encryption: Option<EncryptionDetails>,
    pub table_schema: Schema,
    #[serde(default)]
    pub parent_commit_sha: Option<String>,
    #[serde(default)]
    pub additions: Vec<String>,
    #[serde(default)]
    pub deletions: Vec<String>,
    #[serde(default)]
    pub truncate: bool,
}

impl Transaction {
    /// Whether the transaction has staged no additions and no deletions.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }
}
