/*!
Table catalog entries
*/

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifier::validate_identifier;
use crate::owner::Subscription;
use crate::schema::Schema;
use crate::error::Result;

/// Permission level granted to a role on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolePermission {
    Read,
    Write,
    Own,
}

/// A role/permission pair attached to a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetPermission {
    pub role: String,
    pub permission: RolePermission,
}

/// How a table's data is produced and maintained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableDisposition {
    Snapshot,
    Continuous,
    External,
}

/// Who may see a table exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableVisibility {
    Private,
    Internal,
    Public,
}

/// Event kinds a table may dispatch subscriptions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableEvent {
    NewCommit,
}

/// The catalog entry for a table, as stored in the `tables` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub steward: String,
    pub owner: String,
    pub table_id: String,
    pub location: Option<String>,
    #[serde(default)]
    pub partitioning: Option<Vec<String>>,
    pub last_updated_ms: i64,
    pub freshness_life_in_days: i64,
    pub retention_in_days: i64,
    #[serde(default)]
    pub permissions: Vec<DatasetPermission>,
    pub visibility: TableVisibility,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub current_commit_sha: Option<String>,
    #[serde(default)]
    pub current_history: Option<String>,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub disposition: TableDisposition,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, Value>,
    pub created_at: i64,
    pub table_schema: Schema,
    #[serde(default)]
    pub subscriptions: Vec<Subscription<TableEvent>>,
}

fn default_format_version() -> u32 {
    1
}

impl Table {
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        self.table_schema.validate()
    }
}
