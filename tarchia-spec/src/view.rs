/*!
View catalog entries

Views are not mutated by the commit engine; this model exists because the
event dispatcher's `ViewCreated`/`ViewDeleted` kinds reference it and the
catalog interface is collection-keyed across tables, owners and views.
*/

use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifier::validate_identifier;
use crate::error::Result;

/// Catalog entry for a view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
    pub view_id: String,
    pub name: String,
    pub owner: String,
    pub steward: String,
    pub statement: String,
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, Value>,
    pub created_at: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_format_version")]
    pub format_version: u32,
}

fn default_format_version() -> u32 {
    1
}

impl View {
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)
    }
}
