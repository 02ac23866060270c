/*!
Owner catalog entries and subscriptions
*/

use serde_derive::{Deserialize, Serialize};

use crate::identifier::validate_identifier;
use crate::error::Result;

/// Whether an owner is an individual user or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerType {
    Organization,
    Individual,
}

/// Event kinds an owner may dispatch subscriptions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OwnerEvent {
    TableCreated,
    TableDeleted,
    ViewCreated,
    ViewDeleted,
}

/// A subscriber registered against one event kind of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription<Event> {
    pub user: String,
    pub event: Event,
    pub url: String,
}

/// Catalog entry for an owner (user or organization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub name: String,
    pub owner_id: String,
    #[serde(rename = "type")]
    pub owner_type: OwnerType,
    pub steward: String,
    #[serde(default)]
    pub memberships: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
    #[serde(default)]
    pub subscriptions: Vec<Subscription<OwnerEvent>>,
}

impl Owner {
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_owner_name() {
        let owner = Owner {
            name: "9bad".to_string(),
            owner_id: "o1".to_string(),
            owner_type: OwnerType::Individual,
            steward: "alice".to_string(),
            memberships: vec![],
            description: String::new(),
            created_at: 0,
            subscriptions: vec![],
        };
        assert!(owner.validate().is_err());
    }
}
