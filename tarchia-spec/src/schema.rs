/*!
Schemas, columns and the schema-evolution predicate
*/

use std::collections::HashSet;

use serde_derive::{Deserialize, Serialize};

use crate::identifier::validate_identifier;
use crate::error::{Error, Result};

/// Closed set of column types a table schema may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    Timestamp,
    TimestampTZ,
    String,
    Uuid,
    Binary,
}

impl ColumnType {
    /// Type changes allowed without a rewrite of existing data.
    fn widens_to(self, other: Self) -> bool {
        matches!(
            (self, other),
            (ColumnType::Int, ColumnType::Double)
                | (ColumnType::Long, ColumnType::Double)
                | (ColumnType::Boolean, ColumnType::Int)
                | (ColumnType::Boolean, ColumnType::Long)
                | (ColumnType::Date, ColumnType::Timestamp)
        )
    }
}

/// A single column in a table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Column {
    /// Validates the column name against the shared identifier pattern.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)
    }

    /// All names this column is known by: its current name plus aliases.
    fn name_and_aliases(&self) -> HashSet<&str> {
        let mut names: HashSet<&str> = self.aliases.iter().map(String::as_str).collect();
        names.insert(&self.name);
        names
    }
}

/// A table schema: an ordered list of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    /// Validates every column name in the schema.
    pub fn validate(&self) -> Result<()> {
        for column in &self.columns {
            column.validate()?;
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Checks whether `to` is a legal evolution of `from`.
///
/// - Added columns must carry a non-null default.
/// - Renamed columns must record their old name as an alias.
/// - No alias may map to two different old names, and the union of every
///   column's name and aliases must stay unique across the schema.
/// - Type changes are only legal along the fixed widening whitelist.
pub fn validate_transition(from: &Schema, to: &Schema) -> Result<()> {
    check_unique_names_and_aliases(to)?;

    for new_column in &to.columns {
        let predecessors = find_predecessors(from, new_column);
        match predecessors.as_slice() {
            [] => {
                if new_column.default.is_none() {
                    return Err(Error::SchemaEvolution(format!(
                        "added column {} requires a non-null default",
                        new_column.name
                    )));
                }
            }
            [old_column] => {
                if old_column.data_type != new_column.data_type
                    && !old_column.data_type.widens_to(new_column.data_type)
                {
                    return Err(Error::SchemaEvolution(format!(
                        "column {} cannot change type from {:?} to {:?}",
                        new_column.name, old_column.data_type, new_column.data_type
                    )));
                }
            }
            _ => {
                return Err(Error::SchemaEvolution(format!(
                    "column {} cannot alias multiple old columns",
                    new_column.name
                )));
            }
        }
    }

    // A column present in `from` but absent from `to`, and not claimed as
    // an alias by any surviving column, is simply dropped: the predicate
    // has no rule against this (only collisions and ambiguous renames are
    // rejected), matching the original validator's behavior.

    Ok(())
}

/// Every old column `new_column` could be a continuation of: its own name,
/// or any old column named in its `aliases`. More than one distinct match
/// means the rename target is ambiguous.
fn find_predecessors<'a>(from: &'a Schema, new_column: &Column) -> Vec<&'a Column> {
    let mut matches: Vec<&Column> = from
        .columns
        .iter()
        .filter(|old| old.name == new_column.name || new_column.aliases.iter().any(|a| a == &old.name))
        .collect();
    matches.dedup_by(|a, b| a.name == b.name);
    matches
}

fn check_unique_names_and_aliases(schema: &Schema) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for column in &schema.columns {
        for name in column.name_and_aliases() {
            if !seen.insert(name) {
                return Err(Error::SchemaEvolution(format!(
                    "name or alias {} is used by more than one column",
                    name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, ty: ColumnType) -> Column {
        Column {
            name: name.to_string(),
            default: None,
            data_type: ty,
            required: false,
            description: String::new(),
            aliases: vec![],
        }
    }

    #[test]
    fn added_column_needs_default() {
        let from = Schema { columns: vec![col("a", ColumnType::Int)] };
        let mut added = col("b", ColumnType::Int);
        let to_missing_default = Schema { columns: vec![col("a", ColumnType::Int), added.clone()] };
        assert!(validate_transition(&from, &to_missing_default).is_err());

        added.default = Some(serde_json::json!(0));
        let to_with_default = Schema { columns: vec![col("a", ColumnType::Int), added] };
        assert!(validate_transition(&from, &to_with_default).is_ok());
    }

    #[test]
    fn rename_requires_old_name_as_alias() {
        let from = Schema { columns: vec![col("old_name", ColumnType::String)] };
        let mut renamed = col("new_name", ColumnType::String);
        let bad = Schema { columns: vec![renamed.clone()] };
        assert!(validate_transition(&from, &bad).is_err());

        renamed.aliases = vec!["old_name".to_string()];
        let good = Schema { columns: vec![renamed] };
        assert!(validate_transition(&from, &good).is_ok());
    }

    #[test]
    fn widening_type_changes_allowed() {
        let from = Schema { columns: vec![col("n", ColumnType::Int)] };
        let to = Schema { columns: vec![col("n", ColumnType::Double)] };
        assert!(validate_transition(&from, &to).is_ok());
    }

    #[test]
    fn narrowing_type_changes_rejected() {
        let from = Schema { columns: vec![col("n", ColumnType::Double)] };
        let to = Schema { columns: vec![col("n", ColumnType::Int)] };
        assert!(validate_transition(&from, &to).is_err());
    }

    #[test]
    fn duplicate_alias_rejected() {
        let from = Schema { columns: vec![] };
        let mut a = col("a", ColumnType::Int);
        a.default = Some(serde_json::json!(0));
        a.aliases = vec!["shared".to_string()];
        let mut b = col("b", ColumnType::Int);
        b.default = Some(serde_json::json!(0));
        b.aliases = vec!["shared".to_string()];
        let to = Schema { columns: vec![a, b] };
        assert!(validate_transition(&from, &to).is_err());
    }

    #[test]
    fn dropping_a_column_without_renaming_is_silently_allowed() {
        // Neither spec.md §4.6 nor the original validator forbids a plain
        // drop: only collisions and ambiguous renames are rejected.
        let from = Schema { columns: vec![col("a", ColumnType::Int), col("gone", ColumnType::String)] };
        let to = Schema { columns: vec![col("a", ColumnType::Int)] };
        assert!(validate_transition(&from, &to).is_ok());
    }

    #[test]
    fn one_column_cannot_claim_two_old_names() {
        let from = Schema {
            columns: vec![col("old_a", ColumnType::String), col("old_b", ColumnType::String)],
        };
        let mut merged = col("merged", ColumnType::String);
        merged.aliases = vec!["old_a".to_string(), "old_b".to_string()];
        let to = Schema { columns: vec![merged] };
        assert!(validate_transition(&from, &to).is_err());
    }
}
