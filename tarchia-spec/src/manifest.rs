/*!
Manifest entry records and the pruning predicate

Building and (de)serializing manifests belongs to the engine crate, since
that requires Storage and Avro I/O; this module holds the pure data shape
and the predicate that decides whether an entry can be skipped for a given
filter, using only the orderable-integer bounds already stored on it.
*/

use std::collections::HashMap;

use serde_derive::{Deserialize, Serialize};

/// Whether a manifest entry points at a data file or at a nested manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryType {
    Data,
    Manifest,
}

/// A single row in a manifest: either a data file with column statistics,
/// or a pointer to a nested manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_path: String,
    pub file_format: String,
    pub file_type: EntryType,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub record_count: u64,
    #[serde(default)]
    pub sha256_checksum: String,
    #[serde(default)]
    pub lower_bounds: HashMap<String, i64>,
    #[serde(default)]
    pub upper_bounds: HashMap<String, i64>,
}

/// A comparison operator applied to a single column's orderable bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// One parsed filter term: `column <op> value`, value already packed
/// through `to_int`.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: String,
    pub operator: Operator,
    pub value: i64,
}

/// Decides whether `entry` can be skipped entirely for `filters`.
///
/// An absent bound never prunes: the entry's statistics are treated as
/// unknown rather than excluding, so a missing lower or upper bound always
/// keeps the entry.
pub fn prune(entry: &ManifestEntry, filters: &[Filter]) -> bool {
    for filter in filters {
        let lower = entry.lower_bounds.get(&filter.column);
        let upper = entry.upper_bounds.get(&filter.column);

        match filter.operator {
            Operator::Eq => {
                if let (Some(&lo), Some(&hi)) = (lower, upper) {
                    if lo > filter.value || hi < filter.value {
                        return true;
                    }
                }
            }
            Operator::Gt | Operator::Gte => {
                if let Some(&hi) = upper {
                    if hi < filter.value {
                        return true;
                    }
                }
            }
            Operator::Lt | Operator::Lte => {
                if let Some(&lo) = lower {
                    if lo > filter.value {
                        return true;
                    }
                }
            }
        }
    }
    false
}
