/*!
Commit history as a branch-indexed arena, with a Merkle root over all
entries for tamper-evidence.
*/

use std::collections::HashMap;

use apache_avro::{Reader as AvroReader, Schema as AvroSchema, Writer as AvroWriter};
use sha2::{Digest, Sha256};
use tarchia_spec::commit::HistoryEntry;

use crate::error::{Error, Result};
use crate::paths::MAIN_BRANCH;

const HISTORY_SCHEMA: &str = r#"{
    "type": "record",
    "name": "Commit",
    "fields": [
        {"name": "sha", "type": "string"},
        {"name": "branch", "type": "string"},
        {"name": "message", "type": "string"},
        {"name": "user", "type": "string"},
        {"name": "timestamp", "type": "long"},
        {"name": "parent_sha", "type": ["null", "string"], "default": null}
    ]
}"#;

fn avro_schema() -> Result<AvroSchema> {
    AvroSchema::parse_str(HISTORY_SCHEMA).map_err(Error::from)
}

/// A table's commit history: an arena of entries plus, for each branch, the
/// arena index of its head entry.
pub struct HistoryTree {
    trunk_branch: String,
    entries: Vec<HistoryEntry>,
    branch_heads: HashMap<String, usize>,
}

impl HistoryTree {
    pub fn new(trunk_branch: impl Into<String>) -> Self {
        Self { trunk_branch: trunk_branch.into(), entries: Vec::new(), branch_heads: HashMap::new() }
    }

    /// Appends a commit to its branch's head.
    pub fn commit(&mut self, entry: HistoryEntry) {
        let branch = entry.branch.clone();
        self.entries.push(entry);
        self.branch_heads.insert(branch, self.entries.len() - 1);
    }

    pub fn branch_head(&self, branch: &str) -> Option<&HistoryEntry> {
        self.branch_heads.get(branch).map(|&idx| &self.entries[idx])
    }

    pub fn branches(&self) -> Vec<&str> {
        self.branch_heads.keys().map(String::as_str).collect()
    }

    /// Walks a branch from its head back to the root, following
    /// `parent_sha` links.
    pub fn walk_branch<'a>(&'a self, branch: &str) -> impl Iterator<Item = &'a HistoryEntry> + 'a {
        let start = self.branch_head(branch);
        WalkFromHead { tree: self, current: start }
    }

    fn entry_by_sha(&self, sha: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.sha == sha)
    }

    /// Builds the Merkle root over every entry's sha, folding the list
    /// pairwise until one hash remains. An odd-length level duplicates its
    /// last node before folding, matching the reference implementation.
    pub fn calculate_root_hash(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut nodes: Vec<String> = self.entries.iter().map(|e| e.sha.clone()).collect();
        while nodes.len() > 1 {
            if nodes.len() % 2 != 0 {
                nodes.push(nodes.last().unwrap().clone());
            }
            nodes = nodes
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], &pair[1]))
                .collect();
        }
        nodes.into_iter().next().unwrap()
    }

    /// Serializes every entry with the zstd-compressed Avro container
    /// format used for all Tarchia metadata blobs.
    pub fn to_avro(&self) -> Result<Vec<u8>> {
        let schema = avro_schema()?;
        let mut writer = AvroWriter::with_codec(&schema, Vec::new(), apache_avro::Codec::Zstandard);
        for entry in &self.entries {
            writer.append_ser(entry)?;
        }
        Ok(writer.into_inner()?)
    }

    /// Rebuilds a tree from its serialized entries. Branch heads are
    /// reconstructed by sorting entries by timestamp descending and taking
    /// the first entry seen per branch.
    pub fn from_avro(bytes: &[u8], trunk_branch: impl Into<String>) -> Result<Self> {
        let schema = avro_schema()?;
        let reader = AvroReader::with_schema(&schema, bytes)?;
        let mut entries: Vec<HistoryEntry> = reader
            .map(|value| apache_avro::from_value(&value?).map_err(Error::from))
            .collect::<Result<Vec<_>>>()?;

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut tree = Self::new(trunk_branch);
        let mut branch_heads = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            branch_heads.entry(entry.branch.clone()).or_insert(idx);
        }
        tree.entries = entries;
        tree.branch_heads = branch_heads;
        Ok(tree)
    }
}

impl Default for HistoryTree {
    fn default() -> Self {
        Self::new(MAIN_BRANCH)
    }
}

struct WalkFromHead<'a> {
    tree: &'a HistoryTree,
    current: Option<&'a HistoryEntry>,
}

impl<'a> Iterator for WalkFromHead<'a> {
    type Item = &'a HistoryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.current.take()?;
        self.current = entry
            .parent_sha
            .as_deref()
            .and_then(|parent| self.tree.entry_by_sha(parent));
        Some(entry)
    }
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    format!("{:x}", hasher.finalize())
}
