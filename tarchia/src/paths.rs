/*!
Storage path layout for commits, manifests and history
*/

/// Default branch name when a table has no explicit branch.
pub const MAIN_BRANCH: &str = "main";

/// Builds `{metadata_root}/{owner}/{table_id}/metadata/commits`.
pub fn commits_root(metadata_root: &str, owner: &str, table_id: &str) -> String {
    format!("{metadata_root}/{owner}/{table_id}/metadata/commits")
}

/// Builds `{metadata_root}/{owner}/{table_id}/metadata/manifests`.
pub fn manifests_root(metadata_root: &str, owner: &str, table_id: &str) -> String {
    format!("{metadata_root}/{owner}/{table_id}/metadata/manifests")
}

/// Builds `{metadata_root}/{owner}/{table_id}/metadata/history`.
pub fn history_root(metadata_root: &str, owner: &str, table_id: &str) -> String {
    format!("{metadata_root}/{owner}/{table_id}/metadata/history")
}

pub fn commit_path(commits_root: &str, commit_sha: &str) -> String {
    format!("{commits_root}/commit-{commit_sha}.json")
}

pub fn manifest_path(manifests_root: &str, uuid: &str) -> String {
    format!("{manifests_root}/manifest-{uuid}.avro")
}

pub fn history_path(history_root: &str, uuid: &str) -> String {
    format!("{history_root}/history-{uuid}.avro")
}
