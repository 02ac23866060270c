/*!
Process-wide configuration, read once at startup.

Environment variables override a config file (out of scope here: this
struct is the merged result a caller hands to [`crate::commit::Engine`]).
Every field the commit engine itself does not act on (`port`, `auth_token`,
the provider selectors) is still carried, since the HTTP layer that
composes this crate needs them and the merge logic belongs in one place.
*/

use std::env;

use crate::error::{Error, Result};

/// Selects which `Catalog` backend a deployment wires up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogProvider {
    Development,
    Firestore,
    Other(String),
}

/// Selects which `Storage` backend a deployment wires up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    Local,
    Google,
    S3,
    Other(String),
}

impl From<String> for CatalogProvider {
    fn from(value: String) -> Self {
        match value.as_str() {
            "DEVELOPMENT" => CatalogProvider::Development,
            "FIRESTORE" => CatalogProvider::Firestore,
            _ => CatalogProvider::Other(value),
        }
    }
}

impl From<String> for StorageProvider {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LOCAL" => StorageProvider::Local,
            "GOOGLE" => StorageProvider::Google,
            "S3" => StorageProvider::S3,
            _ => StorageProvider::Other(value),
        }
    }
}

/// Merged process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub catalog_provider: CatalogProvider,
    pub catalog_name: String,
    pub storage_provider: StorageProvider,
    pub metadata_root: String,
    pub transaction_signer: Vec<u8>,
    pub port: u16,
    pub auth_token: Option<String>,
}

impl Config {
    /// Reads configuration from environment variables. `TRANSACTION_SIGNER`
    /// and `METADATA_ROOT` are required; everything else defaults.
    pub fn from_env() -> Result<Self> {
        let transaction_signer = env::var("TRANSACTION_SIGNER")
            .map_err(|_| Error::Transaction("TRANSACTION_SIGNER is not set".to_string()))?
            .into_bytes();
        let metadata_root = env::var("METADATA_ROOT")
            .map_err(|_| Error::Transaction("METADATA_ROOT is not set".to_string()))?;

        Ok(Self {
            catalog_provider: env::var("CATALOG_PROVIDER")
                .unwrap_or_else(|_| "DEVELOPMENT".to_string())
                .into(),
            catalog_name: env::var("CATALOG_NAME").unwrap_or_else(|_| "tarchia".to_string()),
            storage_provider: env::var("STORAGE_PROVIDER")
                .unwrap_or_else(|_| "LOCAL".to_string())
                .into(),
            metadata_root,
            transaction_signer,
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            auth_token: env::var("AUTH_TOKEN").ok(),
        })
    }
}
