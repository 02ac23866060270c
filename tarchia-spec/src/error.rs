/*!
Error type for the Tarchia data model
*/

use thiserror::Error;

#[derive(Error, Debug)]
/// Data-model validation error
pub enum Error {
    /// Identifier does not match the allowed pattern
    #[error("{0} is not a valid identifier")]
    InvalidIdentifier(String),
    /// Schema evolution rejected a transition
    #[error("schema evolution rejected: {0}")]
    SchemaEvolution(String),
    /// Column not found in schema
    #[error("column {0} not found in schema")]
    ColumnNotFound(String),
    /// Conversion error
    #[error("failed to convert {0} to {1}")]
    Conversion(String, String),
    /// Chrono parse error
    #[error("chrono parse error")]
    Chrono(#[from] chrono::ParseError),
    /// Serde json error
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),
    /// Uuid error
    #[error("uuid error")]
    Uuid(#[from] uuid::Error),
}

/// Result type for the data model
pub type Result<T> = std::result::Result<T, Error>;
