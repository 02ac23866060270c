/*!
Error type for the Tarchia commit engine
*/

use thiserror::Error;

#[derive(Error, Debug)]
/// Engine-level error
pub enum Error {
    /// Data model validation error
    #[error("data model error")]
    DataModel(#[from] tarchia_spec::Error),
    /// Entity not found in the catalog
    #[error("{0} {1} not found")]
    NotFound(String, String),
    /// Entity already exists in the catalog
    #[error("{0} {1} already exists")]
    AlreadyExists(String, String),
    /// Transaction envelope or lifecycle error
    #[error("transaction error: {0}")]
    Transaction(String),
    /// A data file fails to satisfy the table's schema, e.g. a required
    /// column with no default is absent from the file (spec.md §7's
    /// `DataEntryError` class — an input/validation error, distinct from a
    /// transaction-lifecycle error).
    #[error("data entry error: {0}")]
    DataEntry(String),
    /// Manifest tree recursed past its depth limit
    #[error("manifest depth exceeded")]
    ManifestDepthExceeded,
    /// Avro error
    #[error("avro error")]
    Avro(#[from] apache_avro::Error),
    /// Serde json error
    #[error("serde json error")]
    JSONSerde(#[from] serde_json::Error),
    /// Io error
    #[error("io error")]
    IO(#[from] std::io::Error),
    /// Object store error
    #[error("object store error")]
    ObjectStore(#[from] object_store::Error),
    /// Base64 decode error
    #[error("base64 decode error")]
    Base64Decode(#[from] base64::DecodeError),
    /// Parquet error
    #[error("parquet error")]
    Parquet(#[from] parquet::errors::ParquetError),
    /// Url parse error
    #[error("url parse error")]
    UrlParse(#[from] url::ParseError),
}

/// Result type for the commit engine
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP status family a (future, out-of-scope) routing layer should map this
/// error to. Lives on the error type because it is a property of the error,
/// not of routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusHint {
    BadRequest,
    NotFound,
    Conflict,
    UnprocessableEntity,
    InternalError,
}

impl Error {
    pub fn http_status_hint(&self) -> StatusHint {
        match self {
            Error::DataModel(tarchia_spec::Error::SchemaEvolution(_)) => {
                StatusHint::UnprocessableEntity
            }
            Error::DataModel(_) => StatusHint::UnprocessableEntity,
            Error::NotFound(..) => StatusHint::NotFound,
            Error::AlreadyExists(..) => StatusHint::Conflict,
            Error::Transaction(_) => StatusHint::BadRequest,
            Error::DataEntry(_) => StatusHint::UnprocessableEntity,
            Error::ManifestDepthExceeded => StatusHint::UnprocessableEntity,
            _ => StatusHint::InternalError,
        }
    }
}
