//! Error types for the mapping and database layers.

use thiserror::Error;

/// Descriptor construction and value conversion failures.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("unsupported field type '{type_name}' for field {field}")]
    UnsupportedType {
        field: String,
        type_name: &'static str,
    },

    #[error("field {field} is not accessible on {entity}")]
    FieldAccess { entity: String, field: String },

    #[error("duplicate field {field} on {entity}")]
    DuplicateField { entity: String, field: String },

    #[error("{entity} declares more than one ID field ({first}, {second})")]
    MultipleIds {
        entity: String,
        first: String,
        second: String,
    },

    #[error("no ID field found for {entity}")]
    MissingId { entity: String },

    #[error("{entity} has no writable fields to update")]
    NoWritableFields { entity: String },

    #[error("invalid value for field {field}: {reason}")]
    Conversion { field: String, reason: String },

    #[error("null value for non-nullable field {field}")]
    Null { field: String },

    #[error("invalid date format '{pattern}'")]
    DateFormat { pattern: String },

    #[error("invalid date value for field {field}")]
    Date {
        field: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("SQL error reading field {field}")]
    Column {
        field: String,
        #[source]
        source: rusqlite::Error,
    },
}

impl MapperError {
    pub(crate) fn conversion(field: &str, reason: impl Into<String>) -> Self {
        Self::Conversion {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// I/O-kind failure surfaced by the pool and executors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("SQL error")]
    Sql(#[from] rusqlite::Error),

    #[error("mapper error")]
    Mapper(#[from] MapperError),

    #[error("{operation} affected {count} rows, expected 1")]
    RowCount {
        operation: &'static str,
        count: usize,
    },

    #[error("could not load database driver '{0}'")]
    DriverNotFound(String),

    #[error("invalid pool size: {0}")]
    InvalidPoolSize(usize),

    #[error("executor is closed")]
    Closed,

    #[error("transaction was rolled back by the database during {operation}")]
    RolledBack {
        operation: &'static str,
        #[source]
        source: Option<Box<Error>>,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
