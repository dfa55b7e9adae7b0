//! # Error Handling Module
//!
//! This module defines the error type shared by every Carafe ORM operation.
//! All fallible operations return [`Result`], and every failure travels through
//! the async result of the operation that produced it.
//!
//! ## Error Categories
//!
//! - **Validation**: bad cast input (null where disallowed, unparsable date, unknown enum value)
//! - **Schema**: a misconfigured model (unknown field, duplicate index, missing index)
//! - **NotFound**: a lookup by key or by field matched no row
//! - **Connection**: no connection pattern matched, or the connection could not be created
//! - **Database**: errors reported by the sqlx driver
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use carafe_orm::{Error, ErrorKind, ModelActions};
//!
//! match Book::find_by_pk(&manager, vec![5.into()]).await {
//!     Ok(book) => println!("{}", book.title),
//!     Err(e) if e.kind() == ErrorKind::NotFound => println!("no such book"),
//!     Err(e) => return Err(e),
//! }
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

// ============================================================================
// Error Enum Definition
// ============================================================================

/// The main error type for Carafe ORM operations.
///
/// The enum is `Clone` because metadata futures are memoized and shared: every
/// caller waiting on the same in-flight build receives the same error value.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------
    /// A null value was given to a field that is neither nullable nor generated.
    #[error("Field `{field}` does not allow null values")]
    NullNotAllowed { field: String },

    /// A raw value did not match any case of a backed enum.
    #[error("Value `{value}` is not a valid case of enum `{enum_name}`")]
    InvalidEnumValue { enum_name: String, value: String },

    /// A string could not be parsed with the declared date format.
    #[error("Value `{value}` does not match date format `{format}`")]
    InvalidDateFormat { value: String, format: String },

    /// A value could not be converted to the type of its field.
    #[error("Invalid value for {expected}: {value}")]
    InvalidValue { expected: String, value: String },

    /// Invalid arguments passed to a finder or builder method.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The number of key values differs from the number of index fields.
    #[error("{model}: expected {expected} key value(s), received {received}")]
    ArgumentCountMismatch { model: String, expected: usize, received: usize },

    /// A value held by a model field could not be converted to the Rust field type.
    #[error("Conversion error: {0}")]
    Conversion(String),

    // ------------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------------
    /// No field with the given name exists on the model.
    #[error("Unknown field `{field}` on model {model}")]
    UnknownField { model: String, field: String },

    /// An index with the same name was already added.
    #[error("Index `{0}` already exists")]
    DuplicateIndex(String),

    /// An index was declared without fields.
    #[error("Index `{0}` has no fields")]
    EmptyIndex(String),

    /// A second primary index was added to the same model.
    #[error("Model {0} already has a primary index")]
    PrimaryIndexExists(String),

    /// A second generated-value field was added to the same model.
    #[error("Model {model} already has generated value field `{existing}`")]
    GeneratedValueExists { model: String, existing: String },

    /// The source of a model was set twice.
    #[error("Source of model {0} is already set")]
    SourceAlreadySet(String),

    /// The target field of a relation does not exist on the target model.
    #[error("Relation `{field}` of {model} targets unknown field `{target_field}` on {target_model}")]
    UnknownRelationField {
        model: String,
        field: String,
        target_model: String,
        target_field: String,
    },

    /// A relation was used before its metadata was finalized.
    #[error("Relation of field `{0}` is not resolved yet")]
    RelationNotResolved(String),

    /// Neither a primary nor a unique index is available for the operation.
    #[error("Model {model} has no primary or unique index to {operation} with")]
    NoUsableIndex { model: String, operation: String },

    /// A primary key lookup was requested on a model without a primary index.
    #[error("Model {0} has no primary index")]
    NoPrimaryIndex(String),

    /// The primary index has no generated value, so insert and update cannot be told apart.
    #[error("Cannot decide between insert and update for {0}, call insert() or update() explicitly")]
    AmbiguousSaveStrategy(String),

    /// A finder method with the given name does not exist.
    #[error("Undefined find method `find{method}` on {model}")]
    UndefinedFindMethod { model: String, method: String },

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------
    /// No metadata driver could describe the model.
    #[error("No metadata driver available for model {0}")]
    NoDriverAvailable(String),

    /// A single driver cannot describe the model; selection moves on to the next one.
    #[error("Driver unavailable for {model}: {reason}")]
    DriverUnavailable { model: String, reason: String },

    /// The model-defined metadata factory returned metadata for another model.
    #[error("Metadata factory of {model} is invalid: {reason}")]
    MetaDataContract { model: String, reason: String },

    /// The hydrator was requested before the model metadata finished resolving.
    #[error("Hydrator for {0} is not ready, await its metadata first")]
    HydratorNotReady(String),

    /// The hydration hook of a model failed or broke its contract.
    #[error("Hydration hook of {model} failed: {reason}")]
    HydrationContractViolation { model: String, reason: String },

    /// A result or finder was read as a model type it was not built for.
    #[error("Expected model {expected}, found {found}")]
    ModelMismatch { expected: String, found: String },

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------
    /// No row matched the lookup.
    #[error("{model} not found for {criteria}")]
    NotFound { model: String, criteria: String },

    // ------------------------------------------------------------------------
    // Connection & Database
    // ------------------------------------------------------------------------
    /// No registered connection pattern matches the model.
    #[error("No connection available for {0}")]
    NoConnectionAvailable(String),

    /// The connection could not be created or used.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Wraps errors from the underlying sqlx library.
    #[error("Database error: {0}")]
    DatabaseError(Arc<sqlx::Error>),

    // ------------------------------------------------------------------------
    // Internal
    // ------------------------------------------------------------------------
    /// An update found nothing to persist. Never returned to callers.
    #[error("No changes to persist")]
    NoChanges,
}

/// Coarse category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Schema,
    NotFound,
    Connection,
    Database,
    Internal,
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

// ============================================================================
// Conversions & Helpers
// ============================================================================

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::DatabaseError(Arc::new(error))
    }
}

impl Error {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NullNotAllowed { .. }
            | Error::InvalidEnumValue { .. }
            | Error::InvalidDateFormat { .. }
            | Error::InvalidValue { .. }
            | Error::InvalidArgument(_)
            | Error::ArgumentCountMismatch { .. }
            | Error::Conversion(_) => ErrorKind::Validation,

            Error::UnknownField { .. }
            | Error::DuplicateIndex(_)
            | Error::EmptyIndex(_)
            | Error::PrimaryIndexExists(_)
            | Error::GeneratedValueExists { .. }
            | Error::SourceAlreadySet(_)
            | Error::UnknownRelationField { .. }
            | Error::RelationNotResolved(_)
            | Error::NoUsableIndex { .. }
            | Error::NoPrimaryIndex(_)
            | Error::AmbiguousSaveStrategy(_)
            | Error::UndefinedFindMethod { .. }
            | Error::NoDriverAvailable(_)
            | Error::DriverUnavailable { .. }
            | Error::MetaDataContract { .. }
            | Error::HydratorNotReady(_)
            | Error::HydrationContractViolation { .. }
            | Error::ModelMismatch { .. } => ErrorKind::Schema,

            Error::NotFound { .. } => ErrorKind::NotFound,

            Error::NoConnectionAvailable(_) | Error::Connection(_) => ErrorKind::Connection,

            Error::DatabaseError(_) => ErrorKind::Database,

            Error::NoChanges => ErrorKind::Internal,
        }
    }

    /// Creates a `Conversion` error.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Error::Conversion(msg.into())
    }

    /// Creates an `InvalidArgument` error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn unknown_field(model: &str, field: &str) -> Self {
        Error::UnknownField { model: model.to_string(), field: field.to_string() }
    }
}
