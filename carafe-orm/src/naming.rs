//! # Naming Strategy Module
//!
//! Converts model names to table names when a model does not declare its source.

use heck::ToSnakeCase;

/// Maps a model name to a table name.
pub trait NamingStrategy: Send + Sync {
    /// `model` is the model name without module path, e.g. `BookAuthor`.
    fn table_name(&self, model: &str) -> String;
}

/// `BookAuthor` → `book_author`, with an optional prefix.
#[derive(Debug, Clone, Default)]
pub struct SnakeCase {
    prefix: String,
}

impl SnakeCase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl NamingStrategy for SnakeCase {
    fn table_name(&self, model: &str) -> String {
        format!("{}{}", self.prefix, model.to_snake_case())
    }
}
