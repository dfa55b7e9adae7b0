//! # Carafe ORM Procedural Macros
//!
//! This crate provides `#[derive(Model)]`, which implements the `Model` trait of
//! carafe-orm for structs representing stored entities.
//!
//! ## Overview
//!
//! The derive reads the struct definition and its `#[orm(...)]` attributes and
//! generates the accessor table, the change snapshot accessors and the
//! declarative metadata consumed by the attribute metadata driver.
//!
//! The crate is organized into three modules:
//!
//! - **`lib.rs`** (this file): Entry point and macro definitions
//! - **`derive_model.rs`**: Implementation of the Model derive macro
//! - **`types.rs`**: Inference of ORM field kinds from Rust types
//!
//! ## Usage
//!
//! This crate is not meant to be used directly. It is re-exported by `carafe-orm`:
//!
//! ```rust,ignore
//! use carafe_orm::{Changes, Model};
//!
//! #[derive(Model, Default)]
//! #[orm(table = "publishers")]
//! struct Publisher {
//!     #[orm(primary_key, generated, relation(one_to_many, model = Book, field = "publisher", alias = "books"))]
//!     id: Option<i64>,
//!     #[orm(unique)]
//!     name: String,
//!     changes: Changes,
//! }
//! ```
//!
//! ## Supported Attributes
//!
//! ### On the struct
//!
//! - `table = "..."`, `schema = "..."` - Source of the model
//! - `model_name = "..."` - Name matched against connection patterns
//! - `derived = Base` - Read the declarative metadata of `Base` instead
//! - `index(primary|unique|key, fields("a", "b"), name = "...")` - Composite index
//! - `meta_data = path`, `hydrate = path`, `initialize = path` - Model hooks
//!
//! ### On a field
//!
//! - `primary_key`, `unique`, `index` - Single field indexes
//! - `generated` or `auto_increment` - Identity assigned on insert
//! - `name = "..."`, `column = "..."`, `quote`, `skip`
//! - `type = "..."`, `min`, `max`, `precision`, `scale`, `format = "..."`, `nullable`
//! - `relation(one_to_one, model = T, field = "...")`
//! - `relation(one_to_many, model = T, field = "...", alias = "...")`
//!
//! Exactly one field must have the type `Changes`; it holds the snapshot used to
//! compute partial updates and is not an ORM field.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod derive_model;
mod types;

/// Derives the `Model` trait.
///
/// # Example
///
/// ```rust,ignore
/// use carafe_orm::{Changes, Model, RelatedProxy};
///
/// #[derive(Model, Default)]
/// struct Book {
///     #[orm(primary_key, generated)]
///     id: Option<i64>,
///
///     #[orm(index)]
///     title: String,
///
///     #[orm(column = "publisher_id", relation(one_to_one, model = Publisher, field = "id"))]
///     publisher: Option<RelatedProxy<Publisher>>,
///
///     #[orm(type = "decimal", precision = 10, scale = 2, nullable)]
///     price: Option<f64>,
///
///     changes: Changes,
/// }
/// ```
///
/// # Errors
///
/// Expansion reports a compile error if:
///
/// - The input is not a struct with named fields
/// - The struct has no `Changes` field, or more than one
/// - A field type has no default ORM kind and no `type = "..."`
/// - An `#[orm(...)]` attribute is malformed
#[proc_macro_derive(Model, attributes(orm))]
pub fn model_derive(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    derive_model::expand(ast).unwrap_or_else(syn::Error::into_compile_error).into()
}
