//! # Type Inference Module
//!
//! Maps the Rust type of a struct field to the name of its ORM field kind.
//!
//! ## Supported Type Mappings
//!
//! - `i16`, `i32`, `i64`, `u16`, `u32`, `bool` → `int`
//! - `RelatedProxy<T>` → `int` (the foreign key of a one-to-one relation)
//! - `f64` → `float`
//! - `String` → `string`
//! - `NaiveDateTime` → `datetime`
//! - `NaiveDate` → `date`
//! - `Option<T>` → kind of `T`, nullable
//!
//! Decimal and enum fields cannot be told apart from their Rust type alone and
//! need an explicit `#[orm(type = "...")]`.
//!
//! ```rust,ignore
//! #[derive(Model)]
//! struct Invoice {
//!     #[orm(primary_key)]
//!     id: i64,               // int
//!     #[orm(type = "decimal", precision = 10, scale = 2)]
//!     total: f64,            // decimal
//!     paid_on: Option<NaiveDate>, // date, nullable
//!     changes: Changes,
//! }
//! ```

use syn::{GenericArgument, PathArguments, Type};

/// The last path segment name of `ty`, if it is a path type.
pub fn type_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

/// Strips one level of `Option<T>`, returning `T` and whether it was wrapped.
pub fn unwrap_option(ty: &Type) -> (&Type, bool) {
    if let Type::Path(type_path) = ty
        && let Some(segment) = type_path.path.segments.last()
        && segment.ident == "Option"
        && let PathArguments::AngleBracketed(args) = &segment.arguments
        && let Some(GenericArgument::Type(inner)) = args.args.first()
    {
        return (inner, true);
    }
    (ty, false)
}

/// True when `ty` is the change snapshot of a model.
pub fn is_changes(ty: &Type) -> bool {
    type_ident(ty).is_some_and(|name| name == "Changes")
}

/// Infers the ORM kind name of a field and whether it is nullable.
///
/// Returns `None` for types with no default kind.
pub fn orm_type_of(ty: &Type) -> Option<(&'static str, bool)> {
    let (inner, nullable) = unwrap_option(ty);
    let kind = match type_ident(inner)?.as_str() {
        "i16" | "i32" | "i64" | "u16" | "u32" | "bool" => "int",
        "RelatedProxy" => "int",
        "f64" => "float",
        "String" => "string",
        "NaiveDateTime" => "datetime",
        "NaiveDate" => "date",
        _ => return None,
    };
    Some((kind, nullable))
}
