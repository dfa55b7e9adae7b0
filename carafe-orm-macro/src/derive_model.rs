//! # Model Derive Macro Implementation
//!
//! This module implements the expansion of `#[derive(Model)]`. It reads the
//! struct fields and their `#[orm(...)]` attributes and generates:
//!
//! 1. `field_names()` - ORM field names in declaration order
//! 2. `accessor()` - getter and setter of each field, by lower-cased name
//! 3. `changes()` / `changes_mut()` - the field of type `Changes`
//! 4. `orm_attributes()` - declarative metadata read by the attribute driver
//! 5. delegating hooks for `meta_data`, `hydrate` and `initialize` when given
//!
//! ## Example
//!
//! ```rust,ignore
//! // Input struct:
//! #[derive(Model, Default)]
//! #[orm(table = "books")]
//! struct Book {
//!     #[orm(primary_key, generated)]
//!     id: Option<i64>,
//!     title: String,
//!     changes: Changes,
//! }
//!
//! // Generated implementation (abridged):
//! impl Model for Book {
//!     fn field_names() -> &'static [&'static str] { &["id", "title"] }
//!     fn accessor(name: &str) -> Option<Accessor<Self>> { /* match on "id", "title" */ }
//!     fn changes(&self) -> &Changes { &self.changes }
//!     fn changes_mut(&mut self) -> &mut Changes { &mut self.changes }
//!     fn orm_attributes() -> Option<ModelAttributes> { /* source, fields, indexes */ }
//! }
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{
    Data, DeriveInput, Fields, Ident, Lit, LitStr, Path, Token, Type, meta::ParseNestedMeta, punctuated::Punctuated,
};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::types::{is_changes, orm_type_of, unwrap_option};

// ============================================================================
// Parsed Attributes
// ============================================================================

#[derive(Default)]
struct ContainerAttrs {
    table: Option<LitStr>,
    schema: Option<LitStr>,
    model_name: Option<LitStr>,
    derived: Option<Path>,
    meta_data: Option<Path>,
    hydrate: Option<Path>,
    initialize: Option<Path>,
    indexes: Vec<IndexSpec>,
}

struct IndexSpec {
    kind: TokenStream,
    fields: Vec<String>,
    name: Option<String>,
}

struct RelationSpec {
    one_to_many: bool,
    model: Path,
    field: String,
    alias: Option<String>,
}

#[derive(Default)]
struct FieldAttrs {
    name: Option<String>,
    column: Option<String>,
    type_name: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    precision: Option<u32>,
    scale: Option<u32>,
    format: Option<String>,
    nullable: bool,
    primary_key: bool,
    unique: bool,
    index: bool,
    generated: bool,
    quote: bool,
    skip: bool,
    relation: Option<RelationSpec>,
}

/// An ORM field with its struct member.
struct OrmField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    name: String,
    attrs: FieldAttrs,
}

// ============================================================================
// Attribute Parsing
// ============================================================================

fn parse_number(meta: &ParseNestedMeta) -> syn::Result<f64> {
    match meta.value()?.parse::<Lit>()? {
        Lit::Int(i) => i.base10_parse::<f64>(),
        Lit::Float(f) => f.base10_parse::<f64>(),
        other => Err(syn::Error::new_spanned(other, "expected a number")),
    }
}

fn parse_string(meta: &ParseNestedMeta) -> syn::Result<String> {
    Ok(meta.value()?.parse::<LitStr>()?.value())
}

fn parse_index(meta: &ParseNestedMeta) -> syn::Result<IndexSpec> {
    let mut spec = IndexSpec { kind: quote! { ::carafe_orm::IndexType::Key }, fields: Vec::new(), name: None };
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("primary") {
            spec.kind = quote! { ::carafe_orm::IndexType::Primary };
        } else if nested.path.is_ident("unique") {
            spec.kind = quote! { ::carafe_orm::IndexType::Unique };
        } else if nested.path.is_ident("key") {
            spec.kind = quote! { ::carafe_orm::IndexType::Key };
        } else if nested.path.is_ident("name") {
            spec.name = Some(parse_string(&nested)?);
        } else if nested.path.is_ident("fields") {
            let content;
            syn::parenthesized!(content in nested.input);
            let names = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
            spec.fields = names.iter().map(LitStr::value).collect();
        } else {
            return Err(nested.error("unsupported index option"));
        }
        Ok(())
    })?;
    if spec.fields.is_empty() {
        return Err(meta.error("index needs `fields(...)`"));
    }
    Ok(spec)
}

fn parse_relation(meta: &ParseNestedMeta) -> syn::Result<RelationSpec> {
    let mut one_to_many = None;
    let mut model = None;
    let mut field = None;
    let mut alias = None;
    meta.parse_nested_meta(|nested| {
        if nested.path.is_ident("one_to_one") {
            one_to_many = Some(false);
        } else if nested.path.is_ident("one_to_many") {
            one_to_many = Some(true);
        } else if nested.path.is_ident("model") {
            model = Some(nested.value()?.parse::<Path>()?);
        } else if nested.path.is_ident("field") {
            field = Some(parse_string(&nested)?);
        } else if nested.path.is_ident("alias") {
            alias = Some(parse_string(&nested)?);
        } else {
            return Err(nested.error("unsupported relation option"));
        }
        Ok(())
    })?;

    let one_to_many = one_to_many.ok_or_else(|| meta.error("relation needs `one_to_one` or `one_to_many`"))?;
    let model = model.ok_or_else(|| meta.error("relation needs `model = Type`"))?;
    let field = field.ok_or_else(|| meta.error("relation needs `field = \"...\"`"))?;
    Ok(RelationSpec { one_to_many, model, field, alias })
}

fn parse_container(ast: &DeriveInput) -> syn::Result<ContainerAttrs> {
    let mut attrs = ContainerAttrs::default();
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                attrs.table = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("schema") {
                attrs.schema = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("model_name") {
                attrs.model_name = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("derived") {
                attrs.derived = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("meta_data") {
                attrs.meta_data = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("hydrate") {
                attrs.hydrate = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("initialize") {
                attrs.initialize = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("index") {
                attrs.indexes.push(parse_index(&meta)?);
            } else {
                return Err(meta.error("unsupported model attribute"));
            }
            Ok(())
        })?;
    }
    if attrs.schema.is_some() && attrs.table.is_none() {
        return Err(syn::Error::new_spanned(&ast.ident, "`schema` requires `table`"));
    }
    Ok(attrs)
}

fn parse_field(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in field.attrs.iter().filter(|a| a.path().is_ident("orm")) {
        attr.parse_nested_meta(|meta| {
            // --------------------------------------------------------
            // Indexes and identity
            // --------------------------------------------------------
            if meta.path.is_ident("primary_key") {
                attrs.primary_key = true;
            } else if meta.path.is_ident("unique") {
                attrs.unique = true;
            } else if meta.path.is_ident("index") {
                attrs.index = true;
            } else if meta.path.is_ident("generated") || meta.path.is_ident("auto_increment") {
                attrs.generated = true;

            // --------------------------------------------------------
            // Naming
            // --------------------------------------------------------
            } else if meta.path.is_ident("name") {
                attrs.name = Some(parse_string(&meta)?);
            } else if meta.path.is_ident("column") {
                attrs.column = Some(parse_string(&meta)?);
            } else if meta.path.is_ident("quote") {
                attrs.quote = true;
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;

            // --------------------------------------------------------
            // Type options
            // --------------------------------------------------------
            } else if meta.path.is_ident("type") {
                attrs.type_name = Some(parse_string(&meta)?);
            } else if meta.path.is_ident("min") {
                attrs.min = Some(parse_number(&meta)?);
            } else if meta.path.is_ident("max") {
                attrs.max = Some(parse_number(&meta)?);
            } else if meta.path.is_ident("precision") {
                attrs.precision = Some(meta.value()?.parse::<syn::LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("scale") {
                attrs.scale = Some(meta.value()?.parse::<syn::LitInt>()?.base10_parse()?);
            } else if meta.path.is_ident("format") {
                attrs.format = Some(parse_string(&meta)?);
            } else if meta.path.is_ident("nullable") {
                attrs.nullable = true;

            // --------------------------------------------------------
            // Relations
            // --------------------------------------------------------
            } else if meta.path.is_ident("relation") {
                if attrs.relation.is_some() {
                    return Err(meta.error("a field takes at most one relation"));
                }
                attrs.relation = Some(parse_relation(&meta)?);
            } else {
                return Err(meta.error("unsupported field attribute"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

// ============================================================================
// Code Generation Helpers
// ============================================================================

fn opt<T: ToTokens>(value: &Option<T>) -> TokenStream {
    match value {
        Some(v) => quote! { ::std::option::Option::Some(#v) },
        None => quote! { ::std::option::Option::None },
    }
}

fn opt_string(value: &Option<String>) -> TokenStream {
    match value {
        Some(v) => quote! { ::std::option::Option::Some(#v.to_string()) },
        None => quote! { ::std::option::Option::None },
    }
}

fn field_attribute(field: &OrmField) -> syn::Result<TokenStream> {
    let attrs = &field.attrs;
    let (inferred, optional) = match orm_type_of(field.ty) {
        Some((kind, nullable)) => (Some(kind), nullable),
        None => (None, unwrap_option(field.ty).1),
    };
    let type_name = match (&attrs.type_name, inferred) {
        (Some(name), _) => name.clone(),
        (None, Some(kind)) => kind.to_string(),
        (None, None) => {
            return Err(syn::Error::new_spanned(
                field.ty,
                "cannot infer the ORM type of this field; add `#[orm(type = \"...\")]`",
            ));
        }
    };

    let base = if type_name.eq_ignore_ascii_case("enum") {
        let (inner, _) = unwrap_option(field.ty);
        quote! { ::carafe_orm::__private::enum_options::<#inner>() }
    } else {
        quote! { ::carafe_orm::TypeOptions::default() }
    };

    let name = &field.name;
    let min = opt(&attrs.min);
    let max = opt(&attrs.max);
    let precision = opt(&attrs.precision);
    let scale = opt(&attrs.scale);
    let format = opt_string(&attrs.format);
    let is_null = attrs.nullable || optional;
    let column = opt_string(&attrs.column);

    let mut attributes = Vec::new();
    if let Some(relation) = &attrs.relation {
        let model = &relation.model;
        let target = &relation.field;
        attributes.push(if relation.one_to_many {
            let alias = match &relation.alias {
                Some(alias) => alias.clone(),
                None => model.segments.last().map(|s| s.ident.to_string().to_snake_case()).unwrap_or_default(),
            };
            quote! {
                ::carafe_orm::Attribute::relation(::carafe_orm::Relation::one_to_many(
                    ::carafe_orm::ModelType::of::<#model>(), #target, #alias,
                ))
            }
        } else {
            quote! {
                ::carafe_orm::Attribute::relation(::carafe_orm::Relation::one_to_one(
                    ::carafe_orm::ModelType::of::<#model>(), #target,
                ))
            }
        });
    }
    if attrs.generated {
        attributes.push(quote! { ::carafe_orm::Attribute::auto_increment() });
    }
    if attrs.quote {
        attributes.push(quote! { ::carafe_orm::Attribute::QuoteIdentifier });
    }

    Ok(quote! {
        ::carafe_orm::FieldAttribute {
            name: #name.to_string(),
            type_name: #type_name.to_string(),
            options: ::carafe_orm::TypeOptions {
                min: #min,
                max: #max,
                precision: #precision,
                scale: #scale,
                format: #format,
                is_null: #is_null,
                ..#base
            },
            column: #column,
            attributes: vec![#(#attributes),*],
        }
    })
}

fn index_attribute(spec: &IndexSpec) -> TokenStream {
    let kind = &spec.kind;
    let fields = &spec.fields;
    let name = opt_string(&spec.name);
    quote! {
        ::carafe_orm::IndexAttribute {
            kind: #kind,
            fields: vec![#(#fields.to_string()),*],
            name: #name,
        }
    }
}

// ============================================================================
// Macro Expansion Function
// ============================================================================

/// Expands `#[derive(Model)]`.
///
/// Fails when the input is not a struct with named fields, when it has no field
/// of type `Changes` (or more than one), or when an `#[orm(...)]` attribute is
/// malformed.
pub fn expand(ast: DeriveInput) -> syn::Result<TokenStream> {
    let struct_name = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();

    let fields = match &ast.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields,
            _ => return Err(syn::Error::new_spanned(struct_name, "Model must have named fields")),
        },
        _ => return Err(syn::Error::new_spanned(struct_name, "Model must be a struct")),
    };

    let container = parse_container(&ast)?;

    // ========================================================================
    // Classify Struct Fields
    // ========================================================================

    let mut changes_field = None;
    let mut orm_fields = Vec::new();
    for field in &fields.named {
        let Some(ident) = field.ident.as_ref() else { continue };
        if is_changes(&field.ty) {
            if changes_field.replace(ident).is_some() {
                return Err(syn::Error::new_spanned(field, "Model takes a single `Changes` field"));
            }
            continue;
        }
        let attrs = parse_field(field)?;
        if attrs.skip {
            continue;
        }
        let name = attrs.name.clone().unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        orm_fields.push(OrmField { ident, ty: &field.ty, name, attrs });
    }

    let Some(changes_field) = changes_field else {
        return Err(syn::Error::new_spanned(struct_name, "Model needs a field of type `Changes`"));
    };

    // ========================================================================
    // Accessor Table
    // ========================================================================

    let names: Vec<&String> = orm_fields.iter().map(|f| &f.name).collect();
    let accessors = orm_fields.iter().map(|f| {
        let ident = f.ident;
        let key = f.name.to_lowercase();
        quote! {
            #key => ::std::option::Option::Some(::carafe_orm::Accessor {
                get: |model: &Self| ::carafe_orm::IntoFieldValue::into_field_value(&model.#ident),
                set: |model: &mut Self, value: ::carafe_orm::FieldValue| -> ::carafe_orm::Result<()> {
                    model.#ident = ::carafe_orm::FromFieldValue::from_field_value(value)?;
                    ::std::result::Result::Ok(())
                },
            }),
        }
    });

    // ========================================================================
    // Declarative Metadata
    // ========================================================================

    let attributes = if let Some(base) = &container.derived {
        quote! {
            ::carafe_orm::ModelAttributes {
                derived: ::std::option::Option::Some(::carafe_orm::ModelType::of::<#base>()),
                ..::std::default::Default::default()
            }
        }
    } else {
        let source = match (&container.table, &container.schema) {
            (Some(table), Some(schema)) => {
                quote! { ::std::option::Option::Some(::carafe_orm::Source::with_schema(#table, #schema)) }
            }
            (Some(table), None) => quote! { ::std::option::Option::Some(::carafe_orm::Source::new(#table)) },
            _ => quote! { ::std::option::Option::None },
        };

        let field_attrs = orm_fields.iter().map(field_attribute).collect::<syn::Result<Vec<_>>>()?;

        // Fields marked `primary_key` form one primary index, in declaration order.
        let mut indexes = Vec::new();
        let primary: Vec<String> = orm_fields.iter().filter(|f| f.attrs.primary_key).map(|f| f.name.clone()).collect();
        if !primary.is_empty() {
            indexes.push(IndexSpec { kind: quote! { ::carafe_orm::IndexType::Primary }, fields: primary, name: None });
        }
        for f in &orm_fields {
            if f.attrs.unique {
                let kind = quote! { ::carafe_orm::IndexType::Unique };
                indexes.push(IndexSpec { kind, fields: vec![f.name.clone()], name: Some(f.name.clone()) });
            }
            if f.attrs.index {
                let kind = quote! { ::carafe_orm::IndexType::Key };
                indexes.push(IndexSpec { kind, fields: vec![f.name.clone()], name: Some(f.name.clone()) });
            }
        }
        indexes.extend(container.indexes);
        let index_attrs = indexes.iter().map(index_attribute);

        quote! {
            ::carafe_orm::ModelAttributes {
                source: #source,
                derived: ::std::option::Option::None,
                fields: vec![#(#field_attrs),*],
                indexes: vec![#(#index_attrs),*],
            }
        }
    };

    // ========================================================================
    // Optional Hooks
    // ========================================================================

    let model_name = container.model_name.as_ref().map(|name| {
        quote! {
            fn model_name() -> &'static str {
                #name
            }
        }
    });

    let meta_data = container.meta_data.as_ref().map(|path| {
        quote! {
            fn orm_meta_data(data: ::carafe_orm::Data) -> ::std::option::Option<::carafe_orm::MetaDataFactory> {
                #path(data)
            }
        }
    });

    let hydrate = container.hydrate.as_ref().map(|path| {
        quote! {
            fn orm_hydrate_model(
                self,
                data: &::carafe_orm::Data,
                row: &::carafe_orm::Row,
            ) -> ::carafe_orm::Result<Self> {
                #path(self, data, row)
            }
        }
    });

    let initialize = container.initialize.as_ref().map(|path| {
        quote! {
            fn orm_initialize() {
                #path()
            }
        }
    });

    // ========================================================================
    // Complete Model Implementation
    // ========================================================================

    Ok(quote! {
        impl #impl_generics ::carafe_orm::Model for #struct_name #ty_generics #where_clause {
            #model_name

            fn field_names() -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn accessor(name: &str) -> ::std::option::Option<::carafe_orm::Accessor<Self>> {
                match name {
                    #(#accessors)*
                    _ => ::std::option::Option::None,
                }
            }

            fn changes(&self) -> &::carafe_orm::Changes {
                &self.#changes_field
            }

            fn changes_mut(&mut self) -> &mut ::carafe_orm::Changes {
                &mut self.#changes_field
            }

            fn orm_attributes() -> ::std::option::Option<::carafe_orm::ModelAttributes> {
                ::std::option::Option::Some(#attributes)
            }

            #meta_data

            #hydrate

            #initialize
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand_str(ast: DeriveInput) -> String {
        expand(ast).map(|tokens| tokens.to_string()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn generates_accessors_by_lowercase_name() {
        let out = expand_str(parse_quote! {
            struct Book {
                #[orm(primary_key, generated)]
                id: Option<i64>,
                #[orm(name = "Title")]
                title: String,
                #[orm(skip)]
                cache: Vec<u8>,
                changes: Changes,
            }
        });
        assert!(out.contains("\"title\" =>"));
        assert!(out.contains("& [\"id\" , \"Title\"]"));
        assert!(!out.contains("cache"));
        assert!(out.contains("IndexType :: Primary"));
    }

    #[test]
    fn requires_a_change_snapshot() {
        let err = expand(parse_quote! {
            struct Book {
                id: i64,
            }
        });
        assert!(err.is_err());
    }

    #[test]
    fn rejects_untyped_fields() {
        let err = expand(parse_quote! {
            struct Book {
                status: Status,
                changes: Changes,
            }
        });
        assert!(err.is_err());
    }

    #[test]
    fn enum_fields_use_enum_options() {
        let out = expand_str(parse_quote! {
            struct Book {
                #[orm(type = "enum")]
                status: Option<Status>,
                changes: Changes,
            }
        });
        assert!(out.contains("enum_options :: < Status >"));
    }

    #[test]
    fn one_to_many_alias_defaults_to_model_name() {
        let out = expand_str(parse_quote! {
            struct Publisher {
                #[orm(primary_key, relation(one_to_many, model = BookItem, field = "publisher"))]
                id: i64,
                changes: Changes,
            }
        });
        assert!(out.contains("\"book_item\""));
    }
}
