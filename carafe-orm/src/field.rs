//! # Field Metadata Module
//!
//! Declarative descriptors attached to model properties:
//!
//! - [`Field`]: property name, [`FieldType`], storage column and auxiliary attributes
//! - [`Relation`]: a reference to another model, one-to-one or one-to-many
//! - [`Index`]: primary, unique or plain key over one or more fields
//! - [`Source`]: the table (and optional schema) a model maps to
//!
//! Descriptors are immutable once built and shared behind `Arc`. The only late-bound
//! piece is the resolved target field of a [`Relation`], set once during metadata
//! finalization.
//!
//! ## Example
//!
//! ```rust,ignore
//! use carafe_orm::{Attribute, Field, FieldType, ModelType, Relation};
//!
//! let id = Field::new("id", FieldType::int(), None, vec![Attribute::GeneratedValue(GeneratedValue::Identity)])?;
//! let publisher = Field::new(
//!     "publisher",
//!     FieldType::int(),
//!     Some("publisher_id"),
//!     vec![Attribute::relation(Relation::one_to_one(ModelType::of::<Publisher>(), "id"))],
//! )?;
//! ```

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{
    errors::{Error, Result},
    model::ModelType,
    types::{FieldKind, FieldType},
    value::{FieldValue, Value},
};

// ============================================================================
// Attributes
// ============================================================================

/// Strategy of a generated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedValue {
    /// The storage engine assigns an identity on insert.
    Identity,
}

/// Auxiliary attributes of a field, in declaration order.
#[derive(Debug, Clone)]
pub enum Attribute {
    Relation(Arc<Relation>),
    GeneratedValue(GeneratedValue),
    QuoteIdentifier,
}

impl Attribute {
    pub fn relation(relation: Relation) -> Self {
        Attribute::Relation(Arc::new(relation))
    }

    /// Alias of `GeneratedValue(Identity)`.
    pub fn auto_increment() -> Self {
        Attribute::GeneratedValue(GeneratedValue::Identity)
    }
}

// ============================================================================
// Relation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationType {
    OneToOne,
    OneToMany,
}

/// A reference from a field to a field of another model.
pub struct Relation {
    kind: RelationType,
    model: ModelType,
    field: String,
    alias: String,
    resolved: OnceLock<Arc<Field>>,
}

impl Relation {
    /// The owning field holds the foreign key of `model.field`.
    pub fn one_to_one(model: ModelType, field: impl Into<String>) -> Self {
        Self::new(RelationType::OneToOne, model, field, "")
    }

    /// Rows of `model` whose `field` references the owning field, exposed under `alias`.
    pub fn one_to_many(model: ModelType, field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::new(RelationType::OneToMany, model, field, alias)
    }

    pub fn new(kind: RelationType, model: ModelType, field: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            kind,
            model,
            field: field.into(),
            alias: alias.into().to_lowercase(),
            resolved: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> RelationType {
        self.kind
    }

    /// The target model.
    pub fn model(&self) -> ModelType {
        self.model
    }

    /// Name of the target field, as declared.
    pub fn field_name(&self) -> &str {
        &self.field
    }

    /// Lower-cased alias of a one-to-many relation, empty otherwise.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The target field, available once metadata is finalized.
    pub fn resolved_field(&self) -> Result<&Arc<Field>> {
        self.resolved.get().ok_or_else(|| Error::RelationNotResolved(self.field.clone()))
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub(crate) fn resolve(&self, field: Arc<Field>) {
        // Shared relations are reached from both the owning and the alias field.
        let _ = self.resolved.set(field);
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("kind", &self.kind)
            .field("model", &self.model.name())
            .field("field", &self.field)
            .field("alias", &self.alias)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

// ============================================================================
// Field
// ============================================================================

/// Metadata of one model property.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    ty: FieldType,
    column: String,
    attributes: Vec<Attribute>,
    relation: Option<Arc<Relation>>,
    generated_value: Option<GeneratedValue>,
    quote_identifier: bool,
}

impl Field {
    /// Creates a field. The column defaults to the field name.
    pub fn new(name: impl Into<String>, ty: FieldType, column: Option<&str>, attributes: Vec<Attribute>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("field name cannot be empty"));
        }

        let mut relation = None;
        let mut generated_value = None;
        let mut quote_identifier = false;
        for attribute in &attributes {
            match attribute {
                Attribute::Relation(r) => {
                    if relation.replace(r.clone()).is_some() {
                        return Err(Error::invalid_argument(format!("field `{}` has more than one relation", name)));
                    }
                }
                Attribute::GeneratedValue(g) => {
                    if generated_value.replace(*g).is_some() {
                        return Err(Error::invalid_argument(format!(
                            "field `{}` has more than one generated value",
                            name
                        )));
                    }
                }
                Attribute::QuoteIdentifier => quote_identifier = true,
            }
        }

        let column = match column {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => name.clone(),
        };

        Ok(Self { name, ty, column, attributes, relation, generated_value, quote_identifier })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.ty
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn relation(&self) -> Option<&Arc<Relation>> {
        self.relation.as_ref()
    }

    pub fn generated_value(&self) -> Option<GeneratedValue> {
        self.generated_value
    }

    pub fn is_generated_value(&self) -> bool {
        self.generated_value.is_some()
    }

    pub fn quote_identifier(&self) -> bool {
        self.quote_identifier
    }

    /// True for the synthetic alias fields of one-to-many relations.
    pub fn is_related(&self) -> bool {
        self.ty.kind() == FieldKind::Related
    }

    pub(crate) fn with_type(&self, ty: FieldType) -> Self {
        Self { ty, ..self.clone() }
    }

    /// Converts an input value to the internal value of this field.
    ///
    /// A one-to-one relation wraps the cast foreign key in a proxy. A model instance
    /// is kept as is, any other structured value is rejected.
    pub fn cast(&self, value: FieldValue) -> Result<FieldValue> {
        if value.is_null() {
            if self.generated_value.is_none() && !self.ty.is_null() {
                return Err(Error::NullNotAllowed { field: self.name.clone() });
            }
            return Ok(FieldValue::NULL);
        }

        match &self.relation {
            Some(relation) if relation.kind() == RelationType::OneToOne => match value {
                FieldValue::Model(_) => Ok(value),
                FieldValue::Proxy(proxy) => Ok(FieldValue::Proxy(proxy)),
                FieldValue::Value(raw) => match self.ty.cast(FieldValue::Value(raw))? {
                    FieldValue::Value(key) => Ok(FieldValue::Proxy(crate::value::ProxyValue {
                        relation: relation.clone(),
                        value: key,
                    })),
                    other => Err(self.invalid_relation_value(&other)),
                },
                other => Err(self.invalid_relation_value(&other)),
            },
            _ => self.ty.cast(value),
        }
    }

    /// Converts an internal value to its storage value.
    ///
    /// For relation fields a proxy yields its raw key and a resolved model yields the
    /// value of the relation's target field.
    pub fn decast(&self, value: &FieldValue) -> Result<Value> {
        if let Some(relation) = &self.relation {
            match value {
                FieldValue::Proxy(proxy) => return Ok(proxy.value.clone()),
                FieldValue::Model(model) => {
                    let target = relation.resolved_field()?;
                    let raw = model.read_field(target.name());
                    return self.ty.decast(&raw);
                }
                _ => {}
            }
        }
        self.ty.decast(value)
    }

    fn invalid_relation_value(&self, value: &FieldValue) -> Error {
        Error::InvalidValue {
            expected: format!("a key or model for relation field `{}`", self.name),
            value: format!("{:?}", value),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column)
    }
}

// ============================================================================
// Index
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Primary,
    Unique,
    Key,
}

impl IndexType {
    /// The name an index of this type gets when none is given.
    pub fn default_name(&self) -> &'static str {
        match self {
            IndexType::Primary => "PRIMARY KEY",
            IndexType::Unique => "UNIQUE",
            IndexType::Key => "INDEX",
        }
    }
}

/// An index over one or more fields of a model.
#[derive(Debug, Clone)]
pub struct Index {
    kind: IndexType,
    fields: Vec<Arc<Field>>,
    name: String,
}

impl Index {
    pub fn new(kind: IndexType, fields: Vec<Arc<Field>>, name: Option<&str>) -> Result<Self> {
        let name = match name {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => kind.default_name().to_string(),
        };
        if fields.is_empty() {
            return Err(Error::EmptyIndex(name));
        }
        Ok(Self { kind, fields, name })
    }

    pub fn kind(&self) -> IndexType {
        self.kind
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The generated-value field among the index fields, if any.
    pub fn generated_value_field(&self) -> Option<&Arc<Field>> {
        self.fields.iter().find(|f| f.is_generated_value())
    }
}

/// A field reference accepted by [`Data::create_index`](crate::Data::create_index).
#[derive(Debug, Clone)]
pub enum IndexField {
    Field(Arc<Field>),
    Name(String),
}

impl From<Arc<Field>> for IndexField {
    fn from(field: Arc<Field>) -> Self {
        IndexField::Field(field)
    }
}

impl From<&str> for IndexField {
    fn from(name: &str) -> Self {
        IndexField::Name(name.to_string())
    }
}

impl From<String> for IndexField {
    fn from(name: String) -> Self {
        IndexField::Name(name)
    }
}

// ============================================================================
// Source
// ============================================================================

/// The storage table of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub schema: Option<String>,
}

impl Source {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), schema: None }
    }

    pub fn with_schema(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self { name: name.into(), schema: Some(schema.into()) }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) if !schema.is_empty() => write!(f, "{}.{}", schema, self.name),
            _ => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_defaults_to_name() {
        let field = Field::new("title", FieldType::string(), None, vec![]).unwrap();
        assert_eq!(field.column(), "title");
        assert_eq!(field.to_string(), "title");

        let field = Field::new("publisher", FieldType::int(), Some("publisher_id"), vec![]).unwrap();
        assert_eq!(field.column(), "publisher_id");
        assert!(Field::new("", FieldType::int(), None, vec![]).is_err());
    }

    #[test]
    fn generated_value_tolerates_null() {
        let id = Field::new("id", FieldType::int(), None, vec![Attribute::auto_increment()]).unwrap();
        assert!(id.is_generated_value());
        assert_eq!(id.cast(FieldValue::NULL).unwrap(), FieldValue::NULL);

        let title = Field::new("title", FieldType::string(), None, vec![]).unwrap();
        assert!(matches!(title.cast(FieldValue::NULL), Err(Error::NullNotAllowed { field }) if field == "title"));

        let note = Field::new("note", FieldType::string().nullable(true), None, vec![]).unwrap();
        assert_eq!(note.cast(FieldValue::NULL).unwrap(), FieldValue::NULL);
    }

    #[test]
    fn quote_identifier_attribute() {
        let field = Field::new("order", FieldType::int(), None, vec![Attribute::QuoteIdentifier]).unwrap();
        assert!(field.quote_identifier());
        assert!(!field.is_generated_value());
    }

    #[test]
    fn index_names_default_by_type() {
        let id = Arc::new(Field::new("id", FieldType::int(), None, vec![]).unwrap());
        assert_eq!(Index::new(IndexType::Primary, vec![id.clone()], None).unwrap().name(), "PRIMARY KEY");
        assert_eq!(Index::new(IndexType::Unique, vec![id.clone()], None).unwrap().name(), "UNIQUE");
        assert_eq!(Index::new(IndexType::Key, vec![id.clone()], Some("by_id")).unwrap().name(), "by_id");
        assert!(matches!(Index::new(IndexType::Key, vec![], None), Err(Error::EmptyIndex(_))));
    }

    #[test]
    fn source_display_includes_schema() {
        assert_eq!(Source::new("book").to_string(), "book");
        assert_eq!(Source::with_schema("book", "library").to_string(), "library.book");
    }
}
