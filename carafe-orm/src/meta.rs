//! # Meta Module
//!
//! [`Data`] is the structural description of one model: its source, its fields in
//! declaration order, its indexes and its generated-value field. [`Meta`] pairs a
//! finalized `Data` with the model it describes.
//!
//! ## Lifecycle
//!
//! 1. A metadata driver populates an empty `Data` (source, fields, indexes).
//!    Declaring a one-to-many relation adds a synthetic related field under the
//!    relation alias.
//! 2. [`Data::finalize`] resolves the target field of every relation by fetching
//!    the raw `Data` of the target model from the manager cache. Models referencing
//!    each other resolve without recursion because the raw cache never finalizes.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut data = Data::new(ModelType::of::<Book>());
//! data.set_source(Source::new("book"))?;
//! data.create_field("id", FieldType::int(), None, vec![Attribute::auto_increment()])?;
//! data.create_field("title", FieldType::string(), None, vec![])?;
//! data.create_index(IndexType::Primary, vec!["id".into()], None)?;
//! ```

use std::{collections::HashMap, sync::Arc};

use futures::future::try_join_all;
use log::debug;

use crate::{
    errors::{Error, Result},
    field::{Attribute, Field, Index, IndexField, IndexType, Relation, RelationType, Source},
    manager::Manager,
    model::ModelType,
    temporal::{DEFAULT_DATE_FORMAT, DEFAULT_DATETIME_FORMAT},
    types::FieldType,
};

// ============================================================================
// Data
// ============================================================================

/// Source, fields and indexes of a model.
#[derive(Debug, Clone)]
pub struct Data {
    model: ModelType,
    source: Option<Source>,
    fields: Vec<Arc<Field>>,
    positions: HashMap<String, usize>,
    generated_value_field: Option<Arc<Field>>,
    indexes: Vec<Arc<Index>>,
    primary_index: Option<Arc<Index>>,
    unique_indexes: Vec<Arc<Index>>,
    datetime_format: String,
    date_format: String,
}

impl Data {
    pub fn new(model: ModelType) -> Self {
        Self {
            model,
            source: None,
            fields: Vec::new(),
            positions: HashMap::new(),
            generated_value_field: None,
            indexes: Vec::new(),
            primary_index: None,
            unique_indexes: Vec::new(),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }

    /// Sets the formats given to date and datetime fields declared without one.
    pub fn with_default_formats(mut self, datetime_format: &str, date_format: &str) -> Self {
        self.datetime_format = datetime_format.to_string();
        self.date_format = date_format.to_string();
        self
    }

    pub fn model(&self) -> ModelType {
        self.model
    }

    // ------------------------------------------------------------------------
    // Source
    // ------------------------------------------------------------------------

    /// Sets the source. A source can only be set once.
    pub fn set_source(&mut self, source: Source) -> Result<&mut Self> {
        if self.source.is_some() {
            return Err(Error::SourceAlreadySet(self.model.name().to_string()));
        }
        self.source = Some(source);
        Ok(self)
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    // ------------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------------

    /// Adds a field, replacing a field with the same (case-insensitive) name.
    ///
    /// A one-to-many relation on the field adds a related field named after the
    /// relation alias.
    pub fn add_field(&mut self, field: Field) -> Result<Arc<Field>> {
        let ty = field.field_type().clone().with_default_format(&self.datetime_format, &self.date_format);
        let field = Arc::new(field.with_type(ty));
        let key = field.name().to_lowercase();

        if field.is_generated_value() {
            if let Some(existing) = &self.generated_value_field {
                if !existing.name().eq_ignore_ascii_case(field.name()) {
                    return Err(Error::GeneratedValueExists {
                        model: self.model.name().to_string(),
                        existing: existing.name().to_string(),
                    });
                }
            }
            self.generated_value_field = Some(field.clone());
        } else if self.generated_value_field.as_ref().is_some_and(|f| f.name().eq_ignore_ascii_case(&key)) {
            self.generated_value_field = None;
        }

        match self.positions.get(&key) {
            Some(&pos) => self.fields[pos] = field.clone(),
            None => {
                self.positions.insert(key, self.fields.len());
                self.fields.push(field.clone());
            }
        }

        if !field.is_related() {
            if let Some(relation) = field.relation().filter(|r| r.kind() == RelationType::OneToMany) {
                self.add_related_field(&field, relation.clone())?;
            }
        }

        Ok(field)
    }

    fn add_related_field(&mut self, owner: &Arc<Field>, relation: Arc<Relation>) -> Result<()> {
        if relation.alias().is_empty() {
            return Err(Error::invalid_argument(format!(
                "one-to-many relation on field `{}` of {} needs an alias",
                owner.name(),
                self.model.name()
            )));
        }
        debug!("{}: adding related field `{}`", self.model.name(), relation.alias());
        let alias = relation.alias().to_string();
        let related = Field::new(alias, FieldType::related(owner.clone()), None, vec![Attribute::Relation(relation)])?;
        self.add_field(related)?;
        Ok(())
    }

    /// Builds a field and adds it.
    pub fn create_field(
        &mut self,
        name: &str,
        ty: FieldType,
        column: Option<&str>,
        attributes: Vec<Attribute>,
    ) -> Result<Arc<Field>> {
        self.add_field(Field::new(name, ty, column, attributes)?)
    }

    /// Looks up a field by name, ignoring case.
    pub fn get_field(&self, name: &str) -> Option<&Arc<Field>> {
        self.positions.get(&name.to_lowercase()).map(|&pos| &self.fields[pos])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.positions.contains_key(&name.to_lowercase())
    }

    pub(crate) fn require_field(&self, name: &str) -> Result<&Arc<Field>> {
        self.get_field(name).ok_or_else(|| Error::unknown_field(self.model.name(), name))
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// Fields stored in the source, that is every field except related aliases.
    pub fn stored_fields(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.fields.iter().filter(|f| !f.is_related())
    }

    pub fn get_field_by_column(&self, column: &str) -> Option<&Arc<Field>> {
        self.stored_fields().find(|f| f.column() == column)
    }

    pub fn generated_value_field(&self) -> Option<&Arc<Field>> {
        self.generated_value_field.as_ref()
    }

    // ------------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------------

    /// Adds an index over fields of this model.
    pub fn add_index(&mut self, index: Index) -> Result<Arc<Index>> {
        let mut fields = Vec::with_capacity(index.fields().len());
        for field in index.fields() {
            let own = self
                .get_field(field.name())
                .filter(|own| Arc::ptr_eq(own, field) || own.column() == field.column())
                .ok_or_else(|| Error::unknown_field(self.model.name(), field.name()))?;
            fields.push(own.clone());
        }

        if self.indexes.iter().any(|i| i.name() == index.name()) {
            return Err(Error::DuplicateIndex(index.name().to_string()));
        }
        if index.kind() == IndexType::Primary && self.primary_index.is_some() {
            return Err(Error::PrimaryIndexExists(self.model.name().to_string()));
        }

        let index = Arc::new(Index::new(index.kind(), fields, Some(index.name()))?);
        match index.kind() {
            IndexType::Primary => self.primary_index = Some(index.clone()),
            IndexType::Unique => self.unique_indexes.push(index.clone()),
            IndexType::Key => {}
        }
        self.indexes.push(index.clone());
        Ok(index)
    }

    /// Builds an index from fields or field names and adds it.
    pub fn create_index(&mut self, kind: IndexType, fields: Vec<IndexField>, name: Option<&str>) -> Result<Arc<Index>> {
        let fields = fields
            .into_iter()
            .map(|f| match f {
                IndexField::Field(field) => Ok(field),
                IndexField::Name(name) => self.require_field(&name).cloned(),
            })
            .collect::<Result<Vec<_>>>()?;
        self.add_index(Index::new(kind, fields, name)?)
    }

    pub fn get_index(&self, name: &str) -> Option<&Arc<Index>> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    pub fn indexes(&self) -> &[Arc<Index>] {
        &self.indexes
    }

    pub fn primary_index(&self) -> Option<&Arc<Index>> {
        self.primary_index.as_ref()
    }

    pub fn unique_indexes(&self) -> &[Arc<Index>] {
        &self.unique_indexes
    }

    /// The primary index, or the first unique index.
    pub fn key_index(&self) -> Option<&Arc<Index>> {
        self.primary_index.as_ref().or_else(|| self.unique_indexes.first())
    }

    // ------------------------------------------------------------------------
    // Finalize
    // ------------------------------------------------------------------------

    /// Binds the target field of every relation. Relations resolve concurrently;
    /// the first failure is returned.
    pub async fn finalize(&self, manager: &Manager) -> Result<()> {
        let mut relations: Vec<(&Arc<Field>, &Arc<Relation>)> = Vec::new();
        for field in &self.fields {
            if let Some(relation) = field.relation() {
                if !relations.iter().any(|(_, r)| Arc::ptr_eq(r, relation)) {
                    relations.push((field, relation));
                }
            }
        }

        debug!("{}: finalizing {} relation(s)", self.model.name(), relations.len());

        try_join_all(relations.into_iter().map(|(field, relation)| async move {
            let target = manager.data_for(relation.model()).await?;
            let resolved = target.get_field(relation.field_name()).ok_or_else(|| Error::UnknownRelationField {
                model: self.model.name().to_string(),
                field: field.name().to_string(),
                target_model: relation.model().name().to_string(),
                target_field: relation.field_name().to_string(),
            })?;
            relation.resolve(resolved.clone());
            Ok::<_, Error>(())
        }))
        .await?;

        Ok(())
    }
}

// ============================================================================
// Meta
// ============================================================================

/// Finalized metadata of a model.
#[derive(Debug)]
pub struct Meta {
    model: ModelType,
    data: Arc<Data>,
}

impl Meta {
    pub(crate) fn new(model: ModelType, data: Arc<Data>) -> Self {
        Self { model, data }
    }

    pub fn model(&self) -> ModelType {
        self.model
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    /// The source of the model. Every driver sets one before the meta is published.
    pub fn source(&self) -> Result<&Source> {
        self.data
            .source()
            .ok_or_else(|| Error::MetaDataContract { model: self.model.name().to_string(), reason: "no source".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        changes::Changes,
        context::OrmContext,
        model::{Accessor, MetaDataFactory, Model},
    };

    #[derive(Debug, Default)]
    struct Shelf {
        changes: Changes,
    }

    impl Model for Shelf {
        fn field_names() -> &'static [&'static str] {
            &[]
        }

        fn accessor(_name: &str) -> Option<Accessor<Self>> {
            None
        }

        fn changes(&self) -> &Changes {
            &self.changes
        }

        fn changes_mut(&mut self) -> &mut Changes {
            &mut self.changes
        }

        fn orm_meta_data(mut data: Data) -> Option<MetaDataFactory> {
            Some(MetaDataFactory::Pending(Box::pin(async move {
                data.create_field("id", FieldType::int(), None, vec![Attribute::auto_increment()])?;
                Ok(data)
            })))
        }
    }

    fn shelf() -> Data {
        Data::new(ModelType::of::<Shelf>())
    }

    #[test]
    fn source_is_set_once() {
        let mut data = shelf();
        data.set_source(Source::new("shelf")).unwrap();
        assert!(matches!(data.set_source(Source::new("other")), Err(Error::SourceAlreadySet(_))));
        assert_eq!(data.source().map(|s| s.name.as_str()), Some("shelf"));
    }

    #[test]
    fn only_one_generated_value_field() {
        let mut data = shelf();
        data.create_field("id", FieldType::int(), None, vec![Attribute::auto_increment()]).unwrap();

        // Redeclaring the same field replaces it in place.
        data.create_field("ID", FieldType::int(), None, vec![Attribute::auto_increment()]).unwrap();
        assert_eq!(data.fields().len(), 1);

        let err = data.create_field("serial", FieldType::int(), None, vec![Attribute::auto_increment()]).unwrap_err();
        assert!(matches!(err, Error::GeneratedValueExists { existing, .. } if existing == "ID"));
        assert_eq!(data.generated_value_field().map(|f| f.name()), Some("ID"));
    }

    #[test]
    fn indexes_cover_own_fields_only() {
        let mut data = shelf();
        data.create_field("title", FieldType::string(), None, vec![]).unwrap();

        let err = data.create_index(IndexType::Key, vec!["missing".into()], None).unwrap_err();
        assert!(matches!(err, Error::UnknownField { field, .. } if field == "missing"));

        let foreign = Arc::new(Field::new("title", FieldType::string(), Some("book_title"), vec![]).unwrap());
        let err = data.add_index(Index::new(IndexType::Key, vec![foreign], None).unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
        assert!(data.indexes().is_empty());
    }

    #[test]
    fn index_names_and_primary_are_unique() {
        let mut data = shelf();
        data.create_field("id", FieldType::int(), None, vec![Attribute::auto_increment()]).unwrap();
        data.create_field("code", FieldType::string(), None, vec![]).unwrap();

        let primary = data.create_index(IndexType::Primary, vec!["id".into()], None).unwrap();
        assert_eq!(primary.name(), "PRIMARY KEY");
        assert_eq!(primary.generated_value_field().map(|f| f.name()), Some("id"));

        let err = data.create_index(IndexType::Primary, vec!["code".into()], None).unwrap_err();
        assert!(matches!(err, Error::DuplicateIndex(name) if name == "PRIMARY KEY"));

        let err = data.create_index(IndexType::Primary, vec!["code".into()], Some("pk_code")).unwrap_err();
        assert!(matches!(err, Error::PrimaryIndexExists(_)));

        data.create_index(IndexType::Unique, vec!["code".into()], Some("by_code")).unwrap();
        let err = data.create_index(IndexType::Key, vec!["code".into()], Some("by_code")).unwrap_err();
        assert!(matches!(err, Error::DuplicateIndex(_)));

        assert_eq!(data.unique_indexes().len(), 1);
        assert_eq!(data.key_index().map(|i| i.name()), Some("PRIMARY KEY"));
    }

    #[test]
    fn unique_index_is_the_fallback_key() {
        let mut data = shelf();
        data.create_field("code", FieldType::string(), None, vec![]).unwrap();
        assert!(data.key_index().is_none());

        data.create_index(IndexType::Unique, vec!["code".into()], None).unwrap();
        assert_eq!(data.key_index().map(|i| i.kind()), Some(IndexType::Unique));
    }

    #[test]
    fn one_to_many_adds_alias_field() {
        let mut data = shelf();
        let relation = Relation::one_to_many(ModelType::of::<Shelf>(), "owner", "items");
        data.create_field("id", FieldType::int(), None, vec![Attribute::relation(relation)]).unwrap();

        assert_eq!(data.fields().iter().map(|f| f.name()).collect::<Vec<_>>(), ["id", "items"]);
        let items = data.get_field("ITEMS").unwrap();
        assert!(items.is_related());
        assert_eq!(items.relation().map(|r| r.kind()), Some(RelationType::OneToMany));
        assert_eq!(data.stored_fields().map(|f| f.name()).collect::<Vec<_>>(), ["id"]);

        let unnamed = Relation::one_to_many(ModelType::of::<Shelf>(), "owner", "");
        let err = data.create_field("code", FieldType::int(), None, vec![Attribute::relation(unnamed)]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn finalize_binds_relation_targets() {
        let manager = Manager::new(OrmContext::default());

        let mut data = shelf();
        let relation = Relation::one_to_one(ModelType::of::<Shelf>(), "id");
        data.create_field("parent", FieldType::int(), None, vec![Attribute::relation(relation)]).unwrap();
        data.finalize(&manager).await.unwrap();

        let relation = data.get_field("parent").and_then(|f| f.relation()).unwrap();
        assert!(relation.is_resolved());
        assert_eq!(relation.resolved_field().unwrap().name(), "id");
    }

    #[tokio::test]
    async fn finalize_reports_missing_target_field() {
        let manager = Manager::new(OrmContext::default());

        let mut data = shelf();
        let relation = Relation::one_to_one(ModelType::of::<Shelf>(), "isbn");
        data.create_field("parent", FieldType::int(), None, vec![Attribute::relation(relation)]).unwrap();

        let err = data.finalize(&manager).await.unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownRelationField { ref field, ref target_field, .. } if field == "parent" && target_field == "isbn"
        ));
    }
}
