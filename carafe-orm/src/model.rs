//! # Model Module
//!
//! This module defines the [`Model`] trait every entity implements, the runtime
//! handle [`ModelType`] used wherever a model has to be named without a type
//! parameter (relations, caches), the object-safe [`DynModel`] view of a model
//! instance, and the [`ModelActions`] surface exposed to application code.
//!
//! ## Overview
//!
//! A model is a plain struct with:
//!
//! - an accessor table mapping each ORM field name to a getter and a setter
//! - a [`Changes`] snapshot owned by the instance, used to compute partial updates
//! - optional hooks: model-defined metadata, hydration override and initialization
//!
//! The accessor table and the declarative metadata are normally generated by
//! `#[derive(Model)]`.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use carafe_orm::{Changes, Model, ModelActions, RelatedProxy};
//!
//! #[derive(Model, Debug, Default, Clone)]
//! struct Book {
//!     #[orm(primary_key, generated)]
//!     id: Option<i64>,
//!     title: String,
//!     #[orm(column = "publisher_id", relation(one_to_one, model = Publisher, field = "id"))]
//!     publisher: Option<RelatedProxy<Publisher>>,
//!     changes: Changes,
//! }
//!
//! let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;
//! book.title = "Dune".to_string();
//! book.save(&manager).await?;
//! ```
//!
//! ## Supported ORM Attributes
//!
//! Container level:
//!
//! - `#[orm(table = "name")]`, `#[orm(schema = "name")]` - Source of the model
//! - `#[orm(derived = Base)]` - Read the declarative metadata of `Base`
//! - `#[orm(index(unique, fields("a", "b"), name = "..."))]` - Composite index
//!
//! Field level:
//!
//! - `#[orm(primary_key)]`, `#[orm(unique)]`, `#[orm(index)]` - Single field indexes
//! - `#[orm(generated)]` / `#[orm(auto_increment)]` - Identity assigned on insert
//! - `#[orm(column = "...")]`, `#[orm(name = "...")]` - Storage column and field name
//! - `#[orm(type = "decimal", precision = 10, scale = 2, format = "...", nullable)]`
//! - `#[orm(quote)]` - Quote the column identifier in generated SQL
//! - `#[orm(relation(one_to_one, model = T, field = "id"))]`
//! - `#[orm(relation(one_to_many, model = T, field = "owner", alias = "items"))]`
//! - `#[orm(skip)]` - Not an ORM field

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::BoxFuture;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    changes::Changes,
    driver::ModelAttributes,
    errors::Result,
    finder::{FindOptions, FindResult},
    manager::{FieldOutput, Manager},
    meta::{Data, Meta},
    proxy,
    result::ModelResult,
    value::{FieldValue, ModelArray, Row, Value},
};

// ============================================================================
// Accessor Table
// ============================================================================

/// Getter and setter of one model field.
pub struct Accessor<M> {
    pub get: fn(&M) -> FieldValue,
    pub set: fn(&mut M, FieldValue) -> Result<()>,
}

impl<M> Clone for Accessor<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Accessor<M> {}

/// What a model-defined metadata factory returns.
pub enum MetaDataFactory {
    Ready(Data),
    Pending(BoxFuture<'static, Result<Data>>),
}

// ============================================================================
// Model Trait
// ============================================================================

/// The contract of every ORM entity.
pub trait Model: Default + Send + Sync + 'static {
    /// Full name of the model, matched against connection patterns.
    fn model_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Name without the module path, used to derive the table name.
    fn short_name() -> &'static str {
        let name = Self::model_name();
        name.rsplit("::").next().unwrap_or(name)
    }

    /// ORM field names that have an accessor, in declaration order.
    fn field_names() -> &'static [&'static str];

    /// Looks up the accessor of a field by its lower-cased name.
    fn accessor(name: &str) -> Option<Accessor<Self>>;

    fn changes(&self) -> &Changes;

    fn changes_mut(&mut self) -> &mut Changes;

    /// Describes the model metadata. Returning `Some` selects the model-defined driver.
    fn orm_meta_data(data: Data) -> Option<MetaDataFactory> {
        let _ = data;
        None
    }

    /// Declarative metadata read by the attribute driver.
    fn orm_attributes() -> Option<ModelAttributes> {
        None
    }

    /// Runs before a row is hydrated into `self` and may return another instance to populate.
    fn orm_hydrate_model(self, data: &Data, row: &Row) -> Result<Self> {
        let _ = (data, row);
        Ok(self)
    }

    /// Called once per model type, the first time its metadata is requested.
    fn orm_initialize() {}
}

// ============================================================================
// Model Type Handle
// ============================================================================

/// A runtime handle naming a model type.
#[derive(Clone, Copy)]
pub struct ModelType {
    name: fn() -> &'static str,
    short_name: fn() -> &'static str,
    type_id: fn() -> TypeId,
    pub(crate) meta_data: fn(Data) -> Option<MetaDataFactory>,
    pub(crate) attributes: fn() -> Option<ModelAttributes>,
    pub(crate) initialize: fn(),
    pub(crate) register_hydrator: fn(&Manager, &Arc<Meta>),
    pub(crate) resolve_proxy: fn(Manager, Arc<crate::field::Relation>, Value) -> BoxFuture<'static, Result<Arc<dyn DynModel>>>,
    pub(crate) hydrate_dyn: fn(&Manager, &Row) -> Result<Arc<dyn DynModel>>,
}

impl ModelType {
    pub fn of<M: Model>() -> Self {
        Self {
            name: M::model_name,
            short_name: M::short_name,
            type_id: TypeId::of::<M>,
            meta_data: M::orm_meta_data,
            attributes: M::orm_attributes,
            initialize: M::orm_initialize,
            register_hydrator: Manager::register_hydrator::<M>,
            resolve_proxy: proxy::resolve_erased::<M>,
            hydrate_dyn: crate::result::hydrate_erased::<M>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    pub fn short_name(&self) -> &'static str {
        (self.short_name)()
    }

    /// Cache key of the model.
    pub fn key(&self) -> String {
        self.name().to_lowercase()
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn is<M: Model>(&self) -> bool {
        self.type_id() == TypeId::of::<M>()
    }

    pub fn attributes(&self) -> Option<ModelAttributes> {
        (self.attributes)()
    }
}

impl PartialEq for ModelType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for ModelType {}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelType").field(&self.name()).finish()
    }
}

// ============================================================================
// Object-Safe Model View
// ============================================================================

/// A model instance whose type is only known at runtime.
pub trait DynModel: Send + Sync + 'static {
    fn model_type(&self) -> ModelType;

    /// Reads a field through the accessor table; unknown fields read as null.
    fn read_field(&self, name: &str) -> FieldValue;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Converts the instance to its plain array form.
    fn to_array_dyn<'a>(&'a self, manager: &'a Manager, resolve_related: bool) -> BoxFuture<'a, Result<ModelArray>>;
}

impl<M: Model> DynModel for M {
    fn model_type(&self) -> ModelType {
        ModelType::of::<M>()
    }

    fn read_field(&self, name: &str) -> FieldValue {
        M::accessor(&name.to_lowercase()).map_or(FieldValue::NULL, |a| (a.get)(self))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn to_array_dyn<'a>(&'a self, manager: &'a Manager, resolve_related: bool) -> BoxFuture<'a, Result<ModelArray>> {
        Box::pin(manager.model_to_array(self, resolve_related))
    }
}

// ============================================================================
// Model Actions
// ============================================================================

/// Operations available on every model, dispatched through a [`Manager`].
#[async_trait]
pub trait ModelActions: Model {
    /// Builds a SELECT over the model; executes it when `options.execute` is set.
    async fn find(manager: &Manager, options: FindOptions) -> Result<FindResult> {
        manager.get_finder::<Self>().await?.find(options).await
    }

    async fn find_all(manager: &Manager) -> Result<ModelResult> {
        manager.get_finder::<Self>().await?.find_all().await
    }

    async fn find_by_pk(manager: &Manager, keys: Vec<FieldValue>) -> Result<Self> {
        manager.get_finder::<Self>().await?.find_by_pk(keys).await
    }

    async fn find_first_by(manager: &Manager, fields: Vec<(String, FieldValue)>) -> Result<Self> {
        manager.get_finder::<Self>().await?.find_first_by(fields).await
    }

    /// Reads a field by name, resolving relations.
    async fn get_field(&mut self, manager: &Manager, name: &str, options: FindOptions) -> Result<FieldOutput> {
        manager.get_model_field(self, name, options).await
    }

    async fn set_field(&mut self, manager: &Manager, name: &str, value: FieldValue) -> Result<()> {
        manager.set_model_field(self, name, value).await
    }

    async fn to_array(&self, manager: &Manager, resolve_related: bool) -> Result<ModelArray> {
        manager.model_to_array(self, resolve_related).await
    }

    async fn to_json(&self, manager: &Manager) -> Result<String> {
        manager.model_to_array(self, false).await?.to_json()
    }

    /// Assigns field-name keyed values without touching the change snapshot.
    async fn assign(&mut self, manager: &Manager, data: Row) -> Result<()> {
        manager.assign_model(self, data).await
    }

    async fn save(&mut self, manager: &Manager) -> Result<()> {
        manager.save_model(self).await
    }

    async fn insert(&mut self, manager: &Manager) -> Result<()> {
        manager.insert_model(self).await
    }

    async fn update(&mut self, manager: &Manager) -> Result<()> {
        manager.update_model(self).await
    }

    /// Deletes the row of the model; returns whether a row was affected.
    async fn delete(&mut self, manager: &Manager) -> Result<bool> {
        manager.delete_model(self).await
    }
}

impl<M: Model> ModelActions for M {}
