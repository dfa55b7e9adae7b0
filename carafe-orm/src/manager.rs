//! # Manager Module
//!
//! The [`Manager`] orchestrates everything model-related:
//!
//! - memoized metadata per model type, built at most once even under concurrent
//!   first access
//! - hydrators and finders per model type
//! - the connection registry
//! - the model lifecycle: find, insert, update, save, delete and assign
//! - relation access: proxy resolution and one-to-many lookups
//!
//! ## Metadata Build
//!
//! Metadata is built in two phases, each memoized in its own cache:
//!
//! 1. raw: a metadata driver populates [`Data`]; the source defaults to the
//!    naming strategy applied to the model short name
//! 2. finalized: relations of the raw data are bound to fields of the raw data of
//!    their target models, then the hydrator is registered
//!
//! Finalization only ever waits on raw data, so models referencing each other
//! finalize without waiting on one another.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use carafe_orm::{DatabaseConfig, Manager, ModelActions, OrmContext};
//!
//! let manager = Manager::new(OrmContext::default());
//! manager.add_connection(DatabaseConfig::new("sqlite::memory:"), "*", &[]);
//!
//! let mut book = Book::find_by_pk(&manager, vec![5.into()]).await?;
//! let publisher = book.get_field(&manager, "publisher", FindOptions::default()).await?;
//! book.title = "Dune Messiah".to_string();
//! book.save(&manager).await?;
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{
    any::{Any, TypeId},
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use heck::ToSnakeCase;
use log::{debug, info};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    connections::{Connection, ConnectionConfig, Connections},
    context::OrmContext,
    driver::select_driver,
    errors::{Error, Result},
    field::{Field, Relation, RelationType, Source},
    finder::{FindArgs, FindOptions, FindOutput, Finder},
    hydrator::Hydrator,
    meta::{Data, Meta},
    model::{DynModel, Model, ModelType},
    query_builder::{Op, QueryBuilder},
    result::ModelResult,
    value::{FieldValue, ModelArray, ProxyValue, Row, Value},
};

type SharedData = Shared<BoxFuture<'static, Result<Arc<Data>>>>;
type SharedMeta = Shared<BoxFuture<'static, Result<Arc<Meta>>>>;
type Erased = Arc<dyn Any + Send + Sync>;

/// Value of a field read through [`Manager::get_model_field`].
#[derive(Debug)]
pub enum FieldOutput {
    /// The field value. One-to-one relations hold the resolved model.
    Value(FieldValue),
    /// An unexecuted one-to-many lookup.
    Query(QueryBuilder),
    /// An executed one-to-many lookup.
    Result(ModelResult),
}

impl FieldOutput {
    pub fn into_value(self) -> Option<FieldValue> {
        match self {
            FieldOutput::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<ModelResult> {
        match self {
            FieldOutput::Result(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_query(self) -> Option<QueryBuilder> {
        match self {
            FieldOutput::Query(qb) => Some(qb),
            _ => None,
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

struct Inner {
    context: OrmContext,
    connections: Connections,
    data: Mutex<HashMap<String, SharedData>>,
    metas: Mutex<HashMap<String, SharedMeta>>,
    hydrators: Mutex<HashMap<TypeId, Erased>>,
    finders: Mutex<HashMap<TypeId, Erased>>,
    initialized: Mutex<HashSet<TypeId>>,
}

/// Entry point of the ORM. Cloning is cheap and clones share all caches.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Manager {
    pub fn new(context: OrmContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                connections: Connections::new(),
                data: Mutex::new(HashMap::new()),
                metas: Mutex::new(HashMap::new()),
                hydrators: Mutex::new(HashMap::new()),
                finders: Mutex::new(HashMap::new()),
                initialized: Mutex::new(HashSet::new()),
            }),
        }
    }

    fn upgrade(inner: &Weak<Inner>) -> Result<Self> {
        inner.upgrade().map(|inner| Self { inner }).ok_or_else(|| Error::Connection("manager was dropped".into()))
    }

    pub fn context(&self) -> &OrmContext {
        &self.inner.context
    }

    pub fn connections(&self) -> &Connections {
        &self.inner.connections
    }

    /// Registers a connection for models whose name matches `pattern`.
    pub fn add_connection(&self, config: impl ConnectionConfig + 'static, pattern: &str, ops: &[&str]) -> &Self {
        self.inner.connections.add(config, pattern, ops);
        self
    }

    pub async fn connection_for(&self, model: ModelType, op: &str) -> Result<Arc<dyn Connection>> {
        self.inner.connections.get(model.name(), op).await
    }

    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    pub async fn get_meta<M: Model>(&self) -> Result<Arc<Meta>> {
        self.meta_for(ModelType::of::<M>()).await
    }

    /// Finalized metadata of `model`, built on first request.
    pub async fn meta_for(&self, model: ModelType) -> Result<Arc<Meta>> {
        self.initialize(model);
        let future = {
            let mut metas = lock(&self.inner.metas);
            metas.entry(model.key()).or_insert_with(|| self.build_meta(model)).clone()
        };
        future.await
    }

    /// Raw metadata of `model`: populated by its driver, relations not yet bound.
    pub async fn data_for(&self, model: ModelType) -> Result<Arc<Data>> {
        let future = {
            let mut data = lock(&self.inner.data);
            data.entry(model.key()).or_insert_with(|| self.build_data(model)).clone()
        };
        future.await
    }

    fn initialize(&self, model: ModelType) {
        let first = lock(&self.inner.initialized).insert(model.type_id());
        if first {
            debug!("Initializing model {}", model.name());
            (model.initialize)();
        }
    }

    fn build_data(&self, model: ModelType) -> SharedData {
        let context = self.inner.context.clone();
        async move {
            info!("Building metadata of {}", model.name());
            let driver = select_driver(&context, model)?;
            let data = Data::new(model).with_default_formats(context.datetime_format(), context.date_format());
            let mut data = driver.get_meta_data(model, data).await?;
            if !data.has_source() {
                let table = context.naming_strategy().table_name(model.short_name());
                debug!("{}: source defaults to `{}`", model.name(), table);
                data.set_source(Source::new(table))?;
            }
            Ok(Arc::new(data))
        }
        .boxed()
        .shared()
    }

    fn build_meta(&self, model: ModelType) -> SharedMeta {
        let inner = Arc::downgrade(&self.inner);
        async move {
            let manager = Self::upgrade(&inner)?;
            let data = manager.data_for(model).await?;
            data.finalize(&manager).await?;
            let meta = Arc::new(Meta::new(model, data));
            (model.register_hydrator)(&manager, &meta);
            debug!("Metadata of {} is ready", model.name());
            Ok(meta)
        }
        .boxed()
        .shared()
    }

    // ------------------------------------------------------------------------
    // Hydrators & Finders
    // ------------------------------------------------------------------------

    pub(crate) fn register_hydrator<M: Model>(&self, meta: &Arc<Meta>) {
        let hydrator: Erased = Arc::new(Hydrator::<M>::new(meta.clone()));
        lock(&self.inner.hydrators).insert(TypeId::of::<M>(), hydrator);
    }

    /// The hydrator of `M`. Available once `get_meta::<M>()` has completed.
    pub fn get_hydrator<M: Model>(&self) -> Result<Arc<Hydrator<M>>> {
        let hydrator = lock(&self.inner.hydrators).get(&TypeId::of::<M>()).cloned();
        hydrator
            .and_then(|h| h.downcast::<Hydrator<M>>().ok())
            .ok_or_else(|| Error::HydratorNotReady(M::model_name().to_string()))
    }

    pub async fn get_finder<M: Model>(&self) -> Result<Arc<Finder<M>>> {
        let cached = lock(&self.inner.finders).get(&TypeId::of::<M>()).cloned();
        if let Some(Ok(finder)) = cached.map(|f| f.downcast::<Finder<M>>()) {
            return Ok(finder);
        }

        let meta = self.get_meta::<M>().await?;
        let mut finders = lock(&self.inner.finders);
        let finder = finders
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Arc::new(Finder::<M>::new(self.clone(), meta)))
            .clone();
        finder.downcast::<Finder<M>>().map_err(|_| Error::ModelMismatch {
            expected: M::model_name().to_string(),
            found: "another finder".to_string(),
        })
    }

    /// Runs `find{method}` of the finder of `M`.
    pub async fn invoke_find<M: Model>(&self, method: &str, args: FindArgs) -> Result<FindOutput<M>> {
        self.get_finder::<M>().await?.invoke(method, args).await
    }

    async fn lifecycle<M: Model>(&self) -> Result<(Arc<Meta>, Arc<Hydrator<M>>)> {
        let meta = self.get_meta::<M>().await?;
        let hydrator = self.get_hydrator::<M>()?;
        Ok((meta, hydrator))
    }

    // ------------------------------------------------------------------------
    // Field Access
    // ------------------------------------------------------------------------

    fn lookup_field<'a>(meta: &'a Meta, name: &str) -> Result<&'a Arc<Field>> {
        let data = meta.data();
        data.get_field(&name.to_snake_case())
            .or_else(|| data.get_field(name))
            .ok_or_else(|| Error::unknown_field(meta.model().name(), name))
    }

    /// Reads a field by name.
    ///
    /// A one-to-one relation is resolved on first access and the model is written
    /// back. A one-to-many alias looks up the related rows, executed unless
    /// `options.execute` is `Some(false)`.
    pub async fn get_model_field<M: Model>(&self, model: &mut M, name: &str, options: FindOptions) -> Result<FieldOutput> {
        let (meta, hydrator) = self.lifecycle::<M>().await?;
        let field = Self::lookup_field(&meta, name)?.clone();

        let Some(relation) = field.relation() else {
            return Ok(FieldOutput::Value(hydrator.get_field_value(model, &field)));
        };

        if field.is_related() {
            let owner = field
                .field_type()
                .field()
                .ok_or_else(|| Error::RelationNotResolved(field.name().to_string()))?;
            let key = owner.decast(&hydrator.get_field_value(model, owner))?;
            return self.related_rows(relation, key, options).await;
        }

        if relation.kind() == RelationType::OneToOne {
            if let FieldValue::Proxy(proxy) = hydrator.get_field_value(model, &field) {
                let value = FieldValue::Model(self.resolve_proxy(&proxy).await?);
                hydrator.set_field_value(model, &field, value.clone())?;
                return Ok(FieldOutput::Value(value));
            }
        }

        Ok(FieldOutput::Value(hydrator.get_field_value(model, &field)))
    }

    async fn related_rows(&self, relation: &Relation, key: Value, options: FindOptions) -> Result<FieldOutput> {
        let target = self.meta_for(relation.model()).await?;
        let target_field = relation.resolved_field()?.clone();
        let connection = self.connection_for(relation.model(), "find").await?;
        let execute = options.execute != Some(false);

        debug!("Loading {} by {} = {}", relation.model().name(), target_field.name(), key);
        let qb = QueryBuilder::select(self.clone(), target, connection)?
            .where_field(&target_field, Op::Eq, key)
            .apply(options)?;

        if execute { Ok(FieldOutput::Result(qb.execute().await?)) } else { Ok(FieldOutput::Query(qb)) }
    }

    /// Casts `value` and writes it to a field by name.
    pub async fn set_model_field<M: Model>(&self, model: &mut M, name: &str, value: FieldValue) -> Result<()> {
        let (meta, hydrator) = self.lifecycle::<M>().await?;
        let field = Self::lookup_field(&meta, name)?;
        hydrator.set_field_value(model, field, value)
    }

    /// An unresolved proxy of the relation's target model.
    pub fn get_related_proxy(&self, relation: Arc<Relation>, value: Value) -> FieldValue {
        FieldValue::Proxy(ProxyValue { relation, value })
    }

    /// Loads the model a proxy refers to.
    pub async fn resolve_proxy(&self, proxy: &ProxyValue) -> Result<Arc<dyn DynModel>> {
        let target = proxy.relation.model();
        (target.resolve_proxy)(self.clone(), proxy.relation.clone(), proxy.value.clone()).await
    }

    pub async fn model_to_array<M: Model>(&self, model: &M, resolve_related: bool) -> Result<ModelArray> {
        let (_, hydrator) = self.lifecycle::<M>().await?;
        hydrator.to_array(self, model, resolve_related).await
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Inserts the model, writes back the generated identity and snapshots changes.
    pub async fn insert_model<M: Model>(&self, model: &mut M) -> Result<()> {
        debug!("Insert model: {}", M::model_name());
        let (meta, hydrator) = self.lifecycle::<M>().await?;
        let values = hydrator.dehydrate(model)?;
        let connection = self.connection_for(meta.model(), "insert").await?;
        let result = QueryBuilder::insert(self.clone(), meta.clone(), connection, values)?.execute().await?;

        if let (Some(id), Some(field)) = (result.insert_id(), meta.data().generated_value_field()) {
            debug!("{}: generated {} = {}", M::model_name(), field.name(), id);
            hydrator.set_field_value(model, field, FieldValue::Value(Value::Int(id)))?;
        }
        hydrator.store_changes(model)
    }

    /// Updates the changed columns of the model. Without changes nothing is executed.
    pub async fn update_model<M: Model>(&self, model: &mut M) -> Result<()> {
        debug!("Update model: {}", M::model_name());
        match self.update_changes(model).await {
            Err(Error::NoChanges) => {
                debug!("{}: no changes to update", M::model_name());
                Ok(())
            }
            other => other,
        }
    }

    async fn update_changes<M: Model>(&self, model: &mut M) -> Result<()> {
        let (meta, hydrator) = self.lifecycle::<M>().await?;
        let changes = hydrator.get_changes(model)?;
        info!("Found {} change(s) in model {}", changes.len(), M::model_name());
        if changes.is_empty() {
            return Err(Error::NoChanges);
        }

        let index = meta.data().key_index().ok_or_else(|| Error::NoUsableIndex {
            model: M::model_name().to_string(),
            operation: "update".to_string(),
        })?;

        let values = changes.into_iter().map(|c| (c.field.column().to_string(), c.current)).collect();
        let connection = self.connection_for(meta.model(), "update").await?;
        let mut qb = QueryBuilder::update(self.clone(), meta.clone(), connection, values)?;
        for field in index.fields() {
            let value = field.decast(&hydrator.get_field_value(model, field))?;
            qb = qb.where_field(field, Op::Eq, value);
        }

        let result = qb.execute().await?;
        debug!("Affected rows: {}", result.affected_rows());
        hydrator.store_changes(model)
    }

    /// Inserts or updates, depending on the generated value of the primary index.
    pub async fn save_model<M: Model>(&self, model: &mut M) -> Result<()> {
        let (meta, hydrator) = self.lifecycle::<M>().await?;
        let Some(index) = meta.data().primary_index() else {
            return self.insert_model(model).await;
        };
        let generated = index
            .generated_value_field()
            .ok_or_else(|| Error::AmbiguousSaveStrategy(M::model_name().to_string()))?;

        if hydrator.get_field_value(model, generated).is_null() {
            self.insert_model(model).await
        } else {
            self.update_model(model).await
        }
    }

    /// Deletes the row of the model by its key index; returns whether a row was affected.
    pub async fn delete_model<M: Model>(&self, model: &mut M) -> Result<bool> {
        debug!("Delete model: {}", M::model_name());
        let (meta, hydrator) = self.lifecycle::<M>().await?;
        let index = meta.data().key_index().ok_or_else(|| Error::NoUsableIndex {
            model: M::model_name().to_string(),
            operation: "delete".to_string(),
        })?;

        let connection = self.connection_for(meta.model(), "delete").await?;
        let mut qb = QueryBuilder::delete(self.clone(), meta.clone(), connection)?;
        for field in index.fields() {
            let value = field.decast(&hydrator.get_field_value(model, field))?;
            qb = qb.where_field(field, Op::Eq, value);
        }

        let result = qb.execute().await?;
        hydrator.delete_changes(model);
        Ok(result.affected_rows() > 0)
    }

    /// Assigns field-name keyed values without touching the change snapshot.
    ///
    /// Keys that name no stored field are ignored. On a cast failure the model is
    /// left unchanged.
    pub async fn assign_model<M: Model>(&self, model: &mut M, data: Row) -> Result<()> {
        let (_, hydrator) = self.lifecycle::<M>().await?;
        hydrator.assign(model, &data)
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("context", &self.inner.context)
            .field("connections", &self.inner.connections.len())
            .finish()
    }
}
