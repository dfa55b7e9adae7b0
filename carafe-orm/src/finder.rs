//! # Finder Module
//!
//! A [`Finder`] builds and runs SELECT queries for one model type.
//!
//! ```rust,ignore
//! let finder = manager.get_finder::<Book>().await?;
//!
//! // Builder, not executed
//! let FindResult::Query(qb) = finder.find(FindOptions::new().filter("title", Op::Like, "D%")).await? else { .. };
//!
//! // Executed
//! let book: Book = finder.find_by_pk(vec![5.into()]).await?;
//! let book: Book = finder.find_first_by(vec![("title".into(), "Dune".into())]).await?;
//! ```

use std::{fmt, marker::PhantomData, sync::Arc};

use log::debug;

use crate::{
    errors::{Error, Result},
    manager::Manager,
    meta::Meta,
    model::Model,
    query_builder::{Direction, Op, QueryBuilder},
    result::ModelResult,
    value::{FieldValue, Value},
};

// ============================================================================
// Find Options
// ============================================================================

/// A condition of a find, by field name.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: FieldValue,
}

/// Modifiers of [`Finder::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filters: Vec<Filter>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// `Some(true)` executes a find; `Some(false)` suppresses execution of a related lookup.
    pub execute: Option<bool>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: impl Into<String>, op: Op, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter { field: field.into(), op, value: value.into() });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filter(field, Op::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn execute(mut self, execute: bool) -> Self {
        self.execute = Some(execute);
        self
    }
}

/// Outcome of [`Finder::find`].
#[derive(Debug)]
pub enum FindResult {
    Query(QueryBuilder),
    Result(ModelResult),
}

impl FindResult {
    pub fn into_query(self) -> Option<QueryBuilder> {
        match self {
            FindResult::Query(qb) => Some(qb),
            FindResult::Result(_) => None,
        }
    }

    pub fn into_result(self) -> Option<ModelResult> {
        match self {
            FindResult::Result(result) => Some(result),
            FindResult::Query(_) => None,
        }
    }
}

/// Arguments of a find method invoked by name.
#[derive(Debug, Clone, Default)]
pub enum FindArgs {
    #[default]
    None,
    Options(FindOptions),
    Keys(Vec<FieldValue>),
    Fields(Vec<(String, FieldValue)>),
}

/// Outcome of a find method invoked by name.
pub enum FindOutput<M> {
    Query(QueryBuilder),
    Result(ModelResult),
    Model(M),
}

impl<M: fmt::Debug> fmt::Debug for FindOutput<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindOutput::Query(qb) => f.debug_tuple("Query").field(qb).finish(),
            FindOutput::Result(result) => f.debug_tuple("Result").field(result).finish(),
            FindOutput::Model(model) => f.debug_tuple("Model").field(model).finish(),
        }
    }
}

// ============================================================================
// Finder
// ============================================================================

/// SELECT queries over model `M`.
pub struct Finder<M: Model> {
    manager: Manager,
    meta: Arc<Meta>,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Finder<M> {
    pub fn new(manager: Manager, meta: Arc<Meta>) -> Self {
        Self { manager, meta, _marker: PhantomData }
    }

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    /// A SELECT of all stored fields, without conditions.
    pub async fn query(&self) -> Result<QueryBuilder> {
        let connection = self.manager.connection_for(self.meta.model(), "find").await?;
        QueryBuilder::select(self.manager.clone(), self.meta.clone(), connection)
    }

    /// Builds a SELECT with `options`; runs it only when `options.execute` is `Some(true)`.
    pub async fn find(&self, options: FindOptions) -> Result<FindResult> {
        let execute = options.execute.unwrap_or(false);
        let qb = self.query().await?.apply(options)?;
        if execute {
            Ok(FindResult::Result(qb.execute().await?))
        } else {
            Ok(FindResult::Query(qb))
        }
    }

    pub async fn find_all(&self) -> Result<ModelResult> {
        self.query().await?.execute().await
    }

    /// Loads the model by its primary index, key values in index-field order.
    pub async fn find_by_pk(&self, keys: Vec<FieldValue>) -> Result<M> {
        if let Some(key) = keys.iter().find(|k| !k.is_scalar()) {
            return Err(Error::invalid_argument(format!(
                "primary key values of {} must be scalars, got {:?}",
                M::model_name(),
                key
            )));
        }

        let data = self.meta.data();
        let index = data.primary_index().ok_or_else(|| Error::NoPrimaryIndex(M::model_name().to_string()))?;
        if index.fields().len() != keys.len() {
            return Err(Error::ArgumentCountMismatch {
                model: M::model_name().to_string(),
                expected: index.fields().len(),
                received: keys.len(),
            });
        }

        let mut qb = self.query().await?;
        let mut criteria = Vec::with_capacity(keys.len());
        for (field, key) in index.fields().iter().zip(keys) {
            let value = field.decast(&field.cast(key)?)?;
            criteria.push(format!("{} = {}", field.name(), value));
            qb = qb.where_field(field, Op::Eq, value);
        }

        debug!("{}::find_by_pk({})", M::model_name(), criteria.join(", "));
        self.first_or_not_found(qb, criteria).await
    }

    /// Loads the first model whose fields equal the given values.
    pub async fn find_first_by(&self, fields: Vec<(String, FieldValue)>) -> Result<M> {
        let data = self.meta.data();
        let mut qb = self.query().await?;
        let mut criteria = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            let field = data.require_field(&name)?;
            let value: Value = field.decast(&field.cast(value)?)?;
            criteria.push(format!("{} = {}", field.name(), value));
            qb = qb.where_field(field, Op::Eq, value);
        }
        self.first_or_not_found(qb.limit(1), criteria).await
    }

    async fn first_or_not_found(&self, qb: QueryBuilder, criteria: Vec<String>) -> Result<M> {
        qb.execute().await?.first::<M>()?.ok_or_else(|| Error::NotFound {
            model: M::model_name().to_string(),
            criteria: criteria.join(", "),
        })
    }

    /// Runs `find{method}` by name: `""`, `"All"`, `"ByPk"` or `"FirstBy"`, ignoring case.
    pub async fn invoke(&self, method: &str, args: FindArgs) -> Result<FindOutput<M>> {
        match (method.to_ascii_lowercase().as_str(), args) {
            ("", FindArgs::None) => self.find(FindOptions::default()).await.map(Into::into),
            ("", FindArgs::Options(options)) => self.find(options).await.map(Into::into),
            ("all", FindArgs::None) => self.find_all().await.map(FindOutput::Result),
            ("bypk", FindArgs::Keys(keys)) => self.find_by_pk(keys).await.map(FindOutput::Model),
            ("firstby", FindArgs::Fields(fields)) => self.find_first_by(fields).await.map(FindOutput::Model),
            ("" | "all" | "bypk" | "firstby", args) => Err(Error::invalid_argument(format!(
                "find{} of {} does not accept {:?}",
                method,
                M::model_name(),
                args
            ))),
            _ => Err(Error::UndefinedFindMethod { model: M::model_name().to_string(), method: method.to_string() }),
        }
    }
}

impl<M> From<FindResult> for FindOutput<M> {
    fn from(result: FindResult) -> Self {
        match result {
            FindResult::Query(qb) => FindOutput::Query(qb),
            FindResult::Result(result) => FindOutput::Result(result),
        }
    }
}
