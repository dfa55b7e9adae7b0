//! # Result Module
//!
//! [`ModelResult`] is the outcome of an executed [`QueryBuilder`](crate::QueryBuilder):
//! the raw rows plus the statement counters, with typed extraction of hydrated
//! models. [`ResultStream`] yields hydrated models one by one.

use std::{
    fmt,
    marker::PhantomData,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{Stream, StreamExt, stream::BoxStream};

use crate::{
    connections::QueryResult,
    errors::{Error, Result},
    manager::Manager,
    meta::Meta,
    model::{DynModel, Model},
    value::Row,
};

// ============================================================================
// Model Result
// ============================================================================

/// Rows and counters of an executed statement.
pub struct ModelResult {
    manager: Manager,
    meta: Arc<Meta>,
    result: QueryResult,
}

impl ModelResult {
    pub(crate) fn new(manager: Manager, meta: Arc<Meta>, result: QueryResult) -> Self {
        Self { manager, meta, result }
    }

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    pub fn rows(&self) -> &[Row] {
        &self.result.rows
    }

    pub fn len(&self) -> usize {
        self.result.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.rows.is_empty()
    }

    pub fn insert_id(&self) -> Option<i64> {
        self.result.insert_id
    }

    pub fn affected_rows(&self) -> u64 {
        self.result.affected_rows
    }

    pub fn warning_count(&self) -> u64 {
        self.result.warning_count
    }

    pub fn query_result(&self) -> &QueryResult {
        &self.result
    }

    fn check<M: Model>(&self) -> Result<()> {
        if self.meta.model().is::<M>() {
            Ok(())
        } else {
            Err(Error::ModelMismatch {
                expected: self.meta.model().name().to_string(),
                found: M::model_name().to_string(),
            })
        }
    }

    /// Hydrates every row, with change tracking.
    pub fn models<M: Model>(&self) -> Result<Vec<M>> {
        self.check::<M>()?;
        let hydrator = self.manager.get_hydrator::<M>()?;
        self.result.rows.iter().map(|row| hydrator.hydrate(M::default(), row, true)).collect()
    }

    /// Hydrates the first row, if any.
    pub fn first<M: Model>(&self) -> Result<Option<M>> {
        self.check::<M>()?;
        let Some(row) = self.result.rows.first() else {
            return Ok(None);
        };
        let hydrator = self.manager.get_hydrator::<M>()?;
        hydrator.hydrate(M::default(), row, true).map(Some)
    }

    /// Hydrates the first row as a model of the result's runtime type.
    pub fn first_dyn(&self) -> Result<Option<Arc<dyn DynModel>>> {
        match self.result.rows.first() {
            Some(row) => (self.meta.model().hydrate_dyn)(&self.manager, row).map(Some),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ModelResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelResult")
            .field("model", &self.meta.model().name())
            .field("result", &self.result)
            .finish()
    }
}

pub(crate) fn hydrate_erased<M: Model>(manager: &Manager, row: &Row) -> Result<Arc<dyn DynModel>> {
    let hydrator = manager.get_hydrator::<M>()?;
    let model = hydrator.hydrate(M::default(), row, true)?;
    Ok(Arc::new(model))
}

// ============================================================================
// Result Stream
// ============================================================================

/// Hydrated models of a streamed SELECT.
pub struct ResultStream<M> {
    inner: BoxStream<'static, Result<M>>,
    _marker: PhantomData<fn() -> M>,
}

impl<M> ResultStream<M> {
    pub(crate) fn new(inner: BoxStream<'static, Result<M>>) -> Self {
        Self { inner, _marker: PhantomData }
    }
}

impl<M> Stream for ResultStream<M> {
    type Item = Result<M>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
