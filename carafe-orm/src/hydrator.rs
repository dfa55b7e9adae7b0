//! # Hydrator Module
//!
//! A [`Hydrator`] moves values between storage rows and instances of one model
//! type. It is built once per model from the finalized [`Meta`] and the model's
//! accessor table, and registered with the [`Manager`] when the metadata resolves.
//!
//! - `hydrate`: row → instance, casting each present column through its field
//! - `assign`: field-name keyed values → instance, all or nothing
//! - `dehydrate`: instance → storage values of every stored field
//! - `to_array`: instance → [`ModelArray`], optionally resolving related proxies
//! - `store_changes` / `get_changes` / `delete_changes`: manage the instance snapshot
//!
//! ```rust,ignore
//! let hydrator = manager.get_hydrator::<Book>()?;
//! let book = hydrator.hydrate(Book::default(), &row, true)?;
//! assert!(hydrator.get_changes(&book)?.is_empty());
//! ```

use std::{collections::HashMap, sync::Arc};

use futures::future::try_join_all;
use log::debug;

use crate::{
    changes::Change,
    errors::{Error, Result},
    field::Field,
    manager::Manager,
    meta::Meta,
    model::{Accessor, DynModel, Model},
    value::{ArrayValue, FieldValue, ModelArray, Row, Value},
};

// ============================================================================
// Hydrator
// ============================================================================

/// Row conversion and change tracking for model `M`.
pub struct Hydrator<M: Model> {
    meta: Arc<Meta>,
    accessors: HashMap<String, Accessor<M>>,
}

impl<M: Model> Hydrator<M> {
    pub fn new(meta: Arc<Meta>) -> Self {
        let accessors = M::field_names()
            .iter()
            .filter_map(|name| {
                let key = name.to_lowercase();
                M::accessor(&key).map(|accessor| (key, accessor))
            })
            .collect();
        Self { meta, accessors }
    }

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    fn accessor(&self, field: &Field) -> Option<&Accessor<M>> {
        self.accessors.get(&field.name().to_lowercase())
    }

    // ------------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------------

    /// Populates `model` from `row`.
    ///
    /// The model's hydration hook runs first and may hand back another instance to
    /// populate. Only columns present in `row` are set.
    pub fn hydrate(&self, model: M, row: &Row, track_changes: bool) -> Result<M> {
        let data = self.meta.data();
        let mut model = model.orm_hydrate_model(data, row).map_err(|e| Error::HydrationContractViolation {
            model: M::model_name().to_string(),
            reason: e.to_string(),
        })?;

        for field in data.stored_fields() {
            let Some(value) = row.get(field.column()) else {
                continue;
            };
            if self.accessor(field).is_none() {
                debug!("{}: no accessor for `{}`, column skipped", M::model_name(), field.name());
                continue;
            }
            self.set_field_value(&mut model, field, FieldValue::Value(value.clone()))?;
        }

        if track_changes {
            self.store_changes(&mut model)?;
        }
        Ok(model)
    }

    /// Writes the values of `data` keyed by field name. Keys that name no stored
    /// field are ignored.
    ///
    /// Every value is cast before the first write, and a failing setter restores the
    /// fields already written, so on error `model` is left as it was.
    pub fn assign(&self, model: &mut M, data: &Row) -> Result<()> {
        let mut pending = Vec::new();
        for field in self.meta.data().stored_fields() {
            let Some(value) = data.get(field.name()) else {
                continue;
            };
            let Some(accessor) = self.accessor(field) else {
                continue;
            };
            pending.push((accessor, field.cast(FieldValue::Value(value.clone()))?));
        }

        let mut written: Vec<(&Accessor<M>, FieldValue)> = Vec::with_capacity(pending.len());
        for (accessor, value) in pending {
            let previous = (accessor.get)(model);
            if let Err(e) = (accessor.set)(model, value) {
                for (accessor, previous) in written.into_iter().rev() {
                    let _ = (accessor.set)(model, previous);
                }
                return Err(e);
            }
            written.push((accessor, previous));
        }
        Ok(())
    }

    /// Storage values of every stored field, in declaration order.
    pub fn dehydrate(&self, model: &M) -> Result<Vec<(String, Value)>> {
        self.meta
            .data()
            .stored_fields()
            .map(|field| Ok((field.column().to_string(), field.decast(&self.get_field_value(model, field))?)))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Field Access
    // ------------------------------------------------------------------------

    /// Casts `value` through `field` and writes it to the model.
    pub fn set_field_value(&self, model: &mut M, field: &Field, value: FieldValue) -> Result<()> {
        let accessor = self.accessor(field).ok_or_else(|| Error::unknown_field(M::model_name(), field.name()))?;
        let value = field.cast(value)?;
        (accessor.set)(model, value)
    }

    /// Reads the current internal value of `field`. Fields without accessor read as null.
    pub fn get_field_value(&self, model: &M, field: &Field) -> FieldValue {
        self.accessor(field).map_or(FieldValue::NULL, |accessor| (accessor.get)(model))
    }

    // ------------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------------

    /// Converts the model to a plain array keyed by field name.
    ///
    /// Proxies are emitted as their raw key unless `resolve_related` is set. Related
    /// models are converted concurrently; keys keep declaration order.
    pub async fn to_array(&self, manager: &Manager, model: &M, resolve_related: bool) -> Result<ModelArray> {
        let mut array = ModelArray::new();
        let mut nested: Vec<(String, NestedValue)> = Vec::new();

        for field in self.meta.data().stored_fields() {
            match self.get_field_value(model, field) {
                FieldValue::Proxy(proxy) if resolve_related => {
                    array.insert(field.name(), ArrayValue::Value(Value::Null));
                    nested.push((field.name().to_string(), NestedValue::Proxy(proxy)));
                }
                FieldValue::Model(related) => {
                    array.insert(field.name(), ArrayValue::Value(Value::Null));
                    nested.push((field.name().to_string(), NestedValue::Model(related)));
                }
                value => array.insert(field.name(), ArrayValue::Value(field.decast(&value)?)),
            }
        }

        let resolved = try_join_all(nested.into_iter().map(|(name, value)| async move {
            let related = match value {
                NestedValue::Proxy(proxy) => manager.resolve_proxy(&proxy).await?,
                NestedValue::Model(related) => related,
            };
            let inner = related.to_array_dyn(manager, false).await?;
            Ok::<_, Error>((name, inner))
        }))
        .await?;

        for (name, inner) in resolved {
            array.insert(name, ArrayValue::Model(inner));
        }
        Ok(array)
    }

    // ------------------------------------------------------------------------
    // Changes
    // ------------------------------------------------------------------------

    /// Snapshots the storage values of every stored field.
    pub fn store_changes(&self, model: &mut M) -> Result<()> {
        let snapshot = self
            .meta
            .data()
            .stored_fields()
            .map(|field| Ok((field.clone(), field.decast(&self.get_field_value(model, field))?)))
            .collect::<Result<Vec<_>>>()?;
        model.changes_mut().store(snapshot);
        Ok(())
    }

    /// Fields whose storage value differs from the snapshot.
    pub fn get_changes(&self, model: &M) -> Result<Vec<Change>> {
        model.changes().diff(|field| field.decast(&self.get_field_value(model, field)))
    }

    pub fn delete_changes(&self, model: &mut M) {
        model.changes_mut().clear();
    }
}

enum NestedValue {
    Proxy(crate::value::ProxyValue),
    Model(Arc<dyn DynModel>),
}
