//! # Related Proxy Module
//!
//! A one-to-one relation field holds a [`RelatedProxy`] until the related model is
//! needed. The proxy carries the relation and the raw foreign key; resolving it
//! looks the target model up by the relation's target field.
//!
//! ```rust,ignore
//! let book = Book::find_by_pk(&manager, vec![5.into()]).await?;
//! let proxy = book.publisher.clone().unwrap();
//! assert_eq!(proxy.raw_value(), Some(&Value::Int(9)));
//!
//! // SELECT id, name FROM publisher WHERE id = ? LIMIT 1
//! let publisher = proxy.resolve(&manager).await?;
//! ```

use std::{fmt, sync::Arc};

use futures::future::BoxFuture;
use log::debug;

use crate::{
    errors::{Error, Result},
    field::Relation,
    manager::Manager,
    model::{DynModel, Model},
    value::{FieldValue, FromFieldValue, IntoFieldValue, ProxyValue, Value},
};

/// A related model of type `M`, loaded on demand.
pub enum RelatedProxy<M: Model> {
    Unresolved { relation: Arc<Relation>, value: Value },
    Resolved(Arc<M>),
}

impl<M: Model> RelatedProxy<M> {
    pub fn new(relation: Arc<Relation>, value: Value) -> Self {
        RelatedProxy::Unresolved { relation, value }
    }

    /// A proxy already holding its model.
    pub fn resolved(model: M) -> Self {
        RelatedProxy::Resolved(Arc::new(model))
    }

    /// The foreign key of an unresolved proxy.
    pub fn raw_value(&self) -> Option<&Value> {
        match self {
            RelatedProxy::Unresolved { value, .. } => Some(value),
            RelatedProxy::Resolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, RelatedProxy::Resolved(_))
    }

    /// The model, once resolved.
    pub fn model(&self) -> Option<&Arc<M>> {
        match self {
            RelatedProxy::Resolved(model) => Some(model),
            RelatedProxy::Unresolved { .. } => None,
        }
    }

    /// Loads the related model. A resolved proxy returns its model without a query.
    pub async fn resolve(&self, manager: &Manager) -> Result<Arc<M>> {
        let (relation, value) = match self {
            RelatedProxy::Resolved(model) => return Ok(model.clone()),
            RelatedProxy::Unresolved { relation, value } => (relation, value),
        };

        if !relation.model().is::<M>() {
            return Err(Error::ModelMismatch {
                expected: relation.model().name().to_string(),
                found: M::model_name().to_string(),
            });
        }

        let target = relation.resolved_field()?;
        debug!("Resolving {} by {} = {}", M::model_name(), target.name(), value);
        let finder = manager.get_finder::<M>().await?;
        let model = finder.find_first_by(vec![(target.name().to_string(), FieldValue::Value(value.clone()))]).await?;
        Ok(Arc::new(model))
    }

    /// Resolves the proxy and keeps the model.
    pub async fn resolve_in_place(&mut self, manager: &Manager) -> Result<Arc<M>> {
        let model = self.resolve(manager).await?;
        *self = RelatedProxy::Resolved(model.clone());
        Ok(model)
    }
}

impl<M: Model> Clone for RelatedProxy<M> {
    fn clone(&self) -> Self {
        match self {
            RelatedProxy::Unresolved { relation, value } => {
                RelatedProxy::Unresolved { relation: relation.clone(), value: value.clone() }
            }
            RelatedProxy::Resolved(model) => RelatedProxy::Resolved(model.clone()),
        }
    }
}

impl<M: Model> fmt::Debug for RelatedProxy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelatedProxy::Unresolved { value, .. } => f.debug_tuple("Unresolved").field(value).finish(),
            RelatedProxy::Resolved(_) => f.debug_tuple("Resolved").field(&M::model_name()).finish(),
        }
    }
}

impl<M: Model> IntoFieldValue for RelatedProxy<M> {
    fn into_field_value(&self) -> FieldValue {
        match self {
            RelatedProxy::Unresolved { relation, value } => {
                FieldValue::Proxy(ProxyValue { relation: relation.clone(), value: value.clone() })
            }
            RelatedProxy::Resolved(model) => FieldValue::Model(model.clone()),
        }
    }
}

impl<M: Model> FromFieldValue for RelatedProxy<M> {
    fn from_field_value(value: FieldValue) -> Result<Self> {
        match value {
            FieldValue::Proxy(proxy) => Ok(RelatedProxy::Unresolved { relation: proxy.relation, value: proxy.value }),
            FieldValue::Model(model) => {
                let found = model.model_type().name();
                model.into_any().downcast::<M>().map(RelatedProxy::Resolved).map_err(|_| Error::ModelMismatch {
                    expected: M::model_name().to_string(),
                    found: found.to_string(),
                })
            }
            other => Err(Error::conversion(format!(
                "cannot read {:?} as a proxy of {}, the field has no one-to-one relation",
                other,
                M::model_name()
            ))),
        }
    }
}

/// Resolves a proxy of `M` behind a type-erased handle.
pub(crate) fn resolve_erased<M: Model>(
    manager: Manager,
    relation: Arc<Relation>,
    value: Value,
) -> BoxFuture<'static, Result<Arc<dyn DynModel>>> {
    Box::pin(async move {
        let model = RelatedProxy::<M>::new(relation, value).resolve(&manager).await?;
        Ok(model as Arc<dyn DynModel>)
    })
}
