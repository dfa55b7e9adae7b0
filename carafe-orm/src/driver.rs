//! # Metadata Driver Module
//!
//! A [`MetaDriver`] turns a model type into its [`Data`]. Selection order:
//!
//! 1. a driver configured on the [`OrmContext`] wins unconditionally
//! 2. [`ModelDriver`], when the model returns metadata from [`Model::orm_meta_data`](crate::Model::orm_meta_data)
//! 3. [`AttributeDriver`], when the model carries declarative attributes (`#[derive(Model)]`)
//! 4. otherwise [`Error::NoDriverAvailable`]
//!
//! Drivers that cannot describe a model fail with [`Error::DriverUnavailable`] when
//! they are created, which moves selection to the next candidate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::{
    context::OrmContext,
    errors::{Error, Result},
    field::{Attribute, Field, IndexField, IndexType, Source},
    meta::Data,
    model::{MetaDataFactory, ModelType},
    types::{FieldType, TypeOptions},
};

// ============================================================================
// Driver Trait
// ============================================================================

/// Describes models.
#[async_trait]
pub trait MetaDriver: Send + Sync {
    /// Populates `data`, an empty description of `model`.
    async fn get_meta_data(&self, model: ModelType, data: Data) -> Result<Data>;
}

/// Picks the driver for `model`.
pub fn select_driver(context: &OrmContext, model: ModelType) -> Result<Arc<dyn MetaDriver>> {
    if let Some(driver) = context.meta_driver() {
        info!("Using configured metadata driver for {}", model.name());
        return Ok(driver.clone());
    }

    match ModelDriver::new(context, model) {
        Ok(driver) => {
            info!("Using model metadata driver for {}", model.name());
            return Ok(Arc::new(driver));
        }
        Err(e) => debug!("{}", e),
    }

    match AttributeDriver::new(model) {
        Ok(driver) => {
            info!("Using attribute metadata driver for {}", model.name());
            return Ok(Arc::new(driver));
        }
        Err(e) => warn!("Attribute driver not available for {}: {}", model.name(), e),
    }

    Err(Error::NoDriverAvailable(model.name().to_string()))
}

fn unavailable(model: ModelType, reason: &str) -> Error {
    Error::DriverUnavailable { model: model.name().to_string(), reason: reason.to_string() }
}

// ============================================================================
// Model-Defined Metadata
// ============================================================================

/// Driver for models that build their own [`Data`].
pub struct ModelDriver {
    factory: Mutex<Option<MetaDataFactory>>,
}

impl ModelDriver {
    pub fn new(context: &OrmContext, model: ModelType) -> Result<Self> {
        let data = Data::new(model).with_default_formats(context.datetime_format(), context.date_format());
        match (model.meta_data)(data) {
            Some(factory) => Ok(Self { factory: Mutex::new(Some(factory)) }),
            None => Err(unavailable(model, "model does not define its metadata")),
        }
    }
}

#[async_trait]
impl MetaDriver for ModelDriver {
    async fn get_meta_data(&self, model: ModelType, _data: Data) -> Result<Data> {
        let factory = self
            .factory
            .lock()
            .map_err(|_| unavailable(model, "metadata factory lock poisoned"))?
            .take()
            .ok_or_else(|| unavailable(model, "metadata factory already consumed"))?;

        let data = match factory {
            MetaDataFactory::Ready(data) => data,
            MetaDataFactory::Pending(future) => future.await?,
        };

        if data.model() != model {
            return Err(Error::MetaDataContract {
                model: model.name().to_string(),
                reason: format!("returned metadata of {}", data.model().name()),
            });
        }
        Ok(data)
    }
}

// ============================================================================
// Declarative Attributes
// ============================================================================

/// Declarative metadata of a model, normally generated by `#[derive(Model)]`.
#[derive(Debug, Clone, Default)]
pub struct ModelAttributes {
    pub source: Option<Source>,
    /// Read the attributes of this model instead.
    pub derived: Option<ModelType>,
    pub fields: Vec<FieldAttribute>,
    pub indexes: Vec<IndexAttribute>,
}

/// A declared field.
#[derive(Debug, Clone)]
pub struct FieldAttribute {
    pub name: String,
    pub type_name: String,
    pub options: TypeOptions,
    pub column: Option<String>,
    pub attributes: Vec<Attribute>,
}

/// A declared index over field names.
#[derive(Debug, Clone)]
pub struct IndexAttribute {
    pub kind: IndexType,
    pub fields: Vec<String>,
    pub name: Option<String>,
}

/// Driver reading [`ModelAttributes`].
pub struct AttributeDriver {
    attributes: ModelAttributes,
}

impl AttributeDriver {
    pub fn new(model: ModelType) -> Result<Self> {
        let mut attributes = model.attributes().ok_or_else(|| unavailable(model, "no attributes found"))?;
        if let Some(base) = attributes.derived {
            debug!("{} is derived from {}", model.name(), base.name());
            attributes = base
                .attributes()
                .ok_or_else(|| unavailable(model, &format!("base model {} has no attributes", base.name())))?;
        }
        Ok(Self { attributes })
    }
}

#[async_trait]
impl MetaDriver for AttributeDriver {
    async fn get_meta_data(&self, model: ModelType, mut data: Data) -> Result<Data> {
        info!("Reading attributes of {}", model.name());

        if let Some(source) = &self.attributes.source {
            data.set_source(source.clone())?;
        }

        for attr in &self.attributes.fields {
            debug!(" > field {} ({})", attr.name, attr.type_name);
            let ty = FieldType::from_options(&attr.type_name, attr.options.clone())?;
            data.add_field(Field::new(attr.name.clone(), ty, attr.column.as_deref(), attr.attributes.clone())?)?;
        }

        for index in &self.attributes.indexes {
            let fields = index.fields.iter().map(|f| IndexField::Name(f.clone())).collect();
            data.create_index(index.kind, fields, index.name.as_deref())?;
        }

        Ok(data)
    }
}
