//! # Context Module
//!
//! [`OrmContext`] holds the configurable collaborators of a [`Manager`](crate::Manager):
//! naming strategy, default date formats and an optional metadata driver override.
//! Every setting is optional.
//!
//! ```rust,ignore
//! let context = OrmContext::builder()
//!     .naming_strategy(SnakeCase::with_prefix("app_"))
//!     .datetime_format("Y-m-d\\TH:i:s")
//!     .build();
//! let manager = Manager::new(context);
//! ```

use std::{fmt, sync::Arc};

use crate::{
    driver::MetaDriver,
    naming::{NamingStrategy, SnakeCase},
    temporal::{DEFAULT_DATE_FORMAT, DEFAULT_DATETIME_FORMAT},
};

/// Configuration shared by everything a manager builds.
#[derive(Clone)]
pub struct OrmContext {
    naming_strategy: Arc<dyn NamingStrategy>,
    datetime_format: String,
    date_format: String,
    meta_driver: Option<Arc<dyn MetaDriver>>,
}

impl Default for OrmContext {
    fn default() -> Self {
        Self {
            naming_strategy: Arc::new(SnakeCase::new()),
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            meta_driver: None,
        }
    }
}

impl OrmContext {
    pub fn builder() -> OrmContextBuilder {
        OrmContextBuilder::default()
    }

    pub fn naming_strategy(&self) -> &dyn NamingStrategy {
        self.naming_strategy.as_ref()
    }

    pub fn datetime_format(&self) -> &str {
        &self.datetime_format
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// A driver that describes every model, bypassing driver selection.
    pub fn meta_driver(&self) -> Option<&Arc<dyn MetaDriver>> {
        self.meta_driver.as_ref()
    }
}

impl fmt::Debug for OrmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrmContext")
            .field("datetime_format", &self.datetime_format)
            .field("date_format", &self.date_format)
            .field("meta_driver", &self.meta_driver.is_some())
            .finish()
    }
}

/// Builder of [`OrmContext`].
#[derive(Default)]
pub struct OrmContextBuilder {
    context: OrmContext,
}

impl OrmContextBuilder {
    pub fn naming_strategy(mut self, strategy: impl NamingStrategy + 'static) -> Self {
        self.context.naming_strategy = Arc::new(strategy);
        self
    }

    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.context.datetime_format = format.into();
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.context.date_format = format.into();
        self
    }

    pub fn meta_driver(mut self, driver: impl MetaDriver + 'static) -> Self {
        self.context.meta_driver = Some(Arc::new(driver));
        self
    }

    pub fn build(self) -> OrmContext {
        self.context
    }
}
