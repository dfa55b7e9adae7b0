//! # Carafe ORM
//!
//! An async ORM runtime: typed field metadata with cast/decast, memoized model
//! metadata with cross-model relations, row hydration with per-instance change
//! tracking, lazy one-to-one proxies and one-to-many lookups, and a lifecycle
//! (find, insert, update, save, delete) dispatched through a [`Manager`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use carafe_orm::{Changes, DatabaseConfig, Manager, Model, ModelActions, OrmContext, RelatedProxy};
//!
//! #[derive(Model, Debug, Default)]
//! struct Publisher {
//!     #[orm(primary_key, generated)]
//!     id: Option<i64>,
//!     name: String,
//!     changes: Changes,
//! }
//!
//! #[derive(Model, Debug, Default)]
//! struct Book {
//!     #[orm(primary_key, generated)]
//!     id: Option<i64>,
//!     title: String,
//!     #[orm(column = "publisher_id", relation(one_to_one, model = Publisher, field = "id"))]
//!     publisher: Option<RelatedProxy<Publisher>>,
//!     changes: Changes,
//! }
//!
//! let manager = Manager::new(OrmContext::default());
//! manager.add_connection(DatabaseConfig::new("sqlite::memory:"), "*", &[]);
//!
//! let mut book = Book { title: "Dune".into(), ..Default::default() };
//! book.save(&manager).await?;
//! ```

pub use carafe_orm_macro::Model;

pub mod changes;
pub mod connections;
pub mod context;
pub mod database;
pub mod driver;
pub mod errors;
pub mod field;
pub mod finder;
pub mod hydrator;
pub mod manager;
pub mod meta;
pub mod model;
pub mod naming;
pub mod proxy;
pub mod query_builder;
pub mod result;
pub mod temporal;
pub mod types;
pub mod value;

pub use changes::{Change, Changes};
pub use connections::{Connection, ConnectionConfig, Connections, QueryResult};
pub use context::{OrmContext, OrmContextBuilder};
pub use database::{Database, DatabaseBuilder, DatabaseConfig, Drivers};
pub use driver::{AttributeDriver, FieldAttribute, IndexAttribute, MetaDriver, ModelAttributes, ModelDriver, select_driver};
pub use errors::{Error, ErrorKind, Result};
pub use field::{Attribute, Field, GeneratedValue, Index, IndexField, IndexType, Relation, RelationType, Source};
pub use finder::{Filter, FindArgs, FindOptions, FindOutput, FindResult, Finder};
pub use hydrator::Hydrator;
pub use manager::{FieldOutput, Manager};
pub use meta::{Data, Meta};
pub use model::{Accessor, DynModel, MetaDataFactory, Model, ModelActions, ModelType};
pub use naming::{NamingStrategy, SnakeCase};
pub use proxy::RelatedProxy;
pub use query_builder::{Direction, Op, QueryBuilder};
pub use result::{ModelResult, ResultStream};
pub use types::{EnumOption, FieldKind, FieldType, TypeOptions};
pub use value::{
    ArrayValue, EnumCase, FieldValue, FromFieldValue, IntoFieldValue, ModelArray, OrmEnum, ProxyValue, Row, Value,
};

/// Items referenced by `#[derive(Model)]` expansions.
#[doc(hidden)]
pub mod __private {
    pub use crate::types::enum_options;
}
