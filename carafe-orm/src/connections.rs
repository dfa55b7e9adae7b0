//! # Connections Module
//!
//! The ORM executes SQL through the [`Connection`] trait. Connections are registered
//! in a [`Connections`] registry as lazy [`ConnectionConfig`]s, each with a
//! glob pattern matched against model names:
//!
//! ```rust,ignore
//! manager.add_connection(DatabaseConfig::new("sqlite::memory:"), "*", &[]);
//! manager.add_connection(DatabaseConfig::new("postgres://localhost/audit"), "app::audit::*", &["write"]);
//! ```
//!
//! Lookup returns the first registration, in registration order, whose pattern
//! matches. A connection is created on first use and then shared.
//!
//! Patterns support `*` (any run of characters) and `?` (one character).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::stream::BoxStream;
use log::{debug, info};
use tokio::sync::OnceCell;
use wildmatch::WildMatch;

use crate::{
    database::Drivers,
    errors::{Error, Result},
    value::{Row, Value},
};

// ============================================================================
// Connection Traits
// ============================================================================

/// Outcome of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Identity generated by an INSERT, when the driver reports one.
    pub insert_id: Option<i64>,
    pub affected_rows: u64,
    pub warning_count: u64,
}

impl QueryResult {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self { rows, ..Self::default() }
    }

    pub fn with_affected_rows(affected_rows: u64) -> Self {
        Self { affected_rows, ..Self::default() }
    }
}

/// A connection able to run parametrized SQL.
#[async_trait]
pub trait Connection: Send + Sync {
    /// SQL dialect spoken by the connection.
    fn driver(&self) -> Drivers;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Runs a query and yields its rows one by one.
    async fn stream(&self, sql: &str, params: &[Value]) -> Result<BoxStream<'static, Result<Row>>>;
}

/// Lazily creates a [`Connection`].
#[async_trait]
pub trait ConnectionConfig: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn Connection>>;
}

// ============================================================================
// Registry
// ============================================================================

struct Entry {
    config: Box<dyn ConnectionConfig>,
    pattern: String,
    matcher: WildMatch,
    ops: Vec<String>,
    connection: OnceCell<Arc<dyn Connection>>,
}

impl Entry {
    async fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.connection
            .get_or_try_init(|| async {
                info!("Opening connection for pattern `{}`", self.pattern);
                self.config.create().await
            })
            .await
            .cloned()
    }
}

/// Registered connection configurations.
#[derive(Default)]
pub struct Connections {
    entries: RwLock<Vec<Arc<Entry>>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `config` for models matching `pattern`.
    ///
    /// `ops` names the operations the connection is meant for. It is recorded but
    /// lookups currently match on the pattern only.
    pub fn add(&self, config: impl ConnectionConfig + 'static, pattern: &str, ops: &[&str]) {
        debug!("Registering connection for pattern `{}`", pattern);
        let entry = Entry {
            config: Box::new(config),
            pattern: pattern.to_string(),
            matcher: WildMatch::new(pattern),
            ops: ops.iter().map(|op| op.to_string()).collect(),
            connection: OnceCell::new(),
        };
        match self.entries.write() {
            Ok(mut entries) => entries.push(Arc::new(entry)),
            Err(poisoned) => poisoned.into_inner().push(Arc::new(entry)),
        }
    }

    /// Returns the connection of the first registration matching `name`.
    pub async fn get(&self, name: &str, op: &str) -> Result<Arc<dyn Connection>> {
        let entry = {
            let entries = match self.entries.read() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries.iter().find(|e| e.matcher.matches(name)).cloned()
        };

        match entry {
            Some(entry) => {
                debug!("{} ({}) uses connection `{}` {:?}", name, op, entry.pattern, entry.ops);
                entry.connection().await
            }
            None => Err(Error::NoConnectionAvailable(name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;

    use super::*;

    struct Fixed(Drivers);

    #[async_trait]
    impl Connection for Fixed {
        fn driver(&self) -> Drivers {
            self.0
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
            Ok(QueryResult::default())
        }

        async fn stream(&self, _sql: &str, _params: &[Value]) -> Result<BoxStream<'static, Result<Row>>> {
            Ok(Box::pin(stream::empty()))
        }
    }

    struct Config {
        driver: Drivers,
        created: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ConnectionConfig for Config {
        async fn create(&self) -> Result<Arc<dyn Connection>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fixed(self.driver)))
        }
    }

    fn config(driver: Drivers, created: &Arc<AtomicUsize>) -> Config {
        Config { driver, created: created.clone() }
    }

    #[tokio::test]
    async fn first_matching_pattern_wins() {
        let created = Arc::new(AtomicUsize::new(0));
        let connections = Connections::new();
        connections.add(config(Drivers::MySQL, &created), "app::audit::*", &["write"]);
        connections.add(config(Drivers::SQLite, &created), "*", &[]);

        assert_eq!(connections.get("app::audit::Entry", "read").await.unwrap().driver(), Drivers::MySQL);
        assert_eq!(connections.get("app::Book", "read").await.unwrap().driver(), Drivers::SQLite);
        assert_eq!(connections.len(), 2);
    }

    #[tokio::test]
    async fn connection_is_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let connections = Connections::new();
        connections.add(config(Drivers::SQLite, &created), "app::*", &[]);

        let a = connections.get("app::Book", "read").await.unwrap();
        let b = connections.get("app::Publisher", "write").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_match_is_an_error() {
        let created = Arc::new(AtomicUsize::new(0));
        let connections = Connections::new();
        assert!(connections.is_empty());
        connections.add(config(Drivers::SQLite, &created), "app::?ook", &[]);

        assert!(connections.get("app::Book", "read").await.is_ok());
        assert!(matches!(
            connections.get("other::Book", "read").await,
            Err(Error::NoConnectionAvailable(name)) if name == "other::Book"
        ));
    }
}
