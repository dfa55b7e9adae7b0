#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use carafe_orm::{
    Changes, Connection, ConnectionConfig, Drivers, Manager, Model, OrmContext, QueryResult, RelatedProxy, Result, Row,
    Value,
};
use futures::stream::{self, BoxStream, StreamExt};

// ============================================================================
// Models
// ============================================================================

#[derive(Model, Debug, Default)]
pub struct Publisher {
    #[orm(primary_key, generated, relation(one_to_many, model = Book, field = "publisher", alias = "books"))]
    pub id: Option<i64>,
    pub name: String,
    pub changes: Changes,
}

#[derive(Model, Debug, Default)]
pub struct Book {
    #[orm(primary_key, generated)]
    pub id: Option<i64>,
    pub title: String,
    #[orm(column = "publisher_id", relation(one_to_one, model = Publisher, field = "id"))]
    pub publisher: Option<RelatedProxy<Publisher>>,
    pub changes: Changes,
}

/// Every stored column is either generated or nullable.
#[derive(Model, Debug, Default)]
pub struct Visit {
    #[orm(primary_key, generated)]
    pub id: Option<i64>,
    pub note: Option<String>,
    pub changes: Changes,
}

// ============================================================================
// Recording Connection
// ============================================================================

/// Statements seen by a [`MockConnection`] and the results it hands out.
#[derive(Default)]
pub struct Recorder {
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    results: Mutex<VecDeque<QueryResult>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the result of the next statement.
    pub fn push(&self, result: QueryResult) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push(QueryResult::with_rows(rows));
    }

    pub fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }

    pub fn last(&self) -> Option<(String, Vec<Value>)> {
        self.statements.lock().unwrap().last().cloned()
    }

    fn next(&self, sql: &str, params: &[Value]) -> QueryResult {
        self.statements.lock().unwrap().push((sql.to_string(), params.to_vec()));
        self.results.lock().unwrap().pop_front().unwrap_or_default()
    }
}

pub struct MockConnection(Arc<Recorder>);

#[async_trait]
impl Connection for MockConnection {
    fn driver(&self) -> Drivers {
        Drivers::SQLite
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        Ok(self.0.next(sql, params))
    }

    async fn stream(&self, sql: &str, params: &[Value]) -> Result<BoxStream<'static, Result<Row>>> {
        let rows = self.0.next(sql, params).rows;
        Ok(stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

pub struct MockConfig(pub Arc<Recorder>);

#[async_trait]
impl ConnectionConfig for MockConfig {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MockConnection(self.0.clone())))
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn row(values: &[(&str, Value)]) -> Row {
    values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// A manager with one recording connection for every model.
pub fn manager() -> (Manager, Arc<Recorder>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let recorder = Recorder::new();
    let manager = Manager::new(OrmContext::default());
    manager.add_connection(MockConfig(recorder.clone()), "*", &[]);
    (manager, recorder)
}
