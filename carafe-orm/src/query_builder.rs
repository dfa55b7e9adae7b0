//! # Query Builder Module
//!
//! Builds parametrized SQL over the source of one model and runs it on a
//! [`Connection`]. Identifiers are written as declared; columns of fields marked
//! with `QuoteIdentifier` are quoted for the connection's driver.
//!
//! ## Example
//!
//! ```rust,ignore
//! let qb = QueryBuilder::select(manager.clone(), meta.clone(), connection)?
//!     .where_column("title", Op::Like, "Dune%".into())
//!     .order_by_column("id", Direction::Desc)
//!     .limit(10);
//!
//! assert_eq!(qb.to_sql(), "SELECT id, title, publisher_id FROM book WHERE title LIKE ? ORDER BY id DESC LIMIT 10");
//! let books: Vec<Book> = qb.execute().await?.models()?;
//! ```

// ============================================================================
// External Crate Imports
// ============================================================================

use std::{fmt, sync::Arc};

use futures::StreamExt;
use log::debug;

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{
    connections::Connection,
    database::Drivers,
    errors::{Error, Result},
    field::Field,
    finder::FindOptions,
    manager::Manager,
    meta::Meta,
    model::Model,
    result::{ModelResult, ResultStream},
    value::Value,
};

// ============================================================================
// Operators
// ============================================================================

/// Comparison operator of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl Op {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "LIKE",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A WHERE term. `IS NULL` terms carry no parameter.
#[derive(Debug, Clone)]
struct Condition {
    column: String,
    op: Op,
    value: Value,
}

// ============================================================================
// Query Builder
// ============================================================================

/// A SELECT, INSERT, UPDATE or DELETE statement over one model source.
pub struct QueryBuilder {
    manager: Manager,
    meta: Arc<Meta>,
    connection: Arc<dyn Connection>,
    kind: QueryKind,
    source: String,
    columns: Vec<String>,
    values: Vec<Value>,
    conditions: Vec<Condition>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryBuilder {
    fn new(manager: Manager, meta: Arc<Meta>, connection: Arc<dyn Connection>, kind: QueryKind) -> Result<Self> {
        let source = meta.source()?.to_string();
        Ok(Self {
            manager,
            meta,
            connection,
            kind,
            source,
            columns: Vec::new(),
            values: Vec::new(),
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    /// SELECT of every stored column of the model.
    pub fn select(manager: Manager, meta: Arc<Meta>, connection: Arc<dyn Connection>) -> Result<Self> {
        let mut qb = Self::new(manager, meta, connection, QueryKind::Select)?;
        let columns: Vec<String> = qb.meta.data().stored_fields().map(|f| qb.ident(f)).collect();
        qb.columns = columns;
        Ok(qb)
    }

    /// INSERT of `(column, value)` pairs. Null values are left to the column default;
    /// with nothing left the row is inserted with default values.
    pub fn insert(
        manager: Manager,
        meta: Arc<Meta>,
        connection: Arc<dyn Connection>,
        values: Vec<(String, Value)>,
    ) -> Result<Self> {
        let mut qb = Self::new(manager, meta, connection, QueryKind::Insert)?;
        for (column, value) in values.into_iter().filter(|(_, v)| !v.is_null()) {
            let column = qb.column_ident(&column);
            qb.columns.push(column);
            qb.values.push(value);
        }
        Ok(qb)
    }

    /// UPDATE setting `(column, value)` pairs.
    pub fn update(
        manager: Manager,
        meta: Arc<Meta>,
        connection: Arc<dyn Connection>,
        values: Vec<(String, Value)>,
    ) -> Result<Self> {
        let mut qb = Self::new(manager, meta, connection, QueryKind::Update)?;
        for (column, value) in values {
            let column = qb.column_ident(&column);
            qb.columns.push(column);
            qb.values.push(value);
        }
        Ok(qb)
    }

    pub fn delete(manager: Manager, meta: Arc<Meta>, connection: Arc<dyn Connection>) -> Result<Self> {
        Self::new(manager, meta, connection, QueryKind::Delete)
    }

    pub fn meta(&self) -> &Arc<Meta> {
        &self.meta
    }

    pub fn driver(&self) -> Drivers {
        self.connection.driver()
    }

    fn ident(&self, field: &Field) -> String {
        if field.quote_identifier() {
            self.connection.driver().quote(field.column())
        } else {
            field.column().to_string()
        }
    }

    fn column_ident(&self, column: &str) -> String {
        match self.meta.data().get_field_by_column(column) {
            Some(field) => self.ident(field),
            None => column.to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Modifiers
    // ------------------------------------------------------------------------

    /// Adds `field op value` to the AND-ed conditions.
    pub fn where_field(mut self, field: &Field, op: Op, value: Value) -> Self {
        let column = self.ident(field);
        self.conditions.push(Condition { column, op, value });
        self
    }

    /// Adds a condition on a column, by column name.
    pub fn where_column(mut self, column: &str, op: Op, value: Value) -> Self {
        let column = self.column_ident(column);
        self.conditions.push(Condition { column, op, value });
        self
    }

    pub fn order_by(mut self, field: &Field, direction: Direction) -> Self {
        let column = self.ident(field);
        self.order.push(format!("{} {}", column, direction.as_sql()));
        self
    }

    pub fn order_by_column(mut self, column: &str, direction: Direction) -> Self {
        let column = self.column_ident(column);
        self.order.push(format!("{} {}", column, direction.as_sql()));
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

    /// Applies find options. Filter values are cast through their field first.
    pub fn apply(mut self, options: FindOptions) -> Result<Self> {
        let meta = self.meta.clone();
        let data = meta.data();
        for filter in options.filters {
            let field = data.require_field(&filter.field)?;
            let value = field.decast(&field.cast(filter.value)?)?;
            self = self.where_field(field, filter.op, value);
        }
        for (name, direction) in options.order {
            let field = data.require_field(&name)?;
            self = self.order_by(field, direction);
        }
        if let Some(limit) = options.limit {
            self = self.limit(limit);
        }
        if let Some(offset) = options.offset {
            self = self.offset(offset);
        }
        Ok(self)
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// The SQL text of the statement.
    pub fn to_sql(&self) -> String {
        let driver = self.connection.driver();
        let mut index = 0;
        let mut next = || {
            index += 1;
            driver.placeholder(index)
        };

        let mut sql = match self.kind {
            QueryKind::Select => format!("SELECT {} FROM {}", self.columns.join(", "), self.source),
            QueryKind::Insert if self.columns.is_empty() => match driver {
                Drivers::MySQL => format!("INSERT INTO {} () VALUES ()", self.source),
                Drivers::SQLite | Drivers::Postgres => format!("INSERT INTO {} DEFAULT VALUES", self.source),
            },
            QueryKind::Insert => {
                let placeholders: Vec<String> = self.values.iter().map(|_| next()).collect();
                format!("INSERT INTO {} ({}) VALUES ({})", self.source, self.columns.join(", "), placeholders.join(", "))
            }
            QueryKind::Update => {
                let set: Vec<String> = self.columns.iter().map(|c| format!("{} = {}", c, next())).collect();
                format!("UPDATE {} SET {}", self.source, set.join(", "))
            }
            QueryKind::Delete => format!("DELETE FROM {}", self.source),
        };

        if !self.conditions.is_empty() {
            let terms: Vec<String> = self
                .conditions
                .iter()
                .map(|c| match (c.op, c.value.is_null()) {
                    (Op::Eq, true) => format!("{} IS NULL", c.column),
                    (Op::Ne, true) => format!("{} IS NOT NULL", c.column),
                    (op, _) => format!("{} {} {}", c.column, op.as_sql(), next()),
                })
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&terms.join(" AND "));
        }

        if self.kind == QueryKind::Select {
            if !self.order.is_empty() {
                sql.push_str(" ORDER BY ");
                sql.push_str(&self.order.join(", "));
            }
            match (self.limit, self.offset) {
                (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
                (None, Some(_)) => match driver {
                    Drivers::SQLite => sql.push_str(" LIMIT -1"),
                    Drivers::MySQL => sql.push_str(" LIMIT 18446744073709551615"),
                    Drivers::Postgres => {}
                },
                (None, None) => {}
            }
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        sql
    }

    /// Bound parameters in placeholder order.
    pub fn parameters(&self) -> Vec<Value> {
        let conditions = self
            .conditions
            .iter()
            .filter(|c| !(c.value.is_null() && matches!(c.op, Op::Eq | Op::Ne)))
            .map(|c| c.value.clone());
        self.values.iter().cloned().chain(conditions).collect()
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    pub async fn execute(self) -> Result<ModelResult> {
        let sql = self.to_sql();
        let params = self.parameters();
        debug!("{} {:?}", sql, params);
        let result = self.connection.execute(&sql, &params).await?;
        Ok(ModelResult::new(self.manager, self.meta, result))
    }

    /// Runs a SELECT and hydrates rows as they arrive.
    pub async fn stream<M: Model>(self) -> Result<ResultStream<M>> {
        if !self.meta.model().is::<M>() {
            return Err(Error::ModelMismatch {
                expected: self.meta.model().name().to_string(),
                found: M::model_name().to_string(),
            });
        }
        let hydrator = self.manager.get_hydrator::<M>()?;
        let sql = self.to_sql();
        let params = self.parameters();
        debug!("{} {:?}", sql, params);
        let rows = self.connection.stream(&sql, &params).await?;
        let models = rows.map(move |row| row.and_then(|row| hydrator.hydrate(M::default(), &row, true)));
        Ok(ResultStream::new(models.boxed()))
    }
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("model", &self.meta.model().name())
            .field("sql", &self.to_sql())
            .field("parameters", &self.parameters())
            .finish()
    }
}
