use serde_json::Value;
use sqlx::{postgres::PgArguments, Executor, Postgres};
use uuid::Uuid;

use crate::database::manager::DatabaseError;

/// A positional SQL parameter. Null binds as nullable text, so callers cast
/// (`$1::timestamptz`) wherever the target column is not text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Json(Value),
}

impl From<Value> for SqlParam {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlParam::Int(i)
                } else if let Some(u) = n.as_u64() {
                    // Postgres doesn't have u64; values past i64::MAX go through as text
                    i64::try_from(u).map(SqlParam::Int).unwrap_or_else(|_| SqlParam::Text(u.to_string()))
                } else if let Some(f) = n.as_f64() {
                    SqlParam::Float(f)
                } else {
                    SqlParam::Text(n.to_string())
                }
            }
            Value::String(s) => SqlParam::Text(s),
            other => SqlParam::Json(other),
        }
    }
}

impl From<&str> for SqlParam {
    fn from(s: &str) -> Self {
        SqlParam::Text(s.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(s: String) -> Self {
        SqlParam::Text(s)
    }
}

impl From<Uuid> for SqlParam {
    fn from(id: Uuid) -> Self {
        SqlParam::Uuid(id)
    }
}

impl From<bool> for SqlParam {
    fn from(b: bool) -> Self {
        SqlParam::Bool(b)
    }
}

impl From<i64> for SqlParam {
    fn from(i: i64) -> Self {
        SqlParam::Int(i)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

/// Thin wrapper over a parameterized statement with dynamically built binds
#[derive(Debug, Clone)]
pub struct SqlQuery {
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    pub fn bind(mut self, param: impl Into<SqlParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Execute and return the number of affected rows
    pub async fn execute<'e, E>(&self, executor: E) -> Result<u64, DatabaseError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let mut q = sqlx::query(&self.sql);
        for p in self.params.iter() {
            q = bind_param(q, p);
        }
        let result = q.execute(executor).await?;
        Ok(result.rows_affected())
    }
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    p: &SqlParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match p {
        SqlParam::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        SqlParam::Bool(b) => q.bind(*b),
        SqlParam::Int(i) => q.bind(*i),
        SqlParam::Float(f) => q.bind(*f),
        SqlParam::Text(s) => q.bind(s.clone()),
        SqlParam::Uuid(id) => q.bind(*id),
        SqlParam::Json(v) => q.bind(v.clone()), // JSONB
    }
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
