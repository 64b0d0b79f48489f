//! Per-engine SQL rendering: identifier quoting, placeholders and column types.

use crate::entity::{ColumnDef, ColumnKind, Value};

/// SQL dialect of an open database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// MySQL / MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

impl Dialect {
    /// Quotes a trusted identifier.
    ///
    /// Callers pass only names that come from entity descriptors or have
    /// already been validated; the quote character is still doubled so the
    /// output is well-formed.
    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Renders the type clause for a column.
    pub fn column_type(self, kind: ColumnKind) -> String {
        match (self, kind) {
            (_, ColumnKind::Varchar(len)) => format!("VARCHAR({len})"),
            (_, ColumnKind::Text) => "TEXT".to_string(),
            (Self::Sqlite, ColumnKind::BigInt) => "INTEGER".to_string(),
            (_, ColumnKind::BigInt) => "BIGINT".to_string(),
            (Self::MySql, ColumnKind::Bool) => "TINYINT(1)".to_string(),
            (Self::Postgres, ColumnKind::Bool) => "BOOLEAN".to_string(),
            (Self::Sqlite, ColumnKind::Bool) => "INTEGER".to_string(),
        }
    }

    /// Wraps a column expression so it compares as a string.
    pub fn cast_to_text(self, expr: &str) -> String {
        match self {
            Self::MySql => format!("CAST({expr} AS CHAR)"),
            Self::Postgres | Self::Sqlite => format!("CAST({expr} AS TEXT)"),
        }
    }

    /// Renders a full column definition for `CREATE TABLE` / `ADD COLUMN`.
    pub fn column_definition(self, column: &ColumnDef) -> String {
        let mut def = format!(
            "{} {}",
            self.quote(&column.column_name()),
            self.column_type(column.kind)
        );
        if column.key {
            def.push_str(" NOT NULL");
        }
        def
    }
}

/// A rendered SQL statement and its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text containing placeholders only, never values.
    pub sql: String,
    /// Parameters bound to the placeholders.
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Accumulates bound parameters and hands out dialect-specific placeholders.
#[derive(Debug)]
pub(crate) struct Binder {
    dialect: Dialect,
    params: Vec<Value>,
}

impl Binder {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    /// Records `value` and returns the placeholder that refers to it.
    pub(crate) fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        match self.dialect {
            Dialect::Postgres => format!("${}", self.params.len()),
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
        }
    }

    pub(crate) fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}
