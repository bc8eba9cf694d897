//! Concrete dialects.

use std::sync::Arc;

use sqldao_core::{
    DatabaseType, Dialect, LimitPlacement, quote_ident, quote_ident_mssql, quote_ident_mysql,
};

/// Unquoted identifiers, trailing `LIMIT`, `RETURNING` for generated keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ansi;

impl Dialect for Ansi {
    fn name(&self) -> &'static str {
        "ansi"
    }
}

/// SQL Server: bracket quoting, `TOP n`, `SELECT @@IDENTITY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSql;

impl Dialect for MsSql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_table(&self, table: &str) -> String {
        quote_ident_mssql(table)
    }

    fn quote_column(&self, column: &str) -> String {
        quote_ident_mssql(column)
    }

    fn limit_placement(&self) -> LimitPlacement {
        LimitPlacement::Top
    }

    fn generated_key_suffix(&self, _key_column: &str) -> String {
        format!("{}SELECT @@IDENTITY AS ID", self.terminator())
    }
}

/// PostgreSQL: quoted columns, tables optionally qualified with a schema.
#[derive(Debug, Clone, Default)]
pub struct Postgres {
    schema: Option<String>,
}

impl Postgres {
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualify every table with `schema`.
    pub fn with_schema(schema: impl Into<String>) -> Self {
        let schema = schema.into();
        Self {
            schema: (!schema.is_empty()).then_some(schema),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_table(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, table),
            None => table.to_string(),
        }
    }

    fn quote_column(&self, column: &str) -> String {
        quote_ident(column)
    }

    fn generated_key_suffix(&self, key_column: &str) -> String {
        format!(" RETURNING {} AS ID{}", key_column, self.terminator())
    }
}

/// MySQL: backtick quoting, `LAST_INSERT_ID()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_table(&self, table: &str) -> String {
        quote_ident_mysql(table)
    }

    fn quote_column(&self, column: &str) -> String {
        quote_ident_mysql(column)
    }

    fn generated_key_suffix(&self, _key_column: &str) -> String {
        format!("{}SELECT LAST_INSERT_ID() AS ID", self.terminator())
    }
}

/// SQLite: double-quote quoting, `last_insert_rowid()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_table(&self, table: &str) -> String {
        quote_ident(table)
    }

    fn quote_column(&self, column: &str) -> String {
        quote_ident(column)
    }

    fn generated_key_suffix(&self, _key_column: &str) -> String {
        format!("{}SELECT last_insert_rowid() AS ID", self.terminator())
    }
}

/// Firebird: double-quote quoting, `ROWS n`, quoted `RETURNING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Firebird;

impl Dialect for Firebird {
    fn name(&self) -> &'static str {
        "firebird"
    }

    fn quote_table(&self, table: &str) -> String {
        quote_ident(table)
    }

    fn quote_column(&self, column: &str) -> String {
        quote_ident(column)
    }

    fn limit_clause(&self, n: u64) -> String {
        format!(" ROWS {} ", n)
    }

    fn generated_key_suffix(&self, key_column: &str) -> String {
        format!(
            " RETURNING {} AS {}{}",
            quote_ident(key_column),
            quote_ident("ID"),
            self.terminator()
        )
    }
}

/// The dialect a configured database type speaks.
pub fn dialect_for(database_type: DatabaseType) -> Arc<dyn Dialect> {
    match database_type {
        DatabaseType::Sqlite => Arc::new(Sqlite),
        DatabaseType::MsSql => Arc::new(MsSql),
        DatabaseType::MySql => Arc::new(MySql),
        DatabaseType::Postgres => Arc::new(Postgres::new()),
    }
}
