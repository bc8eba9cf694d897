//! The statement builder.
//!
//! [`StatementBuilder`] is the statement buffer: rendered SQL so far, the
//! ordered parameter values, the next parameter ordinal and a dialect that
//! formats identifiers. Fluent methods append; `go()` terminates the current
//! statement; any of the `execute*` methods hands the whole buffer to a
//! [`Database`] and resets it, whether or not execution succeeded.
//!
//! ```
//! use sqldao_query::{Assignment, Filter, StatementBuilder};
//! use sqldao_core::Value;
//!
//! let mut b = StatementBuilder::ansi();
//! b.update("Person", &[Assignment::new("Status", Value::Int(1))])
//!     .where_filter(&Filter::col("Id").eq(7_i64))
//!     .go();
//! assert_eq!(b.sql(), "UPDATE Person SET Status = @P1 WHERE Id = @P2 ;\r\n");
//! assert_eq!(b.params(), &[Value::Int(1), Value::BigInt(7)]);
//! ```

use sqldao_core::{
    BoundParameter, Database, Dialect, Error, FilterErrorKind, LimitPlacement, Result, RowSet,
    TableSchema, Value, bind_parameters, parameter_name,
};
use serde::{Deserialize, Serialize};

use crate::dialect::Ansi;
use crate::filter::Filter;

static ANSI: Ansi = Ansi;

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[serde(alias = "asc")]
    #[default]
    Ascending,
    #[serde(alias = "desc")]
    Descending,
}

impl SortOrder {
    pub const fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

/// A column/value pair for INSERT and UPDATE.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub column: String,
    pub value: Value,
    /// Overrides the dialect's column formatting for this column only
    pub formatter: Option<fn(&str) -> String>,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            formatter: None,
        }
    }

    pub fn with_formatter(mut self, formatter: fn(&str) -> String) -> Self {
        self.formatter = Some(formatter);
        self
    }
}

/// Builder behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderOptions {
    /// Allow `SELECT *` and projections outside the schema's columns
    pub select_star: bool,
}

/// Accumulates one or more statements for a single round trip.
///
/// Not for concurrent use: one builder per unit of work.
#[derive(Debug)]
pub struct StatementBuilder<'d> {
    dialect: &'d dyn Dialect,
    options: BuilderOptions,
    sql: String,
    params: Vec<Value>,
    next_ordinal: usize,
    pending_limit: Option<u64>,
}

impl StatementBuilder<'static> {
    /// A builder for the default ANSI dialect.
    pub fn ansi() -> Self {
        Self::new(&ANSI)
    }
}

impl<'d> StatementBuilder<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            options: BuilderOptions::default(),
            sql: String::new(),
            params: Vec::new(),
            next_ordinal: 1,
            pending_limit: None,
        }
    }

    /// A builder using `db`'s dialect.
    pub fn for_database(db: &'d dyn Database) -> Self {
        Self::new(db.dialect())
    }

    pub fn with_options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    pub fn options(&self) -> BuilderOptions {
        self.options
    }

    /// SQL rendered so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter values in ordinal order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Parameters named with the dialect prefix, ready for a driver.
    pub fn bound_parameters(&self) -> Vec<BoundParameter> {
        bind_parameters(self.dialect.parameter_prefix(), 1, &self.params)
    }

    /// The ordinal the next parameter will receive.
    pub fn next_ordinal(&self) -> usize {
        self.next_ordinal
    }

    /// True when nothing but whitespace has been appended.
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty() && self.pending_limit.is_none()
    }

    /// Clear text, parameters and ordinal state.
    pub fn reset(&mut self) {
        self.sql.clear();
        self.params.clear();
        self.next_ordinal = 1;
        self.pending_limit = None;
    }

    fn append(&mut self, text: &str) -> &mut Self {
        tracing::trace!(dialect = self.dialect.name(), text, "Append");
        self.sql.push_str(text);
        self
    }

    fn placeholder(&mut self, value: Value) -> String {
        let name = parameter_name(self.dialect.parameter_prefix(), self.next_ordinal);
        self.next_ordinal += 1;
        self.params.push(value);
        name
    }

    fn assignment_column(&self, assignment: &Assignment) -> String {
        match assignment.formatter {
            Some(format) => format(&assignment.column),
            None => self.dialect.quote_column(&assignment.column),
        }
    }

    fn column_list(&self, columns: &[&str]) -> String {
        columns
            .iter()
            .map(|c| self.dialect.quote_column(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn projection(&self, schema: &TableSchema) -> String {
        if self.options.select_star {
            "*".to_string()
        } else {
            self.column_list(&schema.column_names())
        }
    }

    /// `SELECT <schema columns> FROM <table> `.
    pub fn select(&mut self, schema: &TableSchema) -> &mut Self {
        self.select_top(0, schema)
    }

    /// `SELECT <columns> FROM <table> `, rejecting columns the schema does
    /// not declare unless select-star is enabled.
    pub fn select_columns(&mut self, schema: &TableSchema, columns: &[&str]) -> Result<&mut Self> {
        if !self.options.select_star {
            if let Some(bad) = columns.iter().find(|c| !schema.has_column(c)) {
                return Err(Error::malformed_filter(
                    FilterErrorKind::InvalidColumn,
                    Some(*bad),
                    format!("invalid column specified for {}", schema.name()),
                ));
            }
        }
        let cols = if columns.is_empty() {
            self.projection(schema)
        } else {
            self.column_list(columns)
        };
        let text = format!("SELECT {} FROM {} ", cols, self.dialect.quote_table(schema.name()));
        Ok(self.append(&text))
    }

    /// `SELECT` limited to `top` rows; `0` means unlimited.
    ///
    /// Trailing limits are appended by the next `go()`.
    pub fn select_top(&mut self, top: u64, schema: &TableSchema) -> &mut Self {
        let mut top_text = String::new();
        if top > 0 {
            match self.dialect.limit_placement() {
                LimitPlacement::Top => top_text = self.dialect.limit_clause(top),
                LimitPlacement::Trailing => self.pending_limit = Some(top),
            }
        }
        let text = format!(
            "SELECT {}{} FROM {} ",
            top_text,
            self.projection(schema),
            self.dialect.quote_table(schema.name())
        );
        self.append(&text)
    }

    pub fn select_count(&mut self, table: &str) -> &mut Self {
        let text = format!("SELECT COUNT(*) FROM {} ", self.dialect.quote_table(table));
        self.append(&text)
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        let text = format!("DELETE FROM {} ", self.dialect.quote_table(table));
        self.append(&text)
    }

    /// `INSERT INTO <table> (<cols>) VALUES (<placeholders>)`.
    pub fn insert(&mut self, table: &str, assignments: &[Assignment]) -> &mut Self {
        let text = format!("INSERT INTO {} ", self.dialect.quote_table(table));
        self.append(&text);
        if assignments.is_empty() {
            return self.append("DEFAULT VALUES");
        }
        let columns: Vec<String> = assignments
            .iter()
            .map(|a| self.assignment_column(a))
            .collect();
        let placeholders: Vec<String> = assignments
            .iter()
            .map(|a| self.placeholder(a.value.clone()))
            .collect();
        let text = format!("({}) VALUES ({})", columns.join(", "), placeholders.join(", "));
        self.append(&text)
    }

    /// `UPDATE <table> SET <col> = <placeholder>, ... `.
    pub fn update(&mut self, table: &str, assignments: &[Assignment]) -> &mut Self {
        let text = format!("UPDATE {} ", self.dialect.quote_table(table));
        self.append(&text);
        let sets: Vec<String> = assignments
            .iter()
            .map(|a| {
                let column = self.assignment_column(a);
                format!("{} = {}", column, self.placeholder(a.value.clone()))
            })
            .collect();
        let text = format!("SET {} ", sets.join(", "));
        self.append(&text)
    }

    fn append_filter(&mut self, keyword: &str, filter: &Filter) -> &mut Self {
        let dialect = self.dialect;
        let rendered = filter.render_with(
            self.next_ordinal,
            dialect.parameter_prefix(),
            &|c: &str| dialect.quote_column(c),
        );
        self.next_ordinal = rendered.next_ordinal;
        self.params.extend(rendered.params);
        let text = format!("{} {} ", keyword, rendered.sql);
        self.append(&text)
    }

    /// `WHERE <filter> `.
    pub fn where_filter(&mut self, filter: &Filter) -> &mut Self {
        self.append_filter("WHERE", filter)
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.where_filter(&Filter::col(column).eq(value))
    }

    /// `AND <filter> `, continuing a WHERE clause.
    pub fn and_filter(&mut self, filter: &Filter) -> &mut Self {
        self.append_filter("AND", filter)
    }

    pub fn and_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.and_filter(&Filter::col(column).eq(value))
    }

    pub fn order_by(&mut self, column: &str, order: SortOrder) -> &mut Self {
        let text = format!("ORDER BY {} {}", self.dialect.quote_column(column), order.as_sql());
        self.append(&text)
    }

    /// Ask for the generated key of the preceding INSERT as an `ID` column.
    pub fn id(&mut self, key_column: &str) -> &mut Self {
        let text = self.dialect.generated_key_suffix(key_column);
        self.append(&text)
    }

    /// A SQL line comment on its own line.
    pub fn comment(&mut self, text: &str) -> &mut Self {
        let text = format!("\r\n-- {}\r\n", text);
        self.append(&text)
    }

    /// Terminate the current statement.
    ///
    /// Appends any pending trailing limit, then the terminator unless the
    /// buffer is empty or already ends with it.
    pub fn go(&mut self) -> &mut Self {
        if let Some(limit) = self.pending_limit.take() {
            let text = self.dialect.limit_clause(limit);
            self.append(&text);
        }
        let terminator = self.dialect.terminator();
        if !self.sql.trim().is_empty() && !self.sql.ends_with(terminator) {
            self.sql.push_str(terminator);
        }
        self
    }

    /// Finish the buffer and reset it. `None` if there is nothing to run.
    fn take(&mut self) -> Option<(String, Vec<BoundParameter>)> {
        if self.pending_limit.is_some() {
            self.go();
        }
        if self.sql.trim().is_empty() {
            self.reset();
            return None;
        }
        let sql = std::mem::take(&mut self.sql);
        let params = self.bound_parameters();
        self.reset();
        tracing::debug!(
            dialect = self.dialect.name(),
            sql_len = sql.len(),
            params = params.len(),
            "Executing statement buffer"
        );
        Some((sql, params))
    }

    /// Run the buffer and return the affected row count.
    pub fn execute(&mut self, db: &dyn Database) -> Result<u64> {
        match self.take() {
            Some((sql, params)) => db.execute_sql(&sql, &params),
            None => Ok(0),
        }
    }

    /// Run the buffer and return its first result set.
    pub fn execute_get_data_table(&mut self, db: &dyn Database) -> Result<RowSet> {
        match self.take() {
            Some((sql, params)) => db.get_data_table(&sql, &params),
            None => Ok(RowSet::default()),
        }
    }

    /// Run the buffer and return every result set in statement order.
    pub fn execute_get_data_set(&mut self, db: &dyn Database) -> Result<Vec<RowSet>> {
        match self.take() {
            Some((sql, params)) => db.get_data_set(&sql, &params),
            None => Ok(Vec::new()),
        }
    }

    /// Run the buffer, logging instead of returning a failure.
    pub fn try_execute(&mut self, db: &dyn Database) -> bool {
        match self.execute(db) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, sql = e.sql().unwrap_or(""), "Statement failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{MsSql, Postgres};
    use parking_lot::Mutex;
    use sqldao_core::DatabaseId;

    fn person() -> std::sync::Arc<TableSchema> {
        TableSchema::builder("Person")
            .required("Name", "varchar")
            .optional("Age", "int")
            .build()
    }

    /// Records every call; optionally fails.
    #[derive(Debug)]
    struct Recorder {
        id: DatabaseId,
        fail: bool,
        calls: Mutex<Vec<(String, Vec<BoundParameter>)>>,
    }

    impl Recorder {
        fn new(fail: bool) -> Self {
            Self {
                id: DatabaseId::next(),
                fail,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, sql: &str, params: &[BoundParameter]) -> Result<()> {
            self.calls.lock().push((sql.to_string(), params.to_vec()));
            if self.fail {
                Err(Error::execution(sql, "rejected"))
            } else {
                Ok(())
            }
        }
    }

    impl Database for Recorder {
        fn id(&self) -> DatabaseId {
            self.id
        }

        fn dialect(&self) -> &dyn Dialect {
            &ANSI
        }

        fn get_data_table(&self, sql: &str, params: &[BoundParameter]) -> Result<RowSet> {
            self.record(sql, params).map(|()| RowSet::default())
        }

        fn execute_sql(&self, sql: &str, params: &[BoundParameter]) -> Result<u64> {
            self.record(sql, params).map(|()| 1)
        }

        fn get_data_set(&self, sql: &str, params: &[BoundParameter]) -> Result<Vec<RowSet>> {
            self.record(sql, params).map(|()| Vec::new())
        }
    }

    #[test]
    fn test_insert_renders_only_given_columns() {
        let mut b = StatementBuilder::ansi();
        b.insert("T", &[Assignment::new("Name", "x")]);
        assert_eq!(b.sql(), "INSERT INTO T (Name) VALUES (@P1)");
        assert_eq!(b.params(), &[Value::from("x")]);
    }

    #[test]
    fn test_go_is_idempotent() {
        let mut b = StatementBuilder::ansi();
        b.delete("T").where_eq("Id", 1).go().go();
        assert_eq!(b.sql(), "DELETE FROM T WHERE Id = @P1 ;\r\n");
        assert_eq!(b.sql().matches(";\r\n").count(), 1);
    }

    #[test]
    fn test_go_on_empty_buffer_appends_nothing() {
        let mut b = StatementBuilder::ansi();
        b.go();
        assert!(b.is_empty());
        assert_eq!(b.sql(), "");
    }

    #[test]
    fn test_ordinals_continue_across_statements() {
        let mut b = StatementBuilder::ansi();
        b.update("T", &[Assignment::new("A", 1), Assignment::new("B", 2)])
            .where_eq("Id", 3)
            .go()
            .delete("T")
            .where_filter(&Filter::col("Id").in_values([4, 5]).unwrap())
            .and_eq("Kind", "x")
            .go();
        assert_eq!(
            b.sql(),
            "UPDATE T SET A = @P1, B = @P2 WHERE Id = @P3 ;\r\nDELETE FROM T WHERE Id IN (@P4, @P5) AND Kind = @P6 ;\r\n"
        );
        assert_eq!(b.next_ordinal(), 7);
        let bound = b.bound_parameters();
        assert_eq!(bound[5].name, "@P6");
    }

    #[test]
    fn test_select_uses_schema_columns() {
        let mut b = StatementBuilder::ansi();
        b.select(&person()).order_by("Name", SortOrder::Descending);
        assert_eq!(b.sql(), "SELECT Id, Name, Age FROM Person ORDER BY Name DESC");
    }

    #[test]
    fn test_select_columns_rejects_unknown() {
        let mut b = StatementBuilder::ansi();
        let err = b.select_columns(&person(), &["Name", "Shoe"]).unwrap_err();
        assert!(err.is_malformed_filter());
        assert!(b.is_empty());

        let mut b = StatementBuilder::ansi().with_options(BuilderOptions { select_star: true });
        b.select_columns(&person(), &["Shoe"]).unwrap();
        assert_eq!(b.sql(), "SELECT Shoe FROM Person ");
        b.reset();
        b.select(&person());
        assert_eq!(b.sql(), "SELECT * FROM Person ");
    }

    #[test]
    fn test_select_top_per_dialect() {
        let mut b = StatementBuilder::new(&MsSql);
        b.select_top(5, &person()).go();
        assert_eq!(b.sql(), "SELECT TOP 5 [Id], [Name], [Age] FROM [Person] ;\r\n");

        let pg = Postgres::with_schema("app");
        let mut b = StatementBuilder::new(&pg);
        b.select_top(5, &person()).where_eq("Name", "x").go();
        assert_eq!(
            b.sql(),
            "SELECT \"Id\", \"Name\", \"Age\" FROM app.Person WHERE \"Name\" = @P1  LIMIT 5 ;\r\n"
        );
    }

    #[test]
    fn test_insert_with_generated_key() {
        let mut b = StatementBuilder::new(&MsSql);
        b.insert("T", &[Assignment::new("Name", "x")]).id("Id").go();
        assert_eq!(
            b.sql(),
            "INSERT INTO [T] ([Name]) VALUES (@P1);\r\nSELECT @@IDENTITY AS ID;\r\n"
        );

        let mut b = StatementBuilder::ansi();
        b.insert("T", &[Assignment::new("Name", "x")]).id("Id").go();
        assert_eq!(b.sql(), "INSERT INTO T (Name) VALUES (@P1) RETURNING Id AS ID;\r\n");
    }

    #[test]
    fn test_assignment_formatter_override() {
        let mut b = StatementBuilder::new(&MsSql);
        b.update(
            "T",
            &[Assignment::new("Raw", 1).with_formatter(|c| c.to_lowercase())],
        );
        assert_eq!(b.sql(), "UPDATE [T] SET raw = @P1 ");
    }

    #[test]
    fn test_count_and_comment() {
        let mut b = StatementBuilder::ansi();
        b.comment("totals").select_count("T").go();
        assert_eq!(b.sql(), "\r\n-- totals\r\nSELECT COUNT(*) FROM T ;\r\n");
    }

    #[test]
    fn test_execute_resets_buffer() {
        let db = Recorder::new(false);
        let mut b = StatementBuilder::for_database(&db);
        b.delete("T").where_eq("Id", 9).go();
        assert_eq!(b.execute(&db).unwrap(), 1);
        assert!(b.is_empty());
        assert_eq!(b.next_ordinal(), 1);
        let calls = db.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec![BoundParameter::new("@P1", Value::Int(9))]);
    }

    #[test]
    fn test_failed_execute_still_resets() {
        let db = Recorder::new(true);
        let mut b = StatementBuilder::ansi();
        b.delete("T").go();
        let err = b.execute(&db).unwrap_err();
        assert_eq!(err.sql(), Some("DELETE FROM T ;\r\n"));
        assert!(b.is_empty());
        assert!(b.params().is_empty());

        b.delete("T").go();
        assert!(!b.try_execute(&db));
        assert!(b.is_empty());
    }

    #[test]
    fn test_whitespace_never_executed() {
        let db = Recorder::new(false);
        let mut b = StatementBuilder::ansi();
        b.append("  \r\n ");
        assert_eq!(b.execute(&db).unwrap(), 0);
        assert!(b.execute_get_data_set(&db).unwrap().is_empty());
        assert!(db.calls.lock().is_empty());
    }

    #[test]
    fn test_pending_limit_applied_on_execute() {
        let db = Recorder::new(false);
        let mut b = StatementBuilder::ansi();
        b.select_top(2, &person());
        b.execute_get_data_table(&db).unwrap();
        assert_eq!(
            db.calls.lock()[0].0,
            "SELECT Id, Name, Age FROM Person  LIMIT 2 ;\r\n"
        );
    }

    #[test]
    fn test_options_and_sort_order_deserialize() {
        let options: BuilderOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.select_star);
        let options: BuilderOptions = serde_json::from_str(r#"{"select_star":true}"#).unwrap();
        assert!(options.select_star);

        let order: SortOrder = serde_json::from_str(r#""desc""#).unwrap();
        assert_eq!(order, SortOrder::Descending);
        assert_eq!(serde_json::to_string(&SortOrder::Ascending).unwrap(), r#""ascending""#);
    }
}
