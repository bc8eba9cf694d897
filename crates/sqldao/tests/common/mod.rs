//! An in-memory `Database` that executes the statements the builder renders.
//!
//! Supports INSERT (with `RETURNING <key> AS ID`), UPDATE, DELETE, SELECT and
//! `SELECT COUNT(*)` over AND-joined predicates: comparisons, LIKE, IN and
//! null checks. Anything else fails the statement.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;

use sqldao::{
    Ansi, BoundParameter, Database, DatabaseId, Dialect, Error, ForeignKey, Result, Row, RowSet,
    TableSchema, Value,
};

struct Table {
    columns: Vec<String>,
    key: String,
    rows: Vec<BTreeMap<String, Value>>,
    next_id: i64,
}

impl Table {
    fn key_of(row: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
        row.get(key).and_then(Value::as_i64)
    }

    fn to_row(&self, row: &BTreeMap<String, Value>, columns: &[String]) -> Vec<Value> {
        columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or_default())
            .collect()
    }
}

enum Outcome {
    Affected(u64),
    Rows(RowSet),
}

struct Patterns {
    insert: Regex,
    update: Regex,
    delete: Regex,
    count: Regex,
    select: Regex,
    comparison: Regex,
    in_list: Regex,
    null_check: Regex,
    placeholder: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        insert: Regex::new(
            r"^INSERT INTO (\w+) \(([^)]*)\) VALUES \(([^)]*)\)(?: RETURNING (\w+) AS ID)?$",
        )
        .unwrap(),
        update: Regex::new(r"^UPDATE (\w+) SET (.+?)(?: WHERE (.+))?$").unwrap(),
        delete: Regex::new(r"^DELETE FROM (\w+)(?: WHERE (.+))?$").unwrap(),
        count: Regex::new(r"^SELECT COUNT\(\*\) FROM (\w+)(?: WHERE (.+))?$").unwrap(),
        select: Regex::new(
            r"^SELECT (.+?) FROM (\w+)(?: WHERE (.+?))?(?: ORDER BY (\w+) (ASC|DESC))?(?: LIMIT (\d+))?$",
        )
        .unwrap(),
        comparison: Regex::new(r"(\w+) (NOT LIKE|LIKE|<=|>=|<>|=|<|>) (@P\d+)").unwrap(),
        in_list: Regex::new(r"(\w+) IN \(([^)]*)\)").unwrap(),
        null_check: Regex::new(r"(\w+) IS (NOT )?NULL").unwrap(),
        placeholder: Regex::new(r"@P\d+").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

enum Condition {
    Compare(String, String, Value),
    In(String, Vec<Value>),
    Null(String, bool),
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) if !matches!(a, Value::Text(_)) && !matches!(b, Value::Text(_)) => {
            Some(x.cmp(&y))
        }
        _ => match (a, b) {
            (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => (a == b).then_some(Ordering::Equal),
            },
        },
    }
}

fn like(value: &Value, pattern: &Value) -> bool {
    let (Some(value), Some(pattern)) = (value.as_str(), pattern.as_str()) else {
        return false;
    };
    match (pattern.strip_prefix('%'), pattern.strip_suffix('%')) {
        (Some(rest), Some(_)) => value.contains(rest.trim_end_matches('%')),
        (Some(suffix), None) => value.ends_with(suffix),
        (None, Some(prefix)) => value.starts_with(prefix),
        (None, None) => value == pattern,
    }
}

impl Condition {
    fn matches(&self, row: &BTreeMap<String, Value>) -> bool {
        let get = |c: &str| row.get(c).cloned().unwrap_or_default();
        match self {
            Condition::Compare(column, op, value) => {
                let actual = get(column);
                if actual.is_null() {
                    return false;
                }
                let ord = compare(&actual, value);
                match op.as_str() {
                    "=" => ord == Some(Ordering::Equal),
                    "<>" => ord != Some(Ordering::Equal),
                    "<" => ord == Some(Ordering::Less),
                    "<=" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    ">" => ord == Some(Ordering::Greater),
                    ">=" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                    "LIKE" => like(&actual, value),
                    "NOT LIKE" => !like(&actual, value),
                    _ => false,
                }
            }
            Condition::In(column, values) => {
                let actual = get(column);
                values
                    .iter()
                    .any(|v| compare(&actual, v) == Some(Ordering::Equal))
            }
            Condition::Null(column, negated) => get(column).is_null() == !negated,
        }
    }
}

fn table_for<'t>(
    tables: &'t mut HashMap<String, Table>,
    statement: &str,
    name: &str,
) -> Result<&'t mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| Error::execution(statement, format!("no such table: {name}")))
}

/// Records every statement and executes it against in-memory tables.
pub struct MemoryDb {
    id: DatabaseId,
    tables: Mutex<HashMap<String, Table>>,
    log: Mutex<Vec<(String, Vec<Value>)>>,
    fail_on: Mutex<Vec<String>>,
}

impl MemoryDb {
    pub fn new(schemas: &[&TableSchema]) -> Self {
        let tables = schemas
            .iter()
            .map(|schema| {
                (
                    schema.name().to_string(),
                    Table {
                        columns: schema
                            .column_names()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                        key: schema.key_column().to_string(),
                        rows: Vec::new(),
                        next_id: 1,
                    },
                )
            })
            .collect();
        Self {
            id: DatabaseId::next(),
            tables: Mutex::new(tables),
            log: Mutex::new(Vec::new()),
            fail_on: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next statement whose text contains `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.fail_on.lock().push(fragment.to_string());
    }

    /// Every executed statement, whitespace-normalized, in order.
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn statement_count(&self) -> usize {
        self.log.lock().len()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Insert a row directly, returning its key.
    pub fn seed(&self, table: &str, values: &[(&str, Value)]) -> i64 {
        let mut tables = self.tables.lock();
        let table = tables.get_mut(table).expect("unknown table");
        let id = table.next_id;
        table.next_id += 1;
        let mut row: BTreeMap<String, Value> = values
            .iter()
            .map(|(c, v)| ((*c).to_string(), v.clone()))
            .collect();
        row.insert(table.key.clone(), Value::BigInt(id));
        table.rows.push(row);
        id
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, |t| t.rows.len())
    }

    /// The stored row with key `id`.
    pub fn row(&self, table: &str, id: i64) -> Option<Row> {
        let tables = self.tables.lock();
        let table = tables.get(table)?;
        let row = table
            .rows
            .iter()
            .find(|r| Table::key_of(r, &table.key) == Some(id))?;
        Some(Row::new(table.columns.clone(), table.to_row(row, &table.columns)))
    }

    fn run(&self, sql: &str, params: &[BoundParameter]) -> Result<Vec<Outcome>> {
        let named: HashMap<&str, &Value> =
            params.iter().map(|p| (p.name.as_str(), &p.value)).collect();
        let mut outcomes = Vec::new();
        for raw in sql.split(Ansi.terminator()) {
            let statement = patterns().whitespace.replace_all(raw.trim(), " ").to_string();
            if statement.is_empty() {
                continue;
            }
            let used: Vec<Value> = patterns()
                .placeholder
                .find_iter(&statement)
                .filter_map(|m| named.get(m.as_str()).map(|v| (*v).clone()))
                .collect();
            self.log.lock().push((statement.clone(), used));
            {
                let mut fail_on = self.fail_on.lock();
                if let Some(i) = fail_on.iter().position(|f| statement.contains(f.as_str())) {
                    fail_on.remove(i);
                    return Err(Error::execution(statement, "injected failure"));
                }
            }
            outcomes.extend(self.run_one(&statement, &named)?);
        }
        Ok(outcomes)
    }

    fn conditions(text: Option<&str>, named: &HashMap<&str, &Value>) -> Result<Vec<Condition>> {
        let Some(text) = text else {
            return Ok(Vec::new());
        };
        if text.contains(" OR ") {
            return Err(Error::execution(text, "OR is not supported"));
        }
        let lookup = |name: &str| -> Result<Value> {
            named
                .get(name)
                .map(|v| (*v).clone())
                .ok_or_else(|| Error::execution(text, format!("unbound parameter {name}")))
        };
        let p = patterns();
        let mut conditions = Vec::new();
        for c in p.comparison.captures_iter(text) {
            conditions.push(Condition::Compare(c[1].to_string(), c[2].to_string(), lookup(&c[3])?));
        }
        for c in p.in_list.captures_iter(text) {
            let values = c[2]
                .split(',')
                .map(|name| lookup(name.trim()))
                .collect::<Result<Vec<_>>>()?;
            conditions.push(Condition::In(c[1].to_string(), values));
        }
        for c in p.null_check.captures_iter(text) {
            conditions.push(Condition::Null(c[1].to_string(), c.get(2).is_some()));
        }
        if conditions.is_empty() {
            return Err(Error::execution(text, "unsupported predicate"));
        }
        Ok(conditions)
    }

    fn run_one(&self, statement: &str, named: &HashMap<&str, &Value>) -> Result<Vec<Outcome>> {
        let p = patterns();
        let mut guard = self.tables.lock();
        let tables = &mut *guard;
        let value = |name: &str| {
            named
                .get(name.trim())
                .map(|v| (*v).clone())
                .ok_or_else(|| Error::execution(statement, format!("unbound parameter {name}")))
        };

        if let Some(c) = p.insert.captures(statement) {
            let table = table_for(tables, statement, &c[1])?;
            let mut row = BTreeMap::new();
            for (column, placeholder) in c[2].split(',').zip(c[3].split(',')) {
                let column = column.trim().to_string();
                if !table.columns.contains(&column) {
                    return Err(Error::execution(statement, format!("no such column: {column}")));
                }
                row.insert(column, value(placeholder)?);
            }
            let id = match Table::key_of(&row, &table.key) {
                Some(id) => {
                    if table.rows.iter().any(|r| Table::key_of(r, &table.key) == Some(id)) {
                        return Err(Error::execution(statement, "UNIQUE constraint failed"));
                    }
                    table.next_id = table.next_id.max(id + 1);
                    id
                }
                None => {
                    let id = table.next_id;
                    table.next_id += 1;
                    row.insert(table.key.clone(), Value::BigInt(id));
                    id
                }
            };
            table.rows.push(row);
            return Ok(match c.get(4) {
                Some(_) => vec![Outcome::Rows(RowSet::scalar("ID", Value::BigInt(id)))],
                None => vec![Outcome::Affected(1)],
            });
        }

        if let Some(c) = p.update.captures(statement) {
            let conditions = Self::conditions(c.get(3).map(|m| m.as_str()), named)?;
            let table = table_for(tables, statement, &c[1])?;
            let mut sets = Vec::new();
            for assignment in c[2].split(',') {
                let (column, placeholder) = assignment
                    .split_once(" = ")
                    .ok_or_else(|| Error::execution(statement, "malformed SET"))?;
                sets.push((column.trim().to_string(), value(placeholder)?));
            }
            let mut affected = 0;
            for row in table.rows.iter_mut().filter(|r| conditions.iter().all(|cond| cond.matches(r))) {
                for (column, v) in &sets {
                    row.insert(column.clone(), v.clone());
                }
                affected += 1;
            }
            return Ok(vec![Outcome::Affected(affected)]);
        }

        if let Some(c) = p.delete.captures(statement) {
            let conditions = Self::conditions(c.get(2).map(|m| m.as_str()), named)?;
            let table = table_for(tables, statement, &c[1])?;
            let before = table.rows.len();
            table.rows.retain(|r| !conditions.iter().all(|cond| cond.matches(r)));
            return Ok(vec![Outcome::Affected((before - table.rows.len()) as u64)]);
        }

        if let Some(c) = p.count.captures(statement) {
            let conditions = Self::conditions(c.get(2).map(|m| m.as_str()), named)?;
            let table = table_for(tables, statement, &c[1])?;
            let n = table
                .rows
                .iter()
                .filter(|r| conditions.iter().all(|cond| cond.matches(r)))
                .count();
            return Ok(vec![Outcome::Rows(RowSet::scalar(
                "COUNT(*)",
                Value::BigInt(n as i64),
            ))]);
        }

        if let Some(c) = p.select.captures(statement) {
            let conditions = Self::conditions(c.get(3).map(|m| m.as_str()), named)?;
            let table = table_for(tables, statement, &c[2])?;
            let columns: Vec<String> = if &c[1] == "*" {
                table.columns.clone()
            } else {
                c[1].split(',').map(|s| s.trim().to_string()).collect()
            };
            let mut rows: Vec<&BTreeMap<String, Value>> = table
                .rows
                .iter()
                .filter(|r| conditions.iter().all(|cond| cond.matches(r)))
                .collect();
            if let Some(order) = c.get(4) {
                let column = order.as_str();
                rows.sort_by(|a, b| {
                    let a = a.get(column).cloned().unwrap_or_default();
                    let b = b.get(column).cloned().unwrap_or_default();
                    compare(&a, &b).unwrap_or(Ordering::Equal)
                });
                if c.get(5).is_some_and(|d| d.as_str() == "DESC") {
                    rows.reverse();
                }
            }
            if let Some(limit) = c.get(6) {
                let limit: usize = limit.as_str().parse().unwrap_or(usize::MAX);
                rows.truncate(limit);
            }
            let values = rows.iter().map(|r| table.to_row(r, &columns)).collect();
            return Ok(vec![Outcome::Rows(RowSet::new(columns, values))]);
        }

        Err(Error::execution(statement, "unsupported statement"))
    }
}

impl Database for MemoryDb {
    fn id(&self) -> DatabaseId {
        self.id
    }

    fn dialect(&self) -> &dyn Dialect {
        &Ansi
    }

    fn get_data_table(&self, sql: &str, params: &[BoundParameter]) -> Result<RowSet> {
        let first = self.run(sql, params)?.into_iter().find_map(|o| match o {
            Outcome::Rows(rows) => Some(rows),
            Outcome::Affected(_) => None,
        });
        Ok(first.unwrap_or_default())
    }

    fn execute_sql(&self, sql: &str, params: &[BoundParameter]) -> Result<u64> {
        Ok(self
            .run(sql, params)?
            .iter()
            .map(|o| match o {
                Outcome::Affected(n) => *n,
                Outcome::Rows(_) => 0,
            })
            .sum())
    }

    fn get_data_set(&self, sql: &str, params: &[BoundParameter]) -> Result<Vec<RowSet>> {
        Ok(self
            .run(sql, params)?
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Rows(rows) => Some(rows),
                Outcome::Affected(_) => None,
            })
            .collect())
    }
}

/// Authors own posts; posts are tagged through the `PostTag` link table.
pub struct Blog {
    pub author: Arc<TableSchema>,
    pub post: Arc<TableSchema>,
    pub tag: Arc<TableSchema>,
    pub post_tag: Arc<TableSchema>,
}

impl Blog {
    pub fn new() -> Self {
        let tag = TableSchema::builder("Tag").required("Name", "varchar").build();
        let post_tag = TableSchema::builder("PostTag")
            .foreign_key(ForeignKey::new("PostId", "Post", "Id"))
            .foreign_key(ForeignKey::new("TagId", "Tag", "Id"))
            .build();
        let post = TableSchema::builder("Post")
            .required("Title", "varchar")
            .optional("Status", "int")
            .foreign_key(ForeignKey::new("AuthorId", "Author", "Id"))
            .xref("Tags", Arc::clone(&post_tag), Arc::clone(&tag))
            .validate_required(true)
            .build();
        let author = TableSchema::builder("Author")
            .required("Name", "varchar")
            .optional("Email", "varchar")
            .child("Posts", Arc::clone(&post), "AuthorId")
            .build();
        Self {
            author,
            post,
            tag,
            post_tag,
        }
    }

    pub fn db(&self) -> MemoryDb {
        MemoryDb::new(&[&self.author, &self.post, &self.tag, &self.post_tag])
    }
}

impl Default for Blog {
    fn default() -> Self {
        Self::new()
    }
}
