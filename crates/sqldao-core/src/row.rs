//! Rows and row sets as the database returns them.
//!
//! Every row of a [`RowSet`] points at the same [`Columns`] header, so name
//! lookups cost one hash probe and the header is stored once per result.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::Value;

/// Ordered column names of one result, with a lookup index.
#[derive(Debug, Clone, Default)]
pub struct Columns {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        Self { names, positions }
    }

    /// Position of `name`. Falls back to an ASCII case-insensitive scan
    /// because drivers fold unquoted identifiers differently.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied().or_else(|| {
            self.names
                .iter()
                .position(|candidate| candidate.eq_ignore_ascii_case(name))
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }
}

/// One result row.
#[derive(Debug, Clone)]
pub struct Row {
    header: Arc<Columns>,
    cells: Vec<Value>,
}

impl Row {
    pub fn new(names: Vec<String>, cells: Vec<Value>) -> Self {
        Self {
            header: Arc::new(Columns::new(names)),
            cells,
        }
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let (names, cells) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self::new(names, cells)
    }

    pub fn header(&self) -> &Arc<Columns> {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Value> {
        self.cells.get(position)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.get(self.header.position(name)?)
    }

    pub fn values(&self) -> &[Value] {
        &self.cells
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.header
            .names()
            .iter()
            .map(String::as_str)
            .zip(&self.cells)
    }
}

/// The rows produced by one statement.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    header: Arc<Columns>,
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new(names: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let header = Arc::new(Columns::new(names));
        let rows = rows
            .into_iter()
            .map(|cells| Row {
                header: Arc::clone(&header),
                cells,
            })
            .collect();
        Self { header, rows }
    }

    /// One row, one column. Generated-key and `COUNT(*)` results look like this.
    pub fn scalar(column: impl Into<String>, value: Value) -> Self {
        Self::new(vec![column.into()], vec![vec![value]])
    }

    pub fn header(&self) -> &Arc<Columns> {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
