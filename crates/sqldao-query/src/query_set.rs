//! Batched statements with positional result sinks.
//!
//! Every statement that yields a result set registers a sink when it is
//! appended. On execution the i-th returned row set is bound to the i-th
//! sink, so INSERTs that retrieve a generated key occupy exactly one slot.

use sqldao_core::{
    Database, Error, ExecutionError, ExecutionErrorKind, Result, RowSet, TableSchema,
};

use crate::builder::{Assignment, StatementBuilder};
use crate::filter::Filter;

/// What a registered statement produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Rows of a SELECT
    Select,
    /// A single `COUNT(*)` value
    Count,
    /// The generated key of an INSERT
    Insert,
}

/// A position in the batch's result ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(usize);

impl Slot {
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Statement buffer plus the ordered list of result sinks.
#[derive(Debug)]
pub struct QuerySet<'d> {
    builder: StatementBuilder<'d>,
    sinks: Vec<SinkKind>,
}

impl<'d> QuerySet<'d> {
    pub fn new(builder: StatementBuilder<'d>) -> Self {
        Self {
            builder,
            sinks: Vec::new(),
        }
    }

    pub fn for_database(db: &'d dyn Database) -> Self {
        Self::new(StatementBuilder::for_database(db))
    }

    /// Direct access for statements without a result set (UPDATE, DELETE).
    pub fn statements(&mut self) -> &mut StatementBuilder<'d> {
        &mut self.builder
    }

    pub fn builder(&self) -> &StatementBuilder<'d> {
        &self.builder
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty() && self.builder.is_empty()
    }

    fn register(&mut self, kind: SinkKind) -> Slot {
        self.sinks.push(kind);
        Slot(self.sinks.len() - 1)
    }

    /// `SELECT` every schema column, optionally filtered.
    pub fn select(&mut self, schema: &TableSchema, filter: Option<&Filter>) -> Slot {
        self.select_top(0, schema, filter)
    }

    pub fn select_top(&mut self, top: u64, schema: &TableSchema, filter: Option<&Filter>) -> Slot {
        self.builder.select_top(top, schema);
        if let Some(filter) = filter {
            self.builder.where_filter(filter);
        }
        self.builder.go();
        self.register(SinkKind::Select)
    }

    pub fn count(&mut self, table: &str, filter: Option<&Filter>) -> Slot {
        self.builder.select_count(table);
        if let Some(filter) = filter {
            self.builder.where_filter(filter);
        }
        self.builder.go();
        self.register(SinkKind::Count)
    }

    /// INSERT and retrieve the generated value of `key_column`.
    pub fn insert(&mut self, table: &str, assignments: &[Assignment], key_column: &str) -> Slot {
        self.builder.insert(table, assignments).id(key_column).go();
        self.register(SinkKind::Insert)
    }

    /// Run the batch in one round trip and bind results to their sinks.
    #[tracing::instrument(level = "debug", skip(self, db), fields(statement_count = self.sinks.len()))]
    pub fn execute(&mut self, db: &dyn Database) -> Result<QueryResults> {
        let sinks = std::mem::take(&mut self.sinks);
        let sets = self.builder.execute_get_data_set(db)?;
        if sets.len() < sinks.len() {
            return Err(Error::Execution(ExecutionError {
                kind: ExecutionErrorKind::UnexpectedResult,
                sql: None,
                message: format!(
                    "expected {} result sets, database returned {}",
                    sinks.len(),
                    sets.len()
                ),
                source: None,
            }));
        }
        if sets.len() > sinks.len() {
            tracing::warn!(
                expected = sinks.len(),
                returned = sets.len(),
                "Ignoring unregistered result sets"
            );
        }
        Ok(QueryResults {
            slots: sinks.into_iter().zip(sets).collect(),
        })
    }
}

/// Row sets of an executed [`QuerySet`], in append order.
#[derive(Debug, Clone, Default)]
pub struct QueryResults {
    slots: Vec<(SinkKind, RowSet)>,
}

impl QueryResults {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn kind(&self, slot: Slot) -> Option<SinkKind> {
        self.slots.get(slot.0).map(|(kind, _)| *kind)
    }

    /// Rows bound to `slot`.
    pub fn rows(&self, slot: Slot) -> Option<&RowSet> {
        self.slots.get(slot.0).map(|(_, rows)| rows)
    }

    /// Take the rows bound to `slot`, leaving an empty set behind.
    pub fn take_rows(&mut self, slot: Slot) -> Option<RowSet> {
        self.slots
            .get_mut(slot.0)
            .map(|(_, rows)| std::mem::take(rows))
    }

    /// The first column of the first row of a count slot.
    pub fn count(&self, slot: Slot) -> Option<u64> {
        let rows = self.rows(slot)?;
        rows.first()?.get(0)?.as_u64()
    }

    /// The `ID` column of an insert slot.
    pub fn generated_key(&self, slot: Slot) -> Option<u64> {
        let rows = self.rows(slot)?;
        let row = rows.first()?;
        row.get_by_name("ID").or_else(|| row.get(0))?.as_u64()
    }
}
