//! The database collaborator.
//!
//! Drivers implement [`Database`]; everything above it renders SQL text plus
//! an ordered list of [`BoundParameter`]s and hands both over in one call.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::RowSet;
use crate::value::Value;

static NEXT_DATABASE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a database handle.
///
/// Event subscriptions filter on this value, so two handles pointing at the
/// same server are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatabaseId(u64);

impl DatabaseId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_DATABASE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db#{}", self.0)
    }
}

/// A named parameter ready for driver materialization.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// Full parameter name including prefix, e.g. `@P1`
    pub name: String,
    pub value: Value,
}

impl BoundParameter {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Name of the parameter with the given ordinal: `{prefix}P{ordinal}`.
pub fn parameter_name(prefix: &str, ordinal: usize) -> String {
    format!("{}P{}", prefix, ordinal)
}

/// Name an ordered value list starting at ordinal `start`.
pub fn bind_parameters(prefix: &str, start: usize, values: &[Value]) -> Vec<BoundParameter> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| BoundParameter::new(parameter_name(prefix, start + i), value.clone()))
        .collect()
}

/// A database handle.
///
/// Implementations own connection acquisition; the core never holds a
/// connection beyond a single call.
pub trait Database: Send + Sync {
    /// Identity used to scope event subscriptions.
    fn id(&self) -> DatabaseId;

    fn dialect(&self) -> &dyn Dialect;

    /// Run a statement and return its first result set.
    fn get_data_table(&self, sql: &str, params: &[BoundParameter]) -> Result<RowSet>;

    /// Run a statement and return the affected row count.
    fn execute_sql(&self, sql: &str, params: &[BoundParameter]) -> Result<u64>;

    /// Run a batch and return every result set in statement order.
    fn get_data_set(&self, sql: &str, params: &[BoundParameter]) -> Result<Vec<RowSet>>;
}
