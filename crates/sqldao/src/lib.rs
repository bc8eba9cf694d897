//! SqlDao: entity persistence over a pluggable relational database.
//!
//! SqlDao provides:
//!
//! - A filter algebra that renders to numbered, parameterized predicates
//! - A statement builder with per-dialect quoting and generated-key retrieval
//! - Entities that track pending values and decide between INSERT and UPDATE
//! - Parent/child and many-to-many collections with cascading deletes
//! - A compensating pseudo-transaction that reverses commits and deletes
//! - A round-robin connection manager
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sqldao::prelude::*;
//!
//! let people = TableSchema::builder("Person")
//!     .required("Name", "varchar")
//!     .optional("Age", "int")
//!     .build();
//!
//! let cx = DbCx::new(&db);
//!
//! // Insert
//! let mut person = Entity::new(Arc::clone(&people));
//! person.set_value("Name", "Ada");
//! person.set_value("Age", 36);
//! person.commit(&cx, false)?;
//! assert!(!person.is_new());
//!
//! // Query
//! let older = Entity::find_where(&cx, &people, &Filter::col("Age").gt(30)?)?;
//!
//! // Update
//! person.set_value("Age", 37);
//! person.save(&cx)?;
//!
//! // Delete
//! person.delete(&cx)?;
//! ```
//!
//! # Crates
//!
//! - `sqldao-core`: values, rows, schema descriptors, the `Database` trait, errors
//! - `sqldao-query`: filters, dialects, the statement builder and query sets
//! - `sqldao-session`: entities, collections, events and the pseudo-transaction
//! - `sqldao-pool`: the connection manager

pub use sqldao_core::{
    BoundParameter, CardinalityError, ColumnDef, ConfigError, ConsistencyError,
    ConsistencyErrorKind, Credentials, DataType, DataTypeTranslator, Database, DatabaseConfig,
    DatabaseId, DatabaseType, Dialect, Error, ExecutionError, ExecutionErrorKind, FilterError,
    FilterErrorKind, ForeignKey, LimitPlacement, PoolError, PoolErrorKind, Result, Row, RowSet,
    StandardTypeTranslator, Table, TableSchema, TableSchemaBuilder, ValidationError, Value,
    XrefRelation, map_i64_to_u64, map_u64_to_i64,
};

pub use sqldao_query::{
    Ansi, Assignment, BuilderOptions, Filter, FilterBuilder, Firebird, MsSql, MySql, Postgres,
    QueryResults, QuerySet, RenderedFilter, Slot, SortOrder, Sqlite, StatementBuilder, col,
    dialect_for,
};

pub use sqldao_session::{
    Child, Collection, DEFAULT_PAGE_SIZE, DbCx, Entity, EntityEvent, EntityHooks, EventHandler,
    EventKind, EventRegistry, PseudoTransaction, SubscriptionFilter, SubscriptionId,
    TransactionState, Validator, WriteMode, XrefCollection,
};

pub use sqldao_pool::{ConnectionFactory, ConnectionManager, PoolConfig, PoolStats};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqldao::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Collection, Database, DbCx, Entity, Error, EventKind, EventRegistry, Filter,
        ForeignKey, PseudoTransaction, Result, Row, RowSet, StatementBuilder, TableSchema,
        Validator, Value, XrefCollection, col,
    };
}
