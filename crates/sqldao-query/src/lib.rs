//! Filter algebra and statement building for SqlDao.
//!
//! `sqldao-query` turns column predicates into numbered, parameterized SQL
//! and assembles INSERT/UPDATE/DELETE/SELECT statements into batches.
//!
//! - **Filters**: [`Filter::col`] starts a predicate; filters combine with
//!   `and`/`or` or, with explicit grouping, `&`/`|`.
//! - **Statement builder**: [`StatementBuilder`] is the statement buffer
//!   that renders through a [`Dialect`](sqldao_core::Dialect) and resets
//!   after every execution.
//! - **Query sets**: [`QuerySet`] batches statements and binds each
//!   returned row set to the statement that produced it.

pub mod builder;
pub mod dialect;
pub mod filter;
pub mod query_set;
pub mod token;

pub use builder::{Assignment, BuilderOptions, SortOrder, StatementBuilder};
pub use dialect::{Ansi, Firebird, MsSql, MySql, Postgres, Sqlite, dialect_for};
pub use filter::{Filter, FilterBuilder, RenderedFilter, col};
pub use query_set::{QueryResults, QuerySet, SinkKind, Slot};
pub use token::{LikePattern, Operator, Token};
