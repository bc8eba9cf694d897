//! Core types and collaborator traits for SqlDao.
//!
//! - [`Value`], [`Row`] and [`RowSet`] for data moving to and from a database
//! - [`TableSchema`] descriptors and the [`Table`] trait
//! - the [`Database`] and [`Dialect`] collaborator traits
//! - [`DatabaseConfig`] loading
//! - the crate-wide [`Error`]

pub mod config;
pub mod database;
pub mod dialect;
pub mod error;
pub mod identifiers;
pub mod row;
pub mod schema;
pub mod types;
pub mod value;

pub use config::{Credentials, DatabaseConfig, DatabaseType};
pub use database::{BoundParameter, Database, DatabaseId, bind_parameters, parameter_name};
pub use dialect::{DEFAULT_PARAMETER_PREFIX, DEFAULT_TERMINATOR, Dialect, LimitPlacement};
pub use error::{
    CardinalityError, ConfigError, ConsistencyError, ConsistencyErrorKind, Error, ExecutionError,
    ExecutionErrorKind, FilterError, FilterErrorKind, PoolError, PoolErrorKind, Result,
    ValidationError,
};
pub use identifiers::{quote_ident, quote_ident_mssql, quote_ident_mysql, sanitize_identifier};
pub use row::{Columns, Row, RowSet};
pub use schema::{
    ChildRelation, ColumnDef, DEFAULT_KEY_COLUMN, ForeignKey, Table, TableSchema,
    TableSchemaBuilder, XrefRelation, link_column_name,
};
pub use types::{DataType, DataTypeTranslator, StandardTypeTranslator};
pub use value::{Value, map_i64_to_u64, map_u64_to_i64};
