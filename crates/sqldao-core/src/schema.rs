//! Table schema descriptors.
//!
//! A [`TableSchema`] is the explicit metadata an entity carries: table name,
//! key column, ordered column definitions, foreign keys, and the child and
//! cross-reference relationships used for cascading commits and deletes.
//! Schemas are built once per entity type (see [`Table`]) and shared via
//! `Arc`.

use std::sync::Arc;

use crate::identifiers::sanitize_identifier;
use crate::types::{DataType, DataTypeTranslator};

/// Default key column name.
pub const DEFAULT_KEY_COLUMN: &str = "Id";

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name as it appears in the database
    pub name: String,
    /// Database type name (e.g. `varchar(255)`, `bigint`)
    pub db_type: String,
    /// Whether NULL is an acceptable value
    pub nullable: bool,
    /// Whether this is the key column
    pub key: bool,
}

impl ColumnDef {
    /// Create a non-nullable, non-key column.
    pub fn new(name: impl Into<String>, db_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            nullable: false,
            key: false,
        }
    }

    /// Set nullability.
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Mark this column as the key column.
    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    /// Translate the database type name to its in-memory category.
    pub fn data_type(&self, translator: &dyn DataTypeTranslator) -> DataType {
        translator.translate(&self.db_type)
    }
}

/// A foreign key declared on this table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Referencing column on this table
    pub column: String,
    /// Referenced table
    pub referenced_table: String,
    /// Referenced column (usually the referenced table's key)
    pub referenced_column: String,
    /// Name of the property that owns the relationship
    pub property: String,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            property: column.clone(),
            column,
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }

    /// Set the owning property name.
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.property = name.into();
        self
    }
}

/// Rows of another table referencing this one by foreign key.
#[derive(Debug, Clone)]
pub struct ChildRelation {
    /// Relationship name, used to look up the owned collection
    pub name: String,
    /// Schema of the child table
    pub schema: Arc<TableSchema>,
    /// Column on the child table holding this table's key
    pub foreign_key: String,
}

/// A many-to-many association through a link table.
///
/// The link table carries `{ParentTable}Id` and `{ListTable}Id` columns.
#[derive(Debug, Clone)]
pub struct XrefRelation {
    /// Relationship name
    pub name: String,
    /// Schema of the link table
    pub link: Arc<TableSchema>,
    /// Schema of the associated (list) table
    pub list: Arc<TableSchema>,
}

impl XrefRelation {
    /// Link column referencing the owning table.
    pub fn parent_column(&self, parent_table: &str) -> String {
        link_column_name(parent_table)
    }

    /// Link column referencing the list table.
    pub fn list_column(&self) -> String {
        link_column_name(self.list.name())
    }
}

/// `{Table}Id`, the naming convention for link-table columns.
pub fn link_column_name(table: &str) -> String {
    format!("{}Id", sanitize_identifier(table))
}

/// Metadata for one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    name: String,
    key_column: String,
    columns: Vec<ColumnDef>,
    foreign_keys: Vec<ForeignKey>,
    children: Vec<ChildRelation>,
    xrefs: Vec<XrefRelation>,
    validate_required: bool,
}

impl TableSchema {
    /// Start building a schema for `name`.
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Ordered column definitions, key column included.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Look up a column (exact match, then ASCII case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// True if `name` names the key column.
    pub fn is_key(&self, name: &str) -> bool {
        self.key_column.eq_ignore_ascii_case(name)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Relations whose rows reference this table.
    pub fn children(&self) -> &[ChildRelation] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&ChildRelation> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn xrefs(&self) -> &[XrefRelation] {
        &self.xrefs
    }

    pub fn xref(&self, name: &str) -> Option<&XrefRelation> {
        self.xrefs.iter().find(|x| x.name == name)
    }

    /// Whether entities of this table run the required-column check when no
    /// validator of their own is installed.
    pub fn validates_required(&self) -> bool {
        self.validate_required
    }
}

/// Builder for [`TableSchema`].
#[derive(Debug)]
pub struct TableSchemaBuilder {
    schema: TableSchema,
}

impl TableSchemaBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            schema: TableSchema {
                name: name.into(),
                key_column: DEFAULT_KEY_COLUMN.to_string(),
                columns: Vec::new(),
                foreign_keys: Vec::new(),
                children: Vec::new(),
                xrefs: Vec::new(),
                validate_required: false,
            },
        }
    }

    /// Set the key column name (default `Id`).
    pub fn key(mut self, column: impl Into<String>) -> Self {
        self.schema.key_column = column.into();
        self
    }

    /// Add a column definition.
    pub fn column(mut self, column: ColumnDef) -> Self {
        if column.key {
            self.schema.key_column.clone_from(&column.name);
        }
        self.schema.columns.push(column);
        self
    }

    /// Shorthand for a non-nullable column.
    pub fn required(self, name: impl Into<String>, db_type: impl Into<String>) -> Self {
        self.column(ColumnDef::new(name, db_type))
    }

    /// Shorthand for a nullable column.
    pub fn optional(self, name: impl Into<String>, db_type: impl Into<String>) -> Self {
        self.column(ColumnDef::new(name, db_type).nullable(true))
    }

    /// Declare a foreign key. The column is added as `bigint` if not present.
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        if !self.schema.has_column(&fk.column) {
            self.schema
                .columns
                .push(ColumnDef::new(fk.column.clone(), "bigint").nullable(true));
        }
        self.schema.foreign_keys.push(fk);
        self
    }

    /// Declare a child relation: rows of `schema` reference this table
    /// through `foreign_key`.
    pub fn child(
        mut self,
        name: impl Into<String>,
        schema: Arc<TableSchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.schema.children.push(ChildRelation {
            name: name.into(),
            schema,
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Declare a cross-reference relation through `link` to `list`.
    pub fn xref(
        mut self,
        name: impl Into<String>,
        link: Arc<TableSchema>,
        list: Arc<TableSchema>,
    ) -> Self {
        self.schema.xrefs.push(XrefRelation {
            name: name.into(),
            link,
            list,
        });
        self
    }

    /// Run the required-column check as the default validator.
    pub fn validate_required(mut self, value: bool) -> Self {
        self.schema.validate_required = value;
        self
    }

    /// Finish the schema. The key column is inserted first if it was not
    /// declared explicitly.
    pub fn build(mut self) -> Arc<TableSchema> {
        let key = self.schema.key_column.clone();
        match self.schema.columns.iter_mut().find(|c| c.name == key) {
            Some(column) => column.key = true,
            None => self
                .schema
                .columns
                .insert(0, ColumnDef::new(key, "bigint").key()),
        }
        Arc::new(self.schema)
    }
}

/// A type that knows its table schema.
///
/// Implementations build the schema once and cache it:
///
/// ```
/// use std::sync::{Arc, OnceLock};
/// use sqldao_core::{Table, TableSchema};
///
/// struct Customer;
///
/// impl Table for Customer {
///     fn schema() -> Arc<TableSchema> {
///         static SCHEMA: OnceLock<Arc<TableSchema>> = OnceLock::new();
///         Arc::clone(SCHEMA.get_or_init(|| {
///             TableSchema::builder("Customer")
///                 .required("Name", "varchar(255)")
///                 .build()
///         }))
///     }
/// }
///
/// assert!(Arc::ptr_eq(&Customer::schema(), &Customer::schema()));
/// assert_eq!(Customer::schema().column_names(), vec!["Id", "Name"]);
/// ```
pub trait Table {
    fn schema() -> Arc<TableSchema>;
}
