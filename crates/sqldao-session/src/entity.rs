//! The entity change tracker.
//!
//! An [`Entity`] is one row of one table. It keeps the values it was loaded
//! with (`original`), the values written since (`new_values`) and its key,
//! and turns them into INSERT, UPDATE and DELETE statements on commit and
//! delete. Owned child and cross-reference collections are created lazily
//! from the relations declared on the [`TableSchema`].

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use sqldao_core::{
    CardinalityError, ConsistencyErrorKind, Error, Result, Row, TableSchema, ValidationError,
    Value, map_i64_to_u64,
};
use sqldao_query::{Assignment, Filter, QueryResults, StatementBuilder};

use crate::batch::{self, BatchMembers, CommitBatch, Written};
use crate::collection::Collection;
use crate::context::DbCx;
use crate::events::{EntityEvent, EntityHooks, EventKind};
use crate::validation::Validator;
use crate::xref::XrefCollection;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Whether commit chooses INSERT or UPDATE itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// INSERT while new, UPDATE once keyed
    #[default]
    Auto,
    ForceInsert,
    ForceUpdate,
}

/// Produces the filter that identifies an entity's row.
pub type UniqueFilterFn = Arc<dyn Fn(&Entity) -> Result<Filter> + Send + Sync>;

/// An owned relation of an entity.
#[derive(Debug, Clone)]
pub enum Child {
    Many(Collection),
    Xref(XrefCollection),
}

impl Child {
    /// The entities currently held in memory.
    pub fn entities(&self) -> &[Entity] {
        match self {
            Child::Many(c) => c.entities(),
            Child::Xref(x) => x.items(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Child::Many(c) => c.is_loaded(),
            Child::Xref(x) => x.is_loaded(),
        }
    }

    pub fn load(&mut self, cx: &DbCx<'_>) -> Result<()> {
        match self {
            Child::Many(c) => c.load(cx),
            Child::Xref(x) => x.load(cx),
        }
    }

    fn entities_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        match self {
            Child::Many(c) => c.iter_mut(),
            Child::Xref(x) => x.iter_mut(),
        }
    }

    fn write_commit(&mut self, cx: &DbCx<'_>, batch: &mut CommitBatch<'_>) -> Result<()> {
        match self {
            Child::Many(c) => c.write_commit(cx, batch),
            Child::Xref(x) => x.write_commit(cx, batch),
        }
    }

    fn write_delete(&self, cx: &DbCx<'_>, statements: &mut StatementBuilder<'_>) -> Result<()> {
        match self {
            Child::Many(c) => c.write_delete(cx, statements),
            Child::Xref(x) => x.write_delete(cx, statements),
        }
    }

    fn visit_deleted(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        match self {
            Child::Many(c) => c.visit_deleted(f),
            Child::Xref(x) => x.visit_deleted(f),
        }
    }
}

/// One tracked row.
#[derive(Clone)]
pub struct Entity {
    instance_id: u64,
    schema: Arc<TableSchema>,
    db_id: Option<u64>,
    original: Option<Row>,
    new_values: Vec<(String, Value)>,
    is_new: bool,
    deleted: bool,
    write_mode: WriteMode,
    auto_delete_children: bool,
    auto_hydrate_children_on_delete: bool,
    children: BTreeMap<String, Child>,
    hooks: EntityHooks,
    validator: Option<Validator>,
    unique_filter: Option<UniqueFilterFn>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("table", &self.schema.name())
            .field("db_id", &self.db_id)
            .field("is_new", &self.is_new())
            .field("new_values", &self.new_values)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// A new, unkeyed entity of `schema`.
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, AtomicOrdering::Relaxed),
            schema,
            db_id: None,
            original: None,
            new_values: Vec::new(),
            is_new: true,
            deleted: false,
            write_mode: WriteMode::Auto,
            auto_delete_children: true,
            auto_hydrate_children_on_delete: false,
            children: BTreeMap::new(),
            hooks: EntityHooks::default(),
            validator: None,
            unique_filter: None,
        }
    }

    /// An entity hydrated from a database row.
    pub fn from_row(schema: Arc<TableSchema>, row: Row) -> Self {
        let db_id = row.get_by_name(schema.key_column()).and_then(Value::as_u64);
        let mut entity = Self::new(schema);
        entity.db_id = db_id;
        entity.original = Some(row);
        entity.is_new = false;
        entity
    }

    /// Load the row with key `id`, if it exists.
    pub fn find(cx: &DbCx<'_>, schema: Arc<TableSchema>, id: u64) -> Result<Option<Entity>> {
        let mut entity = Self::new(schema);
        entity.db_id = Some(id);
        Ok(entity.hydrate(cx)?.then_some(entity))
    }

    /// Load every row matching `filter`.
    pub fn find_where(
        cx: &DbCx<'_>,
        schema: &Arc<TableSchema>,
        filter: &Filter,
    ) -> Result<Vec<Entity>> {
        let rows = StatementBuilder::for_database(cx.db())
            .select(schema)
            .where_filter(filter)
            .go()
            .execute_get_data_table(cx.db())?;
        Ok(rows
            .into_rows()
            .into_iter()
            .map(|row| Entity::from_row(Arc::clone(schema), row))
            .collect())
    }

    /// Process-unique identity, kept by clones.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.name()
    }

    pub fn key_column(&self) -> &str {
        self.schema.key_column()
    }

    pub fn db_id(&self) -> Option<u64> {
        self.db_id
    }

    pub fn set_db_id(&mut self, id: Option<u64>) {
        self.db_id = id;
    }

    /// True until the entity has been committed or given a positive key.
    pub fn is_new(&self) -> bool {
        self.is_new && !self.db_id.is_some_and(|id| id > 0)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn has_new_values(&self) -> bool {
        !self.new_values.is_empty()
    }

    /// Values written on this entity that no commit has persisted yet.
    pub fn has_pending_changes(&self) -> bool {
        self.has_new_values()
    }

    /// Pending values on any loaded child. These are written by
    /// `commit(cx, true)` or `save`, not by a plain commit.
    pub fn has_pending_child_changes(&self) -> bool {
        self.children
            .values()
            .any(|c| c.entities().iter().any(Entity::has_new_values))
    }

    /// Values written since the last commit, in write order.
    pub fn new_values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.new_values.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// The row as last loaded or committed.
    pub fn original_row(&self) -> Option<&Row> {
        self.original.as_ref()
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn set_write_mode(&mut self, mode: WriteMode) {
        self.write_mode = mode;
    }

    pub fn force_insert(&self) -> bool {
        self.write_mode == WriteMode::ForceInsert
    }

    pub fn set_force_insert(&mut self, value: bool) {
        self.write_mode = if value {
            WriteMode::ForceInsert
        } else {
            WriteMode::Auto
        };
    }

    pub fn force_update(&self) -> bool {
        self.write_mode == WriteMode::ForceUpdate
    }

    pub fn set_force_update(&mut self, value: bool) {
        self.write_mode = if value {
            WriteMode::ForceUpdate
        } else {
            WriteMode::Auto
        };
    }

    pub fn auto_delete_children(&self) -> bool {
        self.auto_delete_children
    }

    pub fn set_auto_delete_children(&mut self, value: bool) {
        self.auto_delete_children = value;
    }

    pub fn auto_hydrate_children_on_delete(&self) -> bool {
        self.auto_hydrate_children_on_delete
    }

    /// Load unloaded child collections before a cascading delete.
    pub fn set_auto_hydrate_children_on_delete(&mut self, value: bool) {
        self.auto_hydrate_children_on_delete = value;
    }

    pub fn hooks(&self) -> &EntityHooks {
        &self.hooks
    }

    /// Install a hook for `kind`. Errors from `before` hooks veto the operation.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> &mut Self
    where
        F: Fn(&EntityEvent<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.on(kind, Arc::new(handler));
        self
    }

    pub fn set_validator(&mut self, validator: Validator) {
        self.validator = Some(validator);
    }

    /// Replace key equality as the filter used by UPDATE, DELETE and hydrate.
    pub fn set_unique_filter<F>(&mut self, provider: F)
    where
        F: Fn(&Entity) -> Result<Filter> + Send + Sync + 'static,
    {
        self.unique_filter = Some(Arc::new(provider));
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Write a column value. Writing the key column sets the key directly.
    pub fn set_value(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.schema.is_key(column) {
            self.db_id = value.as_u64();
            return;
        }
        let name = self
            .schema
            .column(column)
            .map_or_else(|| column.to_string(), |c| c.name.clone());
        match self
            .new_values
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.new_values.push((name, value)),
        }
    }

    /// Write an unsigned value.
    ///
    /// The key and foreign-key columns store the value as is; other columns
    /// use the order-preserving signed mapping read back by [`Entity::get_u64`].
    pub fn set_u64(&mut self, column: &str, value: u64) {
        if self.schema.is_key(column) {
            self.db_id = Some(value);
        } else if self.is_foreign_key(column) {
            self.set_value(column, Value::from_u64_clamped(value));
        } else {
            self.set_value(column, Value::from_u64_mapped(value));
        }
    }

    fn is_foreign_key(&self, column: &str) -> bool {
        self.schema
            .foreign_keys()
            .iter()
            .any(|fk| fk.column.eq_ignore_ascii_case(column))
    }

    /// The pending value if one was written, else the original value.
    pub fn current_value(&self, column: &str) -> Option<Value> {
        if self.schema.is_key(column) {
            return self.db_id.map(Value::from_u64_clamped);
        }
        self.new_values
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(column))
            .map(|(_, v)| v.clone())
            .or_else(|| self.original_value(column).cloned())
    }

    pub fn original_value(&self, column: &str) -> Option<&Value> {
        self.original.as_ref()?.get_by_name(column)
    }

    fn non_null(&self, column: &str) -> Option<Value> {
        self.current_value(column).filter(|v| !v.is_null())
    }

    pub fn get_string(&self, column: &str) -> Option<String> {
        self.non_null(column)
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.non_null(column)?.as_i64()
    }

    pub fn get_i32(&self, column: &str) -> Option<i32> {
        i32::try_from(self.get_i64(column)?).ok()
    }

    /// Read an unsigned value written with [`Entity::set_u64`].
    pub fn get_u64(&self, column: &str) -> Option<u64> {
        if self.schema.is_key(column) {
            return self.db_id;
        }
        let value = self.non_null(column)?;
        if self.is_foreign_key(column) {
            value.as_u64()
        } else {
            value.as_i64().map(map_i64_to_u64)
        }
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.non_null(column)?.as_bool()
    }

    pub fn get_bytes(&self, column: &str) -> Option<Vec<u8>> {
        self.non_null(column)?.as_bytes().map(<[u8]>::to_vec)
    }

    /// Decimal columns as `f64`.
    pub fn get_decimal(&self, column: &str) -> Option<f64> {
        self.non_null(column)?.as_f64()
    }

    /// Order two entities by the current value of `column`. Missing and
    /// null values sort first.
    pub fn compare_by(&self, other: &Entity, column: &str) -> Ordering {
        compare_values(
            self.non_null(column).as_ref(),
            other.non_null(column).as_ref(),
        )
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    /// Run the entity's validator, or the required check when the schema
    /// opts in.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        match &self.validator {
            Some(validator) => validator.check(self),
            None if self.schema.validates_required() => self.validate_required(),
            None => Ok(()),
        }
    }

    /// Every non-key, non-nullable column holds a non-empty value.
    pub fn validate_required(&self) -> std::result::Result<(), ValidationError> {
        let missing: Vec<&str> = self
            .schema
            .columns()
            .iter()
            .filter(|c| !c.nullable && !c.key && !self.schema.is_key(&c.name))
            .filter(|c| {
                self.current_value(&c.name)
                    .is_none_or(|v| v.is_null_or_empty())
            })
            .map(|c| c.name.as_str())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ValidationError {
            table: self.table().to_string(),
            message: format!("missing required value for {}", missing.join(", ")),
            cause: None,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(crate) fn require_key(&self) -> Result<u64> {
        self.db_id.ok_or_else(|| {
            Error::consistency(
                ConsistencyErrorKind::MissingKey,
                format!("{} has no key value", self.table()),
            )
        })
    }

    /// The filter identifying this entity's row.
    pub fn unique_filter(&self) -> Result<Filter> {
        if let Some(provider) = &self.unique_filter {
            return provider(self);
        }
        let id = self.require_key()?;
        Ok(Filter::col(self.key_column()).eq(Value::from_u64_clamped(id)))
    }

    pub(crate) fn writes_insert(&self) -> bool {
        match self.write_mode {
            WriteMode::Auto => self.is_new(),
            WriteMode::ForceInsert => true,
            WriteMode::ForceUpdate => false,
        }
    }

    fn pending_assignments(&self, include_key: bool) -> Vec<Assignment> {
        let key = self
            .db_id
            .filter(|_| include_key)
            .map(|id| Assignment::new(self.key_column(), Value::from_u64_clamped(id)));
        key.into_iter()
            .chain(
                self.new_values
                    .iter()
                    .map(|(c, v)| Assignment::new(c.as_str(), v.clone())),
            )
            .collect()
    }

    /// Validate and write this entity's INSERT or UPDATE into `batch`.
    pub(crate) fn write_commit(&mut self, cx: &DbCx<'_>, batch: &mut CommitBatch<'_>) -> Result<()> {
        self.write_commit_checked(cx, batch, true)
    }

    fn write_commit_checked(
        &mut self,
        cx: &DbCx<'_>,
        batch: &mut CommitBatch<'_>,
        validate: bool,
    ) -> Result<()> {
        if validate {
            self.validate().map_err(Error::Validation)?;
        }
        cx.emit(EventKind::BeforeWriteCommit, self)?;

        if self.has_new_values() {
            let table = self.schema.name();
            if self.writes_insert() {
                // A known key is inserted explicitly; otherwise the database
                // generates one and hands it back through a result slot.
                let explicit_key = self.db_id.is_some_and(|id| id > 0);
                let assignments = self.pending_assignments(explicit_key);
                let written = if explicit_key {
                    batch.queries().statements().insert(table, &assignments).go();
                    Written::Inserted(None)
                } else {
                    let slot = batch
                        .queries()
                        .insert(table, &assignments, self.schema.key_column());
                    Written::Inserted(Some(slot))
                };
                batch.record(self.instance_id, written);
            } else {
                let filter = self.unique_filter()?;
                let assignments = self.pending_assignments(false);
                batch
                    .queries()
                    .statements()
                    .update(table, &assignments)
                    .where_filter(&filter)
                    .go();
                batch.record(self.instance_id, Written::Updated);
            }
            tracing::trace!(
                table = %self.table(),
                columns = self.new_values.len(),
                insert = self.writes_insert(),
                "Wrote entity commit"
            );
        }

        cx.emit(EventKind::AfterWriteCommit, self)
    }

    /// Take on committed state after the batch executed.
    pub(crate) fn complete_commit(&mut self, written: Written, results: &QueryResults) {
        if let Written::Inserted(Some(slot)) = written {
            match results.generated_key(slot) {
                Some(id) => self.db_id = Some(id),
                None => tracing::warn!(table = %self.table(), "Insert returned no generated key"),
            }
        }
        self.merge_new_values();
        self.is_new = false;
        self.deleted = false;
    }

    /// Fold pending values into the original row.
    fn merge_new_values(&mut self) {
        let mut names: Vec<String> = self
            .schema
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        for (column, _) in &self.new_values {
            if !self.schema.has_column(column) {
                names.push(column.clone());
            }
        }
        let values = names
            .iter()
            .map(|name| self.current_value(name).unwrap_or_default())
            .collect();
        self.original = Some(Row::new(names, values));
        self.new_values.clear();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Commit pending values, optionally cascading one level into loaded
    /// children.
    ///
    /// Nothing is rendered or executed when no values are pending. After a
    /// successful commit the committed values become the original values
    /// and owned collections are dropped so the next access re-hydrates.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = %self.table(), db_id = ?self.db_id))]
    pub fn commit(&mut self, cx: &DbCx<'_>, commit_children: bool) -> Result<()> {
        self.commit_inner(cx, commit_children, true)
    }

    /// Commit with children.
    pub fn save(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.commit(cx, true)
    }

    /// Commit as an INSERT regardless of state.
    pub fn insert(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.commit_as(cx, WriteMode::ForceInsert, true)
    }

    /// Commit as an UPDATE regardless of state.
    pub fn update(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.commit_as(cx, WriteMode::ForceUpdate, true)
    }

    fn commit_as(&mut self, cx: &DbCx<'_>, mode: WriteMode, validate: bool) -> Result<()> {
        let previous = std::mem::replace(&mut self.write_mode, mode);
        let result = self.commit_inner(cx, false, validate);
        self.write_mode = previous;
        result
    }

    fn commit_inner(&mut self, cx: &DbCx<'_>, commit_children: bool, validate: bool) -> Result<()> {
        let mut batch = CommitBatch::new(cx);
        self.write_commit_checked(cx, &mut batch, validate)?;
        if commit_children {
            for child in self.children.values_mut() {
                child.write_commit(cx, &mut batch)?;
            }
        }
        if batch::execute(cx, batch, self)? {
            self.reset_children();
        }
        Ok(())
    }

    /// Delete the row, cascading to owned collections when
    /// `auto_delete_children` is set.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = %self.table(), db_id = ?self.db_id))]
    pub fn delete(&mut self, cx: &DbCx<'_>) -> Result<()> {
        // Fails with MissingKey before any cascade work when there is
        // neither a key nor a unique-filter provider.
        self.unique_filter()?;
        if self.auto_delete_children {
            if self.auto_hydrate_children_on_delete {
                self.hydrate_children(cx)?;
            } else {
                self.ensure_declared_children()?;
            }
        }
        let mut statements = StatementBuilder::for_database(cx.db());
        self.write_delete(cx, &mut statements)?;
        self.visit_deleted(&mut |e| cx.emit(EventKind::BeforeDelete, e))?;
        statements.execute(cx.db())?;
        self.visit_deleted(&mut |e| cx.emit(EventKind::AfterDelete, e))?;
        self.deleted = true;
        self.reset_children();
        Ok(())
    }

    /// Write this entity's DELETE, preceded by its cascaded child deletes.
    pub(crate) fn write_delete(
        &self,
        cx: &DbCx<'_>,
        statements: &mut StatementBuilder<'_>,
    ) -> Result<()> {
        let filter = self.unique_filter()?;
        cx.emit(EventKind::BeforeWriteDelete, self)?;
        self.write_child_deletes(cx, statements)?;
        statements.delete(self.table()).where_filter(&filter).go();
        cx.emit(EventKind::AfterWriteDelete, self)
    }

    pub(crate) fn write_child_deletes(
        &self,
        cx: &DbCx<'_>,
        statements: &mut StatementBuilder<'_>,
    ) -> Result<()> {
        if self.auto_delete_children {
            for child in self.children.values() {
                child.write_delete(cx, statements)?;
            }
        }
        Ok(())
    }

    /// This entity and every loaded entity its delete cascades to, parents
    /// before children.
    pub(crate) fn visit_deleted(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        f(self)?;
        if self.auto_delete_children {
            for child in self.children.values() {
                child.visit_deleted(f)?;
            }
        }
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    /// Write every original value back with an UPDATE and drop pending
    /// values. Used by rollback.
    pub fn undo(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let Some(original) = self.original.as_ref() else {
            self.new_values.clear();
            return Ok(());
        };
        let assignments: Vec<Assignment> = original
            .iter()
            .filter(|(column, _)| !self.schema.is_key(column))
            .map(|(column, value)| Assignment::new(column, value.clone()))
            .collect();
        if !assignments.is_empty() {
            let filter = self.unique_filter()?;
            StatementBuilder::for_database(cx.db())
                .update(self.table(), &assignments)
                .where_filter(&filter)
                .go()
                .execute(cx.db())?;
        }
        self.new_values.clear();
        tracing::debug!(table = %self.table(), db_id = ?self.db_id, "Reverted entity");
        Ok(())
    }

    /// Re-insert the row with its last known values and key. Used by
    /// rollback.
    pub fn undelete(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let values: Vec<(String, Value)> = self
            .schema
            .columns()
            .iter()
            .filter(|c| !self.schema.is_key(&c.name))
            .filter_map(|c| self.current_value(&c.name).map(|v| (c.name.clone(), v)))
            .collect();
        self.new_values = values;
        self.is_new = true;
        self.deleted = false;
        self.commit_as(cx, WriteMode::ForceInsert, false)
    }

    /// Reload the row by its unique filter. Returns false when no row
    /// matched.
    pub fn hydrate(&mut self, cx: &DbCx<'_>) -> Result<bool> {
        let filter = self.unique_filter()?;
        let rows = StatementBuilder::for_database(cx.db())
            .select(&self.schema)
            .where_filter(&filter)
            .go()
            .execute_get_data_table(cx.db())?;
        if rows.len() > 1 {
            return Err(Error::Cardinality(CardinalityError {
                table: self.table().to_string(),
                found: rows.len(),
            }));
        }
        let Some(row) = rows.into_rows().into_iter().next() else {
            return Ok(false);
        };
        if let Some(id) = row.get_by_name(self.key_column()).and_then(Value::as_u64) {
            self.db_id = Some(id);
        }
        self.original = Some(row);
        self.new_values.clear();
        self.is_new = false;
        self.reset_children();
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Children
    // ------------------------------------------------------------------

    fn build_child(&self, name: &str) -> Result<Child> {
        if let Some(relation) = self.schema.child(name) {
            return Ok(Child::Many(Collection::for_parent(
                self,
                Arc::clone(&relation.schema),
                relation.foreign_key.clone(),
            )));
        }
        if let Some(relation) = self.schema.xref(name) {
            return Ok(Child::Xref(XrefCollection::new(self, relation.clone())));
        }
        Err(Error::consistency(
            ConsistencyErrorKind::UnknownRelation,
            format!("{} declares no relation named {}", self.table(), name),
        ))
    }

    fn ensure_child(&mut self, name: &str) -> Result<&mut Child> {
        if !self.children.contains_key(name) {
            let child = self.build_child(name)?;
            self.children.insert(name.to_string(), child);
        }
        self.children.get_mut(name).ok_or_else(|| {
            Error::consistency(ConsistencyErrorKind::UnknownRelation, name.to_string())
        })
    }

    fn ensure_declared_children(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .schema
            .children()
            .iter()
            .map(|c| c.name.clone())
            .chain(self.schema.xrefs().iter().map(|x| x.name.clone()))
            .collect();
        for name in names {
            self.ensure_child(&name)?;
        }
        Ok(())
    }

    /// The owned child collection `name`, created unloaded on first access.
    pub fn children(&mut self, name: &str) -> Result<&mut Collection> {
        let table = self.table().to_string();
        match self.ensure_child(name)? {
            Child::Many(collection) => Ok(collection),
            Child::Xref(_) => Err(Error::consistency(
                ConsistencyErrorKind::UnknownRelation,
                format!("{}.{} is a cross-reference", table, name),
            )),
        }
    }

    /// The owned cross-reference collection `name`.
    pub fn xref(&mut self, name: &str) -> Result<&mut XrefCollection> {
        let table = self.table().to_string();
        match self.ensure_child(name)? {
            Child::Xref(xref) => Ok(xref),
            Child::Many(_) => Err(Error::consistency(
                ConsistencyErrorKind::UnknownRelation,
                format!("{}.{} is not a cross-reference", table, name),
            )),
        }
    }

    /// A materialized child, if it has been accessed since the last reset.
    pub fn child(&self, name: &str) -> Option<&Child> {
        self.children.get(name)
    }

    /// Load every declared child relation.
    pub fn hydrate_children(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.ensure_declared_children()?;
        for child in self.children.values_mut() {
            child.load(cx)?;
        }
        Ok(())
    }

    /// Load every declared child relation, one scoped thread per relation.
    pub fn preload_children(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.ensure_declared_children()?;
        let table = self.table().to_string();
        let results: Vec<Result<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .children
                .values_mut()
                .map(|child| scope.spawn(move || child.load(cx)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(Error::Custom(format!("child load of {} panicked", table)))
                    })
                })
                .collect()
        });
        results.into_iter().collect()
    }

    /// Drop every materialized child collection.
    pub fn reset_children(&mut self) {
        self.children.clear();
    }

    /// A copy without hooks or children, as recorded by a transaction.
    pub(crate) fn snapshot(&self) -> Entity {
        Entity {
            children: BTreeMap::new(),
            hooks: EntityHooks::default(),
            ..self.clone()
        }
    }
}

impl BatchMembers for Entity {
    fn visit(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        f(self)?;
        for child in self.children.values() {
            for entity in child.entities() {
                f(entity)?;
            }
        }
        Ok(())
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Entity) -> Result<()>) -> Result<()> {
        f(self)?;
        for child in self.children.values_mut() {
            for entity in child.entities_mut() {
                f(entity)?;
            }
        }
        Ok(())
    }
}

/// Keyed entities are equal when table and key match; unkeyed entities
/// only equal themselves (and their clones).
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        if self.table() != other.table() {
            return false;
        }
        match (self.db_id, other.db_id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.instance_id == other.instance_id,
            _ => false,
        }
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table().hash(state);
        match self.db_id {
            Some(id) => (0u8, id).hash(state),
            None => (1u8, self.instance_id).hash(state),
        }
    }
}

pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Text(a)), Some(Value::Text(b))) => a.cmp(b),
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}
