//! Paged, optionally parent-bound collections of entities.

use std::cmp::Ordering;
use std::sync::Arc;

use sqldao_core::{
    CardinalityError, ConsistencyErrorKind, Error, Result, RowSet, TableSchema, Value,
};
use sqldao_query::{Filter, StatementBuilder};

use crate::batch::{self, BatchMembers, CommitBatch};
use crate::context::DbCx;
use crate::entity::Entity;
use crate::events::EventKind;

/// Page size used until [`Collection::set_page_size`] is called.
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct ParentBinding {
    table: String,
    key: Option<u64>,
    foreign_key: String,
}

/// Entities of one table, materialized in memory.
///
/// A collection bound to a parent loads `WHERE <fk> = <parent key>`, stamps
/// the foreign key on everything added to it, and deletes in bulk.
#[derive(Debug, Clone)]
pub struct Collection {
    schema: Arc<TableSchema>,
    parent: Option<ParentBinding>,
    query: Option<Filter>,
    entities: Vec<Entity>,
    loaded: bool,
    page_size: usize,
}

impl Collection {
    /// An unbound collection over every row of `schema`'s table.
    pub fn new(schema: Arc<TableSchema>) -> Self {
        Self {
            schema,
            parent: None,
            query: None,
            entities: Vec::new(),
            loaded: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Children of `parent` referencing it through `foreign_key`.
    pub fn for_parent(
        parent: &Entity,
        schema: Arc<TableSchema>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let mut collection = Self::new(schema);
        collection.parent = Some(ParentBinding {
            table: parent.table().to_string(),
            key: parent.db_id(),
            foreign_key: foreign_key.into(),
        });
        collection
    }

    /// Rows of `schema`'s table matching `query`.
    pub fn with_query(schema: Arc<TableSchema>, query: Filter) -> Self {
        let mut collection = Self::new(schema);
        collection.query = Some(query);
        collection
    }

    /// Narrow the rows loaded by `query`, grouped with any parent binding.
    pub fn and_query(mut self, query: Filter) -> Self {
        self.query = Some(match self.query.take() {
            Some(existing) => existing & query,
            None => query,
        });
        self
    }

    /// A loaded collection over rows already fetched.
    pub fn from_rows(schema: Arc<TableSchema>, rows: RowSet) -> Self {
        let mut collection = Self::new(schema);
        collection.materialize(rows);
        collection
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn parent_key(&self) -> Option<u64> {
        self.parent.as_ref().and_then(|p| p.key)
    }

    pub fn foreign_key(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.foreign_key.as_str())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// The parent binding and its key, or `None` when unbound.
    fn bound_parent(&self) -> Result<Option<(&ParentBinding, u64)>> {
        let Some(binding) = &self.parent else {
            return Ok(None);
        };
        match binding.key {
            Some(key) => Ok(Some((binding, key))),
            None => Err(Error::consistency(
                ConsistencyErrorKind::ParentNotPersisted,
                format!(
                    "{} must be committed before its {} children",
                    binding.table,
                    self.schema.name()
                ),
            )),
        }
    }

    fn parent_filter(binding: &ParentBinding, key: u64) -> Filter {
        Filter::col(binding.foreign_key.as_str()).eq(Value::from_u64_clamped(key))
    }

    fn materialize(&mut self, rows: RowSet) {
        self.entities = rows
            .into_rows()
            .into_iter()
            .map(|row| Entity::from_row(Arc::clone(&self.schema), row))
            .collect();
        self.loaded = true;
    }

    /// Run the bound query and replace the contents.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = %self.schema.name()))]
    pub fn load(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let filter = match self.bound_parent()? {
            Some((binding, key)) => {
                let by_parent = Self::parent_filter(binding, key);
                Some(match &self.query {
                    Some(query) => by_parent & query.clone(),
                    None => by_parent,
                })
            }
            None => self.query.clone(),
        };
        let mut statements = StatementBuilder::for_database(cx.db());
        statements.select(&self.schema);
        if let Some(filter) = &filter {
            statements.where_filter(filter);
        }
        let rows = statements.go().execute_get_data_table(cx.db())?;
        self.materialize(rows);
        tracing::debug!(count = self.entities.len(), "Loaded collection");
        Ok(())
    }

    pub fn reload(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.loaded = false;
        self.load(cx)
    }

    /// Append `entity`, stamping the parent key on a bound collection.
    pub fn add(&mut self, mut entity: Entity) -> Result<()> {
        if let Some((binding, key)) = self.bound_parent()? {
            entity.set_value(&binding.foreign_key, Value::from_u64_clamped(key));
        }
        self.entities.push(entity);
        Ok(())
    }

    /// Append a new entity of the collection's table and return it.
    pub fn add_new(&mut self) -> Result<&mut Entity> {
        self.add(Entity::new(Arc::clone(&self.schema)))?;
        let last = self.entities.len() - 1;
        Ok(&mut self.entities[last])
    }

    pub fn add_range(&mut self, entities: impl IntoIterator<Item = Entity>) -> Result<()> {
        entities.into_iter().try_for_each(|e| self.add(e))
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.entities.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.entities.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.entities.iter_mut()
    }

    /// The contents ordered by `cmp`, leaving the collection untouched.
    pub fn sorted<F>(&self, mut cmp: F) -> Vec<&Entity>
    where
        F: FnMut(&Entity, &Entity) -> Ordering,
    {
        let mut sorted: Vec<&Entity> = self.entities.iter().collect();
        sorted.sort_by(|a, b| cmp(a, b));
        sorted
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn set_page_size(&mut self, size: usize) {
        self.page_size = size.max(1);
    }

    pub fn page_count(&self) -> usize {
        self.entities.len().div_ceil(self.page_size)
    }

    /// Page `page`, counted from 1. Out-of-range pages are empty.
    pub fn get_page(&self, page: usize) -> &[Entity] {
        if page == 0 {
            return &[];
        }
        let start = (page - 1).saturating_mul(self.page_size);
        if start >= self.entities.len() {
            return &[];
        }
        let end = (start + self.page_size).min(self.entities.len());
        &self.entities[start..end]
    }

    /// The only entity, created when there is none.
    ///
    /// A bound or queried collection loads first. More than one entity is a
    /// [`Cardinality`](Error::Cardinality) error.
    pub fn just_one(&mut self, cx: &DbCx<'_>, save_if_new: bool) -> Result<&mut Entity> {
        if !self.loaded && (self.parent.is_some() || self.query.is_some()) {
            self.load(cx)?;
        }
        match self.entities.len() {
            0 => {
                self.add_new()?;
                if save_if_new {
                    self.entities[0].commit(cx, false)?;
                }
            }
            1 => {}
            found => {
                return Err(Error::Cardinality(CardinalityError {
                    table: self.schema.name().to_string(),
                    found,
                }));
            }
        }
        Ok(&mut self.entities[0])
    }

    /// Commit every entity with pending values in one batch. Entries stay
    /// in the collection with their committed state.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = %self.schema.name()))]
    pub fn commit(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let mut batch = CommitBatch::new(cx);
        self.write_commit(cx, &mut batch)?;
        batch::execute(cx, batch, self)?;
        Ok(())
    }

    pub(crate) fn write_commit(&mut self, cx: &DbCx<'_>, batch: &mut CommitBatch<'_>) -> Result<()> {
        if let Some((binding, _)) = self.bound_parent()? {
            let unbound = self.entities.iter().any(|e| {
                e.has_new_values()
                    && e.current_value(&binding.foreign_key)
                        .is_none_or(|v| v.is_null())
            });
            if unbound {
                return Err(Error::consistency(
                    ConsistencyErrorKind::MissingParentBinding,
                    format!(
                        "{} entry has no {} referencing its {} parent",
                        self.schema.name(),
                        binding.foreign_key,
                        binding.table
                    ),
                ));
            }
        }
        for entity in self.entities.iter_mut().filter(|e| e.has_new_values()) {
            entity.write_commit(cx, batch)?;
        }
        Ok(())
    }

    /// Delete the collection's rows: in bulk by parent key when bound,
    /// one by one otherwise. Unpersisted entries are left alone.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(table = %self.schema.name()))]
    pub fn delete(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let mut statements = StatementBuilder::for_database(cx.db());
        self.write_delete(cx, &mut statements)?;
        if statements.is_empty() {
            return Ok(());
        }
        self.visit_deleted(&mut |e| cx.emit(EventKind::BeforeDelete, e))?;
        statements.execute(cx.db())?;
        self.visit_deleted(&mut |e| cx.emit(EventKind::AfterDelete, e))?;
        for entity in self.entities.iter_mut().filter(|e| !e.is_new()) {
            entity.mark_deleted();
        }
        Ok(())
    }

    /// Delete every row, then empty the collection.
    pub fn clear(&mut self, cx: &DbCx<'_>) -> Result<()> {
        self.delete(cx)?;
        self.entities.clear();
        Ok(())
    }

    pub(crate) fn write_delete(
        &self,
        cx: &DbCx<'_>,
        statements: &mut StatementBuilder<'_>,
    ) -> Result<()> {
        let persisted = self.entities.iter().filter(|e| !e.is_new());
        match self.bound_parent()? {
            Some((binding, key)) => {
                for entity in persisted {
                    entity.write_child_deletes(cx, statements)?;
                }
                let filter = Self::parent_filter(binding, key);
                statements.delete(self.schema.name()).where_filter(&filter).go();
            }
            None => {
                for entity in persisted {
                    entity.write_delete(cx, statements)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn visit_deleted(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        for entity in self.entities.iter().filter(|e| !e.is_new()) {
            entity.visit_deleted(f)?;
        }
        Ok(())
    }
}

impl BatchMembers for Collection {
    fn visit(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        self.entities.iter().try_for_each(|e| f(e))
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Entity) -> Result<()>) -> Result<()> {
        self.entities.iter_mut().try_for_each(|e| f(e))
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedDb;
    use sqldao_core::{ForeignKey, Row};

    fn line() -> Arc<TableSchema> {
        TableSchema::builder("OrderLine")
            .required("Sku", "varchar")
            .foreign_key(ForeignKey::new("OrderId", "Orders", "Id"))
            .build()
    }

    fn order(id: Option<i64>) -> Entity {
        let schema = TableSchema::builder("Orders").required("Customer", "varchar").build();
        match id {
            Some(id) => Entity::from_row(
                schema,
                Row::new(vec!["Id".into()], vec![Value::BigInt(id)]),
            ),
            None => Entity::new(schema),
        }
    }

    fn lines(n: i64) -> RowSet {
        RowSet::new(
            vec!["Id".into(), "Sku".into(), "OrderId".into()],
            (1..=n)
                .map(|i| vec![Value::BigInt(i), Value::from(format!("s{i}")), Value::BigInt(1)])
                .collect(),
        )
    }

    #[test]
    fn test_add_requires_persisted_parent() {
        let mut c = Collection::for_parent(&order(None), line(), "OrderId");
        let err = c.add_new().unwrap_err();
        assert!(err.is_consistency(ConsistencyErrorKind::ParentNotPersisted));
        assert!(c.is_empty());
    }

    #[test]
    fn test_add_stamps_foreign_key() {
        let mut c = Collection::for_parent(&order(Some(3)), line(), "OrderId");
        let e = c.add_new().unwrap();
        assert_eq!(e.current_value("OrderId"), Some(Value::BigInt(3)));
        assert_eq!(c.parent_key(), Some(3));
        assert_eq!(c.foreign_key(), Some("OrderId"));
    }

    #[test]
    fn test_load_by_parent() {
        let db = ScriptedDb::new();
        db.push_table(lines(2));
        let cx = DbCx::new(&db);
        let mut c = Collection::for_parent(&order(Some(1)), line(), "OrderId");
        c.load(&cx).unwrap();
        assert!(c.is_loaded());
        assert_eq!(c.len(), 2);
        assert_eq!(
            db.statements(),
            vec!["SELECT Id, Sku, OrderId FROM OrderLine WHERE OrderId = @P1 ;\r\n"]
        );
        assert!(c.iter().all(|e| !e.is_new()));
    }

    #[test]
    fn test_load_with_query_and_parent_groups_both() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::for_parent(&order(Some(1)), line(), "OrderId")
            .and_query(Filter::col("Sku").starts_with("s"));
        c.load(&cx).unwrap();
        assert_eq!(
            db.statements(),
            vec!["SELECT Id, Sku, OrderId FROM OrderLine WHERE (OrderId = @P1) AND (Sku LIKE @P2) ;\r\n"]
        );
    }

    #[test]
    fn test_paging() {
        let mut c = Collection::from_rows(line(), lines(25));
        assert_eq!(c.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(c.page_count(), 3);
        assert_eq!(c.get_page(1).len(), 10);
        assert_eq!(c.get_page(3).len(), 5);
        assert!(c.get_page(0).is_empty());
        assert!(c.get_page(4).is_empty());
        c.set_page_size(0);
        assert_eq!(c.page_size(), 1);
        assert_eq!(c.page_count(), 25);
    }

    #[test]
    fn test_just_one_creates_when_empty() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::for_parent(&order(Some(1)), line(), "OrderId");
        let e = c.just_one(&cx, false).unwrap();
        assert!(e.is_new());
        assert_eq!(c.len(), 1);
        // loaded once, nothing saved
        assert_eq!(db.statements().len(), 1);
    }

    #[test]
    fn test_just_one_rejects_many() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::from_rows(line(), lines(2));
        let err = c.just_one(&cx, false).unwrap_err();
        assert!(matches!(err, Error::Cardinality(ref e) if e.found == 2));
    }

    #[test]
    fn test_commit_batches_dirty_entities_only() {
        let db = ScriptedDb::new();
        db.push_key(30);
        let cx = DbCx::new(&db);
        let mut c = Collection::from_rows(line(), lines(2));
        c.get_mut(1).unwrap().set_value("Sku", "changed");
        let fresh = c.add_new().unwrap();
        fresh.set_value("Sku", "new");
        c.commit(&cx).unwrap();

        assert_eq!(
            db.statements(),
            vec![
                "UPDATE OrderLine SET Sku = @P1 WHERE Id = @P2 ;\r\n\
                 INSERT INTO OrderLine (Sku) VALUES (@P3) RETURNING Id AS ID;\r\n"
            ]
        );
        assert_eq!(c.len(), 3);
        assert_eq!(c.get(2).and_then(Entity::db_id), Some(30));
        assert!(c.iter().all(|e| !e.has_new_values()));
    }

    #[test]
    fn test_commit_rejects_entry_without_parent_key() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::for_parent(&order(Some(1)), line(), "OrderId");
        let e = c.add_new().unwrap();
        e.set_value("Sku", "s");
        e.set_value("OrderId", Value::Null);
        let err = c.commit(&cx).unwrap_err();
        assert!(err.is_consistency(ConsistencyErrorKind::MissingParentBinding));
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_failed_commit_keeps_entries_pending() {
        let db = ScriptedDb::new();
        db.fail_next("constraint violated");
        let cx = DbCx::new(&db);
        let mut c = Collection::from_rows(line(), lines(1));
        c.get_mut(0).unwrap().set_value("Sku", "changed");
        c.add_new().unwrap().set_value("Sku", "new");

        let err = c.commit(&cx).unwrap_err();
        assert!(err.to_string().contains("constraint violated"));
        assert!(err.sql().is_some_and(|sql| sql.starts_with("UPDATE OrderLine")));
        assert_eq!(db.statements().len(), 1);

        let updated = c.get(0).unwrap();
        assert!(updated.has_new_values());
        assert_eq!(updated.original_value("Sku"), Some(&Value::from("s1")));
        let inserted = c.get(1).unwrap();
        assert!(inserted.is_new());
        assert_eq!(inserted.db_id(), None);
        assert_eq!(inserted.get_string("Sku").as_deref(), Some("new"));
    }

    #[test]
    fn test_bound_delete_is_bulk() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::for_parent(&order(Some(1)), line(), "OrderId");
        c.delete(&cx).unwrap();
        assert_eq!(
            db.statements(),
            vec!["DELETE FROM OrderLine WHERE OrderId = @P1 ;\r\n"]
        );
    }

    #[test]
    fn test_unbound_delete_is_per_entity() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::from_rows(line(), lines(2));
        c.add_new().unwrap().set_value("Sku", "unsaved");
        c.clear(&cx).unwrap();
        assert_eq!(
            db.statements(),
            vec!["DELETE FROM OrderLine WHERE Id = @P1 ;\r\nDELETE FROM OrderLine WHERE Id = @P2 ;\r\n"]
        );
        assert!(c.is_empty());
    }

    #[test]
    fn test_empty_unbound_delete_executes_nothing() {
        let db = ScriptedDb::new();
        let cx = DbCx::new(&db);
        let mut c = Collection::new(line());
        c.delete(&cx).unwrap();
        assert!(db.statements().is_empty());
    }

    #[test]
    fn test_sorted_leaves_order_untouched() {
        let c = Collection::from_rows(line(), lines(3));
        let sorted = c.sorted(|a, b| b.compare_by(a, "Id"));
        assert_eq!(sorted[0].db_id(), Some(3));
        assert_eq!(c.get(0).and_then(Entity::db_id), Some(1));
    }
}
