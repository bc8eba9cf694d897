//! Many-to-many associations through a link table.
//!
//! A link table for parent `P` and list table `L` has columns `PId` and
//! `LId`. Loading takes two queries: the link rows for the parent, then the
//! list rows for exactly the referenced keys. Links are cached by list key.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use sqldao_core::{ConsistencyErrorKind, Error, Result, Value, XrefRelation};
use sqldao_query::{Filter, StatementBuilder};

use crate::batch::{self, BatchMembers, CommitBatch};
use crate::context::DbCx;
use crate::entity::Entity;
use crate::events::EventKind;

#[derive(Debug, Clone)]
pub struct XrefCollection {
    relation: XrefRelation,
    parent_table: String,
    parent_key: Option<u64>,
    items: Vec<Entity>,
    links: BTreeMap<u64, Entity>,
    loaded: bool,
}

impl XrefCollection {
    pub fn new(parent: &Entity, relation: XrefRelation) -> Self {
        Self {
            relation,
            parent_table: parent.table().to_string(),
            parent_key: parent.db_id(),
            items: Vec::new(),
            links: BTreeMap::new(),
            loaded: false,
        }
    }

    pub fn relation(&self) -> &XrefRelation {
        &self.relation
    }

    /// Link column holding the parent key.
    pub fn parent_column(&self) -> String {
        self.relation.parent_column(&self.parent_table)
    }

    /// Link column holding the list key.
    pub fn list_column(&self) -> String {
        self.relation.list_column()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.items.iter_mut()
    }

    /// The cached link row for the list entity keyed `item_key`.
    pub fn link(&self, item_key: u64) -> Option<&Entity> {
        self.links.get(&item_key)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn require_parent_key(&self) -> Result<u64> {
        self.parent_key.ok_or_else(|| {
            Error::consistency(
                ConsistencyErrorKind::ParentNotPersisted,
                format!(
                    "{} must be committed before linking {}",
                    self.parent_table,
                    self.relation.list.name()
                ),
            )
        })
    }

    fn link_filter(&self, parent_key: u64, item_key: u64) -> Filter {
        Filter::col(self.list_column())
            .eq(Value::from_u64_clamped(item_key))
            .and(Filter::col(self.parent_column()).eq(Value::from_u64_clamped(parent_key)))
    }

    /// Load the parent's links, then the list rows they reference.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(link = %self.relation.link.name()))]
    pub fn load(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let parent_key = self.require_parent_key()?;
        let list_column = self.list_column();
        let by_parent = Filter::col(self.parent_column()).eq(Value::from_u64_clamped(parent_key));

        let mut links = BTreeMap::new();
        for link in Entity::find_where(cx, &self.relation.link, &by_parent)? {
            // Link keys are stored unmapped whether or not the column is a
            // declared foreign key.
            if let Some(item_key) = link.current_value(&list_column).and_then(|v| v.as_u64()) {
                links.insert(item_key, link);
            }
        }

        let items = if links.is_empty() {
            Vec::new()
        } else {
            let list = &self.relation.list;
            let by_key = Filter::col(list.key_column())
                .in_values(links.keys().map(|k| Value::from_u64_clamped(*k)))?;
            Entity::find_where(cx, list, &by_key)?
        };

        tracing::debug!(links = links.len(), items = items.len(), "Loaded cross-reference");
        self.links = links;
        self.items = items;
        self.loaded = true;
        Ok(())
    }

    /// Append an item. It is linked when the collection is committed.
    pub fn add(&mut self, item: Entity) {
        self.items.push(item);
    }

    pub fn add_new(&mut self) -> &mut Entity {
        self.items.push(Entity::new(Arc::clone(&self.relation.list)));
        let last = self.items.len() - 1;
        &mut self.items[last]
    }

    /// The link row for `item`, committing `item` first if it is new and
    /// inserting the link if none exists.
    pub fn ensure_link(&mut self, cx: &DbCx<'_>, item: &mut Entity) -> Result<&Entity> {
        let parent_key = self.require_parent_key()?;
        let link = link_for(cx, &self.relation, &self.parent_table, parent_key, &mut self.links, item)?;
        Ok(link)
    }

    /// Delete the link to `item`. The item row itself is kept.
    ///
    /// Returns false if `item` was never persisted.
    pub fn remove(&mut self, cx: &DbCx<'_>, item: &Entity) -> Result<bool> {
        let parent_key = self.require_parent_key()?;
        let Some(item_key) = item.db_id() else {
            self.items.retain(|e| e != item);
            return Ok(false);
        };
        if let Some(mut link) = self.links.remove(&item_key) {
            if let Err(err) = link.delete(cx) {
                self.links.insert(item_key, link);
                return Err(err);
            }
        } else {
            StatementBuilder::for_database(cx.db())
                .delete(self.relation.link.name())
                .where_filter(&self.link_filter(parent_key, item_key))
                .go()
                .execute(cx.db())?;
        }
        self.items.retain(|e| e != item);
        Ok(true)
    }

    /// Delete every link of the parent. Item rows are kept.
    pub fn clear(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let parent_key = self.require_parent_key()?;
        let keys: Vec<u64> = self.links.keys().copied().collect();
        for key in keys {
            if let Some(mut link) = self.links.remove(&key) {
                if let Err(err) = link.delete(cx) {
                    self.links.insert(key, link);
                    return Err(err);
                }
            }
        }
        // links that were never loaded
        StatementBuilder::for_database(cx.db())
            .delete(self.relation.link.name())
            .where_filter(&Filter::col(self.parent_column()).eq(Value::from_u64_clamped(parent_key)))
            .go()
            .execute(cx.db())?;
        self.items.clear();
        Ok(())
    }

    /// Link every item and commit pending item values in one batch.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(link = %self.relation.link.name()))]
    pub fn commit(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let mut batch = CommitBatch::new(cx);
        self.write_commit(cx, &mut batch)?;
        batch::execute(cx, batch, self)?;
        Ok(())
    }

    pub(crate) fn write_commit(&mut self, cx: &DbCx<'_>, batch: &mut CommitBatch<'_>) -> Result<()> {
        let parent_key = self.require_parent_key()?;
        for item in &mut self.items {
            link_for(cx, &self.relation, &self.parent_table, parent_key, &mut self.links, item)?;
            if item.has_new_values() {
                item.write_commit(cx, batch)?;
            }
        }
        Ok(())
    }

    /// Delete every persisted item and its link.
    #[tracing::instrument(level = "debug", skip(self, cx), fields(link = %self.relation.link.name()))]
    pub fn delete(&mut self, cx: &DbCx<'_>) -> Result<()> {
        let mut statements = StatementBuilder::for_database(cx.db());
        self.write_delete(cx, &mut statements)?;
        if !statements.is_empty() {
            self.visit_deleted(&mut |e| cx.emit(EventKind::BeforeDelete, e))?;
            statements.execute(cx.db())?;
            self.visit_deleted(&mut |e| cx.emit(EventKind::AfterDelete, e))?;
        }
        self.items.clear();
        self.links.clear();
        Ok(())
    }

    pub(crate) fn write_delete(
        &self,
        cx: &DbCx<'_>,
        statements: &mut StatementBuilder<'_>,
    ) -> Result<()> {
        let parent_key = self.require_parent_key()?;
        for item in self.items.iter().filter(|e| !e.is_new()) {
            let item_key = item.require_key()?;
            statements
                .delete(self.relation.link.name())
                .where_filter(&self.link_filter(parent_key, item_key))
                .go();
            item.write_delete(cx, statements)?;
        }
        Ok(())
    }

    pub(crate) fn visit_deleted(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        for item in self.items.iter().filter(|e| !e.is_new()) {
            if let Some(link) = item.db_id().and_then(|key| self.links.get(&key)) {
                f(link)?;
            }
            item.visit_deleted(f)?;
        }
        Ok(())
    }
}

/// Find or create the link between the parent and `item`.
fn link_for<'l>(
    cx: &DbCx<'_>,
    relation: &XrefRelation,
    parent_table: &str,
    parent_key: u64,
    links: &'l mut BTreeMap<u64, Entity>,
    item: &mut Entity,
) -> Result<&'l Entity> {
    if item.is_new() {
        item.commit(cx, false)?;
    }
    let item_key = item.require_key()?;
    match links.entry(item_key) {
        Entry::Occupied(cached) => Ok(cached.into_mut()),
        Entry::Vacant(slot) => {
            let parent_column = relation.parent_column(parent_table);
            let list_column = relation.list_column();
            let filter = Filter::col(list_column.as_str())
                .eq(Value::from_u64_clamped(item_key))
                .and(Filter::col(parent_column.as_str()).eq(Value::from_u64_clamped(parent_key)));
            let existing = Entity::find_where(cx, &relation.link, &filter)?;
            let link = match existing.into_iter().next() {
                Some(link) => link,
                None => {
                    let mut link = Entity::new(Arc::clone(&relation.link));
                    link.set_value(&parent_column, Value::from_u64_clamped(parent_key));
                    link.set_value(&list_column, Value::from_u64_clamped(item_key));
                    link.commit(cx, false)?;
                    link
                }
            };
            tracing::trace!(item_key, link = ?link.db_id(), "Linked cross-reference item");
            Ok(slot.insert(link))
        }
    }
}

impl BatchMembers for XrefCollection {
    fn visit(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()> {
        self.items.iter().try_for_each(|e| f(e))
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Entity) -> Result<()>) -> Result<()> {
        self.items.iter_mut().try_for_each(|e| f(e))
    }
}
