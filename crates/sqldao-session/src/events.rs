//! Entity lifecycle events.
//!
//! Events are delivered to two places: hooks installed on the entity itself,
//! and an [`EventRegistry`] carried by the [`DbCx`](crate::DbCx) the
//! operation runs under. There is no process-wide bus; a registry lives as
//! long as the session that owns it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use sqldao_core::{DatabaseId, Result};

use crate::entity::Entity;

/// The eight lifecycle points of commit and delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Before the entity's statement is written to the batch
    BeforeWriteCommit,
    /// After the entity's statement is written to the batch
    AfterWriteCommit,
    /// Just before the batch executes
    BeforeCommit,
    /// After the batch executed and the entity took on its committed state
    AfterCommit,
    BeforeWriteDelete,
    AfterWriteDelete,
    BeforeDelete,
    AfterDelete,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::BeforeWriteCommit,
        EventKind::AfterWriteCommit,
        EventKind::BeforeCommit,
        EventKind::AfterCommit,
        EventKind::BeforeWriteDelete,
        EventKind::AfterWriteDelete,
        EventKind::BeforeDelete,
        EventKind::AfterDelete,
    ];

    /// Whether a handler error aborts the operation before any SQL runs.
    pub const fn can_veto(self) -> bool {
        matches!(
            self,
            EventKind::BeforeWriteCommit
                | EventKind::BeforeCommit
                | EventKind::BeforeWriteDelete
                | EventKind::BeforeDelete
        )
    }
}

/// An event raised against one entity on one database.
#[derive(Debug, Clone, Copy)]
pub struct EntityEvent<'a> {
    pub kind: EventKind,
    pub database: DatabaseId,
    pub entity: &'a Entity,
}

/// An event handler. Errors from `before` handlers abort the operation.
pub type EventHandler = Arc<dyn Fn(&EntityEvent<'_>) -> Result<()> + Send + Sync>;

/// Hooks installed on a single entity.
#[derive(Clone, Default)]
pub struct EntityHooks {
    hooks: Vec<(EventKind, EventHandler)>,
}

impl fmt::Debug for EntityHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHooks")
            .field("count", &self.hooks.len())
            .finish()
    }
}

impl EntityHooks {
    pub fn on(&mut self, kind: EventKind, handler: EventHandler) {
        self.hooks.push((kind, handler));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn fire(&self, event: &EntityEvent<'_>) -> Result<()> {
        for (kind, handler) in &self.hooks {
            if *kind == event.kind {
                handler(event)?;
            }
        }
        Ok(())
    }
}

/// Handle returned by [`EventRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Which events a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    database: Option<DatabaseId>,
    kinds: Vec<EventKind>,
}

impl SubscriptionFilter {
    /// Every event on every database.
    pub fn all() -> Self {
        Self::default()
    }

    /// Only events raised against `database`.
    pub fn database(mut self, database: DatabaseId) -> Self {
        self.database = Some(database);
        self
    }

    /// Only the listed kinds.
    pub fn kinds(mut self, kinds: &[EventKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn matches(&self, event: &EntityEvent<'_>) -> bool {
        self.database.is_none_or(|db| db == event.database)
            && (self.kinds.is_empty() || self.kinds.contains(&event.kind))
    }
}

struct Subscription {
    id: SubscriptionId,
    filter: SubscriptionFilter,
    handler: EventHandler,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    subscriptions: Vec<Subscription>,
}

/// Session-scoped subscriptions to entity events.
///
/// Handlers are invoked without the registry lock held, so a handler may
/// subscribe or unsubscribe.
#[derive(Default)]
pub struct EventRegistry {
    inner: Mutex<RegistryInner>,
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: SubscriptionFilter, handler: EventHandler) -> SubscriptionId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subscriptions.push(Subscription {
            id,
            filter,
            handler,
        });
        tracing::trace!(subscription = id.0, "Subscribed to entity events");
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|s| s.id != id);
        before != inner.subscriptions.len()
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every matching subscription in subscription
    /// order, stopping at the first error.
    pub fn emit(&self, event: &EntityEvent<'_>) -> Result<()> {
        let handlers: Vec<EventHandler> = self
            .inner
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.filter.matches(event))
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler(event)?;
        }
        Ok(())
    }
}
