use std::fmt;

use sqldao_core::{Database, Result};

use crate::entity::Entity;
use crate::events::{EntityEvent, EventKind, EventRegistry};

/// The database an operation runs against, plus the event registry that
/// observes it.
///
/// Entity and collection operations take a `&DbCx` instead of reaching for
/// global state, so two sessions never see each other's events.
#[derive(Clone, Copy)]
pub struct DbCx<'a> {
    db: &'a dyn Database,
    events: Option<&'a EventRegistry>,
}

impl fmt::Debug for DbCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCx")
            .field("database", &self.db.id())
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl<'a> DbCx<'a> {
    /// A context without event subscribers. Entity hooks still fire.
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db, events: None }
    }

    pub fn with_events(db: &'a dyn Database, events: &'a EventRegistry) -> Self {
        Self {
            db,
            events: Some(events),
        }
    }

    pub fn db(&self) -> &'a dyn Database {
        self.db
    }

    pub fn events(&self) -> Option<&'a EventRegistry> {
        self.events
    }

    /// The same database with registry delivery suspended.
    #[must_use]
    pub fn without_events(&self) -> Self {
        Self::new(self.db)
    }

    /// Raise `kind` for `entity`: entity hooks first, then subscribers.
    pub fn emit(&self, kind: EventKind, entity: &Entity) -> Result<()> {
        let event = EntityEvent {
            kind,
            database: self.db.id(),
            entity,
        };
        entity.hooks().fire(&event)?;
        if let Some(events) = self.events {
            events.emit(&event)?;
        }
        Ok(())
    }
}
