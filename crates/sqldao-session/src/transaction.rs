//! Compensating pseudo-transaction.
//!
//! No BEGIN/COMMIT is sent. A [`PseudoTransaction`] subscribes to the
//! commit and delete events of one database and records what it would take
//! to reverse them:
//!
//! - an entity inserted by a commit is deleted on rollback
//! - an entity updated by a commit is reverted to its pre-commit values
//! - a deleted entity is re-inserted with its key
//!
//! Dropping an active transaction rolls it back.
//!
//! A commit that fails partway through a cascade leaves only the writes
//! whose `BeforeCommit` already fired eligible for compensation. The
//! failure itself is returned to the caller as is.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use sqldao_core::{Database, Error, Result};

use crate::context::DbCx;
use crate::entity::Entity;
use crate::events::{EntityEvent, EventKind, EventRegistry, SubscriptionFilter, SubscriptionId};

/// Outcome of a [`PseudoTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

type OutcomeFn = Box<dyn FnMut() -> Result<()> + Send>;

#[derive(Default)]
struct OutcomeCallbacks {
    committed: Vec<OutcomeFn>,
    rolled_back: Vec<OutcomeFn>,
}

impl fmt::Debug for OutcomeCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutcomeCallbacks")
            .field("committed", &self.committed.len())
            .field("rolled_back", &self.rolled_back.len())
            .finish()
    }
}

impl OutcomeCallbacks {
    fn fire(callbacks: &mut [OutcomeFn]) -> Result<()> {
        for cb in callbacks.iter_mut() {
            cb()?;
        }
        Ok(())
    }
}

/// Snapshots taken while the transaction is active.
#[derive(Default)]
struct CompensationLog {
    to_delete: Vec<Entity>,
    to_undelete: Vec<Entity>,
    to_undo: Vec<Entity>,
}

impl CompensationLog {
    fn record(&mut self, event: &EntityEvent<'_>) {
        let entity = event.entity;
        match event.kind {
            EventKind::BeforeCommit if entity.writes_insert() => {
                self.to_delete.push(entity.snapshot());
            }
            EventKind::BeforeCommit => self.to_undo.push(entity.snapshot()),
            // the generated key is only known once the insert ran
            EventKind::AfterCommit => {
                if let Some(snapshot) = self
                    .to_delete
                    .iter_mut()
                    .rev()
                    .find(|s| s.instance_id() == entity.instance_id() && s.db_id().is_none())
                {
                    snapshot.set_db_id(entity.db_id());
                }
            }
            EventKind::BeforeDelete => self.to_undelete.push(entity.snapshot()),
            _ => {}
        }
    }

    fn len(&self) -> usize {
        self.to_delete.len() + self.to_undelete.len() + self.to_undo.len()
    }
}

/// Undo-by-compensation over one database.
///
/// Run entity operations under [`PseudoTransaction::cx`] so the transaction
/// sees them.
pub struct PseudoTransaction<'a> {
    db: &'a dyn Database,
    registry: &'a EventRegistry,
    subscription: Option<SubscriptionId>,
    log: Arc<Mutex<CompensationLog>>,
    state: TransactionState,
    callbacks: OutcomeCallbacks,
}

impl fmt::Debug for PseudoTransaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PseudoTransaction")
            .field("database", &self.db.id())
            .field("state", &self.state)
            .field("recorded", &self.recorded())
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

impl<'a> PseudoTransaction<'a> {
    /// Start recording commit and delete events raised against `db`.
    pub fn begin(db: &'a dyn Database, registry: &'a EventRegistry) -> Self {
        let log = Arc::new(Mutex::new(CompensationLog::default()));
        let handler_log = Arc::clone(&log);
        let subscription = registry.subscribe(
            SubscriptionFilter::all().database(db.id()).kinds(&[
                EventKind::BeforeCommit,
                EventKind::AfterCommit,
                EventKind::BeforeDelete,
            ]),
            Arc::new(move |event: &EntityEvent<'_>| {
                handler_log.lock().record(event);
                Ok(())
            }),
        );
        tracing::debug!(database = %db.id(), "Began pseudo-transaction");
        Self {
            db,
            registry,
            subscription: Some(subscription),
            log,
            state: TransactionState::Active,
            callbacks: OutcomeCallbacks::default(),
        }
    }

    /// The context entity operations must run under to be recorded.
    pub fn cx(&self) -> DbCx<'a> {
        DbCx::with_events(self.db, self.registry)
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of recorded compensations.
    pub fn recorded(&self) -> usize {
        self.log.lock().len()
    }

    /// Register a callback to run after a successful commit.
    pub fn on_committed(&mut self, f: impl FnMut() -> Result<()> + Send + 'static) {
        self.callbacks.committed.push(Box::new(f));
    }

    /// Register a callback to run after rollback.
    pub fn on_rolled_back(&mut self, f: impl FnMut() -> Result<()> + Send + 'static) {
        self.callbacks.rolled_back.push(Box::new(f));
    }

    fn unsubscribe(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.registry.unsubscribe(id);
        }
    }

    /// Keep everything written so far and discard the compensations.
    #[tracing::instrument(level = "debug", skip(self), fields(database = %self.db.id()))]
    pub fn commit(mut self) -> Result<()> {
        self.unsubscribe();
        let discarded = std::mem::take(&mut *self.log.lock()).len();
        self.state = TransactionState::Committed;
        tracing::info!(discarded, "Pseudo-transaction committed");
        OutcomeCallbacks::fire(&mut self.callbacks.committed)
    }

    /// Reverse everything recorded.
    #[tracing::instrument(level = "debug", skip(self), fields(database = %self.db.id()))]
    pub fn rollback(mut self) -> Result<()> {
        self.rollback_inner()
    }

    /// Deletes run first, then re-inserts, then reverts. Deletes and
    /// reverts replay newest first, so an entity written twice ends at its
    /// earliest recorded state; re-inserts replay in recorded order, so
    /// parents return before their children.
    ///
    /// Every compensation is attempted. The first failure is returned and
    /// the rest are logged.
    fn rollback_inner(&mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Ok(());
        }
        self.unsubscribe();
        self.state = TransactionState::RolledBack;
        let log = std::mem::take(&mut *self.log.lock());
        let cx = DbCx::new(self.db);

        let mut first_error: Option<Error> = None;
        let mut failed = 0usize;
        let mut note = |result: Result<()>, action: &str, entity: &Entity| {
            if let Err(err) = result {
                failed += 1;
                tracing::warn!(
                    action,
                    table = %entity.table(),
                    db_id = ?entity.db_id(),
                    error = %err,
                    "Compensation failed"
                );
                first_error.get_or_insert(err);
            }
        };

        let (deletes, undeletes, undos) = (log.to_delete.len(), log.to_undelete.len(), log.to_undo.len());
        for mut entity in log.to_delete.into_iter().rev() {
            if entity.db_id().is_none() {
                tracing::warn!(table = %entity.table(), "Inserted entity has no key; cannot delete");
                continue;
            }
            let result = entity.delete(&cx);
            note(result, "delete", &entity);
        }
        for mut entity in log.to_undelete {
            let result = entity.undelete(&cx);
            note(result, "undelete", &entity);
        }
        for mut entity in log.to_undo.into_iter().rev() {
            let result = entity.undo(&cx);
            note(result, "undo", &entity);
        }

        tracing::info!(deletes, undeletes, undos, failed, "Pseudo-transaction rolled back");
        let callbacks = OutcomeCallbacks::fire(&mut self.callbacks.rolled_back);
        match first_error {
            Some(err) => Err(err),
            None => callbacks,
        }
    }
}

impl Drop for PseudoTransaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            tracing::warn!(database = %self.db.id(), "Pseudo-transaction dropped without commit; rolling back");
            if let Err(err) = self.rollback_inner() {
                tracing::error!(error = %err, "Implicit rollback failed");
            }
        }
        self.unsubscribe();
    }
}
