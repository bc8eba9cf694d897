//! One commit round trip shared by entities and collections.
//!
//! Statements are written into a [`QuerySet`] while the batch remembers
//! which entity produced each one. Execution then fires `BeforeCommit` for
//! every written entity, runs the set, hands generated keys back through
//! their slots and fires `AfterCommit`.

use std::collections::HashMap;

use sqldao_core::Result;
use sqldao_query::{QuerySet, Slot};

use crate::context::DbCx;
use crate::entity::Entity;
use crate::events::EventKind;

/// How an entity's statement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Written {
    /// INSERT; the slot is present when the key is generated by the database
    Inserted(Option<Slot>),
    Updated,
}

pub(crate) struct CommitBatch<'d> {
    queries: QuerySet<'d>,
    written: HashMap<u64, Written>,
}

impl<'d> CommitBatch<'d> {
    pub(crate) fn new(cx: &DbCx<'d>) -> Self {
        Self {
            queries: QuerySet::for_database(cx.db()),
            written: HashMap::new(),
        }
    }

    pub(crate) fn queries(&mut self) -> &mut QuerySet<'d> {
        &mut self.queries
    }

    pub(crate) fn record(&mut self, instance_id: u64, written: Written) {
        self.written.insert(instance_id, written);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.written.is_empty()
    }
}

/// The entities a batch may have written, reachable from one owner.
pub(crate) trait BatchMembers {
    fn visit(&self, f: &mut dyn FnMut(&Entity) -> Result<()>) -> Result<()>;
    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Entity) -> Result<()>) -> Result<()>;
}

/// Execute `batch` and complete every member it wrote.
///
/// Returns false, without touching the database, when nothing was written.
pub(crate) fn execute(
    cx: &DbCx<'_>,
    mut batch: CommitBatch<'_>,
    members: &mut dyn BatchMembers,
) -> Result<bool> {
    if batch.is_empty() {
        return Ok(false);
    }
    let written = std::mem::take(&mut batch.written);

    members.visit(&mut |e| {
        if written.contains_key(&e.instance_id()) {
            cx.emit(EventKind::BeforeCommit, e)
        } else {
            Ok(())
        }
    })?;

    let results = batch.queries.execute(cx.db())?;

    members.visit_mut(&mut |e| {
        if let Some(how) = written.get(&e.instance_id()) {
            e.complete_commit(*how, &results);
        }
        Ok(())
    })?;

    members.visit(&mut |e| {
        if written.contains_key(&e.instance_id()) {
            cx.emit(EventKind::AfterCommit, e)
        } else {
            Ok(())
        }
    })?;
    Ok(true)
}
