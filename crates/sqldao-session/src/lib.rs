//! Entity change tracking for SqlDao.
//!
//! `sqldao-session` is the **persistence layer** on top of the statement
//! builder. It tracks pending values per row, writes them back in batches and
//! reverses them on request.
//!
//! # Role In The Architecture
//!
//! - **Entities**: [`Entity`] holds the original row plus pending values and
//!   decides between INSERT and UPDATE on commit.
//! - **Collections**: [`Collection`] is a paged list of entities, optionally
//!   bound to a parent by a foreign key; [`XrefCollection`] manages a
//!   many-to-many relation through a link table.
//! - **Events**: every lifecycle step raises an [`EventKind`] to per-entity
//!   hooks and to a session-scoped [`EventRegistry`].
//! - **Compensation**: [`PseudoTransaction`] records commits and deletes
//!   through the registry and reverses them on rollback.
//!
//! # Example
//!
//! ```ignore
//! let registry = EventRegistry::new();
//! let tx = PseudoTransaction::begin(&db, &registry);
//! let cx = tx.cx();
//!
//! let mut order = Entity::new(orders);
//! order.set_value("Customer", "ACME");
//! order.commit(&cx, false)?;
//!
//! order.children("Lines")?.add_new().set_value("Sku", "A-1");
//! order.save(&cx)?;
//!
//! tx.rollback()?;
//! ```

mod batch;
pub mod collection;
pub mod context;
pub mod entity;
pub mod events;
pub mod transaction;
pub mod validation;
pub mod xref;

#[cfg(test)]
mod test_support;

pub use collection::{Collection, DEFAULT_PAGE_SIZE};
pub use context::DbCx;
pub use entity::{Child, Entity, UniqueFilterFn, WriteMode};
pub use events::{
    EntityEvent, EntityHooks, EventHandler, EventKind, EventRegistry, SubscriptionFilter,
    SubscriptionId,
};
pub use transaction::{PseudoTransaction, TransactionState};
pub use validation::Validator;
pub use xref::XrefCollection;
