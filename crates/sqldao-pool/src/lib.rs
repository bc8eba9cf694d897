//! Connection management for SqlDao.
//!
//! [`ConnectionManager`] keeps a fixed ring of `max_connections` slots. Every
//! [`ConnectionManager::get_connection`] call opens a fresh connection for the
//! next slot and retires the slot's previous occupant once its lifetime has
//! elapsed, giving the caller that received it time to finish.
//!
//! Opening and closing driver connections is delegated to a
//! [`ConnectionFactory`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use sqldao_core::{Error, PoolError, PoolErrorKind, Result};

/// Default number of connection slots.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default time a retired connection stays open, in milliseconds.
pub const DEFAULT_LIFETIME_MS: u64 = 3100;

/// Opens and closes driver connections.
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;

    fn connect(&self) -> Result<Self::Connection>;

    fn close(&self, conn: &Self::Connection) -> Result<()>;
}

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of slots in the ring
    pub max_connections: usize,
    /// Delay before a retired connection is closed, in milliseconds
    pub lifetime_ms: u64,
    /// Close retired connections on the calling thread
    pub block_on_release: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            lifetime_ms: DEFAULT_LIFETIME_MS,
            block_on_release: false,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with the given number of slots.
    pub fn new(max_connections: usize) -> Self {
        Self {
            max_connections,
            ..Default::default()
        }
    }

    /// Set the number of slots.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the retirement delay.
    pub fn lifetime(mut self, ms: u64) -> Self {
        self.lifetime_ms = ms;
        self
    }

    /// Enable/disable closing retired connections inline.
    pub fn block_on_release(mut self, enabled: bool) -> Self {
        self.block_on_release = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Pool(PoolError {
                kind: PoolErrorKind::Config,
                message: "max_connections must be at least 1".to_string(),
                source: None,
            }));
        }
        Ok(())
    }
}

/// Manager counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections opened
    pub created: usize,
    /// Connections closed
    pub released: usize,
    /// Close attempts that failed
    pub release_failures: usize,
    /// Retired connections waiting out their lifetime
    pub pending_releases: usize,
}

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    released: AtomicUsize,
    release_failures: AtomicUsize,
    pending_releases: AtomicUsize,
}

struct Ring<C> {
    slots: Vec<Option<Arc<C>>>,
    next: Option<usize>,
}

impl<C> Ring<C> {
    fn advance(&mut self) -> usize {
        let index = match self.next {
            Some(i) if i + 1 < self.slots.len() => i + 1,
            _ => 0,
        };
        self.next = Some(index);
        index
    }
}

/// Round-robin connection manager with lifetime-based release.
pub struct ConnectionManager<F: ConnectionFactory> {
    factory: Arc<F>,
    config: PoolConfig,
    ring: Mutex<Ring<F::Connection>>,
    counters: Arc<Counters>,
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    /// Create a manager with the default configuration.
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            config: PoolConfig::default(),
            ring: Mutex::new(Ring {
                slots: (0..DEFAULT_MAX_CONNECTIONS).map(|_| None).collect(),
                next: None,
            }),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Create a manager with `config`.
    pub fn with_config(factory: F, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let slots = (0..config.max_connections).map(|_| None).collect();
        Ok(Self {
            factory: Arc::new(factory),
            config,
            ring: Mutex::new(Ring { slots, next: None }),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn max_connections(&self) -> usize {
        self.config.max_connections
    }

    /// Open a connection for the next slot, retiring the slot's previous
    /// occupant.
    pub fn get_connection(&self) -> Result<Arc<F::Connection>> {
        let (index, retired) = {
            let mut ring = self.ring.lock();
            let index = ring.advance();
            (index, ring.slots[index].take())
        };

        if let Some(previous) = retired {
            tracing::debug!(index, "Retiring connection");
            self.schedule_release(previous);
        }

        let conn = Arc::new(self.factory.connect().map_err(|e| {
            Error::Pool(PoolError {
                kind: PoolErrorKind::Connect,
                message: format!("failed to open connection for slot {index}"),
                source: Some(Box::new(e)),
            })
        })?);
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        self.ring.lock().slots[index] = Some(Arc::clone(&conn));
        tracing::trace!(index, "Opened connection");
        Ok(conn)
    }

    /// Close `conn` now. Failures are logged and counted, never returned.
    pub fn release_connection(&self, conn: &F::Connection) {
        release(self.factory.as_ref(), &self.counters, conn);
    }

    fn schedule_release(&self, conn: Arc<F::Connection>) {
        let lifetime = Duration::from_millis(self.config.lifetime_ms);
        self.counters.pending_releases.fetch_add(1, Ordering::Relaxed);
        let factory = Arc::clone(&self.factory);
        let counters = Arc::clone(&self.counters);
        let task = move || {
            thread::sleep(lifetime);
            release(factory.as_ref(), &counters, conn.as_ref());
            counters.pending_releases.fetch_sub(1, Ordering::Relaxed);
        };

        if self.config.block_on_release {
            task();
            return;
        }
        let spawned = thread::Builder::new()
            .name("sqldao-release".to_string())
            .spawn(task);
        if let Err(err) = spawned {
            // The closure was consumed; the connection is dropped unclosed.
            tracing::warn!(error = %err, "Could not spawn release thread");
            self.counters.pending_releases.fetch_sub(1, Ordering::Relaxed);
            self.counters.release_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Close every connection still held in a slot.
    pub fn close_all(&self) {
        let held: Vec<Arc<F::Connection>> = {
            let mut ring = self.ring.lock();
            ring.next = None;
            ring.slots.iter_mut().filter_map(Option::take).collect()
        };
        for conn in held {
            self.release_connection(&conn);
        }
    }

    /// Connections currently held in slots.
    pub fn open_connections(&self) -> usize {
        self.ring.lock().slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.counters.created.load(Ordering::Relaxed),
            released: self.counters.released.load(Ordering::Relaxed),
            release_failures: self.counters.release_failures.load(Ordering::Relaxed),
            pending_releases: self.counters.pending_releases.load(Ordering::Relaxed),
        }
    }
}

fn release<F: ConnectionFactory>(factory: &F, counters: &Counters, conn: &F::Connection) {
    match factory.close(conn) {
        Ok(()) => {
            counters.released.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            counters.release_failures.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(error = %err, "Exception releasing database connection");
        }
    }
}
