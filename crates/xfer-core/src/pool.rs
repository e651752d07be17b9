//! Generic connection pool shared by every protocol backend.
//!
//! - One slot per [`ConnectionKey`]; a slot holds at most one live connection.
//! - The slot's async mutex serializes both creation and use, so two callers
//!   with the same key never get the same connection at once and never race
//!   to create a second one.
//! - The map mutex is only held for check-and-insert, never across the
//!   network connect.
//! - A semaphore bounds connections that are *in use*, independent of how
//!   many idle ones are pooled. The permit is an RAII guard, so a failed
//!   connect gives it back.

use crate::config::TransferConfig;
use crate::error::{OperationResult, TransferError};
use crate::types::{ConnectionKey, Credentials};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard, OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Factory, liveness probe and close routine for one protocol's connections.
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open and authenticate a new connection.
    async fn connect(&self, key: &ConnectionKey, credentials: &Credentials) -> OperationResult<Self::Connection>;

    /// Cheap liveness probe; must not perform a real operation.
    fn is_valid(&self, conn: &Self::Connection) -> bool;

    /// Tear the connection down. Errors are the manager's to log.
    async fn close(&self, conn: Self::Connection);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: usize,
    pub idle_timeout: Duration,
}

impl From<&TransferConfig> for PoolOptions {
    fn from(cfg: &TransferConfig) -> Self {
        Self {
            max_connections: cfg.max_connections,
            idle_timeout: cfg.idle_timeout(),
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        (&TransferConfig::default()).into()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Pooled connections (idle + in use).
    pub live: usize,
    pub in_use: usize,
    pub limit: usize,
    pub created: usize,
    pub closed: usize,
}

// ─── Internals ──────────────────────────────────────────────────────────────

struct Entry<C> {
    conn: C,
    last_used: Instant,
    poisoned: bool,
}

type Slot<C> = Arc<Mutex<Option<Entry<C>>>>;

struct Shared<M: ConnectionManager> {
    manager: M,
    slots: StdMutex<HashMap<ConnectionKey, Slot<M::Connection>>>,
    semaphore: Arc<Semaphore>,
    /// Current permit budget; guarded separately so `reconfigure` is atomic.
    limit: StdMutex<usize>,
    idle_timeout: Duration,
    created: AtomicUsize,
    closed: AtomicUsize,
}

impl<M: ConnectionManager> Shared<M> {
    fn usable(&self, entry: &Entry<M::Connection>) -> bool {
        !entry.poisoned
            && entry.last_used.elapsed() <= self.idle_timeout
            && self.manager.is_valid(&entry.conn)
    }

    async fn close_entry(&self, key: &ConnectionKey, entry: Entry<M::Connection>) {
        debug!("pool: closing connection {}", key);
        self.manager.close(entry.conn).await;
        self.closed.fetch_add(1, Ordering::SeqCst);
    }

    fn slots(&self) -> OperationResult<std::sync::MutexGuard<'_, HashMap<ConnectionKey, Slot<M::Connection>>>> {
        self.slots
            .lock()
            .map_err(|_| TransferError::unknown("connection pool state poisoned"))
    }

    /// Drop map entries that are empty and referenced by nobody else.
    fn prune(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.retain(|_, slot| {
                let unused = Arc::strong_count(slot) == 1;
                let empty = slot.try_lock().map(|g| g.is_none()).unwrap_or(false);
                !(unused && empty)
            });
        }
    }
}

// ─── Pool ───────────────────────────────────────────────────────────────────

/// Keyed cache of live connections with idle eviction and bounded concurrency.
pub struct ConnectionPool<M: ConnectionManager> {
    shared: Arc<Shared<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    pub fn new(manager: M, options: PoolOptions) -> Self {
        let limit = options.max_connections.max(1);
        Self {
            shared: Arc::new(Shared {
                manager,
                slots: StdMutex::new(HashMap::new()),
                semaphore: Arc::new(Semaphore::new(limit)),
                limit: StdMutex::new(limit),
                idle_timeout: options.idle_timeout,
                created: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }),
        }
    }

    pub fn manager(&self) -> &M {
        &self.shared.manager
    }

    /// Hand out the live connection for `key`, creating it when absent and
    /// replacing it when it fails the liveness probe.
    pub async fn acquire(&self, key: &ConnectionKey, credentials: &Credentials) -> OperationResult<PooledConnection<M>> {
        let slot = {
            let mut slots = self.shared.slots()?;
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone()
        };

        let mut guard: OwnedMutexGuard<Option<Entry<M::Connection>>> = slot.clone().lock_owned().await;

        // Permits are taken only once the slot is ours.
        let permit = match self.shared.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                debug!("pool: all permits in use, evicting idle connections before waiting");
                self.evict_idle().await;
                self.shared
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| TransferError::unknown("connection pool closed"))?
            }
            Err(TryAcquireError::Closed) => return Err(TransferError::unknown("connection pool closed")),
        };

        let stale = guard.as_ref().map(|e| !self.shared.usable(e)).unwrap_or(false);
        if stale {
            if let Some(old) = guard.take() {
                info!("pool: replacing stale connection {}", key);
                self.shared.close_entry(key, old).await;
            }
        }

        if guard.is_none() {
            // On failure `guard` and `permit` drop here, releasing both.
            let conn = self.shared.manager.connect(key, credentials).await?;
            self.shared.created.fetch_add(1, Ordering::SeqCst);
            debug!("pool: opened connection {}", key);
            *guard = Some(Entry {
                conn,
                last_used: Instant::now(),
                poisoned: false,
            });
        }

        let guard = OwnedMutexGuard::try_map(guard, |entry| entry.as_mut())
            .map_err(|_| TransferError::unknown("pool slot emptied during acquire"))?;

        Ok(PooledConnection {
            key: key.clone(),
            slot,
            shared: self.shared.clone(),
            guard,
            _permit: permit,
        })
    }

    /// Return a connection to the pool. Dropping it does the same.
    pub fn release(&self, conn: PooledConnection<M>) {
        drop(conn);
    }

    /// Force-close the pooled connection for `key`, waiting for its current
    /// user (if any) to finish.
    pub async fn invalidate(&self, key: &ConnectionKey) {
        let slot = match self.shared.slots() {
            Ok(slots) => slots.get(key).cloned(),
            Err(_) => None,
        };
        if let Some(slot) = slot {
            let entry = slot.lock().await.take();
            if let Some(entry) = entry {
                info!("pool: invalidated {}", key);
                self.shared.close_entry(key, entry).await;
            }
        }
        self.shared.prune();
    }

    /// Close and remove every idle connection past the idle timeout (or
    /// failing the liveness probe). In-use connections are skipped.
    pub async fn evict_idle(&self) -> usize {
        let snapshot: Vec<(ConnectionKey, Slot<M::Connection>)> = match self.shared.slots() {
            Ok(slots) => slots.iter().map(|(k, s)| (k.clone(), s.clone())).collect(),
            Err(_) => return 0,
        };

        let mut evicted = 0;
        for (key, slot) in snapshot {
            let Ok(mut guard) = slot.try_lock_owned() else {
                continue;
            };
            let expired = guard.as_ref().map(|e| !self.shared.usable(e)).unwrap_or(false);
            if expired {
                if let Some(entry) = guard.take() {
                    self.shared.close_entry(&key, entry).await;
                    evicted += 1;
                }
            }
        }

        self.shared.prune();
        if evicted > 0 {
            info!("pool: evicted {} idle connection(s)", evicted);
        }
        evicted
    }

    /// Close every pooled connection. Waits for in-use connections to be released.
    pub async fn close_all(&self) {
        let snapshot: Vec<(ConnectionKey, Slot<M::Connection>)> = match self.shared.slots() {
            Ok(mut slots) => slots.drain().collect(),
            Err(_) => return,
        };
        let count = snapshot.len();
        for (key, slot) in snapshot {
            let entry = slot.lock().await.take();
            if let Some(entry) = entry {
                self.shared.close_entry(&key, entry).await;
            }
        }
        if count > 0 {
            info!("pool: closed {} connection slot(s)", count);
        }
    }

    /// Change the in-use connection limit at runtime.
    ///
    /// Growing takes effect immediately; shrinking retires permits as they
    /// are released.
    pub fn reconfigure(&self, limit: usize) {
        let limit = limit.max(1);
        let Ok(mut current) = self.shared.limit.lock() else {
            warn!("pool: limit lock poisoned, reconfigure ignored");
            return;
        };
        if limit > *current {
            self.shared.semaphore.add_permits(limit - *current);
        } else if limit < *current {
            let shrink = (*current - limit) as u32;
            let sem = self.shared.semaphore.clone();
            match sem.clone().try_acquire_many_owned(shrink) {
                Ok(permits) => permits.forget(),
                Err(_) => match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            if let Ok(permits) = sem.acquire_many_owned(shrink).await {
                                permits.forget();
                            }
                        });
                    }
                    Err(_) => {
                        warn!("pool: cannot shrink limit outside a runtime while permits are busy");
                        return;
                    }
                },
            }
        }
        info!("pool: connection limit {} -> {}", *current, limit);
        *current = limit;
    }

    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            limit: self.shared.limit.lock().map(|l| *l).unwrap_or(0),
            created: self.shared.created.load(Ordering::SeqCst),
            closed: self.shared.closed.load(Ordering::SeqCst),
            ..Default::default()
        };
        if let Ok(slots) = self.shared.slots.lock() {
            for slot in slots.values() {
                match slot.try_lock() {
                    Ok(entry) => {
                        if entry.is_some() {
                            stats.live += 1;
                        }
                    }
                    // Locked means a caller holds it (or is creating it).
                    Err(_) => {
                        stats.live += 1;
                        stats.in_use += 1;
                    }
                }
            }
        }
        stats
    }

    /// Periodic eviction; the task ends once every pool handle is dropped.
    pub fn spawn_maintenance(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Shared<M>> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else { break };
                ConnectionPool { shared }.evict_idle().await;
            }
        })
    }
}

// ─── Checked-out handle ─────────────────────────────────────────────────────

/// Exclusive use of one pooled connection. Returned to the pool on drop.
pub struct PooledConnection<M: ConnectionManager> {
    key: ConnectionKey,
    slot: Slot<M::Connection>,
    shared: Arc<Shared<M>>,
    guard: OwnedMappedMutexGuard<Option<Entry<M::Connection>>, Entry<M::Connection>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Close this connection instead of returning it (after a fatal error).
    pub async fn invalidate(mut self) {
        self.guard.poisoned = true;
        let key = self.key.clone();
        let slot = self.slot.clone();
        let shared = self.shared.clone();
        drop(self);

        let entry = {
            let mut guard = slot.lock().await;
            match guard.as_ref() {
                Some(e) if e.poisoned => guard.take(),
                _ => None,
            }
        };
        if let Some(entry) = entry {
            warn!("pool: dropping broken connection {}", key);
            shared.close_entry(&key, entry).await;
        }
        drop(slot);
        shared.prune();
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.guard.conn
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard.conn
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if !self.guard.poisoned {
            self.guard.last_used = Instant::now();
        }
    }
}
