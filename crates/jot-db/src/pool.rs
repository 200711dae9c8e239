//! Bounded pool of cached connections.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::connection::CachedConnection;
use crate::driver::{Driver, ProbeUnsupported, default_driver, lookup_driver};
use crate::error::{Error, Result};

/// Timeout hint passed to the driver's liveness probe.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(1);

fn default_max_size() -> usize {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct PoolConfig {
    pub url: String,
    /// Registered driver name; the SQLite driver when unset.
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            driver: None,
            max_size: default_max_size(),
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

struct PoolState {
    idle: VecDeque<CachedConnection>,
    issued: usize,
    driver: Option<Arc<dyn Driver>>,
}

impl PoolState {
    fn release_slot(&mut self) {
        match self.issued.checked_sub(1) {
            Some(issued) => self.issued = issued,
            None => error!("pool slot released with no connection issued"),
        }
    }
}

/// A bounded FIFO pool. `issued` counts open connections, loaned or idle,
/// and never exceeds `max_size`.
pub struct ConnectionPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    has_is_valid: AtomicBool,
}

/// A loaned connection that returns to the pool on drop.
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    conn: Option<CachedConnection>,
}

impl ConnectionPool {
    /// Creates a pool whose driver is resolved by name on first acquisition.
    pub fn new(config: PoolConfig) -> Result<Arc<Self>> {
        Self::build(config, None)
    }

    /// Creates a pool that uses `driver` regardless of the configured name.
    pub fn with_driver(config: PoolConfig, driver: Arc<dyn Driver>) -> Result<Arc<Self>> {
        Self::build(config, Some(driver))
    }

    fn build(config: PoolConfig, driver: Option<Arc<dyn Driver>>) -> Result<Arc<Self>> {
        if config.max_size < 1 {
            return Err(Error::InvalidPoolSize(config.max_size));
        }
        Ok(Arc::new(Self {
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                issued: 0,
                driver,
            }),
            available: Condvar::new(),
            has_is_valid: AtomicBool::new(true),
        }))
    }

    /// Loans a connection, blocking while the pool is saturated.
    ///
    /// Idle connections are revalidated first; ones that fail are closed
    /// and their slot is freed.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledConnection> {
        let mut state = self.state.lock();
        loop {
            while let Some(conn) = state.idle.pop_front() {
                if self.revalidate(&conn) {
                    return Ok(PooledConnection::new(self, conn));
                }
                state.release_slot();
                warn!(url = %self.config.url, "discarding connection that failed revalidation");
                if let Err(err) = conn.close() {
                    debug!(error = %err, "closing invalid connection failed");
                }
            }
            if state.issued < self.config.max_size {
                break;
            }
            self.available.wait(&mut state);
        }

        let driver = match &state.driver {
            Some(driver) => Arc::clone(driver),
            None => {
                let driver = self.resolve_driver()?;
                state.driver = Some(Arc::clone(&driver));
                driver
            }
        };
        state.issued += 1;
        let issued = state.issued;
        drop(state);

        match driver.connect(&self.config.url) {
            Ok(conn) => {
                debug!(url = %self.config.url, driver = driver.name(), issued, "opened connection");
                Ok(PooledConnection::new(self, CachedConnection::new(conn, driver)))
            }
            Err(err) => {
                let mut state = self.state.lock();
                state.release_slot();
                self.available.notify_one();
                Err(err.into())
            }
        }
    }

    fn resolve_driver(&self) -> Result<Arc<dyn Driver>> {
        match &self.config.driver {
            None => Ok(default_driver()),
            Some(name) => lookup_driver(name).ok_or_else(|| Error::DriverNotFound(name.clone())),
        }
    }

    fn revalidate(&self, conn: &CachedConnection) -> bool {
        if self.has_is_valid.load(Ordering::SeqCst) {
            match conn.is_valid(VALIDATION_TIMEOUT) {
                Ok(valid) => return valid,
                Err(ProbeUnsupported) => {
                    self.has_is_valid.store(false, Ordering::SeqCst);
                    debug!("driver has no liveness probe, validating with select 1");
                }
            }
        }
        conn.ping().is_ok()
    }

    /// Returns `conn` to the tail of the idle queue and wakes all waiters.
    /// Only connections loaned by this pool may come back through here.
    pub(crate) fn release(&self, conn: CachedConnection) {
        let mut state = self.state.lock();
        state.idle.push_back(conn);
        self.available.notify_all();
    }

    fn discard(&self, conn: CachedConnection) {
        if let Err(err) = conn.close() {
            debug!(error = %err, "closing discarded connection failed");
        }
        let mut state = self.state.lock();
        state.release_slot();
        self.available.notify_one();
    }

    pub fn issued(&self) -> usize {
        self.state.lock().issued
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl PooledConnection {
    fn new(pool: &Arc<ConnectionPool>, conn: CachedConnection) -> Self {
        Self {
            pool: Arc::clone(pool),
            conn: Some(conn),
        }
    }

    /// Returns the connection to its pool. Dropping does the same.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }

    /// Closes the connection instead of returning it, freeing its slot.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard(conn);
        }
    }
}

impl Deref for PooledConnection {
    type Target = CachedConnection;

    fn deref(&self) -> &CachedConnection {
        self.conn
            .as_ref()
            .expect("pooled connection missing (already released)")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut CachedConnection {
        self.conn
            .as_mut()
            .expect("pooled connection missing (already released)")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
