//! Database drivers and the process-wide driver registry.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rusqlite::{Connection, OpenFlags};

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Capacity of the per-connection compiled statement cache.
pub(crate) const STATEMENT_CACHE_CAPACITY: usize = 256;

pub const SQLITE_DRIVER: &str = "sqlite";

/// Returned by drivers that have no native liveness probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeUnsupported;

/// Opens sessions for a connection URL.
pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    fn connect(&self, url: &str) -> rusqlite::Result<Connection>;

    /// Native liveness probe with a timeout hint.
    fn is_valid(&self, _conn: &Connection, _timeout: Duration) -> Result<bool, ProbeUnsupported> {
        Err(ProbeUnsupported)
    }
}

/// File or in-memory SQLite through rusqlite.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteDriver;

impl SqliteDriver {
    fn target(url: &str) -> &str {
        let url = url.strip_prefix("jdbc:").unwrap_or(url);
        url.strip_prefix("sqlite:").unwrap_or(url)
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        SQLITE_DRIVER
    }

    fn connect(&self, url: &str) -> rusqlite::Result<Connection> {
        let target = Self::target(url);
        let conn = if target == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            Connection::open_with_flags(Path::new(target), flags)?
        };
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        Ok(conn)
    }
}

static DRIVERS: Lazy<RwLock<HashMap<String, Arc<dyn Driver>>>> = Lazy::new(|| {
    let mut drivers: HashMap<String, Arc<dyn Driver>> = HashMap::new();
    drivers.insert(SQLITE_DRIVER.to_string(), Arc::new(SqliteDriver));
    RwLock::new(drivers)
});

/// Makes `driver` loadable by name from [`crate::PoolConfig::driver`].
pub fn register_driver(driver: Arc<dyn Driver>) {
    DRIVERS.write().insert(driver.name().to_string(), driver);
}

pub(crate) fn lookup_driver(name: &str) -> Option<Arc<dyn Driver>> {
    DRIVERS.read().get(name).cloned()
}

pub(crate) fn default_driver() -> Arc<dyn Driver> {
    Arc::new(SqliteDriver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_forms() {
        assert_eq!(SqliteDriver::target("sqlite::memory:"), ":memory:");
        assert_eq!(SqliteDriver::target("jdbc:sqlite:/tmp/a.db"), "/tmp/a.db");
        assert_eq!(SqliteDriver::target("/tmp/b.db"), "/tmp/b.db");
    }

    #[test]
    fn sqlite_is_registered() {
        let driver = lookup_driver(SQLITE_DRIVER).unwrap();
        let conn = driver.connect("sqlite::memory:").unwrap();
        assert_eq!(driver.is_valid(&conn, Duration::from_secs(1)), Err(ProbeUnsupported));
        assert!(lookup_driver("oracle").is_none());
    }
}
