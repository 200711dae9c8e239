//! CRUD over one entity type, either loaning a connection per call or
//! holding one pinned connection for a transaction.

use std::marker::PhantomData;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::{debug, error};

use crate::connection::CachedConnection;
use crate::descriptor::describe;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::mapper::read_row;
use crate::pool::{ConnectionPool, PooledConnection};
use crate::value::Value;

enum Mode {
    Pooled,
    Pinned(PooledConnection),
    Closed,
}

pub struct Executor<T: Entity> {
    pool: Arc<ConnectionPool>,
    mode: Mode,
    generated_key: Option<i64>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Executor<T> {
    /// An executor that loans a connection from `pool` for each operation.
    pub fn new(pool: &Arc<ConnectionPool>) -> Self {
        Self::with_mode(pool, Mode::Pooled)
    }

    fn with_mode(pool: &Arc<ConnectionPool>, mode: Mode) -> Self {
        Self {
            pool: Arc::clone(pool),
            mode,
            generated_key: None,
            _entity: PhantomData,
        }
    }

    /// Key assigned by the database to the most recent [`Self::insert`].
    pub fn generated_key(&self) -> Option<i64> {
        self.generated_key
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.mode, Mode::Closed)
    }

    /// Runs `sql` and maps every row to a fresh `T`.
    pub fn select(&mut self, sql: &str, params: &[Value]) -> Result<Vec<T>> {
        self.run("select", |conn| {
            debug!(sql, "select");
            let statement = conn.prepare(sql, false)?;
            conn.query(&statement, params, |row| {
                let mut entity = T::default();
                read_row(&mut entity, row)?;
                Ok(entity)
            })
        })
    }

    pub fn find_by_id(&mut self, id: impl Into<Value>) -> Result<Option<T>> {
        let sql = describe::<T>()?.select_by_id_sql()?;
        let rows = self.select(&sql, &[id.into()])?;
        Ok(rows.into_iter().next())
    }

    /// Inserts one entity and records the generated key.
    pub fn insert(&mut self, entity: &T) -> Result<()> {
        let key = self.run("insert", |conn| {
            let descriptor = describe::<T>()?;
            let sql = descriptor.insert_sql();
            let params = descriptor.sql_params(entity, false, &[])?;
            debug!(sql = %sql, "insert");
            let statement = conn.prepare(&sql, true)?;
            expect_one("insert", conn.execute(&statement, &params)?)?;
            Ok(conn.generated_key(&statement))
        })?;
        self.generated_key = key;
        Ok(())
    }

    /// Inserts every entity with one statement; returns per-row counts.
    pub fn insert_batch(&mut self, entities: &[T]) -> Result<Vec<usize>> {
        self.run("insert batch", |conn| {
            let descriptor = describe::<T>()?;
            let sql = descriptor.insert_sql();
            let batch = entities
                .iter()
                .map(|entity| descriptor.sql_params(entity, false, &[]))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            debug!(sql = %sql, rows = batch.len(), "insert batch");
            let statement = conn.prepare(&sql, false)?;
            Ok(conn.execute_batch(&statement, batch)?)
        })
    }

    pub fn update(&mut self, entity: &T) -> Result<()> {
        self.update_where(entity, "", &[])
    }

    /// Updates by identity, AND-ing `constraint` onto the WHERE clause and
    /// binding `tail` after the identity value.
    pub fn update_where(&mut self, entity: &T, constraint: &str, tail: &[Value]) -> Result<()> {
        self.run("update", |conn| {
            let descriptor = describe::<T>()?;
            let sql = descriptor.update_sql(Some(constraint))?;
            let params = descriptor.sql_params(entity, true, tail)?;
            debug!(sql = %sql, "update");
            let statement = conn.prepare(&sql, false)?;
            expect_one("update", conn.execute(&statement, &params)?)
        })
    }

    pub fn delete(&mut self, entity: &T) -> Result<()> {
        self.run("delete", |conn| {
            let descriptor = describe::<T>()?;
            let sql = descriptor.delete_sql()?;
            let params = descriptor.id_params(entity)?;
            debug!(sql = %sql, "delete");
            let statement = conn.prepare(&sql, false)?;
            expect_one("delete", conn.execute(&statement, &params)?)
        })
    }

    /// Raw passthrough; returns the affected-row count.
    pub fn execute_update(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        self.run("execute update", |conn| {
            debug!(sql, "execute update");
            let statement = conn.prepare(sql, false)?;
            Ok(conn.execute(&statement, params)?)
        })
    }

    fn run<R>(
        &mut self,
        operation: &'static str,
        body: impl FnOnce(&mut CachedConnection) -> Result<R>,
    ) -> Result<R> {
        let result = match &mut self.mode {
            Mode::Pinned(conn) => {
                let result = body(&mut **conn);
                match conn.resume_transaction() {
                    Ok(false) => result,
                    Ok(true) => Err(Error::RolledBack {
                        operation,
                        source: result.err().map(Box::new),
                    }),
                    Err(err) => Err(err.into()),
                }
            }
            Mode::Pooled => self
                .pool
                .acquire()
                .and_then(|mut conn| body(&mut *conn)),
            Mode::Closed => Err(Error::Closed),
        };
        if let Err(err) = &result {
            error!(operation, error = %err, "database operation failed");
        }
        result
    }
}

fn expect_one(operation: &'static str, count: usize) -> Result<()> {
    if count == 1 {
        Ok(())
    } else {
        Err(Error::RowCount { operation, count })
    }
}

/// An [`Executor`] pinned to one connection with auto-commit disabled.
///
/// Dropping it closes it: uncommitted work is rolled back and the
/// connection goes back to the pool.
pub struct TransactionExecutor<T: Entity> {
    inner: Executor<T>,
}

impl<T: Entity> TransactionExecutor<T> {
    pub fn begin(pool: &Arc<ConnectionPool>) -> Result<Self> {
        let mut conn = pool.acquire()?;
        conn.set_auto_commit(false)?;
        Ok(Self {
            inner: Executor::with_mode(pool, Mode::Pinned(conn)),
        })
    }

    pub fn commit(&mut self) -> Result<()> {
        self.inner.run("commit", |conn| Ok(conn.commit()?))
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.inner.run("rollback", |conn| Ok(conn.rollback()?))
    }

    /// Returns the pinned connection to the pool. Safe to call repeatedly.
    ///
    /// Uncommitted work is discarded; call [`Self::commit`] first to keep it.
    pub fn close(&mut self) -> Result<()> {
        let Mode::Pinned(mut conn) = mem::replace(&mut self.inner.mode, Mode::Closed) else {
            return Ok(());
        };
        let restored = conn.rollback().and_then(|()| conn.set_auto_commit(true));
        match restored {
            Ok(()) => {
                conn.release();
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "restoring auto-commit failed, discarding connection");
                conn.discard();
                Err(err.into())
            }
        }
    }
}

impl<T: Entity> Deref for TransactionExecutor<T> {
    type Target = Executor<T>;

    fn deref(&self) -> &Executor<T> {
        &self.inner
    }
}

impl<T: Entity> DerefMut for TransactionExecutor<T> {
    fn deref_mut(&mut self) -> &mut Executor<T> {
        &mut self.inner
    }
}

impl<T: Entity> Drop for TransactionExecutor<T> {
    fn drop(&mut self) {
        // Failures are already logged by close.
        let _ = self.close();
    }
}
