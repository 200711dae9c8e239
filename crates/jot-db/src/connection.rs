//! A database session that memoizes its prepared statements.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, Row, params_from_iter};

use crate::driver::{Driver, ProbeUnsupported, STATEMENT_CACHE_CAPACITY};
use crate::value::Value;

/// Handle for a statement prepared on one [`CachedConnection`].
///
/// The compiled SQLite statement stays in the connection's statement cache
/// for as long as the connection is open; the cache grows with the number
/// of prepared statements.
#[derive(Debug)]
pub struct PreparedStatement {
    sql: String,
    generated_keys: bool,
    parameter_count: usize,
    columns: Vec<String>,
}

impl PreparedStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn wants_generated_keys(&self) -> bool {
        self.generated_keys
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// One live session plus its prepared statements. Not for concurrent use;
/// the pool hands each connection to one holder at a time.
pub struct CachedConnection {
    conn: Connection,
    driver: Arc<dyn Driver>,
    statements: HashMap<(String, bool), Arc<PreparedStatement>>,
    cache_capacity: usize,
    auto_commit: bool,
}

impl CachedConnection {
    pub fn new(conn: Connection, driver: Arc<dyn Driver>) -> Self {
        conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
        Self {
            conn,
            driver,
            statements: HashMap::new(),
            cache_capacity: STATEMENT_CACHE_CAPACITY,
            auto_commit: true,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns the statement prepared for `(sql, generated_keys)`,
    /// compiling it on first use. Statements are never evicted.
    pub fn prepare(
        &mut self,
        sql: &str,
        generated_keys: bool,
    ) -> rusqlite::Result<Arc<PreparedStatement>> {
        let key = (sql.to_string(), generated_keys);
        if let Some(statement) = self.statements.get(&key) {
            return Ok(Arc::clone(statement));
        }
        self.reserve_compiled_slot();
        let compiled = self.conn.prepare_cached(sql)?;
        let statement = Arc::new(PreparedStatement {
            sql: sql.to_string(),
            generated_keys,
            parameter_count: compiled.parameter_count(),
            columns: compiled
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        });
        drop(compiled);
        self.statements.insert(key, Arc::clone(&statement));
        Ok(statement)
    }

    // One slot per memoized statement plus the new one and the ping query,
    // so the LRU never drops a compiled statement.
    fn reserve_compiled_slot(&mut self) {
        let needed = self.statements.len() + 2;
        if needed > self.cache_capacity {
            self.cache_capacity = needed.max(self.cache_capacity * 2);
            self.conn
                .set_prepared_statement_cache_capacity(self.cache_capacity);
        }
    }

    pub fn prepared_count(&self) -> usize {
        self.statements.len()
    }

    /// Capacity of the compiled statement cache behind [`Self::prepare`].
    pub fn statement_cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    /// Runs a query and maps every row. The cursor is closed before
    /// returning, also on failure.
    pub fn query<T, E, F>(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
        mut map_row: F,
    ) -> Result<Vec<T>, E>
    where
        F: FnMut(&Row<'_>) -> Result<T, E>,
        E: From<rusqlite::Error>,
    {
        let mut compiled = self.conn.prepare_cached(&statement.sql)?;
        let mut rows = compiled.query(params_from_iter(params))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(map_row(row)?);
        }
        Ok(result)
    }

    /// Executes a mutating statement and returns the affected-row count.
    pub fn execute(&self, statement: &PreparedStatement, params: &[Value]) -> rusqlite::Result<usize> {
        let mut compiled = self.conn.prepare_cached(&statement.sql)?;
        compiled.execute(params_from_iter(params))
    }

    /// Executes `statement` once per parameter set.
    pub fn execute_batch<I>(&self, statement: &PreparedStatement, batch: I) -> rusqlite::Result<Vec<usize>>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let mut compiled = self.conn.prepare_cached(&statement.sql)?;
        batch
            .into_iter()
            .map(|params| compiled.execute(params_from_iter(&params)))
            .collect()
    }

    /// Key generated by the most recent insert, for statements prepared
    /// with `generated_keys`.
    pub fn generated_key(&self, statement: &PreparedStatement) -> Option<i64> {
        statement
            .generated_keys
            .then(|| self.conn.last_insert_rowid())
    }

    /// Driver liveness probe.
    pub fn is_valid(&self, timeout: Duration) -> Result<bool, ProbeUnsupported> {
        self.driver.is_valid(&self.conn, timeout)
    }

    /// Round-trips `select 1`.
    pub fn ping(&self) -> rusqlite::Result<()> {
        let mut compiled = self.conn.prepare_cached("select 1")?;
        compiled.query_row([], |row| row.get::<_, i64>(0)).map(|_| ())
    }

    pub fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Disabling auto-commit opens a transaction; enabling it commits any
    /// pending work.
    pub fn set_auto_commit(&mut self, enabled: bool) -> rusqlite::Result<()> {
        if enabled == self.auto_commit {
            return Ok(());
        }
        if enabled {
            if !self.conn.is_autocommit() {
                self.conn.execute_batch("COMMIT")?;
            }
        } else {
            self.conn.execute_batch("BEGIN")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    /// Commits pending work and starts the next transaction. No-op in
    /// auto-commit mode.
    pub fn commit(&mut self) -> rusqlite::Result<()> {
        if self.auto_commit {
            return Ok(());
        }
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.conn.execute_batch("BEGIN")
    }

    /// Discards pending work and starts the next transaction. No-op in
    /// auto-commit mode.
    pub fn rollback(&mut self) -> rusqlite::Result<()> {
        if self.auto_commit {
            return Ok(());
        }
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        self.conn.execute_batch("BEGIN")
    }

    /// Reopens the transaction if SQLite ended it on its own, as a
    /// `RAISE(ROLLBACK)` trigger or an I/O failure does. Returns whether
    /// that happened.
    pub fn resume_transaction(&mut self) -> rusqlite::Result<bool> {
        if self.auto_commit || !self.conn.is_autocommit() {
            return Ok(false);
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(true)
    }

    /// Closes the session; its prepared statements go with it.
    pub fn close(self) -> rusqlite::Result<()> {
        self.conn.close().map_err(|(_, err)| err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SqliteDriver;

    fn open() -> CachedConnection {
        let driver = Arc::new(SqliteDriver);
        let conn = driver.connect("sqlite::memory:").unwrap();
        let cached = CachedConnection::new(conn, driver);
        cached
            .connection()
            .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, body TEXT)")
            .unwrap();
        cached
    }

    #[test]
    fn prepare_is_memoized() {
        let mut conn = open();
        let first = conn.prepare("SELECT body FROM notes", false).unwrap();
        let second = conn.prepare("SELECT body FROM notes", false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.columns().to_vec(), vec!["body".to_string()]);
        assert_eq!(conn.prepared_count(), 1);
    }

    #[test]
    fn generated_keys_flag_is_part_of_the_key() {
        let mut conn = open();
        let sql = "INSERT INTO notes (body) VALUES (?)";
        let plain = conn.prepare(sql, false).unwrap();
        let keyed = conn.prepare(sql, true).unwrap();
        assert!(!Arc::ptr_eq(&plain, &keyed));
        assert_eq!(keyed.parameter_count(), 1);

        assert_eq!(conn.execute(&keyed, &[Value::from("a")]).unwrap(), 1);
        assert_eq!(conn.generated_key(&keyed), Some(1));
        assert_eq!(conn.generated_key(&plain), None);
    }

    #[test]
    fn compiled_cache_outgrows_the_memo() {
        let mut conn = open();
        let sqls: Vec<String> = (0..300)
            .map(|i| format!("SELECT body, {i} AS n FROM notes"))
            .collect();
        for sql in &sqls {
            conn.prepare(sql, false).unwrap();
        }
        assert_eq!(conn.prepared_count(), 300);
        assert!(conn.statement_cache_capacity() > conn.prepared_count());

        // Every statement is still compiled and runnable.
        let first = conn.prepare(&sqls[0], false).unwrap();
        assert!(conn.query(&first, &[], |row| row.get::<_, i64>(1)).unwrap().is_empty());
        assert!(conn.ping().is_ok());
    }

    #[test]
    fn syntax_errors_surface_at_prepare() {
        let mut conn = open();
        assert!(conn.prepare("SELEKT nothing", false).is_err());
    }

    #[test]
    fn rollback_discards_pending_work() {
        let mut conn = open();
        let insert = conn.prepare("INSERT INTO notes (body) VALUES (?)", false).unwrap();
        let count = conn.prepare("SELECT count(*) AS n FROM notes", false).unwrap();

        conn.set_auto_commit(false).unwrap();
        conn.execute(&insert, &[Value::from("draft")]).unwrap();
        conn.rollback().unwrap();
        conn.execute(&insert, &[Value::from("kept")]).unwrap();
        conn.set_auto_commit(true).unwrap();

        let n: Vec<i64> = conn
            .query(&count, &[], |row| row.get::<_, i64>(0))
            .unwrap();
        assert_eq!(n, vec![1]);
        assert!(conn.connection().is_autocommit());
    }

    #[test]
    fn ping_and_probe() {
        let conn = open();
        assert!(conn.ping().is_ok());
        assert_eq!(conn.is_valid(Duration::from_secs(1)), Err(ProbeUnsupported));
    }
}
