//! Pooled SQLite access with descriptor-driven entity mapping.
//!
//! An [`Entity`] declares its table and fields once through a [`Record`].
//! [`describe`] turns that into a cached [`Descriptor`], which synthesizes
//! CRUD statements and drives the row marshaller. [`Executor`] runs those
//! statements over connections loaned from a [`ConnectionPool`];
//! [`TransactionExecutor`] pins one connection for a transaction.
//!
//! ```no_run
//! use jot_db::{ConnectionPool, Entity, Executor, Field, PoolConfig, Record};
//!
//! #[derive(Default)]
//! struct User {
//!     id: i32,
//!     name: String,
//! }
//!
//! impl Entity for User {
//!     fn record() -> Record {
//!         Record::new("User")
//!             .field(Field::of::<i32>("id").id().id_auto_assign())
//!             .field(Field::of::<String>("name"))
//!     }
//!
//!     jot_db::entity_accessors!(id, name);
//! }
//!
//! # fn main() -> jot_db::Result<()> {
//! let pool = ConnectionPool::new(PoolConfig::new("sqlite:app.db").with_max_size(4))?;
//! let mut users = Executor::<User>::new(&pool);
//! users.insert(&User { id: 0, name: "Alice".into() })?;
//! let id = users.generated_key();
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

mod connection;
mod descriptor;
mod driver;
mod entity;
mod error;
mod executor;
mod mapper;
mod pool;
mod sql;
mod value;

pub use connection::{CachedConnection, PreparedStatement};
pub use descriptor::{DateFormat, Descriptor, FieldInfo, ScalarKind, describe};
pub use driver::{Driver, ProbeUnsupported, SQLITE_DRIVER, SqliteDriver, register_driver};
pub use entity::{Entity, Field, Record};
pub use error::{Error, MapperError, Result};
pub use executor::{Executor, TransactionExecutor};
pub use mapper::{
    CsvSink, ElementSource, read_element, read_json, read_row, to_csv, to_csv_header, to_json,
};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use value::{FromValue, Value};
