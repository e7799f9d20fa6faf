//! SQLite connection sources.
//!
//! SQLite has no server-side schemas, so each tenant schema is a separate
//! database file attached under the schema name. A connection has no tenant
//! database attached when it is handed out. Setting the schema (or the
//! catalog) attaches that tenant's database and detaches the one attached
//! before, so a tagged connection can reach only `main` and its own tenant
//! database. Names that are not configured are rejected.
//!
//! Unqualified `CREATE` statements always land in `main`; use
//! [`SqliteConnection::qualify`] for tenant tables. Unqualified reads fall
//! through to the attached tenant database when `main` has no such table.
//!
//! Two sources are provided:
//!
//! - [`SqlitePool`] - an r2d2 pool; can be shut down
//! - [`SqliteDirectSource`] - opens a fresh connection per acquisition and has
//!   nothing to shut down
//!
//! # Example
//!
//! ```no_run
//! use helios_tenant_pool::backends::sqlite::{SqlitePool, SqlitePoolConfig};
//! use helios_tenant_pool::source::{ConnectionSource, TenantConnection};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SqlitePool::new(
//!     SqlitePoolConfig::file("shared.db").with_attached("schema_acme", "acme.db"),
//! )?;
//!
//! let mut conn = pool.acquire().await?;
//! conn.set_schema("schema_acme").await?;
//! conn.execute_batch(&format!("CREATE TABLE {} (id TEXT)", conn.qualify("patients")))?;
//! # Ok(())
//! # }
//! ```

mod direct;
mod pool;

pub use direct::SqliteDirectSource;
pub use pool::{AttachedDatabase, SqlitePool, SqlitePoolConfig};

use std::fmt::Debug;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::debug;

use crate::error::{ConnectionError, ConnectionResult};
use crate::source::TenantConnection;
use crate::strategy::{SchemaScope, escape_identifier};

enum Handle {
    Pooled(PooledConnection<SqliteConnectionManager>),
    Direct(Connection),
}

/// A SQLite connection tagged with its tenant schema.
///
/// Dereferences to the underlying [`rusqlite::Connection`]. Pooled
/// connections go back to their pool when dropped.
pub struct SqliteConnection {
    handle: Handle,
    databases: Arc<[AttachedDatabase]>,
    attached: Option<String>,
    schema: Option<String>,
    catalog: Option<String>,
}

impl Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("pooled", &matches!(self.handle, Handle::Pooled(_)))
            .field("attached", &self.attached)
            .field("schema", &self.schema)
            .field("catalog", &self.catalog)
            .finish()
    }
}

impl SqliteConnection {
    /// Wraps a pooled connection, detaching whatever tenant database the
    /// previous holder left attached.
    pub(crate) fn pooled(
        conn: PooledConnection<SqliteConnectionManager>,
        databases: Arc<[AttachedDatabase]>,
    ) -> rusqlite::Result<Self> {
        let conn = Self::new(Handle::Pooled(conn), databases);
        conn.detach_tenant_databases()?;
        Ok(conn)
    }

    pub(crate) fn direct(conn: Connection, databases: Arc<[AttachedDatabase]>) -> Self {
        Self::new(Handle::Direct(conn), databases)
    }

    fn new(handle: Handle, databases: Arc<[AttachedDatabase]>) -> Self {
        Self {
            handle,
            databases,
            attached: None,
            schema: None,
            catalog: None,
        }
    }

    /// Returns `table` qualified with the active schema, if one is set.
    pub fn qualify(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", escape_identifier(schema), escape_identifier(table)),
            None => escape_identifier(table),
        }
    }

    /// Returns the names of all databases visible on this connection.
    pub fn database_names(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.prepare("PRAGMA database_list")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Returns the tenant database currently attached, if any.
    pub fn attached_database(&self) -> Option<&str> {
        self.attached.as_deref()
    }

    fn detach_tenant_databases(&self) -> rusqlite::Result<()> {
        if !self.is_autocommit() {
            // DETACH is refused inside a transaction.
            self.execute_batch("ROLLBACK")?;
        }

        let names = self.database_names()?;
        for db in self.databases.iter().filter(|db| names.contains(&db.name)) {
            debug!(database = %db.name, "Detaching leftover tenant database");
            self.execute_batch(&format!("DETACH DATABASE {}", escape_identifier(&db.name)))?;
        }
        Ok(())
    }

    /// Makes `name` the only attached tenant database.
    fn attach_tenant(&mut self, scope: SchemaScope, name: &str) -> ConnectionResult<()> {
        let path = self
            .databases
            .iter()
            .find(|db| db.name == name)
            .map(|db| db.path.clone())
            .ok_or_else(|| {
                ConnectionError::schema_application(scope, name, "no database configured under that name")
            })?;

        if self.attached.as_deref() == Some(name) {
            return Ok(());
        }

        if let Some(previous) = self.attached.clone() {
            self.execute_batch(&format!("DETACH DATABASE {}", escape_identifier(&previous)))
                .map_err(|e| driver_error(scope, name, "failed to detach previous tenant database", e))?;
            self.attached = None;
            self.schema = None;
            self.catalog = None;
        }

        self.execute(
            &format!("ATTACH DATABASE ?1 AS {}", escape_identifier(name)),
            [path.as_str()],
        )
        .map_err(|e| driver_error(scope, name, "failed to attach tenant database", e))?;
        self.attached = Some(name.to_string());
        Ok(())
    }
}

fn driver_error(scope: SchemaScope, name: &str, context: &str, e: rusqlite::Error) -> ConnectionError {
    ConnectionError::SchemaApplication {
        scope,
        name: name.to_string(),
        message: format!("{}: {}", context, e),
        source: Some(Box::new(e)),
    }
}

impl Deref for SqliteConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.handle {
            Handle::Pooled(conn) => &**conn,
            Handle::Direct(conn) => conn,
        }
    }
}

impl DerefMut for SqliteConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.handle {
            Handle::Pooled(conn) => &mut **conn,
            Handle::Direct(conn) => conn,
        }
    }
}

/// Schema and catalog both name the attached tenant database, so setting one
/// to a different database clears the other.
#[async_trait]
impl TenantConnection for SqliteConnection {
    async fn set_schema(&mut self, schema: &str) -> ConnectionResult<()> {
        self.attach_tenant(SchemaScope::Schema, schema)?;
        self.schema = Some(schema.to_string());
        Ok(())
    }

    async fn set_catalog(&mut self, catalog: &str) -> ConnectionResult<()> {
        self.attach_tenant(SchemaScope::Catalog, catalog)?;
        self.catalog = Some(catalog.to_string());
        Ok(())
    }

    fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }
}
