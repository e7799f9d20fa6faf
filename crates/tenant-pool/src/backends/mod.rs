//! Concrete connection sources.
//!
//! Each backend is gated behind a feature flag.
//!
//! # Available Backends
//!
//! | Backend | Feature | Schema handling |
//! |---------|---------|-----------------|
//! | SQLite | `sqlite` | Schemas are attached databases |
//! | PostgreSQL | `postgres` | Schemas set through `search_path` |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use helios_tenant_pool::backends::sqlite::{SqlitePool, SqlitePoolConfig};
//!
//! let pool = SqlitePool::new(
//!     SqlitePoolConfig::file("./data/shared.db")
//!         .with_attached("schema_acme", "./data/acme.db")
//!         .with_attached("schema_globex", "./data/globex.db"),
//! )?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;
