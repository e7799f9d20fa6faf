//! An in-process pool that records what happens to its connections.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use helios_tenant_pool::error::{ConnectionError, ConnectionResult, PoolError};
use helios_tenant_pool::source::{
    ConnectionSource, LogWriter, LogWriterSlot, LoginTimeout, ManagedPool, TenantConnection,
};
use helios_tenant_pool::strategy::SchemaScope;

/// Counters and knobs shared between a [`FakePool`] and its connections.
#[derive(Debug, Default)]
pub struct FakePoolState {
    pub acquired: AtomicUsize,
    pub outstanding: AtomicUsize,
    pub credential_acquisitions: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub fail_acquire: AtomicBool,
    pub known_schemas: Mutex<HashSet<String>>,
    pub apply_delay: Mutex<Option<Duration>>,
}

/// A pool whose connections accept only a known set of schema names.
#[derive(Debug)]
pub struct FakePool {
    name: String,
    managed: bool,
    state: Arc<FakePoolState>,
    login_timeout: LoginTimeout,
    log_writer: LogWriterSlot,
}

impl FakePool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            managed: true,
            state: Arc::new(FakePoolState::default()),
            login_timeout: LoginTimeout::new(Duration::from_secs(30)),
            log_writer: LogWriterSlot::default(),
        }
    }

    /// Connections accept these schema and catalog names.
    pub fn with_schemas(self, schemas: &[&str]) -> Self {
        self.state
            .known_schemas
            .lock()
            .extend(schemas.iter().map(|s| s.to_string()));
        self
    }

    /// The pool reports no managed resources, like a plain driver data source.
    pub fn non_managed(mut self) -> Self {
        self.managed = false;
        self
    }

    pub fn state(&self) -> Arc<FakePoolState> {
        self.state.clone()
    }

    pub fn outstanding(&self) -> usize {
        self.state.outstanding.load(Ordering::SeqCst)
    }

    pub fn acquired(&self) -> usize {
        self.state.acquired.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        self.state.fail_acquire.store(fail, Ordering::SeqCst);
    }

    pub fn set_apply_delay(&self, delay: Duration) {
        *self.state.apply_delay.lock() = Some(delay);
    }

    fn checkout(&self) -> ConnectionResult<FakeConnection> {
        if self.state.fail_acquire.load(Ordering::SeqCst) {
            self.log_writer
                .write_line(&format!("{}: checkout failed", self.name));
            return Err(PoolError::Exhausted {
                pool_name: self.name.clone(),
                timeout_ms: self.login_timeout.get().as_millis() as u64,
            }
            .into());
        }
        let id = self.state.acquired.fetch_add(1, Ordering::SeqCst);
        self.state.outstanding.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection {
            id,
            pool_name: self.name.clone(),
            state: self.state.clone(),
            schema: None,
            catalog: None,
        })
    }
}

#[async_trait]
impl ConnectionSource for FakePool {
    type Connection = FakeConnection;

    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self) -> ConnectionResult<FakeConnection> {
        self.checkout()
    }

    async fn acquire_with_credentials(
        &self,
        _user: &str,
        _password: &str,
    ) -> ConnectionResult<FakeConnection> {
        self.state
            .credential_acquisitions
            .fetch_add(1, Ordering::SeqCst);
        self.checkout()
    }

    fn login_timeout(&self) -> Duration {
        self.login_timeout.get()
    }

    fn set_login_timeout(&self, timeout: Duration) {
        self.login_timeout.set(timeout);
    }

    fn log_writer(&self) -> Option<LogWriter> {
        self.log_writer.get()
    }

    fn set_log_writer(&self, writer: Option<LogWriter>) {
        self.log_writer.set(writer);
    }

    fn wrapped(&self) -> &dyn Any {
        self
    }

    fn as_managed(&self) -> Option<&dyn ManagedPool> {
        if self.managed { Some(self) } else { None }
    }
}

impl ManagedPool for FakePool {
    fn shutdown(&self, _deregister_driver: bool) {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.shutdowns() > 0
    }
}

/// A connection from [`FakePool`]; dropping it returns it to the pool.
#[derive(Debug)]
pub struct FakeConnection {
    pub id: usize,
    pub pool_name: String,
    state: Arc<FakePoolState>,
    schema: Option<String>,
    catalog: Option<String>,
}

impl FakeConnection {
    async fn check(&self, scope: SchemaScope, name: &str) -> ConnectionResult<()> {
        let delay = *self.state.apply_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.known_schemas.lock().contains(name) {
            Ok(())
        } else {
            Err(ConnectionError::schema_application(scope, name, "unknown name"))
        }
    }
}

#[async_trait]
impl TenantConnection for FakeConnection {
    async fn set_schema(&mut self, schema: &str) -> ConnectionResult<()> {
        self.check(SchemaScope::Schema, schema).await?;
        self.schema = Some(schema.to_string());
        Ok(())
    }

    async fn set_catalog(&mut self, catalog: &str) -> ConnectionResult<()> {
        self.check(SchemaScope::Catalog, catalog).await?;
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

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.state.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}
