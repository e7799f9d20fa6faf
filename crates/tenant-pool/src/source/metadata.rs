//! Pass-through metadata storage: login timeout and log writer.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

/// A shared sink for pool diagnostics.
pub type LogWriter = Arc<Mutex<dyn Write + Send>>;

/// Holds an optional [`LogWriter`].
#[derive(Default)]
pub struct LogWriterSlot {
    writer: RwLock<Option<LogWriter>>,
}

impl std::fmt::Debug for LogWriterSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriterSlot")
            .field("is_set", &self.writer.read().is_some())
            .finish()
    }
}

impl LogWriterSlot {
    /// Returns the current writer.
    pub fn get(&self) -> Option<LogWriter> {
        self.writer.read().clone()
    }

    /// Replaces the current writer.
    pub fn set(&self, writer: Option<LogWriter>) {
        *self.writer.write() = writer;
    }

    /// Writes one line to the writer, if set. Write failures are ignored.
    pub fn write_line(&self, message: &str) {
        if let Some(writer) = self.get() {
            let mut out = writer.lock();
            let _ = writeln!(out, "{}", message);
        }
    }
}

/// Acquisition wait limit, adjustable while the pool is shared.
#[derive(Debug)]
pub struct LoginTimeout {
    millis: AtomicU64,
}

impl LoginTimeout {
    /// Creates a timeout holder.
    pub fn new(timeout: Duration) -> Self {
        Self {
            millis: AtomicU64::new(timeout.as_millis() as u64),
        }
    }

    /// Returns the current timeout.
    pub fn get(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }

    /// Sets the timeout.
    pub fn set(&self, timeout: Duration) {
        self.millis
            .store(timeout.as_millis() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_writer_slot() {
        let slot = LogWriterSlot::default();
        slot.write_line("dropped: no writer");
        assert!(slot.get().is_none());

        let buffer = Arc::new(Mutex::new(Vec::<u8>::new()));
        slot.set(Some(buffer.clone()));
        slot.write_line("pool exhausted");
        assert_eq!(String::from_utf8_lossy(&buffer.lock()), "pool exhausted\n");

        slot.set(None);
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_login_timeout() {
        let timeout = LoginTimeout::new(Duration::from_secs(30));
        assert_eq!(timeout.get(), Duration::from_secs(30));
        timeout.set(Duration::from_millis(250));
        assert_eq!(timeout.get(), Duration::from_millis(250));
    }
}
