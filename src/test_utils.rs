//! Scriptable in-memory driver for exercising the pool and the transaction
//! state machine without a real backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::driver::{DriverAdapter, QueryOutput, RawConnection};
use crate::error::SqlBridgeError;
use crate::types::SqlValue;

/// Shared control surface: scripts connect failures, toggles capability
/// flags, and records everything connections do.
#[derive(Debug, Default)]
pub struct DriverScript {
    connect_failures: Mutex<VecDeque<bool>>,
    can_disable_autocommit: AtomicBool,
    forced_non_idle: Mutex<Option<String>>,
    discard_on_release: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    statements: Mutex<Vec<String>>,
}

impl DriverScript {
    /// Queue `count` connect failures before connects succeed again;
    /// `retryable` is how the adapter will classify them.
    pub fn fail_connects(&self, count: usize, retryable: bool) {
        let mut failures = lock(&self.connect_failures);
        for _ in 0..count {
            failures.push_back(retryable);
        }
    }

    pub fn set_can_disable_autocommit(&self, value: bool) {
        self.can_disable_autocommit.store(value, Ordering::Relaxed);
    }

    /// Force every connection to report this non-idle transaction status.
    pub fn set_forced_non_idle(&self, status: Option<String>) {
        *lock(&self.forced_non_idle) = status;
    }

    pub fn set_discard_on_release(&self, value: bool) {
        self.discard_on_release.store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Relaxed)
    }

    /// Every statement executed across all connections, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        lock(&self.statements).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A [`DriverAdapter`] whose behavior is driven by a [`DriverScript`].
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    script: Arc<DriverScript>,
    dialect: Dialect,
}

impl Default for ScriptedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedDriver {
    #[must_use]
    pub fn new() -> Self {
        let script = DriverScript {
            can_disable_autocommit: AtomicBool::new(true),
            ..DriverScript::default()
        };
        Self {
            script: Arc::new(script),
            dialect: Dialect::sqlite(),
        }
    }

    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// The control surface, shared with every connection this driver opens.
    #[must_use]
    pub fn script(&self) -> Arc<DriverScript> {
        self.script.clone()
    }
}

#[async_trait]
impl DriverAdapter for ScriptedDriver {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn connect(&self) -> Result<Box<dyn RawConnection>, SqlBridgeError> {
        if let Some(retryable) = lock(&self.script.connect_failures).pop_front() {
            return Err(SqlBridgeError::Connect {
                message: "scripted connect failure".into(),
                retryable,
            });
        }
        self.script.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ScriptedConnection {
            script: self.script.clone(),
            autocommit: true,
            in_transaction: false,
            closed: false,
        }))
    }
}

struct ScriptedConnection {
    script: Arc<DriverScript>,
    autocommit: bool,
    in_transaction: bool,
    closed: bool,
}

impl ScriptedConnection {
    fn check_open(&self) -> Result<(), SqlBridgeError> {
        if self.closed {
            return Err(SqlBridgeError::Execution("connection is closed".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RawConnection for ScriptedConnection {
    async fn execute(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
    ) -> Result<QueryOutput, SqlBridgeError> {
        self.check_open()?;
        lock(&self.script.statements).push(sql.to_string());
        if sql.eq_ignore_ascii_case("BEGIN") || !self.autocommit {
            self.in_transaction = true;
        }
        Ok(QueryOutput::rows_affected_only(0))
    }

    async fn commit(&mut self) -> Result<(), SqlBridgeError> {
        self.check_open()?;
        lock(&self.script.statements).push("COMMIT".to_string());
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlBridgeError> {
        self.check_open()?;
        lock(&self.script.statements).push("ROLLBACK".to_string());
        self.in_transaction = false;
        Ok(())
    }

    fn autocommit(&self) -> bool {
        self.autocommit
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), SqlBridgeError> {
        self.check_open()?;
        self.autocommit = enabled;
        if enabled {
            self.in_transaction = false;
        }
        Ok(())
    }

    fn can_disable_autocommit_now(&self) -> bool {
        self.script.can_disable_autocommit.load(Ordering::Relaxed)
    }

    fn non_idle_transaction_status(&self) -> Option<String> {
        if let Some(status) = lock(&self.script.forced_non_idle).clone() {
            return Some(status);
        }
        self.in_transaction.then(|| "idle in transaction".to_string())
    }

    fn must_discard_on_release(&self) -> bool {
        self.script.discard_on_release.load(Ordering::Relaxed)
    }

    async fn close(&mut self) -> Result<(), SqlBridgeError> {
        if !self.closed {
            self.closed = true;
            self.script.closes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
