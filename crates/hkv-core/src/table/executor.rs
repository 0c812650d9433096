//! Bounded execution of remote calls.
//!
//! Every call site builds a [`ServerCall`]: a description of the rows it
//! touches plus one boxed attempt. Reads go through [`BoundedExecutor::execute`],
//! which runs the attempt inline or, in pool mode, on a private runtime with a
//! hard deadline. Mutations always run inline.
//!
//! The private pool is a dedicated multi-thread runtime with one worker and a
//! semaphore of `max_threads` permits. Callers wait for a permit instead of
//! queueing work, and that wait counts against the deadline.

use crate::config::{TableConfig, DEFAULT_OPERATION_TIMEOUT_MS};
use crate::{Error, Result};
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Rows a call touches, for logs and errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallScope {
    pub table: String,
    pub start_row: Vec<u8>,
    pub stop_row: Vec<u8>,
}

impl CallScope {
    pub fn new(table: impl Into<String>, start_row: &[u8], stop_row: &[u8]) -> Self {
        Self {
            table: table.into(),
            start_row: start_row.to_vec(),
            stop_row: stop_row.to_vec(),
        }
    }

    /// Scope of a single-row call.
    pub fn row(table: impl Into<String>, row: &[u8]) -> Self {
        Self::new(table, row, row)
    }
}

/// One remote call: its scope and a single attempt.
pub struct ServerCall<T> {
    scope: CallScope,
    attempt: BoxFuture<'static, Result<T>>,
}

impl<T> ServerCall<T> {
    pub fn new<F>(scope: CallScope, attempt: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            scope,
            attempt: Box::pin(attempt),
        }
    }
}

/// Execution pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub operation_timeout_ms: u64,
    /// Explicit pool mode; derived from the timeout when unset
    pub execute_in_pool: Option<bool>,
    pub max_threads: usize,
    pub keep_alive: Duration,
}

impl From<&TableConfig> for ExecutorConfig {
    fn from(config: &TableConfig) -> Self {
        Self {
            operation_timeout_ms: config.operation_timeout_ms,
            execute_in_pool: config.execute_in_pool,
            max_threads: config.max_threads.max(1),
            keep_alive: config.keep_alive(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    timeout_ms: u64,
    in_pool: bool,
}

enum PoolState {
    /// Private runtime not started yet
    Idle,
    Owned(Runtime),
    /// Runtime supplied by the caller; never shut down here
    Shared(Handle),
    Closed,
}

/// Runs server calls inline or on a bounded private pool.
pub struct BoundedExecutor {
    table_name: String,
    config: ExecutorConfig,
    settings: RwLock<Settings>,
    pool: Mutex<PoolState>,
    permits: Arc<Semaphore>,
}

impl BoundedExecutor {
    /// Executor whose private runtime is created on first pooled call.
    pub fn new(table_name: impl Into<String>, config: ExecutorConfig) -> Self {
        Self::with_state(table_name.into(), config, PoolState::Idle)
    }

    /// Executor that schedules pooled calls on a caller-supplied runtime.
    pub fn with_handle(table_name: impl Into<String>, config: ExecutorConfig, handle: Handle) -> Self {
        Self::with_state(table_name.into(), config, PoolState::Shared(handle))
    }

    fn with_state(table_name: String, config: ExecutorConfig, pool: PoolState) -> Self {
        let settings = Settings {
            timeout_ms: config.operation_timeout_ms,
            in_pool: derive_in_pool(config.execute_in_pool, config.operation_timeout_ms),
        };
        Self {
            permits: Arc::new(Semaphore::new(config.max_threads)),
            table_name,
            config,
            settings: RwLock::new(settings),
            pool: Mutex::new(pool),
        }
    }

    pub fn operation_timeout_ms(&self) -> u64 {
        self.settings.read().timeout_ms
    }

    pub fn execute_in_pool(&self) -> bool {
        self.settings.read().in_pool
    }

    /// Change the timeout; pool mode is re-derived unless configured explicitly.
    pub fn set_operation_timeout(&self, timeout_ms: u64) {
        let mut settings = self.settings.write();
        settings.timeout_ms = timeout_ms;
        settings.in_pool = derive_in_pool(self.config.execute_in_pool, timeout_ms);
        debug!(
            table = %self.table_name,
            timeout_ms,
            in_pool = settings.in_pool,
            "Operation timeout updated"
        );
    }

    /// Run a call with the configured bounds.
    pub async fn execute<T>(&self, call: ServerCall<T>) -> Result<T>
    where
        T: Send + 'static,
    {
        let settings = *self.settings.read();
        if !settings.in_pool {
            return self.execute_direct(call).await;
        }

        let handle = self.pool_handle()?;
        let ServerCall { scope, attempt } = call;
        trace!(
            table = %scope.table,
            start_row = ?scope.start_row,
            stop_row = ?scope.stop_row,
            "Submitting call to execution pool"
        );

        let started = Instant::now();
        let timeout = Duration::from_millis(settings.timeout_ms);
        let permits = self.permits.clone();
        let table = self.table_name.clone();

        let pooled = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::PoolShutdown {
                    table: table.clone(),
                })?;
            let mut task = AbortOnDrop(handle.spawn(async move {
                let _permit = permit;
                attempt.await
            }));

            match (&mut task.0).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) if err.is_io() => Err(err),
                Ok(Err(err)) => Err(Error::Execution(Box::new(err))),
                Err(join) if join.is_cancelled() => Err(Error::Interrupted { table }),
                Err(join) => Err(Error::Execution(Box::new(Error::Io(join.into())))),
            }
        };

        match tokio::time::timeout(timeout, pooled).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    table = %self.table_name,
                    timeout_ms = settings.timeout_ms,
                    waited_ms,
                    "Operation timed out, task cancelled"
                );
                Err(Error::OperationTimeout {
                    table: self.table_name.clone(),
                    timeout_ms: settings.timeout_ms,
                    waited_ms,
                })
            }
        }
    }

    /// Run a call inline, without the pool or the deadline.
    pub async fn execute_direct<T>(&self, call: ServerCall<T>) -> Result<T> {
        trace!(
            table = %call.scope.table,
            start_row = ?call.scope.start_row,
            stop_row = ?call.scope.stop_row,
            "Executing call inline"
        );
        call.attempt.await
    }

    fn pool_handle(&self) -> Result<Handle> {
        let mut pool = self.pool.lock();
        match &*pool {
            PoolState::Owned(runtime) => Ok(runtime.handle().clone()),
            PoolState::Shared(handle) => Ok(handle.clone()),
            PoolState::Closed => Err(Error::PoolShutdown {
                table: self.table_name.clone(),
            }),
            PoolState::Idle => {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .max_blocking_threads(self.config.max_threads)
                    .thread_keep_alive(self.config.keep_alive)
                    .thread_name(format!("hkv-{}-pool", self.table_name))
                    .enable_all()
                    .build()?;
                info!(
                    table = %self.table_name,
                    max_threads = self.config.max_threads,
                    keep_alive_secs = self.config.keep_alive.as_secs(),
                    "Created execution pool"
                );
                let handle = runtime.handle().clone();
                *pool = PoolState::Owned(runtime);
                Ok(handle)
            }
        }
    }

    /// Shut down an owned pool; a caller-supplied runtime is left running.
    pub fn close(&self) {
        let previous = {
            let mut pool = self.pool.lock();
            if matches!(*pool, PoolState::Shared(_)) {
                return;
            }
            std::mem::replace(&mut *pool, PoolState::Closed)
        };

        self.permits.close();
        if let PoolState::Owned(runtime) = previous {
            runtime.shutdown_background();
            info!(table = %self.table_name, "Execution pool shut down");
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.pool.lock(), PoolState::Closed)
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        if let PoolState::Owned(runtime) = std::mem::replace(self.pool.get_mut(), PoolState::Closed) {
            runtime.shutdown_background();
        }
    }
}

fn derive_in_pool(explicit: Option<bool>, timeout_ms: u64) -> bool {
    explicit.unwrap_or(timeout_ms != DEFAULT_OPERATION_TIMEOUT_MS)
}

/// Aborts the task if the waiting side goes away.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
