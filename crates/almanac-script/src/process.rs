//! Cancellable, observable script execution.
//!
//! A [`ScriptProcess`] wraps one execution closure. `start()` runs it on a
//! dedicated worker thread; the process then settles exactly once into
//! `Completed`, `Failed` or `Cancelled`, and the completion callback (if
//! any) fires exactly once with `(was_cancelled, error)`.
//!
//! Cancellation sets a shared flag that the running interpreter polls at a
//! bounded instruction interval, so even an unbounded script loop is
//! interrupted. `cancel()` blocks until the worker has acknowledged.

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::NativeValue;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

type Body = Box<dyn FnOnce(&ProcessContext) -> RuntimeResult<()> + Send>;
type Callback = Box<dyn FnOnce(bool, Option<&RuntimeError>) + Send>;

/// Lifecycle state of a [`ScriptProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessState::Completed | ProcessState::Failed | ProcessState::Cancelled
        )
    }
}

/// Shared cancellation signal checked by running interpreters.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// What the execution closure gets to see.
pub struct ProcessContext {
    label: String,
    env: BTreeMap<String, NativeValue>,
    cancellation: CancellationFlag,
}

impl ProcessContext {
    /// Human-readable label of the owning process.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Environment variables to inject into the script's global scope.
    pub fn env(&self) -> &BTreeMap<String, NativeValue> {
        &self.env
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }
}

struct Inner {
    state: ProcessState,
    body: Option<Body>,
    env: BTreeMap<String, NativeValue>,
    callback: Option<Callback>,
    error: Option<Arc<RuntimeError>>,
}

struct Shared {
    label: String,
    inner: Mutex<Inner>,
    settled: Condvar,
    cancellation: CancellationFlag,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the terminal state and wake waiters, then fire the callback.
    fn finish(&self, result: RuntimeResult<()>) {
        let (cancelled, error, callback) = {
            let mut inner = self.lock();
            let cancelled = self.cancellation.is_cancelled();
            let error = match result {
                Err(err) if !cancelled => Some(Arc::new(err)),
                _ => None,
            };
            inner.state = if cancelled {
                ProcessState::Cancelled
            } else if error.is_some() {
                ProcessState::Failed
            } else {
                ProcessState::Completed
            };
            inner.error = error.clone();
            self.settled.notify_all();
            (cancelled, error, inner.callback.take())
        };

        match (&error, cancelled) {
            (_, true) => info!(process = %self.label, "Script process cancelled"),
            (Some(err), _) => warn!(process = %self.label, "Script process failed: {}", err),
            (None, _) => debug!(process = %self.label, "Script process completed"),
        }

        // Runs unlocked and after settling, so it may use the process freely.
        if let Some(callback) = callback {
            callback(cancelled, error.as_deref());
        }
    }
}

/// One asynchronous, cancellable script execution.
///
/// Cloning yields another handle to the same process.
#[derive(Clone)]
pub struct ScriptProcess {
    shared: Arc<Shared>,
}

impl ScriptProcess {
    /// Create a process in the `Created` state around an execution closure.
    pub fn new<F>(label: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&ProcessContext) -> RuntimeResult<()> + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                label: label.into(),
                inner: Mutex::new(Inner {
                    state: ProcessState::Created,
                    body: Some(Box::new(body)),
                    env: BTreeMap::new(),
                    callback: None,
                    error: None,
                }),
                settled: Condvar::new(),
                cancellation: CancellationFlag::default(),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Set an environment variable for the script. Only allowed before start.
    pub fn set_env(&self, name: impl Into<String>, value: impl Into<NativeValue>) -> RuntimeResult<()> {
        let mut inner = self.shared.lock();
        if inner.state != ProcessState::Created {
            return Err(RuntimeError::AlreadyStarted(self.shared.label.clone()));
        }
        inner.env.insert(name.into(), value.into());
        Ok(())
    }

    /// Register the completion callback, replacing any earlier one.
    ///
    /// If the process already finished, the callback fires immediately with
    /// the recorded outcome.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(bool, Option<&RuntimeError>) + Send + 'static,
    {
        let (cancelled, error) = {
            let mut inner = self.shared.lock();
            if !inner.state.is_terminal() {
                inner.callback = Some(Box::new(callback));
                return;
            }
            (inner.state == ProcessState::Cancelled, inner.error.clone())
        };

        callback(cancelled, error.as_deref());
    }

    /// Schedule the closure on a worker thread without blocking the caller.
    pub fn start(&self) -> RuntimeResult<()> {
        let (body, env) = {
            let mut inner = self.shared.lock();
            if inner.state != ProcessState::Created {
                return Err(RuntimeError::AlreadyStarted(self.shared.label.clone()));
            }
            let Some(body) = inner.body.take() else {
                return Err(RuntimeError::AlreadyStarted(self.shared.label.clone()));
            };
            inner.state = ProcessState::Running;
            (body, std::mem::take(&mut inner.env))
        };

        let ctx = ProcessContext {
            label: self.shared.label.clone(),
            env,
            cancellation: self.shared.cancellation.clone(),
        };
        let shared = Arc::clone(&self.shared);

        info!(process = %self.shared.label, "Starting script process");
        let spawned = thread::Builder::new()
            .name(format!("script-{}", self.shared.label))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| body(&ctx)))
                    .unwrap_or_else(|_| {
                        Err(RuntimeError::ExecutionError("script worker panicked".to_string()))
                    });
                shared.finish(result);
            });

        match spawned {
            Ok(_) => Ok(()),
            Err(err) => {
                let message = format!("failed to spawn script worker: {err}");
                self.shared.finish(Err(RuntimeError::Io(err)));
                Err(RuntimeError::ExecutionError(message))
            }
        }
    }

    /// Forcibly stop a running process and wait for it to settle.
    ///
    /// Returns `false` if the process was not running (never started or
    /// already finished).
    pub fn cancel(&self) -> bool {
        {
            let inner = self.shared.lock();
            if inner.state != ProcessState::Running {
                return false;
            }
            self.shared.cancellation.cancel();
        }
        info!(process = %self.shared.label, "Cancelling script process");
        self.wait();
        true
    }

    /// Block until the process has settled. Returns immediately if it was
    /// never started.
    pub fn wait(&self) -> ProcessState {
        let mut inner = self.shared.lock();
        while inner.state == ProcessState::Running {
            inner = self
                .shared
                .settled
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
        inner.state
    }

    pub fn state(&self) -> ProcessState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Error recorded by a failed process.
    pub fn error(&self) -> Option<Arc<RuntimeError>> {
        self.shared.lock().error.clone()
    }
}

impl std::fmt::Debug for ScriptProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptProcess")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .finish()
    }
}
