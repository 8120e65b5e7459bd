//! Scoped suppression of the logging initialization hook.
//!
//! Code that installs a subscriber as a side effect (usually by calling
//! [`init_module`](crate::init_module)) goes through a [`LoggingContext`].
//! Holding a [`SuppressInit`] guard swaps the context's hook for a no-op and
//! puts the previous hook back when the guard drops, including during a
//! panic unwind.
//!
//! Guards on the same context must be created and dropped in stack order
//! from one thread at a time. Tests that need isolation should build their
//! own `LoggingContext` instead of suppressing the global one.

use crate::config::LogConfig;
use crate::error::LogError;
use crate::logging::init_logging;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// "Initialize logging" strategy stored in a [`LoggingContext`].
pub type InitHook = Arc<dyn Fn(&LogConfig) -> Result<(), LogError> + Send + Sync>;

static NOOP_HOOK: Lazy<InitHook> =
    Lazy::new(|| Arc::new(|_: &LogConfig| -> Result<(), LogError> { Ok(()) }));

static GLOBAL_CONTEXT: Lazy<LoggingContext> =
    Lazy::new(|| LoggingContext::from_fn(init_logging));

/// The hook that accepts a config and does nothing.
pub fn noop_hook() -> InitHook {
    NOOP_HOOK.clone()
}

/// Holds the current logging initialization hook.
pub struct LoggingContext {
    hook: RwLock<InitHook>,
}

impl LoggingContext {
    pub fn new(hook: InitHook) -> Self {
        Self {
            hook: RwLock::new(hook),
        }
    }

    pub fn from_fn<F>(hook: F) -> Self
    where
        F: Fn(&LogConfig) -> Result<(), LogError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(hook))
    }

    /// Process-wide context used by [`init_module`](crate::init_module).
    /// Its hook starts out as [`init_logging`].
    pub fn global() -> &'static LoggingContext {
        &GLOBAL_CONTEXT
    }

    /// The currently installed hook.
    pub fn hook(&self) -> InitHook {
        self.hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install `hook`, returning the one it replaces.
    pub fn set_hook(&self, hook: InitHook) -> InitHook {
        let mut slot = self.hook.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, hook)
    }

    /// Run the current hook with `config`.
    pub fn initialize(&self, config: &LogConfig) -> Result<(), LogError> {
        // Cloned out so the hook may touch this context itself
        let hook = self.hook();
        (*hook)(config)
    }

    /// Replace the hook with a no-op until the returned guard is dropped.
    #[must_use = "initialization is only suppressed while the guard is alive"]
    pub fn suppress(&self) -> SuppressInit<'_> {
        let original = self.set_hook(noop_hook());
        trace!("logging initialization suppressed");
        SuppressInit {
            context: self,
            original: Some(original),
        }
    }

    /// Whether the installed hook is the no-op.
    pub fn is_suppressed(&self) -> bool {
        Arc::ptr_eq(&self.hook(), &*NOOP_HOOK)
    }
}

impl Default for LoggingContext {
    /// A context whose hook is [`init_logging`].
    fn default() -> Self {
        Self::from_fn(init_logging)
    }
}

impl fmt::Debug for LoggingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingContext")
            .field("suppressed", &self.is_suppressed())
            .finish()
    }
}

/// Guard returned by [`LoggingContext::suppress`]; restores the saved hook on drop.
pub struct SuppressInit<'a> {
    context: &'a LoggingContext,
    original: Option<InitHook>,
}

impl Drop for SuppressInit<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.context.set_hook(original);
            trace!("logging initialization restored");
        }
    }
}

impl fmt::Debug for SuppressInit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuppressInit").finish_non_exhaustive()
    }
}

/// Suppress the global context's hook until the guard is dropped.
#[must_use = "initialization is only suppressed while the guard is alive"]
pub fn suppress_logging_init() -> SuppressInit<'static> {
    LoggingContext::global().suppress()
}

/// Run `f` with the global hook suppressed.
pub fn with_logging_init_suppressed<R>(f: impl FnOnce() -> R) -> R {
    let _guard = suppress_logging_init();
    f()
}
