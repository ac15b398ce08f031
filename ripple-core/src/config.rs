//! Runtime Configuration
//!
//! Configuration is per thread, like the rest of the reactive runtime. The
//! serializable part can be loaded from JSON; handlers are installed in code.
//!
//! ```rust,ignore
//! use ripple_core::config::{self, Config};
//!
//! config::install(Config::from_json(r#"{"async_mode": false}"#)?);
//! config::configure(|c| c.max_update_count = 10);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// Handler for recoverable errors: `(error, info)`.
pub type ErrorHandler = Rc<dyn Fn(&ReactiveError, &str)>;

/// Handler for warning diagnostics.
pub type WarnHandler = Rc<dyn Fn(&str)>;

/// How the tick scheduler gets the callback buffer drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStrategy {
    /// The host drains at its turn boundary with
    /// [`run_pending`](crate::scheduler::run_pending), or by awaiting a
    /// [`NextTick`](crate::scheduler::NextTick).
    #[default]
    Manual,
    /// Spawn a tokio local task that yields once and then drains.
    /// Must be used from within a `tokio::task::LocalSet`.
    LocalTask,
}

/// Reactive runtime settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch updates through the tick scheduler. When off, the queue
    /// flushes synchronously and notifications run in id order.
    pub async_mode: bool,

    /// How many times one subscriber may re-trigger itself within a single
    /// flush before it is dropped with a diagnostic.
    pub max_update_count: usize,

    pub tick_strategy: TickStrategy,

    /// Suppress warnings.
    pub silent: bool,

    #[serde(skip)]
    pub error_handler: Option<ErrorHandler>,

    #[serde(skip)]
    pub warn_handler: Option<WarnHandler>,
}

impl Config {
    /// Parse the serializable settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_mode: true,
            max_update_count: 100,
            tick_strategy: TickStrategy::Manual,
            silent: false,
            error_handler: None,
            warn_handler: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("async_mode", &self.async_mode)
            .field("max_update_count", &self.max_update_count)
            .field("tick_strategy", &self.tick_strategy)
            .field("silent", &self.silent)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::default());
}

/// Replace the current thread's configuration.
pub fn install(config: Config) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Modify the current thread's configuration in place.
pub fn configure(f: impl FnOnce(&mut Config)) {
    CONFIG.with(|c| f(&mut c.borrow_mut()));
}

/// Snapshot of the current configuration.
pub fn current() -> Config {
    CONFIG.with(|c| c.borrow().clone())
}

/// Restore defaults.
pub fn reset() {
    install(Config::default());
}

pub(crate) fn is_async() -> bool {
    CONFIG.with(|c| c.borrow().async_mode)
}

pub(crate) fn max_update_count() -> usize {
    CONFIG.with(|c| c.borrow().max_update_count)
}

pub(crate) fn tick_strategy() -> TickStrategy {
    CONFIG.with(|c| c.borrow().tick_strategy)
}

pub(crate) fn is_silent() -> bool {
    CONFIG.with(|c| c.borrow().silent)
}

// Handlers are cloned out so they can be invoked without holding the borrow.
pub(crate) fn error_handler() -> Option<ErrorHandler> {
    CONFIG.with(|c| c.borrow().error_handler.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    CONFIG.with(|c| c.borrow().warn_handler.clone())
}
