//! Logging safety helpers for `tracing` pipelines.
//!
//! - [`log_exceptions`] / [`Logged`] log failures of wrapped callables once
//!   and pass them on unchanged.
//! - [`LoggingContext`] / [`SuppressInit`] temporarily disable logging
//!   initialization side effects.
//! - [`RedactingMakeWriter`] masks API keys and registered secrets in every
//!   rendered line before it reaches a sink.

// Lets `#[log_exceptions]` expand to `::logshield::...` inside this crate's tests
extern crate self as logshield;

pub mod config;
pub mod error;
mod logging;
#[cfg(all(test, feature = "macros"))]
mod macros_tests;
pub mod redaction;
pub mod suppress;
#[cfg(test)]
mod test_support;
pub mod wrapper;
pub mod writer;

pub use config::{LogConfig, LogFormat};
pub use error::{ConfigError, Error, LogError, Result};
pub use logging::{init_logging, init_module};
pub use redaction::{
    redact, redact_api_keys, register_for_redaction, register_secret_for_redaction,
    with_redaction, RedactionRule, Redactor,
};
pub use suppress::{
    suppress_logging_init, with_logging_init_suppressed, InitHook, LoggingContext, SuppressInit,
};
pub use wrapper::{
    log_exceptions, log_exceptions_async, log_panics, log_panics_async, Callable, Logged,
};
pub use writer::{RedactingMakeWriter, RedactingWriter};

// Conditionally re-export the attribute macro
#[cfg(feature = "macros")]
pub use logshield_macros::log_exceptions;

/// Prelude module, exposing the most commonly used items.
pub mod prelude {
    pub use crate::{
        init_module, log_exceptions, log_exceptions_async, log_panics, logged, redact,
        suppress_logging_init, LogConfig, Logged, LoggingContext, RedactingMakeWriter,
    };
}
