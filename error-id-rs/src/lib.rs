//! # Error ID
//!
//! Tags runtime errors with short, support-friendly IDs such as
//! `ERR-20261016-a3f91c`, logs them with full context and returns only the
//! ID to clients, so a customer report can be matched to one log line.
//!
//! ## Features
//!
//! - Unique, day-sortable error IDs with pluggable generators
//! - An error envelope that keeps the original error reachable via `source()`
//! - Structured logging through a pluggable [`Logger`]
//! - `on_error` callbacks, run inline or detached, isolated from panics
//! - A process-wide handler configured once, plus independent instances
//! - axum middleware that turns handler panics into `500` JSON responses
//!
//! ```
//! use error_id::{Config, Handler};
//!
//! let handler = Handler::new(Config::default());
//! let err = std::io::Error::new(std::io::ErrorKind::Other, "connection refused");
//! let wrapped = handler.wrap(Some(err), "database query failed").unwrap();
//!
//! assert!(wrapped.id().starts_with("ERR-"));
//! assert!(wrapped.to_string().ends_with("database query failed: connection refused"));
//! ```

pub mod types;
pub mod generator;
pub mod details;
pub mod envelope;
pub mod logging;
pub mod config;
pub mod handler;
pub mod facade;
pub mod context;
pub mod middleware;
pub mod monitoring;
mod stack;

// Re-export commonly used types
pub use types::{Error, Result};
pub use generator::{generate_error_id, DefaultIdGenerator, IdGenerator};
pub use details::Details;
pub use envelope::{ErrorWithId, Failure};
pub use logging::{init_logging, Logger, LoggingConfig, TracingLogger, WriterLogger};
pub use crate::config::{Config, Environment, ErrorCallback, Settings};
pub use handler::Handler;
pub use facade::{configure, default_handler, is_configured, try_configure, wrap, wrap_with_details};
pub use context::WithErrorId;
pub use middleware::{
    error_response, recover_panics, with_recovery, ErrorResponse, PanicError, RecoveredPanic,
    GENERIC_MESSAGE,
};
