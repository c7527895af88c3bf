//! # Result Extension
//!
//! Attach an error ID at the point a `Result` fails:
//!
//! ```no_run
//! use error_id::WithErrorId;
//!
//! fn load() -> Result<String, error_id::ErrorWithId> {
//!     std::fs::read_to_string("/etc/app.toml").with_error_id("loading app config")
//! }
//! ```

use crate::details::Details;
use crate::envelope::{ErrorWithId, Failure};
use crate::facade::default_handler;
use crate::handler::Handler;

/// Wraps the error side of a `Result` into an [`ErrorWithId`]
pub trait WithErrorId<T> {
    /// Wraps using the global handler
    fn with_error_id(self, context: &str) -> Result<T, ErrorWithId>;

    /// Wraps using a specific handler
    fn with_error_id_using(self, handler: &Handler, context: &str) -> Result<T, ErrorWithId>;

    /// Wraps with metadata using a specific handler
    fn with_error_details(
        self,
        handler: &Handler,
        context: &str,
        details: Details,
    ) -> Result<T, ErrorWithId>;
}

impl<T, E> WithErrorId<T> for Result<T, E>
where
    E: Into<Failure>,
{
    fn with_error_id(self, context: &str) -> Result<T, ErrorWithId> {
        self.map_err(|e| default_handler().wrap_failure(e.into(), context, None))
    }

    fn with_error_id_using(self, handler: &Handler, context: &str) -> Result<T, ErrorWithId> {
        self.map_err(|e| handler.wrap_failure(e.into(), context, None))
    }

    fn with_error_details(
        self,
        handler: &Handler,
        context: &str,
        details: Details,
    ) -> Result<T, ErrorWithId> {
        self.map_err(|e| handler.wrap_failure(e.into(), context, Some(details)))
    }
}
