//! # Global Handler
//!
//! A process-wide [`Handler`] for code that does not thread one through
//! explicitly. It starts out with [`Config::default`] and may be replaced
//! exactly once, at startup, via [`configure`] or [`try_configure`].

use std::sync::{Mutex, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::config::Config;
use crate::details::Details;
use crate::envelope::{ErrorWithId, Failure};
use crate::handler::Handler;
use crate::types::{Error, Result};

// Global handler instance
static DEFAULT_HANDLER: Lazy<RwLock<Handler>> =
    Lazy::new(|| RwLock::new(Handler::new(Config::default())));

// One-time gate: flips to true on the first successful configuration
static CONFIGURED: Mutex<bool> = Mutex::new(false);

/// Installs `config` as the global handler's configuration.
///
/// Returns [`Error::AlreadyConfigured`] if the global handler was already
/// configured; the existing handler stays in place.
pub fn try_configure(config: Config) -> Result<()> {
    let mut configured = CONFIGURED.lock().unwrap_or_else(PoisonError::into_inner);
    if *configured {
        return Err(Error::AlreadyConfigured);
    }

    let handler = Handler::new(config);
    *DEFAULT_HANDLER.write().unwrap_or_else(PoisonError::into_inner) = handler;
    *configured = true;

    tracing::debug!("global error handler configured");
    Ok(())
}

/// Installs `config` as the global handler's configuration.
///
/// Must be called once, at program startup, before any traffic is served.
///
/// # Panics
///
/// Panics if called more than once. A repeated configuration is a startup
/// ordering bug; use [`try_configure`] to handle it instead.
pub fn configure(config: Config) {
    if let Err(e) = try_configure(config) {
        panic!("{}", e);
    }
}

/// True once the global handler has been configured
pub fn is_configured() -> bool {
    *CONFIGURED.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns the global handler (the default one if never configured)
pub fn default_handler() -> Handler {
    DEFAULT_HANDLER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Wraps an error using the global handler
pub fn wrap<E>(error: Option<E>, context: &str) -> Option<ErrorWithId>
where
    E: Into<Failure>,
{
    default_handler().wrap(error, context)
}

/// Wraps an error with metadata using the global handler
pub fn wrap_with_details<E>(
    error: Option<E>,
    context: &str,
    details: Option<Details>,
) -> Option<ErrorWithId>
where
    E: Into<Failure>,
{
    default_handler().wrap_with_details(error, context, details)
}

#[cfg(test)]
mod tests {
    // Configuration of the global handler is covered by
    // tests/global_configure.rs, which runs in its own process.
    use super::*;
    use std::io;

    #[test]
    fn test_global_wrap() {
        let err = wrap(Some(io::Error::new(io::ErrorKind::Other, "test")), "global test").unwrap();
        assert!(err.id().starts_with("ERR-"));
        assert_eq!(err.context(), "global test");
    }

    #[test]
    fn test_global_wrap_none() {
        assert!(wrap(None::<io::Error>, "nothing").is_none());
    }

    #[test]
    fn test_global_wrap_with_details() {
        let details = Details::new().add("user_id", 123).add("action", "test");
        let err = wrap_with_details(
            Some(io::Error::new(io::ErrorKind::Other, "test error")),
            "test context",
            Some(details.clone()),
        )
        .unwrap();

        assert_eq!(err.details(), Some(&details));
    }

    #[test]
    fn test_default_handler_is_shared() {
        let a = default_handler();
        let b = default_handler();
        assert!(a.ptr_eq(&b));
    }
}
