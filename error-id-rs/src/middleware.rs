//! # HTTP Recovery Boundary
//!
//! axum middleware that turns a panic inside a request handler into a
//! `500` JSON response carrying the error ID, instead of dropping the
//! connection. The panic is wrapped, logged and reported like any other
//! error.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//!
//! let app = error_id::with_recovery(
//!     Router::new().route("/", get(|| async { "ok" })),
//!     error_id::default_handler(),
//! );
//! # let _: Router = app;
//! ```

use std::any::Any;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::config::Environment;
use crate::details::Details;
use crate::envelope::{ErrorWithId, Failure};
use crate::facade::default_handler;
use crate::handler::{panic_message, Handler};
use crate::monitoring;

/// Client message used everywhere except the development environment
pub const GENERIC_MESSAGE: &str =
    "An internal error occurred. Please contact support with this error ID.";

/// Context attached to errors produced from recovered panics
pub const PANIC_CONTEXT: &str = "panic recovered in HTTP handler";

/// JSON body returned to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_id: String,
    pub message: String,
    pub timestamp: i64,
}

impl ErrorResponse {
    /// Builds the client body, exposing the error text only in development
    pub fn from_error(err: &ErrorWithId, environment: &Environment) -> Self {
        let message = if environment.is_development() {
            err.to_string()
        } else {
            GENERIC_MESSAGE.to_string()
        };

        Self {
            error_id: err.id().to_string(),
            message,
            timestamp: err.timestamp(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

/// A panic payload that is not itself an error
#[derive(Debug, Clone, ThisError)]
#[error("panic: {value}")]
pub struct PanicError {
    value: String,
}

impl PanicError {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self { value: value.into() }
    }

    /// The rendered panic value
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A panic payload, classified once at the recovery boundary
#[derive(Debug)]
pub enum RecoveredPanic {
    /// The handler panicked with an error value; it is used as-is
    Failure(Failure),
    /// Any other payload, rendered as text
    Raw(String),
}

impl RecoveredPanic {
    /// Classifies a payload from `catch_unwind`
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<Failure>() {
            Ok(failure) => return RecoveredPanic::Failure(*failure),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<ErrorWithId>() {
            Ok(wrapped) => return RecoveredPanic::Failure(Failure::new(*wrapped)),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Box<dyn StdError + Send + Sync>>() {
            Ok(boxed) => return RecoveredPanic::Failure(Failure::from_boxed(*boxed)),
            Err(payload) => payload,
        };

        RecoveredPanic::Raw(panic_message(payload.as_ref()))
    }

    /// Converts into the failure to wrap
    pub fn into_failure(self) -> Failure {
        match self {
            RecoveredPanic::Failure(failure) => failure,
            RecoveredPanic::Raw(value) => Failure::new(PanicError::new(value)),
        }
    }
}

impl Handler {
    /// Builds the `500` JSON response for a wrapped error, following this
    /// handler's environment policy
    pub fn error_response(&self, err: &ErrorWithId) -> Response {
        ErrorResponse::from_error(err, &self.config().environment).into_response()
    }
}

/// Builds the `500` JSON response using the global handler
pub fn error_response(err: &ErrorWithId) -> Response {
    default_handler().error_response(err)
}

/// Middleware function; install with [`with_recovery`] or
/// `axum::middleware::from_fn_with_state(handler, recover_panics)`.
pub async fn recover_panics(State(handler): State<Handler>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            monitoring::record_panic_recovered(&method);

            let failure = RecoveredPanic::from_payload(payload).into_failure();
            let details = Details::new()
                .add("method", method)
                .add("path", path)
                .add("remote", remote);

            let wrapped = handler.wrap_failure(failure, PANIC_CONTEXT, Some(details));
            handler.error_response(&wrapped)
        }
    }
}

/// Wraps every route registered on `router` so far with panic recovery
pub fn with_recovery<S>(router: Router<S>, handler: Handler) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(handler, recover_panics))
}
