//! Metrics emitted by the handler and the HTTP recovery boundary.
//!
//! Only the `metrics` facade is used; installing an exporter is left to the
//! embedding binary. Without one these calls are no-ops.

use metrics::counter;

use crate::config::Environment;

pub const WRAPPED_ERRORS: &str = "error_id.wrapped";
pub const CALLBACK_PANICS: &str = "error_id.callback_panics";
pub const PANICS_RECOVERED: &str = "error_id.panics_recovered";

/// Counts a wrapped error, labelled by environment
pub(crate) fn record_wrapped(environment: &Environment) {
    counter!(WRAPPED_ERRORS, 1, "environment" => environment.to_string());
}

/// Counts an `on_error` callback that panicked
pub(crate) fn record_callback_panic() {
    counter!(CALLBACK_PANICS, 1);
}

/// Counts a panic caught at the HTTP boundary
pub(crate) fn record_panic_recovered(method: &str) {
    counter!(PANICS_RECOVERED, 1, "method" => method.to_string());
}
