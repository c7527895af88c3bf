//! # Error Envelope
//!
//! [`ErrorWithId`] binds an original failure to its tracking ID, the
//! operation context and optional metadata. It is built once inside
//! [`Handler::wrap_with_details`](crate::Handler::wrap_with_details) and is
//! read-only afterwards.

use std::error::Error as StdError;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::details::Details;

/// Shared handle to an original failure.
///
/// Cloning a `Failure` shares the same underlying error value, so an
/// envelope, its log record and a detached callback all observe one failure.
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
    /// Wraps an error value
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Adopts an existing shared error without re-boxing it
    pub fn from_arc(error: Arc<dyn StdError + Send + Sync + 'static>) -> Self {
        Self(error)
    }

    /// Adopts a boxed error
    pub fn from_boxed(error: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self(Arc::from(error))
    }

    /// Returns the shared handle
    pub fn as_arc(&self) -> &Arc<dyn StdError + Send + Sync + 'static> {
        &self.0
    }

    /// True if both handles point at the same error value
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Attempts to view the failure as a concrete error type
    pub fn downcast_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Failure::new(error)
    }
}

impl Deref for Failure {
    type Target = dyn StdError + Send + Sync + 'static;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl AsRef<dyn StdError + Send + Sync + 'static> for Failure {
    fn as_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// An error tagged with a unique, support-friendly ID
#[derive(Debug, Clone)]
pub struct ErrorWithId {
    id: String,
    original: Failure,
    context: String,
    details: Option<Details>,
    stack_trace: String,
    timestamp: i64,
}

impl ErrorWithId {
    pub(crate) fn new(
        id: String,
        original: Failure,
        context: String,
        details: Option<Details>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            original,
            context,
            details,
            stack_trace: String::new(),
            timestamp,
        }
    }

    pub(crate) fn with_stack_trace(mut self, stack_trace: String) -> Self {
        self.stack_trace = stack_trace;
        self
    }

    /// The tracking ID shown to users and written to logs
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The wrapped failure
    pub fn original(&self) -> &Failure {
        &self.original
    }

    /// Consumes the envelope and returns the wrapped failure
    pub fn into_original(self) -> Failure {
        self.original
    }

    /// Description of the operation that failed
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Caller-supplied metadata, exactly as passed to the wrap call
    pub fn details(&self) -> Option<&Details> {
        self.details.as_ref()
    }

    /// Captured stack trace; empty when capture was disabled
    pub fn stack_trace(&self) -> &str {
        &self.stack_trace
    }

    /// Unix timestamp (seconds) when the error was wrapped
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Attempts to view the original failure as a concrete error type
    pub fn downcast_original_ref<T: StdError + 'static>(&self) -> Option<&T> {
        self.original.downcast_ref::<T>()
    }
}

impl fmt::Display for ErrorWithId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.id, self.original)
        } else {
            write!(f, "[{}] {}: {}", self.id, self.context, self.original)
        }
    }
}

impl StdError for ErrorWithId {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&**self.original.as_arc())
    }
}
