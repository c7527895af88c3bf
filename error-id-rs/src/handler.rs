//! # Error Handler
//!
//! A [`Handler`] owns one immutable [`Config`] and performs the
//! wrap, log and callback sequence. Handlers are cheap to clone and may be
//! shared across any number of threads or tasks; wrapping takes no locks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, ErrorCallback};
use crate::details::Details;
use crate::envelope::{ErrorWithId, Failure};
use crate::generator::{DefaultIdGenerator, IdGenerator};
use crate::logging::{Logger, TracingLogger};
use crate::{monitoring, stack};

/// Wraps errors with unique IDs, logs them and runs the configured callback
#[derive(Clone)]
pub struct Handler {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    id_generator: Arc<dyn IdGenerator>,
    logger: Arc<dyn Logger>,
}

impl Handler {
    /// Creates a handler, filling in the default ID generator and logger
    /// when the config leaves them unset.
    pub fn new(config: Config) -> Self {
        let id_generator = config
            .id_generator
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultIdGenerator::default()));
        let logger = config
            .logger
            .clone()
            .unwrap_or_else(|| Arc::new(TracingLogger));

        Self {
            inner: Arc::new(Inner {
                config,
                id_generator,
                logger,
            }),
        }
    }

    /// Read-only access to the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// True if both values are clones of the same handler
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wraps an error with a unique ID.
    ///
    /// Returns `None` for `None` input without generating an ID, logging
    /// or running the callback.
    pub fn wrap<E>(&self, error: Option<E>, context: &str) -> Option<ErrorWithId>
    where
        E: Into<Failure>,
    {
        self.wrap_with_details(error, context, None)
    }

    /// Wraps an error with a unique ID and caller-supplied metadata.
    ///
    /// The details end up on the envelope unchanged. The logger gets its own
    /// copy with a `timestamp` entry added.
    pub fn wrap_with_details<E>(
        &self,
        error: Option<E>,
        context: &str,
        details: Option<Details>,
    ) -> Option<ErrorWithId>
    where
        E: Into<Failure>,
    {
        let failure = error?.into();
        Some(self.wrap_failure(failure, context, details))
    }

    /// Wraps a failure that is known to be present
    pub(crate) fn wrap_failure(
        &self,
        failure: Failure,
        context: &str,
        details: Option<Details>,
    ) -> ErrorWithId {
        let inner = &self.inner;
        let error_id = inner.id_generator.generate();
        let timestamp = chrono::Utc::now().timestamp();

        let mut wrapped = ErrorWithId::new(error_id, failure, context.to_string(), details, timestamp);

        if inner.config.include_stack_trace {
            wrapped = wrapped.with_stack_trace(stack::capture());
        }

        self.log_error(&wrapped);
        monitoring::record_wrapped(&inner.config.environment);

        if let Some(callback) = &inner.config.on_error {
            if inner.config.async_callback {
                self.spawn_callback(Arc::clone(callback), wrapped.clone());
            } else {
                safe_callback(callback, &wrapped, inner.logger.as_ref());
            }
        }

        wrapped
    }

    fn log_error(&self, wrapped: &ErrorWithId) {
        // Copy user details so the caller's map never sees system fields
        let mut details = wrapped.details().cloned().unwrap_or_default();
        details.insert("timestamp", wrapped.timestamp());

        self.inner.logger.error(
            wrapped.id(),
            wrapped.original(),
            wrapped.context(),
            &details,
            wrapped.stack_trace(),
        );
    }

    /// Runs the callback without waiting for it. No handle is kept: the
    /// callback may finish at any point after `wrap` returns.
    ///
    /// Inside a tokio runtime the callback goes to the bounded blocking
    /// pool. Outside one, each call starts its own OS thread, so a burst of
    /// errors means a burst of threads; long-running callbacks in
    /// runtime-less programs should hand work to their own queue.
    fn spawn_callback(&self, callback: ErrorCallback, wrapped: ErrorWithId) {
        let logger = Arc::clone(&self.inner.logger);
        let run = move || safe_callback(&callback, &wrapped, logger.as_ref());

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(run);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("error-id-callback".to_string())
                    .spawn(run);
                if let Err(e) = spawned {
                    debug!(error = %e, "failed to spawn callback thread");
                    self.inner
                        .logger
                        .info(&format!("on_error callback could not be started: {}", e));
                }
            }
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Runs the callback, demoting a panic to an info log line
fn safe_callback(callback: &ErrorCallback, wrapped: &ErrorWithId, logger: &dyn Logger) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(wrapped)));

    if let Err(payload) = outcome {
        monitoring::record_callback_panic();
        logger.info(&format!(
            "on_error callback panicked for {}: {}",
            wrapped.id(),
            panic_message(payload.as_ref())
        ));
    }
}

/// Renders a panic payload for logging
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::logging::tests::RecordingLogger;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    fn io_error(msg: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, msg.to_string())
    }

    fn is_well_formed(id: &str) -> bool {
        let parts: Vec<&str> = id.split('-').collect();
        parts.len() == 3
            && parts[0] == "ERR"
            && parts[1].len() == 8
            && parts[1].chars().all(|c| c.is_ascii_digit())
            && parts[2].len() == 6
            && parts[2].chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
    }

    #[test]
    fn test_handler_new() {
        let handler = Handler::new(Config::default().with_environment("test"));
        assert_eq!(handler.config().environment, Environment::Other("test".to_string()));
    }

    #[test]
    fn test_wrap_error() {
        let handler = Handler::new(Config::default());
        let wrapped = handler.wrap(Some(io_error("original error")), "test context").unwrap();

        assert!(is_well_formed(wrapped.id()), "malformed id {}", wrapped.id());
        assert_eq!(wrapped.context(), "test context");
        assert_eq!(wrapped.original().to_string(), "original error");
        assert!(wrapped.timestamp() > 0);
        assert!(wrapped.details().is_none());
    }

    #[test]
    fn test_wrap_none_has_no_side_effects() {
        let logger = RecordingLogger::shared();
        let calls = Arc::new(AtomicUsize::new(0));
        let generated = Arc::new(AtomicUsize::new(0));

        let calls_cb = Arc::clone(&calls);
        let generated_cb = Arc::clone(&generated);
        let handler = Handler::new(
            Config::default()
                .with_shared_logger(logger.clone())
                .with_on_error(move |_| {
                    calls_cb.fetch_add(1, Ordering::SeqCst);
                })
                .with_id_generator(move || {
                    generated_cb.fetch_add(1, Ordering::SeqCst);
                    "UNUSED".to_string()
                }),
        );

        assert!(handler.wrap(None::<io::Error>, "context").is_none());
        assert!(handler
            .wrap_with_details(None::<io::Error>, "context", Some(Details::new().add("k", 1)))
            .is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(generated.load(Ordering::SeqCst), 0);
        assert!(logger.errors().is_empty());
        assert!(logger.infos().is_empty());
    }

    #[test]
    fn test_unwrap_returns_same_failure() {
        let handler = Handler::new(Config::default());
        let original = Failure::new(io_error("original"));

        let wrapped = handler.wrap(Some(original.clone()), "context").unwrap();

        assert!(wrapped.original().ptr_eq(&original));
        assert!(wrapped.into_original().ptr_eq(&original));
    }

    #[test]
    fn test_source_chain_matching() {
        let handler = Handler::new(Config::default());
        let wrapped = handler
            .wrap(Some(io::Error::new(io::ErrorKind::NotFound, "missing")), "lookup")
            .unwrap();

        let source = std::error::Error::source(&wrapped).unwrap();
        assert_eq!(
            source.downcast_ref::<io::Error>().map(|e| e.kind()),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_wrap_with_details_isolation() {
        let logger = RecordingLogger::shared();
        let handler = Handler::new(Config::default().with_shared_logger(logger.clone()));

        let details = Details::new().add("user_id", 123).add("action", "test");
        let before = details.clone();

        let wrapped = handler
            .wrap_with_details(Some(io_error("test error")), "test context", Some(details))
            .unwrap();

        // The envelope keeps exactly what the caller passed
        assert_eq!(wrapped.details(), Some(&before));
        assert!(!wrapped.details().unwrap().contains_key("timestamp"));

        // The logger gets a copy with the timestamp added
        let logged = logger.errors();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].error_id, wrapped.id());
        assert_eq!(logged[0].context, "test context");
        assert!(logged[0].error.ptr_eq(wrapped.original()));
        assert_eq!(logged[0].details.get("user_id"), before.get("user_id"));
        assert_eq!(logged[0].details.get("action"), before.get("action"));
        assert_eq!(
            logged[0].details.get("timestamp"),
            Some(&serde_json::json!(wrapped.timestamp()))
        );
        assert!(!logged[0].details.contains_key("stack_trace"));
    }

    #[test]
    fn test_custom_id_generator() {
        let handler = Handler::new(Config::default().with_id_generator(|| "CUSTOM-ID-123".to_string()));
        let wrapped = handler.wrap(Some(io_error("test")), "context").unwrap();
        assert_eq!(wrapped.id(), "CUSTOM-ID-123");
    }

    #[test]
    fn test_no_stack_trace() {
        let logger = RecordingLogger::shared();
        let handler = Handler::new(
            Config::default()
                .with_stack_trace(false)
                .with_shared_logger(logger.clone()),
        );

        for _ in 0..3 {
            let wrapped = handler.wrap(Some(io_error("test")), "context").unwrap();
            assert!(wrapped.stack_trace().is_empty());
        }
        assert!(logger.errors().iter().all(|e| e.stack_trace.is_empty()));
    }

    #[test]
    fn test_stack_trace_names_caller() {
        let logger = RecordingLogger::shared();
        let handler = Handler::new(
            Config::default()
                .with_stack_trace(true)
                .with_shared_logger(logger.clone()),
        );

        let wrapped = handler.wrap(Some(io_error("test")), "context").unwrap();

        assert!(!wrapped.stack_trace().is_empty());
        assert!(
            wrapped.stack_trace().contains("test_stack_trace_names_caller"),
            "stack trace missing caller frame:\n{}",
            wrapped.stack_trace()
        );
        let first = wrapped.stack_trace().lines().next().unwrap_or_default();
        assert!(!first.contains("wrap_failure"), "wrap frame leaked: {}", first);
        assert_eq!(logger.errors()[0].stack_trace, wrapped.stack_trace());
    }

    #[test]
    fn test_sync_callback_runs_before_return() {
        let captured: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let captured_cb = Arc::clone(&captured);

        let handler = Handler::new(Config::default().with_async_callback(false).with_on_error(
            move |err| {
                *captured_cb.lock().unwrap() = Some(err.id().to_string());
            },
        ));

        let wrapped = handler.wrap(Some(io_error("test error")), "test context").unwrap();

        assert_eq!(captured.lock().unwrap().as_deref(), Some(wrapped.id()));
    }

    #[test]
    fn test_callback_called_per_wrap() {
        let count = Arc::new(AtomicUsize::new(0));
        let last: Arc<Mutex<String>> = Arc::default();
        let (count_cb, last_cb) = (Arc::clone(&count), Arc::clone(&last));

        let handler = Handler::new(Config::default().with_on_error(move |err| {
            count_cb.fetch_add(1, Ordering::SeqCst);
            *last_cb.lock().unwrap() = err.id().to_string();
        }));

        handler.wrap(Some(io_error("error 1")), "context 1");
        handler.wrap(Some(io_error("error 2")), "context 2");
        let third = handler.wrap(Some(io_error("error 3")), "context 3").unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(*last.lock().unwrap(), third.id());
    }

    // Detached callbacks carry no completion guarantee, so these tests wait
    // on a channel instead of checking a flag right after `wrap`.
    #[test]
    fn test_async_callback_on_thread() {
        let (tx, rx) = mpsc::channel::<String>();
        let tx = Mutex::new(tx);

        let handler = Handler::new(Config::default().with_async_callback(true).with_on_error(
            move |err| {
                let _ = tx.lock().unwrap().send(err.id().to_string());
            },
        ));

        let wrapped = handler.wrap(Some(io_error("test error")), "test context").unwrap();

        let received = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("timeout waiting for async callback");
        assert_eq!(received, wrapped.id());
    }

    #[test]
    fn test_async_callback_burst_without_runtime() {
        let (tx, rx) = mpsc::channel::<String>();
        let tx = Mutex::new(tx);

        let handler = Handler::new(Config::default().with_async_callback(true).with_on_error(
            move |err| {
                let _ = tx.lock().unwrap().send(err.id().to_string());
            },
        ));

        let mut expected: Vec<String> = (0..32)
            .map(|i| {
                handler
                    .wrap(Some(io_error(&format!("burst {}", i))), "burst")
                    .unwrap()
                    .id()
                    .to_string()
            })
            .collect();

        let mut received: Vec<String> = (0..32)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("callback lost"))
            .collect();

        expected.sort();
        received.sort();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_async_callback_in_runtime() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

        let handler = Handler::new(Config::default().with_async_callback(true).with_on_error(
            move |err| {
                let _ = tx.send(err.id().to_string());
            },
        ));

        let wrapped = handler.wrap(Some(io_error("test error")), "test context").unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for async callback");
        assert_eq!(received.as_deref(), Some(wrapped.id()));
    }

    #[test]
    fn test_callback_panic_is_isolated() {
        let logger = RecordingLogger::shared();
        let handler = Handler::new(
            Config::default()
                .with_shared_logger(logger.clone())
                .with_on_error(|_| panic!("sentry unreachable")),
        );

        let wrapped = handler.wrap(Some(io_error("test")), "context");

        assert!(wrapped.is_some());
        let infos = logger.infos();
        assert_eq!(infos.len(), 1);
        assert!(infos[0].contains("on_error callback panicked"));
        assert!(infos[0].contains("sentry unreachable"));
    }

    #[test]
    fn test_async_callback_panic_is_isolated() {
        let (tx, rx) = mpsc::channel::<String>();

        struct ChannelLogger(Mutex<mpsc::Sender<String>>);
        impl Logger for ChannelLogger {
            fn error(&self, _: &str, _: &Failure, _: &str, _: &Details, _: &str) {}
            fn info(&self, msg: &str) {
                let _ = self.0.lock().unwrap().send(msg.to_string());
            }
        }

        let handler = Handler::new(
            Config::default()
                .with_logger(ChannelLogger(Mutex::new(tx)))
                .with_async_callback(true)
                .with_on_error(|_| panic!("detached failure")),
        );

        assert!(handler.wrap(Some(io_error("test")), "context").is_some());

        let msg = rx.recv_timeout(Duration::from_secs(5)).expect("panic was not logged");
        assert!(msg.contains("detached failure"));
    }

    #[test]
    fn test_handlers_are_independent() {
        let a_calls = Arc::new(AtomicUsize::new(0));
        let a_calls_cb = Arc::clone(&a_calls);

        let a = Handler::new(Config::default().with_on_error(move |_| {
            a_calls_cb.fetch_add(1, Ordering::SeqCst);
        }));
        let b = Handler::new(Config::default().with_id_generator(|| "B-ID".to_string()));

        let from_b = b.wrap(Some(io_error("b")), "b").unwrap();
        assert_eq!(from_b.id(), "B-ID");
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);

        let from_a = a.wrap(Some(io_error("a")), "a").unwrap();
        assert!(is_well_formed(from_a.id()));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_database_failure_end_to_end() {
        let logger = RecordingLogger::shared();
        let handler = Handler::new(Config::default().with_shared_logger(logger.clone()));

        let wrapped = handler
            .wrap(Some(io_error("connection refused")), "database query failed")
            .unwrap();

        assert_eq!(
            wrapped.to_string(),
            format!("[{}] database query failed: connection refused", wrapped.id())
        );
        assert_eq!(logger.errors()[0].error_id, wrapped.id());
    }

    #[test]
    fn test_concurrent_wraps_share_handler() {
        let logger = RecordingLogger::shared();
        let handler = Handler::new(Config::default().with_shared_logger(logger.clone()));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let handler = handler.clone();
                std::thread::spawn(move || {
                    for j in 0..25 {
                        handler.wrap(Some(io_error(&format!("{}-{}", i, j))), "worker");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(logger.errors().len(), 200);
    }

    #[test_log::test]
    fn test_default_tracing_logger() {
        let handler = Handler::new(Config::default());
        assert!(handler.wrap(Some(io_error("traced")), "tracing sink").is_some());
    }
}
