//! # Handler Configuration
//!
//! [`Config`] is the immutable bundle a [`Handler`](crate::Handler) is built
//! from. Capabilities (callback, logger, ID generator) are set in code;
//! the plain settings can also be loaded from a file and the environment via
//! [`Settings`].

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::envelope::ErrorWithId;
use crate::generator::{DefaultIdGenerator, IdGenerator, DEFAULT_PREFIX, DEFAULT_RANDOM_BYTES};
use crate::logging::{Logger, LoggingConfig};
use crate::types::Result;

/// Callback invoked for every wrapped error
pub type ErrorCallback = Arc<dyn Fn(&ErrorWithId) + Send + Sync>;

/// Deployment environment; controls how much error detail clients see
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    /// Clients only see the ID and a generic message
    #[default]
    Production,
    /// Clients see the full error text
    Development,
    /// Any other label (staging, test, ...); treated like production
    Other(String),
}

impl Environment {
    /// True only for the development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Environment::Production => "production",
            Environment::Development => "development",
            Environment::Other(name) => name,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "production" => Environment::Production,
            "development" => Environment::Development,
            other => Environment::Other(other.to_string()),
        })
    }
}

impl From<&str> for Environment {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(env) => env,
            Err(never) => match never {},
        }
    }
}

impl Serialize for Environment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Environment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Environment::from(s.as_str()))
    }
}

/// Configuration for an error handler
#[derive(Clone, Default)]
pub struct Config {
    /// Executed for every wrapped error, e.g. to forward it to an alerting
    /// service. Panics inside the callback are caught and logged.
    pub on_error: Option<ErrorCallback>,

    /// Run `on_error` detached from the caller instead of blocking it
    pub async_callback: bool,

    /// Sink for wrapped errors. `None` means the tracing logger.
    pub logger: Option<Arc<dyn Logger>>,

    /// Capture a stack trace for every wrapped error
    pub include_stack_trace: bool,

    /// Controls client-facing detail in HTTP error responses
    pub environment: Environment,

    /// ID source. `None` means [`DefaultIdGenerator`].
    pub id_generator: Option<Arc<dyn IdGenerator>>,
}

impl Config {
    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ErrorWithId) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn with_async_callback(mut self, async_callback: bool) -> Self {
        self.async_callback = async_callback;
        self
    }

    pub fn with_logger<L: Logger + 'static>(mut self, logger: L) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Uses an already shared logger, e.g. one a test keeps a handle to
    pub fn with_shared_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_stack_trace(mut self, include_stack_trace: bool) -> Self {
        self.include_stack_trace = include_stack_trace;
        self
    }

    pub fn with_environment<E: Into<Environment>>(mut self, environment: E) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, generator: G) -> Self {
        self.id_generator = Some(Arc::new(generator));
        self
    }

    /// Builds a config from loaded settings. Capabilities keep their defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        Config {
            async_callback: settings.async_callback,
            include_stack_trace: settings.include_stack_trace,
            environment: settings.environment.clone(),
            id_generator: Some(Arc::new(DefaultIdGenerator::new(
                settings.id_prefix.clone(),
                settings.id_random_bytes,
            ))),
            ..Config::default()
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("on_error", &self.on_error.as_ref().map(|_| "<callback>"))
            .field("async_callback", &self.async_callback)
            .field("logger", &self.logger.as_ref().map(|_| "<logger>"))
            .field("include_stack_trace", &self.include_stack_trace)
            .field("environment", &self.environment)
            .field("id_generator", &self.id_generator.as_ref().map(|_| "<generator>"))
            .finish()
    }
}

/// File and environment loadable settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub environment: Environment,
    pub async_callback: bool,
    pub include_stack_trace: bool,
    pub id_prefix: String,
    pub id_random_bytes: usize,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            async_callback: false,
            include_stack_trace: false,
            id_prefix: DEFAULT_PREFIX.to_string(),
            id_random_bytes: DEFAULT_RANDOM_BYTES,
            logging: LoggingConfig::default(),
        }
    }
}

impl TryFrom<config::Config> for Settings {
    type Error = config::ConfigError;

    fn try_from(cfg: config::Config) -> std::result::Result<Self, Self::Error> {
        // Start with defaults and override from config where present.
        let mut base = Settings::default();

        if let Some(environment) = optional::<String>(&cfg, "environment")? {
            base.environment = Environment::from(environment.as_str());
        }
        if let Some(async_callback) = optional::<bool>(&cfg, "async_callback")? {
            base.async_callback = async_callback;
        }
        if let Some(include_stack_trace) = optional::<bool>(&cfg, "include_stack_trace")? {
            base.include_stack_trace = include_stack_trace;
        }
        if let Some(prefix) = optional::<String>(&cfg, "id_prefix")? {
            base.id_prefix = prefix;
        }
        if let Some(random_bytes) = optional::<usize>(&cfg, "id_random_bytes")? {
            base.id_random_bytes = random_bytes;
        }
        base.logging = LoggingConfig::from_config(&cfg)?;

        Ok(base)
    }
}

/// Reads `key`, treating only a missing key as absent. A present value of
/// the wrong type is an error.
pub(crate) fn optional<T: DeserializeOwned>(
    cfg: &config::Config,
    key: &str,
) -> std::result::Result<Option<T>, config::ConfigError> {
    match cfg.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(config::ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl Settings {
    /// Loads settings from an optional file plus `ERROR_ID__*` environment
    /// variables, e.g. `ERROR_ID__ENVIRONMENT=development` or
    /// `ERROR_ID__LOGGING__LEVEL=debug`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("ERROR_ID")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(Settings::try_from(cfg)?)
    }
}
