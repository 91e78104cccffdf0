//! Logging backends
//!
//! Output format is chosen by name at startup. A process-wide registry maps
//! backend names to factories that build a `tracing` subscriber from an
//! [`EnvFilter`]. `pretty`, `compact` and `json` are registered out of the
//! box; embedders can add their own with [`register_backend`] before calling
//! [`init_tracing`].

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;

pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync + 'static>;

/// Builds a subscriber honouring the given filter
pub type LogBackendFactory = fn(EnvFilter) -> BoxedSubscriber;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("logging backend name must not be empty")]
    EmptyName,

    #[error("logging backend {0:?} is already registered")]
    DuplicateBackend(String),

    #[error("unknown logging backend {0:?}")]
    UnknownBackend(String),

    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("logging backend registry is poisoned")]
    Poisoned,

    #[error("global subscriber already installed: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

static BACKENDS: LazyLock<RwLock<HashMap<String, LogBackendFactory>>> = LazyLock::new(|| {
    let mut backends: HashMap<String, LogBackendFactory> = HashMap::new();
    backends.insert("pretty".to_string(), pretty);
    backends.insert("compact".to_string(), compact);
    backends.insert("json".to_string(), json);
    RwLock::new(backends)
});

fn pretty(filter: EnvFilter) -> BoxedSubscriber {
    Box::new(
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .finish(),
    )
}

fn compact(filter: EnvFilter) -> BoxedSubscriber {
    Box::new(
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .finish(),
    )
}

fn json(filter: EnvFilter) -> BoxedSubscriber {
    Box::new(
        tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .finish(),
    )
}

/// Register a named backend. Names are case-sensitive and unique.
pub fn register_backend(name: &str, factory: LogBackendFactory) -> Result<(), TelemetryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TelemetryError::EmptyName);
    }

    let mut backends = BACKENDS.write().map_err(|_| TelemetryError::Poisoned)?;
    if backends.contains_key(name) {
        return Err(TelemetryError::DuplicateBackend(name.to_string()));
    }

    backends.insert(name.to_string(), factory);
    Ok(())
}

/// Sorted names of all registered backends
pub fn registered_backends() -> Vec<String> {
    let mut names: Vec<String> = BACKENDS
        .read()
        .map(|backends| backends.keys().cloned().collect())
        .unwrap_or_default();
    names.sort();
    names
}

/// Build, without installing, the subscriber for `backend`
pub fn build_subscriber(backend: &str, filter: &str) -> Result<BoxedSubscriber, TelemetryError> {
    let factory = {
        let backends = BACKENDS.read().map_err(|_| TelemetryError::Poisoned)?;
        *backends
            .get(backend.trim())
            .ok_or_else(|| TelemetryError::UnknownBackend(backend.to_string()))?
    };

    let filter = EnvFilter::try_new(filter)?;
    Ok(factory(filter))
}

/// Install `backend` as the global subscriber. Call once at startup.
pub fn init_tracing(backend: &str, filter: &str) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(backend, filter)?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
