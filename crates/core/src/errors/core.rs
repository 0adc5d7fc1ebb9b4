use thiserror::Error;

use crate::config::ConfigError;

/// Boxed error returned by service factories.
///
/// Anything implementing `std::error::Error` converts into it with `?`, including
/// [`CoreError`] raised by a nested `resolve` call.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Core error type for scopewise
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid container configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Service not registered: {service}")]
    UnregisteredService { service: String },

    #[error("Factory for '{service}' failed: {source}")]
    Factory { service: String, source: BoxError },

    #[error("Circular dependency detected: {path} (cycle at: {cycle_service})")]
    CyclicDependency { path: String, cycle_service: String },

    #[error("Service '{service}' is poisoned by an earlier failed initialization: {message}")]
    PoisonedService { service: String, message: String },

    #[error("Service '{service}' did not produce an instance of '{expected}'")]
    TypeMismatch { service: String, expected: String },

    #[error("Container {container} has been disposed")]
    ContainerDisposed { container: String },

    #[error("Disposing '{service}' failed ({failures} failure(s), {remaining} left undisposed): {source}")]
    DisposalFailed {
        service: String,
        remaining: usize,
        failures: usize,
        source: Box<CoreError>,
    },

    #[error("Disposal error: {message}")]
    Disposal { message: String },
}

impl CoreError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new unregistered service error
    pub fn unregistered(service: impl Into<String>) -> Self {
        Self::UnregisteredService {
            service: service.into(),
        }
    }

    /// Create an error for a disposable's release routine to return
    pub fn disposal(message: impl Into<String>) -> Self {
        Self::Disposal {
            message: message.into(),
        }
    }

    /// Create a container disposed error
    pub fn container_disposed(container: impl std::fmt::Display) -> Self {
        Self::ContainerDisposed {
            container: container.to_string(),
        }
    }

    /// Turn an error returned by a factory into the error surfaced by `resolve`.
    ///
    /// Container errors pass through untouched so that, for example, a nested
    /// unregistered dependency is reported as such rather than as a factory failure.
    pub(crate) fn from_factory(service: &str, error: BoxError) -> Self {
        match error.downcast::<CoreError>() {
            Ok(core) => *core,
            Err(source) => Self::Factory {
                service: service.to_string(),
                source,
            },
        }
    }

    /// Check if the error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Config(_))
    }

    /// Check if the error reports an unregistered service
    pub fn is_unregistered(&self) -> bool {
        matches!(self, Self::UnregisteredService { .. })
    }

    /// Check if the error is a propagated factory failure
    pub fn is_factory(&self) -> bool {
        matches!(self, Self::Factory { .. })
    }

    /// Check if the error reports a dependency cycle
    pub fn is_cyclic(&self) -> bool {
        matches!(self, Self::CyclicDependency { .. })
    }

    /// Check if the error comes from a disposed container
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::ContainerDisposed { .. })
    }
}
