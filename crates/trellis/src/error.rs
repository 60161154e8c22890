//! Error handling types

use crate::key::ServiceKey;
use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// One failed teardown branch, reported after the sweep completes
#[derive(Debug)]
pub struct TeardownFailure {
    /// Key of the object whose disposal failed
    pub key: ServiceKey,
    /// Rendered failure
    pub message: String,
}

/// Main error type for the container
#[derive(Error, Debug)]
pub enum Error {
    /// No strategy produced a recipe for the requested key
    #[error("unresolvable service: no strategy produced a recipe for `{key}`")]
    UnresolvableService {
        /// The key that could not be resolved
        key: ServiceKey,
    },

    /// A route chain revisited a key already on the active resolution path
    #[error("route cycle detected: {path}")]
    RouteCycle {
        /// Rendered resolution path, oldest first
        path: String,
    },

    /// A required injection point had no resolvable value and no default
    #[error("missing required injection `{member}` on `{key}`: {source}")]
    MissingRequiredInjection {
        /// Name of the parameter or member
        member: &'static str,
        /// Type being constructed
        key: ServiceKey,
        /// Why resolution of the injection point failed
        #[source]
        source: Box<Error>,
    },

    /// A resolved constructor or factory itself failed
    #[error("construction of `{key}` failed: {source}")]
    ConstructionFailure {
        /// Type being constructed
        key: ServiceKey,
        /// The underlying failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An instance was supplied to a constructor thunk, or omitted for a method thunk
    #[error("invalid invocation: {message}")]
    InvalidInvocation {
        /// Description of the misuse
        message: String,
    },

    /// The key was deliberately registered as unsupported
    #[error("`{key}` is registered as unsupported: {reason}")]
    Unsupported {
        /// The stubbed key
        key: ServiceKey,
        /// Diagnostic supplied at registration
        reason: String,
    },

    /// Configuration-related error
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation attempted in the wrong container state
    #[error("lifecycle error: {message}")]
    Lifecycle {
        /// Description of the state violation
        message: String,
    },

    /// One or more owned objects failed to dispose during the teardown sweep
    #[error("teardown completed with {} failed branch(es)", failures.len())]
    Teardown {
        /// Per-branch failures, aggregated after the sweep
        failures: Vec<TeardownFailure>,
    },
}

impl Error {
    /// Create an unresolvable-service error
    pub fn unresolvable(key: ServiceKey) -> Self {
        Self::UnresolvableService { key }
    }

    /// Create a route-cycle error from the active path plus the revisited key
    pub fn route_cycle(path: &[ServiceKey], revisited: ServiceKey) -> Self {
        let mut rendered: Vec<&str> = path.iter().map(ServiceKey::name).collect();
        rendered.push(revisited.name());
        Self::RouteCycle {
            path: rendered.join(" -> "),
        }
    }

    /// Create a missing-required-injection error
    pub fn missing_injection(member: &'static str, key: ServiceKey, source: Error) -> Self {
        Self::MissingRequiredInjection {
            member,
            key,
            source: Box::new(source),
        }
    }

    /// Create a construction-failure error
    pub fn construction<E: std::error::Error + Send + Sync + 'static>(
        key: ServiceKey,
        source: E,
    ) -> Self {
        Self::ConstructionFailure {
            key,
            source: Box::new(source),
        }
    }

    /// Create an invalid-invocation error
    pub fn invalid_invocation<S: Into<String>>(message: S) -> Self {
        Self::InvalidInvocation {
            message: message.into(),
        }
    }

    /// Create a deliberately-unsupported error
    pub fn unsupported<S: Into<String>>(key: ServiceKey, reason: S) -> Self {
        Self::Unsupported {
            key,
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source<
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    >(
        message: S,
        source: E,
    ) -> Self {
        Self::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a lifecycle error
    pub fn lifecycle<S: Into<String>>(message: S) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }

    /// True if this is an `UnresolvableService` error
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::UnresolvableService { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn route_cycle_renders_full_path() {
        let a = ServiceKey::of::<Widget>();
        let err = Error::route_cycle(&[a, a], a);
        let rendered = err.to_string();
        assert!(rendered.contains("route cycle"));
        assert_eq!(rendered.matches("Widget").count(), 3);
    }

    #[test]
    fn missing_injection_carries_source() {
        let key = ServiceKey::of::<Widget>();
        let err = Error::missing_injection("label", key, Error::unresolvable(key));
        assert!(err.to_string().contains("label"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
