//! Error type shared by every layer of the load balancer.

/// Result type for load balancer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by resolvers, the pool cache, selectors and the load balancer.
///
/// The type is `Clone` so that one in-flight resolution can hand the same
/// outcome to every caller waiting on it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The caller supplied an unusable argument, such as an empty service name.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The load balancer could not be constructed from the given settings.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Discovery returned no addresses and no usable stale pool exists.
    #[error("no addresses found for service {service}")]
    NotFound {
        /// The service that was looked up.
        service: String,
    },

    /// Discovery failed (transport error, malformed response or timeout).
    #[error("failed to resolve service {service}: {reason}")]
    ResolutionFailure {
        /// The service that was looked up.
        service: String,
        /// Description of the underlying failure.
        reason: String,
    },

    /// A selector was handed a pool without addresses.
    #[error("address pool for service {service} is empty")]
    EmptyPool {
        /// The service whose pool was empty.
        service: String,
    },
}

impl Error {
    pub(crate) fn not_found(service: &str) -> Self {
        Self::NotFound {
            service: service.to_string(),
        }
    }

    pub(crate) fn resolution_failure(service: &str, reason: impl std::fmt::Display) -> Self {
        Self::ResolutionFailure {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn empty_pool(service: &str) -> Self {
        Self::EmptyPool {
            service: service.to_string(),
        }
    }

    /// Returns `true` for the discovery outcomes a stale pool may stand in for.
    #[must_use]
    pub fn is_discovery_failure(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ResolutionFailure { .. })
    }
}

/// Rejects empty service names before any lookup is attempted.
pub(crate) fn validate_service_name(service: &str) -> Result<()> {
    if service.is_empty() {
        return Err(Error::InvalidInput("service name must not be empty".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_service_name_is_invalid_input() {
        assert!(matches!(
            validate_service_name(""),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn non_empty_service_name_is_accepted() {
        assert!(validate_service_name("web.service.consul").is_ok());
    }

    #[test]
    fn discovery_failures_are_classified() {
        assert!(Error::not_found("svc").is_discovery_failure());
        assert!(Error::resolution_failure("svc", "timed out").is_discovery_failure());
        assert!(!Error::empty_pool("svc").is_discovery_failure());
        assert!(!Error::InvalidInput("x".into()).is_discovery_failure());
    }

    #[test]
    fn display_includes_service_and_reason() {
        let err = Error::resolution_failure("web", "connection refused");
        assert_eq!(
            err.to_string(),
            "failed to resolve service web: connection refused"
        );
    }
}
