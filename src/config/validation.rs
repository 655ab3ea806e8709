//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits, windows, thresholds, timeouts > 0)
//! - Check URLs and addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GuardConfig, LimitConfig, StoreBackend, ADMIN_KEY_PLACEHOLDER};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.store.backend == StoreBackend::Redis {
        match url::Url::parse(&config.store.url) {
            Ok(u) if u.scheme() == "redis" || u.scheme() == "rediss" => {}
            Ok(u) => errors.push(ValidationError::new(
                "store.url",
                format!("unsupported scheme '{}', expected redis or rediss", u.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("store.url", e.to_string())),
        }
    }
    if config.store.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("store.connect_timeout_ms", "must be greater than 0"));
    }
    if config.store.command_timeout_ms == 0 {
        errors.push(ValidationError::new("store.command_timeout_ms", "must be greater than 0"));
    }

    if config.cache.failure_threshold == 0 {
        errors.push(ValidationError::new("cache.failure_threshold", "must be at least 1"));
    }

    let rl = &config.rate_limit;
    check_limit(&mut errors, "rate_limit.anonymous", rl.anonymous);
    check_limit(&mut errors, "rate_limit.authenticated", rl.authenticated);
    check_limit(&mut errors, "rate_limit.sensitive", rl.sensitive);
    for (field, paths) in [
        ("rate_limit.protected_paths", &rl.protected_paths),
        ("rate_limit.sensitive_paths", &rl.sensitive_paths),
    ] {
        for path in paths.iter().filter(|p| !p.starts_with('/')) {
            errors.push(ValidationError::new(field, format!("'{path}' must start with '/'")));
        }
    }
    if rl.credential_headers.iter().any(|h| axum::http::HeaderName::try_from(h.as_str()).is_err()) {
        errors.push(ValidationError::new("rate_limit.credential_headers", "contains an invalid header name"));
    }

    for (name, breaker) in &config.breakers {
        if breaker.failure_threshold == 0 {
            errors.push(ValidationError::new(
                format!("breakers.{name}.failure_threshold"),
                "must be at least 1",
            ));
        }
    }

    if let Err(e) = url::Url::parse(&config.upstream.base_url) {
        errors.push(ValidationError::new("upstream.base_url", e.to_string()));
    }
    if config.upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }
    let retry = &config.upstream.retry;
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("upstream.retry.max_attempts", "must be at least 1"));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "upstream.retry.max_delay_ms",
            "must not be less than base_delay_ms",
        ));
    }

    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER {
            errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_limit(errors: &mut Vec<ValidationError>, field: &str, limit: LimitConfig) {
    if limit.limit == 0 {
        errors.push(ValidationError::new(format!("{field}.limit"), "must be at least 1"));
    }
    if limit.window_secs == 0 {
        errors.push(ValidationError::new(format!("{field}.window_secs"), "must be at least 1"));
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{value}' is not a socket address")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BreakerConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GuardConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GuardConfig::default();
        config.rate_limit.anonymous = LimitConfig::new(0, 0);
        config.rate_limit.protected_paths.push("api".into());
        config.store.url = "http://localhost:6379".into();
        config.upstream.retry.max_attempts = 0;
        config.breakers.insert(
            "upstream".into(),
            BreakerConfig {
                failure_threshold: 0,
                ..BreakerConfig::default()
            },
        );

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"rate_limit.anonymous.limit"));
        assert!(fields.contains(&"rate_limit.anonymous.window_secs"));
        assert!(fields.contains(&"rate_limit.protected_paths"));
        assert!(fields.contains(&"store.url"));
        assert!(fields.contains(&"breakers.upstream.failure_threshold"));
        assert!(fields.contains(&"upstream.retry.max_attempts"));
    }

    #[test]
    fn test_admin_requires_real_key() {
        let mut config = GuardConfig::default();
        config.admin.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "admin.api_key: must be set when admin is enabled");

        config.admin.api_key = "s3cret".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_memory_backend_skips_url_check() {
        let mut config = GuardConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.store.url = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
