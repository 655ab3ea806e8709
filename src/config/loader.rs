//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::GuardConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
///
/// A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<GuardConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        GuardConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the supported environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut GuardConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("REDIS_URL") {
        config.store.url = url;
    }

    let rl = &mut config.rate_limit;
    override_parsed(&lookup, "RATE_LIMIT_ANON", &mut rl.anonymous.limit);
    override_parsed(&lookup, "RATE_LIMIT_ANON_WINDOW", &mut rl.anonymous.window_secs);
    override_parsed(&lookup, "RATE_LIMIT_AUTH", &mut rl.authenticated.limit);
    override_parsed(&lookup, "RATE_LIMIT_AUTH_WINDOW", &mut rl.authenticated.window_secs);
    override_parsed(&lookup, "RATE_LIMIT_SENSITIVE", &mut rl.sensitive.limit);
    override_parsed(&lookup, "RATE_LIMIT_SENSITIVE_WINDOW", &mut rl.sensitive.window_secs);
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(variable = key, value = %raw, "Ignoring unparseable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REDIS_URL", "redis://cache:6379/2"),
            ("RATE_LIMIT_ANON", "5"),
            ("RATE_LIMIT_SENSITIVE_WINDOW", "120"),
            ("RATE_LIMIT_AUTH", "lots"),
        ]
        .into_iter()
        .collect();

        let mut config = GuardConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.store.url, "redis://cache:6379/2");
        assert_eq!(config.rate_limit.anonymous.limit, 5);
        assert_eq!(config.rate_limit.sensitive.window_secs, 120);
        assert_eq!(config.rate_limit.authenticated.limit, 100);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join("admission_guard_loader_test.toml");
        fs::write(&path, "[rate_limit]\nanonymous = { limit = 7, window_secs = 14 }\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.rate_limit.anonymous.limit, 7);
        assert_eq!(config.rate_limit.anonymous.window_secs, 14);

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = std::env::temp_dir().join("admission_guard_invalid_test.toml");
        fs::write(&path, "[cache]\nfailure_threshold = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("cache.failure_threshold"));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
