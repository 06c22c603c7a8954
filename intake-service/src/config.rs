use std::{path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_PORT: u16 = 5000;
const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 20;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_LITERATURE_TOP_K: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Service settings read from the environment at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub model: String,
    pub port: u16,
    pub extraction_timeout: Duration,
    /// Sessions idle for longer than this are evicted. `None` keeps them for the process lifetime.
    pub session_idle_ttl: Option<Duration>,
    pub session_sweep_interval: Duration,
    pub literature_path: Option<PathBuf>,
    pub literature_top_k: usize,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?;
        let model = get("INTAKE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let port = parse("PORT", get("PORT"))?.unwrap_or(DEFAULT_PORT);
        let extraction_timeout = parse::<u64>("EXTRACTION_TIMEOUT_SECS", get("EXTRACTION_TIMEOUT_SECS"))?
            .unwrap_or(DEFAULT_EXTRACTION_TIMEOUT_SECS);
        let session_idle_ttl = parse::<u64>("SESSION_IDLE_TTL_SECS", get("SESSION_IDLE_TTL_SECS"))?;
        let session_sweep_interval =
            parse::<u64>("SESSION_SWEEP_INTERVAL_SECS", get("SESSION_SWEEP_INTERVAL_SECS"))?
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        let literature_top_k = parse("LITERATURE_TOP_K", get("LITERATURE_TOP_K"))?
            .unwrap_or(DEFAULT_LITERATURE_TOP_K);

        if extraction_timeout == 0 {
            return Err(invalid("EXTRACTION_TIMEOUT_SECS", "0", "must be positive"));
        }
        if session_sweep_interval == 0 {
            return Err(invalid("SESSION_SWEEP_INTERVAL_SECS", "0", "must be positive"));
        }

        Ok(Self {
            api_key,
            model,
            port,
            extraction_timeout: Duration::from_secs(extraction_timeout),
            session_idle_ttl: session_idle_ttl.map(Duration::from_secs),
            session_sweep_interval: Duration::from_secs(session_sweep_interval),
            literature_path: get("LITERATURE_PATH").map(PathBuf::from),
            literature_top_k,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse<T>(key: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| invalid(key, &raw, e.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = config(&[("OPENROUTER_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.port, 5000);
        assert_eq!(config.extraction_timeout, Duration::from_secs(20));
        assert_eq!(config.session_idle_ttl, None);
        assert_eq!(config.session_sweep_interval, Duration::from_secs(60));
        assert_eq!(config.literature_path, None);
        assert_eq!(config.literature_top_k, 5);
    }

    #[test]
    fn api_key_is_required() {
        assert_eq!(
            config(&[]).unwrap_err(),
            ConfigError::Missing("OPENROUTER_API_KEY")
        );
        assert_eq!(
            config(&[("OPENROUTER_API_KEY", "  ")]).unwrap_err(),
            ConfigError::Missing("OPENROUTER_API_KEY")
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("INTAKE_MODEL", "anthropic/claude-3.5-haiku"),
            ("PORT", "8080"),
            ("EXTRACTION_TIMEOUT_SECS", "5"),
            ("SESSION_IDLE_TTL_SECS", "3600"),
            ("LITERATURE_PATH", "/data/passages.json"),
            ("LITERATURE_TOP_K", "3"),
        ])
        .unwrap();
        assert_eq!(config.model, "anthropic/claude-3.5-haiku");
        assert_eq!(config.port, 8080);
        assert_eq!(config.extraction_timeout, Duration::from_secs(5));
        assert_eq!(config.session_idle_ttl, Some(Duration::from_secs(3600)));
        assert_eq!(
            config.literature_path,
            Some(PathBuf::from("/data/passages.json"))
        );
        assert_eq!(config.literature_top_k, 3);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config(&[("OPENROUTER_API_KEY", "sk-test"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));

        let err = config(&[
            ("OPENROUTER_API_KEY", "sk-test"),
            ("EXTRACTION_TIMEOUT_SECS", "0"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "EXTRACTION_TIMEOUT_SECS",
                ..
            }
        ));
    }
}
