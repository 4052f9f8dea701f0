//! Runtime configuration for the interviewer, loaded from the environment.

use interview_core::ResilienceSettings;
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub voice_api_key: Option<SecretString>,
    pub voice_base_url: Option<String>,
    pub feedback_api_url: Option<String>,
    pub feedback_api_token: Option<SecretString>,
    pub simulate: bool,
    pub log_level: Level,
    pub resilience: ResilienceSettings,
}

impl Config {
    /// Loads configuration from environment variables, reading `.env` first if present.
    ///
    /// *   `VOICE_API_KEY`: Key for the voice provider. Required unless simulating.
    /// *   `VOICE_BASE_URL`: (Optional) Override for the provider's websocket endpoint.
    /// *   `FEEDBACK_API_URL`: (Optional) Base URL of the feedback and identity service.
    /// *   `FEEDBACK_API_TOKEN`: (Optional) Bearer token for the feedback service.
    /// *   `SIMULATE_PROVIDER`: (Optional) "true" to use the in-process provider.
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    /// *   `MAX_RECONNECT_ATTEMPTS`, `MAX_EJECTION_RECONNECT_ATTEMPTS`,
    ///     `STALENESS_THRESHOLD_SECS`, `KEEP_ALIVE_SECS` (0 disables): resilience tuning.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let simulate = match non_empty("SIMULATE_PROVIDER") {
            Some(value) => parse_bool("SIMULATE_PROVIDER", &value)?,
            None => false,
        };

        let voice_api_key = non_empty("VOICE_API_KEY").map(SecretString::from);
        if voice_api_key.is_none() && !simulate {
            return Err(ConfigError::MissingVar(
                "VOICE_API_KEY must be set unless SIMULATE_PROVIDER=true".to_string(),
            ));
        }

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let mut resilience = ResilienceSettings::default();
        if let Some(value) = non_empty("MAX_RECONNECT_ATTEMPTS") {
            resilience = resilience.with_max_reconnect_attempts(parse("MAX_RECONNECT_ATTEMPTS", &value)?);
        }
        if let Some(value) = non_empty("MAX_EJECTION_RECONNECT_ATTEMPTS") {
            resilience = resilience.with_max_ejection_reconnect_attempts(parse(
                "MAX_EJECTION_RECONNECT_ATTEMPTS",
                &value,
            )?);
        }
        if let Some(value) = non_empty("STALENESS_THRESHOLD_SECS") {
            let secs: u64 = parse("STALENESS_THRESHOLD_SECS", &value)?;
            resilience = resilience.with_staleness_threshold(Duration::from_secs(secs));
        }
        if let Some(value) = non_empty("KEEP_ALIVE_SECS") {
            let secs: u64 = parse("KEEP_ALIVE_SECS", &value)?;
            let interval = (secs > 0).then(|| Duration::from_secs(secs));
            resilience = resilience.with_keep_alive(interval);
        }

        Ok(Self {
            voice_api_key,
            voice_base_url: non_empty("VOICE_BASE_URL"),
            feedback_api_url: non_empty("FEEDBACK_API_URL"),
            feedback_api_token: non_empty("FEEDBACK_API_TOKEN").map(SecretString::from),
            simulate,
            log_level,
            resilience,
        })
    }

    /// Connection settings for the voice provider client.
    pub fn voice_config(&self) -> Result<voice_realtime::Config, ConfigError> {
        let api_key = self
            .voice_api_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingVar("VOICE_API_KEY".to_string()))?;
        let mut builder = voice_realtime::Config::builder().with_api_key(api_key.expose_secret());
        if let Some(base_url) = &self.voice_base_url {
            builder = builder.with_base_url(base_url);
        }
        Ok(builder.build())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_voice_key_required_unless_simulating() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(_)));

        let config = Config::from_lookup(lookup(&[("SIMULATE_PROVIDER", "true")])).unwrap();
        assert!(config.simulate);
        assert!(config.voice_api_key.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("VOICE_API_KEY", "key")])).unwrap();
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.resilience, ResilienceSettings::default());
        assert!(config.feedback_api_url.is_none());
        assert!(!config.simulate);
    }

    #[test]
    fn test_resilience_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("VOICE_API_KEY", "key"),
            ("MAX_RECONNECT_ATTEMPTS", "7"),
            ("MAX_EJECTION_RECONNECT_ATTEMPTS", "1"),
            ("STALENESS_THRESHOLD_SECS", "45"),
            ("KEEP_ALIVE_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.resilience.connection_loss.max_attempts, 7);
        assert_eq!(config.resilience.ejection.max_attempts, 1);
        assert_eq!(config.resilience.staleness_threshold, Duration::from_secs(45));
        assert_eq!(config.resilience.keep_alive_interval, None);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = Config::from_lookup(lookup(&[
            ("VOICE_API_KEY", "key"),
            ("MAX_RECONNECT_ATTEMPTS", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "MAX_RECONNECT_ATTEMPTS"));

        let err = Config::from_lookup(lookup(&[("VOICE_API_KEY", "key"), ("RUST_LOG", "loud")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "RUST_LOG"));
    }

    #[test]
    fn test_voice_config_uses_base_url_override() {
        let config = Config::from_lookup(lookup(&[
            ("VOICE_API_KEY", "key"),
            ("VOICE_BASE_URL", "wss://voice.test/v1/"),
        ]))
        .unwrap();
        let voice = config.voice_config().unwrap();
        assert_eq!(voice.base_url(), "wss://voice.test/v1");
        assert_eq!(voice.api_key().expose_secret(), "key");
    }
}
