use interview_service::config::{Config as SessionConfig, ConfigError};
use std::net::SocketAddr;

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Provider, feedback and resilience settings shared with the CLI.
    pub session: SessionConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// *   `BIND_ADDRESS`: The address and port to bind the server to. Defaults to "0.0.0.0:3000".
    ///
    /// Every variable read by the interviewer CLI applies here as well.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        Ok(Self {
            bind_address,
            session: SessionConfig::from_lookup(lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bind_address() {
        let config = Config::from_lookup(|key| {
            (key == "SIMULATE_PROVIDER").then(|| "true".to_string())
        })
        .unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert!(config.session.simulate);
    }

    #[test]
    fn test_invalid_bind_address() {
        let err = Config::from_lookup(|key| match key {
            "BIND_ADDRESS" => Some("not-an-address".to_string()),
            "SIMULATE_PROVIDER" => Some("true".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(key, _) if key == "BIND_ADDRESS"));
    }
}
