//! Relay client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use sb_protocol::DEFAULT_MAX_LINE_LENGTH;

use crate::ipc::DEFAULT_SEND_TIMEOUT;

use super::controller::DEFAULT_CONTROLLER_PORT;
use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// One controller agent the relay dials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayBackend {
    /// Display name used in connectivity notices ("Minecraft")
    pub name: String,

    /// Chat prefix routed to this backend ("mc" for `!mc`)
    pub prefix: String,

    /// Controller agent address
    pub address: String,
}

/// Configuration for the relay client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Pre-shared secret checked during the handshake
    pub secret: String,

    /// Fixed delay between reconnect attempts
    #[serde(with = "duration_secs")]
    pub reconnect_interval: Duration,

    /// Deadline for the listener to complete the handshake
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// How long one write may wait on a controller that is not reading
    #[serde(with = "duration_secs")]
    pub send_timeout: Duration,

    /// Maximum encoded line length accepted on the IPC channel
    pub max_line_length: usize,

    /// Controller agents to dial
    pub backends: Vec<RelayBackend>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            reconnect_interval: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            backends: vec![RelayBackend {
                name: "Minecraft".to_string(),
                prefix: "mc".to_string(),
                address: format!("127.0.0.1:{}", DEFAULT_CONTROLLER_PORT),
            }],
        }
    }
}

impl RelayConfig {
    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingField("secret".to_string()));
        }
        if self.backends.is_empty() {
            return Err(ConfigError::MissingField("backends".to_string()));
        }
        for (i, backend) in self.backends.iter().enumerate() {
            if backend.prefix.is_empty() || backend.prefix.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "backend #{} has an invalid prefix {:?}",
                    i, backend.prefix
                )));
            }
            if self.backends[..i].iter().any(|b| b.prefix == backend.prefix) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate backend prefix {:?}",
                    backend.prefix
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.reconnect_interval, Duration::from_secs(10));
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].prefix, "mc");
    }

    #[test]
    fn test_parse_multiple_backends() {
        let config: RelayConfig = toml::from_str(
            r#"
secret = "abc"
reconnect_interval = 5

[[backends]]
name = "Minecraft"
prefix = "mc"
address = "127.0.0.1:7700"

[[backends]]
name = "Terraria"
prefix = "te"
address = "127.0.0.1:7701"
"#,
        )
        .unwrap();

        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[1].name, "Terraria");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_prefix() {
        let mut config = RelayConfig {
            secret: "abc".to_string(),
            ..RelayConfig::default()
        };
        let dup = config.backends[0].clone();
        config.backends.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
