//! Controller agent configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use sb_protocol::DEFAULT_MAX_LINE_LENGTH;

use crate::ipc::DEFAULT_SEND_TIMEOUT;

use super::backend::BackendProfile;
use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Default IPC port of the controller agent
pub const DEFAULT_CONTROLLER_PORT: u16 = 7700;

/// Chat messages above this many characters are rejected downstream;
/// leave a little room for the relay's own decoration.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 1990;

/// Configuration for the controller agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Address the IPC listener binds to (localhost only)
    pub listen_address: String,

    /// Pre-shared secret checked during the handshake
    pub secret: String,

    /// The supervised game server
    pub backend: BackendProfile,

    /// Maximum characters per outbound log message when batching output
    pub max_message_len: usize,

    /// Maximum encoded line length accepted on the IPC channel
    pub max_line_length: usize,

    /// How often the drain loop checks whether a relay has connected
    #[serde(with = "duration_secs")]
    pub connection_poll_interval: Duration,

    /// How often `stop` polls the child for exit
    #[serde(with = "duration_secs")]
    pub stop_poll_interval: Duration,

    /// Deadline for a dialer to complete the handshake
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// How long one write may wait on a relay that is not reading
    #[serde(with = "duration_secs")]
    pub send_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("127.0.0.1:{}", DEFAULT_CONTROLLER_PORT),
            secret: String::new(),
            backend: BackendProfile::default(),
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            connection_poll_interval: Duration::from_secs(1),
            stop_poll_interval: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

impl ControllerConfig {
    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingField("secret".to_string()));
        }
        if self.backend.command.is_empty() {
            return Err(ConfigError::MissingField("backend.command".to_string()));
        }
        if self.max_message_len == 0 {
            return Err(ConfigError::Invalid(
                "max_message_len must be greater than zero".to_string(),
            ));
        }
        // Worst case: every char escapes to 4 UTF-8 bytes, plus the status prefix
        if self.max_message_len.saturating_mul(4).saturating_add(8) > self.max_line_length {
            return Err(ConfigError::Invalid(format!(
                "max_message_len {} does not fit in max_line_length {} (needs at most {})",
                self.max_message_len,
                self.max_line_length,
                self.max_line_length.saturating_sub(8) / 4
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.listen_address, "127.0.0.1:7700");
        assert_eq!(config.max_message_len, 1990);
        assert_eq!(config.connection_poll_interval, Duration::from_secs(1));
        assert_eq!(config.send_timeout, DEFAULT_SEND_TIMEOUT);
    }

    #[test]
    fn test_validate_requires_secret_and_command() {
        let mut config = ControllerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingField(f)) if f == "secret"));

        config.secret = "s3cret".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(f)) if f == "backend.command"
        ));

        config.backend = BackendProfile::minecraft("/opt/minecraft");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_message_len_fits_line() {
        let mut config = ControllerConfig {
            secret: "s3cret".to_string(),
            backend: BackendProfile::minecraft("/opt/minecraft"),
            ..ControllerConfig::default()
        };

        config.max_message_len = 100_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.max_message_len = 1990;
        config.max_line_length = 1990;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.max_line_length = 1990 * 4 + 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: ControllerConfig = toml::from_str(
            r#"
listen_address = "127.0.0.1:25580"
secret = "abc"
max_message_len = 500

[backend]
name = "Minecraft"
prefix = "mc"
command = ["java", "-jar", "server.jar", "nogui"]
working_dir = "/opt/minecraft"
whitelist = true
startup_timeout = 120
"#,
        )
        .unwrap();

        assert_eq!(config.listen_address, "127.0.0.1:25580");
        assert_eq!(config.max_message_len, 500);
        assert!(config.backend.whitelist);
        assert_eq!(config.backend.startup_timeout, Duration::from_secs(120));
        assert_eq!(config.stop_poll_interval, Duration::from_secs(1));
    }
}
