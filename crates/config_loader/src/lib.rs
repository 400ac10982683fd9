//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `ForwarderSettings`
//!
//! A missing required key surfaces as an error here; the binary treats it as
//! fatal at startup.
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("forwarder.toml")).unwrap();
//! println!("Broker: {}", settings.mqtt.server);
//! ```

mod parser;
mod validator;

pub use contracts::ForwarderSettings;
pub use parser::ConfigFormat;
pub use validator::{PLAIN_SCHEMES, TLS_SCHEMES};

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure (including missing required keys)
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ForwarderSettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ForwarderSettings, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Re-run validation, e.g. after CLI overrides were applied
    pub fn validate(settings: &ForwarderSettings) -> Result<(), ContractError> {
        validator::validate(settings)
    }

    /// Serialize ForwarderSettings to TOML string
    pub fn to_toml(settings: &ForwarderSettings) -> Result<String, ContractError> {
        toml::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ForwarderSettings to JSON string
    pub fn to_json(settings: &ForwarderSettings) -> Result<String, ContractError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ForwarderSettings, ContractError> {
        let settings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[mqtt]
server = "tls://broker.example.com:8883"
client_id = "gateway-01"
user_name = "gateway"
password = "secret"
event_topic = "edge/events"
new_device_topic = "edge/devices"
command_topic = "edge/commands"

[metadata]
uri = "http://localhost:48081"

[core_data]
uri = "http://localhost:48080"

[dispatch]
queue_capacity = 32
device_cache_capacity = 1024

[dispatch.retry]
backoff_multiplier = 2.0
max_attempts = 10
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let settings = result.unwrap();
        assert_eq!(settings.mqtt.event_topic, "edge/events");
        assert_eq!(settings.dispatch.queue_capacity, 32);
        assert_eq!(settings.dispatch.device_cache_capacity, Some(1024));
        assert_eq!(settings.dispatch.retry.max_attempts, Some(10));
    }

    #[test]
    fn test_round_trip_toml() {
        let settings = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&settings).unwrap();
        let settings2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(settings.mqtt.server, settings2.mqtt.server);
        assert_eq!(
            settings.dispatch.retry.backoff_multiplier,
            settings2.dispatch.retry.backoff_multiplier
        );
    }

    #[test]
    fn test_round_trip_json() {
        let settings = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&settings).unwrap();
        let settings2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(settings.mqtt.client_id, settings2.mqtt.client_id);
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = MINIMAL_TOML.replace("edge/devices", "edge/events");
        let result = ConfigLoader::load_from_str(&content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let settings = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(settings.mqtt.client_id, "gateway-01");
    }

    #[test]
    fn test_example_config_is_valid() {
        let content = include_str!("../../../config/forwarder.example.toml");
        let settings = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        assert_eq!(settings.dispatch.queue_capacity, 16);
        assert!(settings.core_data.is_some());
    }

    #[test]
    fn test_load_from_path_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }
}
