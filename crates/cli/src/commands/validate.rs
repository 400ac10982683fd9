//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::ForwarderSettings;
use serde::Serialize;
use tracing::info;
use transport::BrokerEndpoint;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    server: String,
    client_id: String,
    event_topic: String,
    new_device_topic: String,
    metadata_uri: String,
    core_data_configured: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(settings) => {
            let warnings = collect_warnings(&settings);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    server: settings.mqtt.server.clone(),
                    client_id: settings.mqtt.client_id.clone(),
                    event_topic: settings.mqtt.event_topic.clone(),
                    new_device_topic: settings.mqtt.new_device_topic.clone(),
                    metadata_uri: settings.metadata.uri.clone(),
                    core_data_configured: settings.core_data.is_some(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(settings: &ForwarderSettings) -> Vec<String> {
    let mut warnings = Vec::new();
    let mqtt = &settings.mqtt;
    let dispatch = &settings.dispatch;

    if settings.core_data.is_none() {
        warnings.push("No core_data configured - events will not be marked pushed".to_string());
    }

    let tls = BrokerEndpoint::parse(&mqtt.server)
        .map(|endpoint| endpoint.tls)
        .unwrap_or(false);
    if !tls {
        if !mqtt.password.is_empty() {
            warnings.push(format!(
                "Credentials are sent in clear text to {}",
                mqtt.server
            ));
        }
        if mqtt.cert_file.is_some() || mqtt.ca_file.is_some() {
            warnings.push("TLS files are ignored on a plain connection".to_string());
        }
    } else if mqtt.cert_file.is_some() && mqtt.ca_file.is_none() {
        warnings.push("mqtt.ca_file is required when a client certificate is used".to_string());
    }

    if dispatch.dead_letter_path.is_some() && dispatch.retry.max_attempts.is_none() {
        warnings.push(
            "dispatch.dead_letter_path is set but retries are unbounded - nothing will be dead-lettered"
                .to_string(),
        );
    }

    if dispatch.retry.max_attempts.is_some() && dispatch.dead_letter_path.is_none() {
        warnings.push(
            "dispatch.retry.max_attempts without dead_letter_path - exhausted events are dropped"
                .to_string(),
        );
    }

    if let Some(capacity) = dispatch.device_cache_capacity {
        warnings.push(format!(
            "Device cache holds {} devices - evicted devices are announced again",
            capacity
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Broker: {}", summary.server);
            println!("  Client id: {}", summary.client_id);
            println!("  Event topic: {}", summary.event_topic);
            println!("  New device topic: {}", summary.new_device_topic);
            println!("  Metadata: {}", summary.metadata_uri);
            println!(
                "  Core data: {}",
                if summary.core_data_configured {
                    "configured"
                } else {
                    "none"
                }
            );
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
