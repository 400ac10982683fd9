//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::ForwarderSettings;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    broker: BrokerInfo,
    topics: TopicInfo,
    metadata_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    core_data_uri: Option<String>,
    dispatch: DispatchInfo,
}

#[derive(Serialize)]
struct BrokerInfo {
    server: String,
    client_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'static str>,
    client_certificate: bool,
    keep_alive_secs: u64,
}

#[derive(Serialize)]
struct TopicInfo {
    events: String,
    new_devices: String,
    commands: String,
}

#[derive(Serialize)]
struct DispatchInfo {
    queue_capacity: usize,
    send_failure_wait_ms: u64,
    backoff_multiplier: f64,
    max_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_cache_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dead_letter_path: Option<String>,
    pretty_json: bool,
}

const MASK: &str = "********";

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let settings = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&settings);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&settings);
    }

    Ok(())
}

fn build_config_info(settings: &ForwarderSettings) -> ConfigInfo {
    let mqtt = &settings.mqtt;
    let dispatch = &settings.dispatch;

    ConfigInfo {
        broker: BrokerInfo {
            server: mqtt.server.clone(),
            client_id: mqtt.client_id.clone(),
            user_name: mqtt.user_name.clone(),
            password: (!mqtt.password.is_empty()).then_some(MASK),
            client_certificate: mqtt.cert_file.is_some(),
            keep_alive_secs: mqtt.keep_alive_secs,
        },
        topics: TopicInfo {
            events: mqtt.event_topic.clone(),
            new_devices: mqtt.new_device_topic.clone(),
            commands: mqtt.command_topic.clone(),
        },
        metadata_uri: settings.metadata.uri.clone(),
        core_data_uri: settings.core_data.as_ref().map(|c| c.uri.clone()),
        dispatch: DispatchInfo {
            queue_capacity: dispatch.queue_capacity,
            send_failure_wait_ms: dispatch.send_failure_wait_ms,
            backoff_multiplier: dispatch.retry.backoff_multiplier,
            max_interval_ms: dispatch.retry.max_interval_ms,
            max_attempts: dispatch.retry.max_attempts,
            device_cache_capacity: dispatch.device_cache_capacity,
            dead_letter_path: dispatch
                .dead_letter_path
                .as_ref()
                .map(|p| p.display().to_string()),
            pretty_json: dispatch.pretty_json,
        },
    }
}

fn print_config_info(settings: &ForwarderSettings) {
    let mqtt = &settings.mqtt;
    let dispatch = &settings.dispatch;

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Cloud Forwarder Configuration                  ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 Broker");
    println!("   ├─ Server: {}", mqtt.server);
    println!("   ├─ Client id: {}", mqtt.client_id);
    if !mqtt.user_name.is_empty() {
        println!("   ├─ User: {}", mqtt.user_name);
    }
    if !mqtt.password.is_empty() {
        println!("   ├─ Password: {}", MASK);
    }
    println!(
        "   ├─ Client certificate: {}",
        if mqtt.cert_file.is_some() { "yes" } else { "no" }
    );
    println!("   └─ Keep alive: {}s", mqtt.keep_alive_secs);

    println!("\n🔀 Topics");
    println!("   ├─ Events: {}", mqtt.event_topic);
    println!("   ├─ New devices: {}", mqtt.new_device_topic);
    println!("   └─ Commands: {}", mqtt.command_topic);

    println!("\n🌐 Services");
    println!("   ├─ Metadata: {}", settings.metadata.uri);
    match &settings.core_data {
        Some(core_data) => println!("   └─ Core data: {}", core_data.uri),
        None => println!("   └─ Core data: (none)"),
    }

    println!("\n⚙️  Dispatch");
    println!("   ├─ Queue capacity: {}", dispatch.queue_capacity);
    println!(
        "   ├─ Retry: {} ms x{} (max {} ms)",
        dispatch.send_failure_wait_ms,
        dispatch.retry.backoff_multiplier,
        dispatch.retry.max_interval_ms
    );
    match dispatch.retry.max_attempts {
        Some(max) => println!("   ├─ Max attempts: {}", max),
        None => println!("   ├─ Max attempts: unbounded"),
    }
    match dispatch.device_cache_capacity {
        Some(capacity) => println!("   ├─ Device cache: {} (LRU)", capacity),
        None => println!("   ├─ Device cache: unbounded"),
    }
    match &dispatch.dead_letter_path {
        Some(path) => println!("   └─ Dead letters: {}", path.display()),
        None => println!("   └─ Dead letters: (none)"),
    }

    println!();
}
