//! `run` command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use contracts::ForwarderSettings;

use crate::cli::RunArgs;
use crate::pipeline::{InputSource, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_forwarder(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    // Validate config path
    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    // Load and parse configuration
    let mut settings = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(ref server) = args.server {
        info!(server = %server, "Overriding broker URL from CLI");
        settings.mqtt.server = server.clone();
    }
    if let Some(ref client_id) = args.client_id {
        info!(client_id = %client_id, "Overriding client id from CLI");
        settings.mqtt.client_id = client_id.clone();
    }
    config_loader::ConfigLoader::validate(&settings)
        .context("Configuration invalid after CLI overrides")?;

    info!(
        server = %settings.mqtt.server,
        client_id = %settings.mqtt.client_id,
        event_topic = %settings.mqtt.event_topic,
        metadata = %settings.metadata.uri,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&settings);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        settings,
        input: input_source(args),
        max_events: if args.max_events == 0 {
            None
        } else {
            Some(args.max_events)
        },
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        buffer_size: args.buffer_size,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    // Signals stop intake and interrupt retry waits; the pipeline still
    // closes the dispatcher before returning.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, stopping forwarder...");
        signal_token.cancel();
    });

    info!("Starting forwarder...");
    let stats = pipeline
        .run(shutdown)
        .await
        .context("Forwarder execution failed")?;

    info!(
        events = stats.events_received,
        delivered = stats.dispatch.delivered,
        devices = stats.dispatch.devices_detected,
        duration_secs = stats.duration.as_secs_f64(),
        "Forwarder finished"
    );
    stats.print_summary();

    Ok(())
}

fn input_source(args: &RunArgs) -> InputSource {
    if args.mock {
        return InputSource::Mock {
            devices: args.mock_devices.clone(),
            rate_hz: args.mock_rate,
        };
    }

    match args.input.as_deref() {
        None => InputSource::Stdin,
        Some(path) if path == Path::new("-") => InputSource::Stdin,
        Some(path) => InputSource::File(path.to_path_buf()),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(settings: &ForwarderSettings) {
    let mqtt = &settings.mqtt;
    let dispatch = &settings.dispatch;

    println!("\n=== Configuration Summary ===\n");
    println!("Broker:");
    println!("  Server: {}", mqtt.server);
    println!("  Client id: {}", mqtt.client_id);
    if !mqtt.user_name.is_empty() {
        println!("  User: {}", mqtt.user_name);
    }
    if mqtt.cert_file.is_some() {
        println!("  Client certificate: configured");
    }

    println!("\nTopics:");
    println!("  Events: {}", mqtt.event_topic);
    println!("  New devices: {}", mqtt.new_device_topic);
    println!("  Commands: {}", mqtt.command_topic);

    println!("\nServices:");
    println!("  Metadata: {}", settings.metadata.uri);
    match &settings.core_data {
        Some(core_data) => println!("  Core data: {}", core_data.uri),
        None => println!("  Core data: (none, events are not marked pushed)"),
    }

    println!("\nDispatch:");
    println!("  Queue capacity: {}", dispatch.queue_capacity);
    println!("  Retry wait: {} ms", dispatch.send_failure_wait_ms);
    match dispatch.retry.max_attempts {
        Some(max) => println!("  Max attempts: {}", max),
        None => println!("  Max attempts: unbounded"),
    }

    println!();
}
