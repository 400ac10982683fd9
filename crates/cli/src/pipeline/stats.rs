//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::DeliveryAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Events taken from the input
    pub events_received: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Input label (stdin, file path or mock)
    pub source: String,

    /// Whether the run ended on its timeout
    pub timed_out: bool,

    /// Per-event delivery outcomes
    pub delivery: DeliveryAggregator,

    /// Final dispatcher counters
    pub dispatch: dispatcher::MetricsSnapshot,

    /// Final ingestion counters
    pub ingestion: ingestion::MetricsSnapshot,
}

impl PipelineStats {
    /// Calculate events per second throughput
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_received as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Forwarder Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Source: {}", self.source);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Events received: {}", self.events_received);
        println!("   ├─ Events/s: {:.2}", self.events_per_sec());
        println!("   ├─ Malformed input lines: {}", self.ingestion.parse_errors);
        println!("   └─ Timed out: {}", self.timed_out);

        let dispatch = &self.dispatch;
        println!("\n📤 Dispatch");
        println!("   ├─ Delivered: {}", dispatch.delivered);
        println!(
            "   ├─ Send attempts: {} ({} failed)",
            dispatch.send_attempts, dispatch.send_failures
        );
        println!("   ├─ Encode failures: {}", dispatch.encode_failures);
        println!("   ├─ Dead-lettered: {}", dispatch.dead_lettered);
        println!("   ├─ Cancelled: {}", dispatch.cancelled);
        println!("   ├─ Mark-pushed failures: {}", dispatch.mark_pushed_failures);
        println!("   ├─ Devices detected: {}", dispatch.devices_detected);
        println!("   └─ Announcement failures: {}", dispatch.notify_failures);

        let summary = self.delivery.summary();
        println!("\n📈 Delivery");
        println!("   ├─ Delivery rate: {:.2}%", summary.delivery_rate);
        println!("   ├─ Attempts per event: {}", summary.attempts);
        println!("   └─ Latency (ms): {}", summary.latency_ms);

        if !summary.device_counts.is_empty() {
            let mut devices: Vec<_> = summary.device_counts.iter().collect();
            devices.sort();
            println!("\n🔌 Events per Device");
            for (device, count) in devices {
                println!("   ├─ {}: {}", device, count);
            }
        }

        println!();
    }
}
