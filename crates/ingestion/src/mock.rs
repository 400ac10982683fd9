//! Mock 事件源
//!
//! 无上游采集管道时用于测试与演示，按固定频率轮流为各设备生成事件。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_channel::Sender;
use contracts::{Event, Reading};
use tracing::{debug, trace, warn};

use crate::metrics::IngestionMetrics;
use crate::source::EventSource;

/// Mock 事件源配置
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// 数据源 ID (同时作为事件 ID 前缀)
    pub source_id: String,

    /// 轮流产生事件的设备名
    pub devices: Vec<String>,

    /// 发送频率 (Hz)
    pub frequency_hz: f64,

    /// 事件总数上限 (None = 不限)
    pub limit: Option<u64>,

    /// 读数名称
    pub resource: String,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            source_id: "mock".to_string(),
            devices: vec![
                "mock-device-1".to_string(),
                "mock-device-2".to_string(),
                "mock-device-3".to_string(),
            ],
            frequency_hz: 10.0,
            limit: None,
            resource: "temperature".to_string(),
        }
    }
}

/// Mock 事件源
pub struct MockEventSource {
    config: MockSourceConfig,
    running: Arc<AtomicBool>,
}

impl MockEventSource {
    /// 创建新的 Mock 事件源
    pub fn new(config: MockSourceConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 为给定设备集合生成 `limit` 个事件
    pub fn bounded(source_id: &str, devices: &[&str], frequency_hz: f64, limit: u64) -> Self {
        Self::new(MockSourceConfig {
            source_id: source_id.to_string(),
            devices: devices.iter().map(|d| d.to_string()).collect(),
            frequency_hz,
            limit: Some(limit),
            ..Default::default()
        })
    }

    /// 第 `seq` 个事件
    fn make_event(config: &MockSourceConfig, seq: u64) -> Event {
        let device = &config.devices[(seq as usize) % config.devices.len()];
        let origin = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        let mut reading = Reading::new(
            config.resource.clone(),
            format!("{:.1}", 20.0 + (seq % 50) as f64 * 0.1),
        );
        reading.device = device.clone();
        reading.origin = origin;

        let mut event = Event::new(format!("{}-{}", config.source_id, seq), device.clone());
        event.origin = origin;
        event.with_reading(reading)
    }
}

impl EventSource for MockEventSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn start(&self, tx: Sender<Event>, metrics: Arc<IngestionMetrics>) {
        if self.config.devices.is_empty() || self.config.frequency_hz <= 0.0 {
            warn!(source_id = %self.config.source_id, "mock source has nothing to produce");
            return;
        }

        let config = self.config.clone();
        let running = self.running.clone();
        running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let interval = Duration::from_secs_f64(1.0 / config.frequency_hz);
            let mut seq: u64 = 0;

            debug!(
                source_id = %config.source_id,
                devices = config.devices.len(),
                frequency_hz = config.frequency_hz,
                "mock event source started"
            );

            while running.load(Ordering::Relaxed) {
                if config.limit.is_some_and(|limit| seq >= limit) {
                    break;
                }

                let event = Self::make_event(&config, seq);
                seq += 1;

                if tx.send(event).await.is_err() {
                    debug!(source_id = %config.source_id, "mock event channel closed");
                    break;
                }
                metrics.record_emitted();
                trace!(source_id = %config.source_id, seq, "mock event sent");

                tokio::time::sleep(interval).await;
            }

            running.store(false, Ordering::SeqCst);
            debug!(source_id = %config.source_id, events = seq, "mock event source stopped");
        });
    }

    /// 停止 Mock 源
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}
