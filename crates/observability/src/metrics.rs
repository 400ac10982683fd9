//! Forwarder 指标收集模块
//!
//! 记录事件投递、设备发现与上游回调的运行指标。

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// 投递结果标签
pub const OUTCOME_DELIVERED: &str = "delivered";
pub const OUTCOME_ENCODE_FAILED: &str = "encode_failed";
pub const OUTCOME_DEAD_LETTERED: &str = "dead_lettered";
pub const OUTCOME_CANCELLED: &str = "cancelled";

/// 直方图名称 (导出端按名称配置分桶)
pub const DELIVERY_LATENCY_MS: &str = "cloud_forwarder_delivery_latency_ms";
pub const SEND_ATTEMPTS_PER_EVENT: &str = "cloud_forwarder_send_attempts_per_event";

/// 注册指标说明，导出端安装后调用一次
pub fn describe_metrics() {
    describe_counter!(
        "cloud_forwarder_events_received_total",
        "Events taken from an input source"
    );
    describe_counter!(
        "cloud_forwarder_events_malformed_total",
        "Input lines that did not parse as an event"
    );
    describe_counter!(
        "cloud_forwarder_send_attempts_total",
        "Publish attempts per topic and status"
    );
    describe_counter!(
        "cloud_forwarder_events_total",
        "Handled events by final outcome"
    );
    describe_histogram!(
        SEND_ATTEMPTS_PER_EVENT,
        Unit::Count,
        "Publish attempts needed per event"
    );
    describe_histogram!(
        DELIVERY_LATENCY_MS,
        Unit::Milliseconds,
        "Time from handle to final outcome"
    );
    describe_counter!(
        "cloud_forwarder_mark_pushed_total",
        "Mark-pushed callbacks by status"
    );
    describe_gauge!(
        "cloud_forwarder_discovery_queue_depth",
        Unit::Count,
        "Events waiting for the discovery tracker"
    );
    describe_counter!(
        "cloud_forwarder_device_notifications_total",
        "New-device announcements by status"
    );
    describe_gauge!(
        "cloud_forwarder_known_devices",
        Unit::Count,
        "Devices already announced"
    );
}

/// 记录从输入源读取的事件
pub fn record_event_received(source: &str) {
    counter!(
        "cloud_forwarder_events_received_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录无法解析的输入行
pub fn record_event_malformed(source: &str) {
    counter!(
        "cloud_forwarder_events_malformed_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录一次发送尝试
pub fn record_send_attempt(topic: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "cloud_forwarder_send_attempts_total",
        "topic" => topic.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录一次事件投递的最终结果
///
/// `attempts` 为发送尝试次数；`latency_ms` 为从 handle 开始到结果确定的耗时。
pub fn record_event_outcome(outcome: &str, attempts: u32, latency_ms: f64) {
    counter!(
        "cloud_forwarder_events_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);

    if attempts > 0 {
        histogram!(SEND_ATTEMPTS_PER_EVENT).record(attempts as f64);
    }
    histogram!(DELIVERY_LATENCY_MS).record(latency_ms);
}

/// 记录 mark-pushed 回调结果
pub fn record_mark_pushed(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "cloud_forwarder_mark_pushed_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录发现队列深度
pub fn record_queue_depth(depth: usize) {
    gauge!("cloud_forwarder_discovery_queue_depth").set(depth as f64);
}

/// 记录一次新设备通知尝试
pub fn record_device_notification(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "cloud_forwarder_device_notifications_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录已知设备数
pub fn record_known_devices(count: usize) {
    gauge!("cloud_forwarder_known_devices").set(count as f64);
}

/// 投递指标聚合器
///
/// 在内存中聚合指标，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct DeliveryAggregator {
    /// 处理的事件总数
    pub total_events: u64,

    /// 成功投递数
    pub delivered: u64,

    /// 编码失败数
    pub encode_failed: u64,

    /// 写入死信文件数
    pub dead_lettered: u64,

    /// 被取消数
    pub cancelled: u64,

    /// 每个事件的发送尝试次数统计
    pub attempt_stats: RunningStats,

    /// 投递耗时统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 各设备事件数
    pub device_counts: std::collections::HashMap<String, u64>,
}

impl DeliveryAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, device: &str, outcome: &str, attempts: u32, latency_ms: f64) {
        self.total_events += 1;
        match outcome {
            OUTCOME_DELIVERED => self.delivered += 1,
            OUTCOME_ENCODE_FAILED => self.encode_failed += 1,
            OUTCOME_DEAD_LETTERED => self.dead_lettered += 1,
            OUTCOME_CANCELLED => self.cancelled += 1,
            _ => {}
        }

        if attempts > 0 {
            self.attempt_stats.push(attempts as f64);
        }
        self.latency_stats.push(latency_ms);

        *self.device_counts.entry(device.to_string()).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_events: self.total_events,
            delivered: self.delivered,
            encode_failed: self.encode_failed,
            dead_lettered: self.dead_lettered,
            cancelled: self.cancelled,
            delivery_rate: if self.total_events > 0 {
                self.delivered as f64 / self.total_events as f64 * 100.0
            } else {
                0.0
            },
            attempts: StatsSummary::from(&self.attempt_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
            device_counts: self.device_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_events: u64,
    pub delivered: u64,
    pub encode_failed: u64,
    pub dead_lettered: u64,
    pub cancelled: u64,
    pub delivery_rate: f64,
    pub attempts: StatsSummary,
    pub latency_ms: StatsSummary,
    pub device_counts: std::collections::HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Delivery Summary ===")?;
        writeln!(f, "Total events: {}", self.total_events)?;
        writeln!(
            f,
            "Delivered: {} ({:.2}%)",
            self.delivered, self.delivery_rate
        )?;
        writeln!(f, "Encode failures: {}", self.encode_failed)?;
        writeln!(f, "Dead-lettered: {}", self.dead_lettered)?;
        writeln!(f, "Cancelled: {}", self.cancelled)?;
        writeln!(f, "Send attempts per event: {}", self.attempts)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.device_counts.is_empty() {
            let mut devices: Vec<_> = self.device_counts.iter().collect();
            devices.sort();
            writeln!(f, "Events per device:")?;
            for (device, count) in devices {
                writeln!(f, "  {}: {}", device, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = DeliveryAggregator::new();

        aggregator.update("thermo-1", OUTCOME_DELIVERED, 1, 2.0);
        aggregator.update("thermo-1", OUTCOME_DELIVERED, 3, 2000.0);
        aggregator.update("pump-7", OUTCOME_ENCODE_FAILED, 0, 0.1);
        aggregator.update("pump-7", OUTCOME_DEAD_LETTERED, 5, 9000.0);

        assert_eq!(aggregator.total_events, 4);
        assert_eq!(aggregator.delivered, 2);
        assert_eq!(aggregator.encode_failed, 1);
        assert_eq!(aggregator.dead_lettered, 1);
        // 编码失败不计入尝试次数
        assert_eq!(aggregator.attempt_stats.count(), 3);
        assert_eq!(aggregator.device_counts.get("pump-7"), Some(&2));

        let summary = aggregator.summary();
        assert!((summary.delivery_rate - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = DeliveryAggregator::new();
        for _ in 0..4 {
            aggregator.update("thermo-1", OUTCOME_DELIVERED, 1, 1.0);
        }
        aggregator.update("thermo-1", OUTCOME_CANCELLED, 2, 1.0);

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total events: 5"));
        assert!(output.contains("80.00%"));
        assert!(output.contains("thermo-1: 5"));
    }

    #[test]
    fn test_reset() {
        let mut aggregator = DeliveryAggregator::new();
        aggregator.update("thermo-1", OUTCOME_DELIVERED, 1, 1.0);
        aggregator.reset();
        assert_eq!(aggregator.total_events, 0);
        assert!(aggregator.device_counts.is_empty());
    }
}
