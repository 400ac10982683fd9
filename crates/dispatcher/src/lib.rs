//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 将事件以 at-least-once 语义发送到事件 topic (阻塞重试)
//! - 经有界队列把事件交给后台发现任务，首次出现的设备只通告一次
//! - 有序关闭：关闭队列、等待发现任务退出、释放传输资源

pub mod cache;
pub mod dead_letter;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod notifier;
pub mod retry;
pub mod tracker;

pub use cache::DeviceCache;
pub use contracts::{Event, MessageSender, PushMarker};
pub use dead_letter::DeadLetterFile;
pub use dispatcher::{
    create_dispatcher, DeliveryOutcome, Dispatcher, DispatcherBuilder, DispatcherConfig,
    DEFAULT_QUEUE_CAPACITY,
};
pub use error::DispatcherError;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use notifier::{DeviceNotifier, LocalDeviceNotifier, Notifier};
pub use retry::RetryPolicy;
pub use tracker::DiscoveryTracker;
