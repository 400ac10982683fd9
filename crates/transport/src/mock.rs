//! Mock 协作者
//!
//! 用于单元测试与集成测试的 mock 实现，支持注入失败场景。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use contracts::{
    ContractError, DeviceLookup, DeviceRecord, EncodeError, Encoder, Event, MessageSender,
    PushMarker,
};
use serde::Serialize;

/// 一次发送记录
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Mock 发送端
///
/// 默认所有发送成功；可按 topic 预置若干次失败。
#[derive(Debug, Default)]
pub struct MockSender {
    /// 已成功发送的消息
    sent: Mutex<Vec<SentMessage>>,
    /// 每个 topic 的发送尝试次数 (含失败)
    attempts: Mutex<HashMap<String, u64>>,
    /// 每个 topic 剩余的失败次数
    failures: Mutex<HashMap<String, u64>>,
    /// 所有 topic 永久失败
    always_fail: AtomicBool,
    /// shutdown 调用次数
    shutdowns: AtomicU64,
}

impl MockSender {
    /// 创建默认 mock 发送端
    pub fn new() -> Self {
        Self::default()
    }

    /// 令 `topic` 接下来的 `count` 次发送失败
    pub fn fail_next(&self, topic: &str, count: u64) {
        *self
            .failures
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert(0) += count;
    }

    /// 切换永久失败模式
    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// 已成功发送的消息
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// 发往 `topic` 的成功消息
    pub fn sent_to(&self, topic: &str) -> Vec<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// `topic` 的发送尝试次数
    pub fn attempts(&self, topic: &str) -> u64 {
        self.attempts
            .lock()
            .unwrap()
            .get(topic)
            .copied()
            .unwrap_or(0)
    }

    pub fn shutdown_count(&self) -> u64 {
        self.shutdowns.load(Ordering::SeqCst)
    }

    fn should_fail(&self, topic: &str) -> bool {
        if self.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(topic) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl MessageSender for MockSender {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send(&self, topic: &str, payload: Bytes) -> bool {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_insert(0) += 1;

        if self.should_fail(topic) {
            return false;
        }

        self.sent.lock().unwrap().push(SentMessage {
            topic: topic.to_string(),
            payload,
        });
        true
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mock 元数据查询
///
/// 未知设备返回以设备名构造的最小记录；可预置失败。
#[derive(Debug, Default)]
pub struct MockLookup {
    /// 预置的设备记录
    records: Mutex<HashMap<String, DeviceRecord>>,
    /// 每个设备剩余的失败次数
    failures: Mutex<HashMap<String, u64>>,
    /// 永久查不到的设备
    missing: Mutex<Vec<String>>,
    /// 查询调用记录 (按顺序)
    calls: Mutex<Vec<String>>,
}

impl MockLookup {
    /// 创建默认 mock 查询
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置设备记录
    pub fn insert(&self, record: DeviceRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.name.clone(), record);
    }

    /// 令 `device` 接下来的 `count` 次查询失败
    pub fn fail_next(&self, device: &str, count: u64) {
        *self
            .failures
            .lock()
            .unwrap()
            .entry(device.to_string())
            .or_insert(0) += count;
    }

    /// 令 `device` 永久查不到
    pub fn mark_missing(&self, device: &str) {
        self.missing.lock().unwrap().push(device.to_string());
    }

    /// 查询调用记录
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// `device` 被查询的次数
    pub fn call_count(&self, device: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|name| *name == device)
            .count()
    }
}

impl DeviceLookup for MockLookup {
    async fn device_for_name(&self, name: &str) -> Result<DeviceRecord, ContractError> {
        self.calls.lock().unwrap().push(name.to_string());

        if self.missing.lock().unwrap().iter().any(|m| m == name) {
            return Err(ContractError::DeviceNotFound {
                device: name.to_string(),
            });
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ContractError::lookup(name, "mock lookup failure"));
                }
            }
        }

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_else(|| DeviceRecord::named(name)))
    }
}

/// Mock mark-pushed 回调
#[derive(Debug, Default)]
pub struct MockMarker {
    marked: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 令所有调用返回错误
    pub fn failing() -> Self {
        let marker = Self::default();
        marker.fail.store(true, Ordering::SeqCst);
        marker
    }

    /// 调用记录 (事件 ID，含失败调用)
    pub fn marked(&self) -> Vec<String> {
        self.marked.lock().unwrap().clone()
    }
}

impl PushMarker for MockMarker {
    async fn mark_pushed(&self, event: &Event) -> Result<(), ContractError> {
        self.marked.lock().unwrap().push(event.id.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ContractError::mark_pushed(&event.id, "mock marker failure"));
        }
        Ok(())
    }
}

/// 按脚本失败的编码器
///
/// 脚本为空时编码为 JSON；脚本项为 `true` 表示该次编码失败。
#[derive(Debug, Default)]
pub struct ScriptedEncoder {
    script: Mutex<VecDeque<bool>>,
    always_fail: AtomicBool,
    calls: AtomicU64,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次编码都失败
    pub fn always_failing() -> Self {
        let encoder = Self::default();
        encoder.always_fail.store(true, Ordering::SeqCst);
        encoder
    }

    /// 追加脚本项
    pub fn push_outcome(&self, fail: bool) {
        self.script.lock().unwrap().push_back(fail);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for ScriptedEncoder {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front().unwrap_or(false);
        if scripted || self.always_fail.load(Ordering::SeqCst) {
            return Err(EncodeError::new("mock", "scripted encode failure"));
        }
        serde_json::to_vec(value).map_err(|e| EncodeError::new("json", e.to_string()))
    }
}
