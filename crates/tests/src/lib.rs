//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试 (事件/设备 JSON 形状)
//! - 模拟 e2e 测试（无需 broker 与元数据服务）
//! - 配置文件到 dispatcher 的装配

#[cfg(test)]
mod contract_tests {
    use contracts::{DeviceRecord, Event, Reading};

    #[test]
    fn test_event_wire_shape() {
        let mut reading = Reading::new("temperature", "21.5");
        reading.value_type = Some("Float64".to_string());
        let event = Event::new("e-1", "thermo-1").with_reading(reading);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], "e-1");
        assert_eq!(json["device"], "thermo-1");
        assert_eq!(json["readings"][0]["valueType"], "Float64");
    }

    #[test]
    fn test_device_record_keeps_unknown_fields() {
        let record: DeviceRecord = serde_json::from_value(serde_json::json!({
            "name": "thermo-1",
            "adminState": "UNLOCKED",
            "firmware": "1.2.3"
        }))
        .unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "thermo-1");
        assert_eq!(json["firmware"], "1.2.3");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{DeviceRecord, Event};
    use dispatcher::{
        create_dispatcher, DeliveryOutcome, DispatcherBuilder, DispatcherConfig, RetryPolicy,
    };
    use ingestion::{IngestionPipeline, JsonLinesSource, MockEventSource};
    use transport::{JsonCodec, MockLookup, MockMarker, MockSender};

    /// End-to-end test: MockEventSource -> IngestionPipeline -> Dispatcher
    ///
    /// 验证完整的数据流：
    /// 1. MockEventSource 轮流为三个设备生成事件
    /// 2. Dispatcher 将每个事件发往事件 topic 并标记已推送
    /// 3. 每个设备只公告一次
    #[tokio::test]
    async fn test_e2e_mock_pipeline() {
        let sender = Arc::new(MockSender::new());
        let lookup = Arc::new(MockLookup::new());
        let marker = MockMarker::new();

        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::new("events", "devices"),
            Arc::clone(&sender),
            Arc::clone(&lookup),
            Arc::new(JsonCodec::new()),
        )
        .build()
        .unwrap();

        let mut ingestion = IngestionPipeline::new(16);
        ingestion.register_source(Box::new(MockEventSource::bounded(
            "mock",
            &["a", "b", "c"],
            1000.0,
            30,
        )));
        let rx = ingestion.take_receiver().unwrap();
        ingestion.start_all();

        let mut handled = 0;
        while let Ok(event) = rx.recv().await {
            let outcome = dispatcher.handle(event, &marker).await;
            assert!(outcome.is_delivered());
            handled += 1;
        }

        let snapshot = dispatcher.close().await;

        assert_eq!(handled, 30);
        assert_eq!(snapshot.delivered, 30);
        assert_eq!(snapshot.devices_detected, 3);
        assert_eq!(sender.sent_to("events").len(), 30);
        assert_eq!(sender.sent_to("devices").len(), 3);
        assert_eq!(marker.marked().len(), 30);
        assert_eq!(lookup.calls().len(), 3);
        assert_eq!(sender.shutdown_count(), 1);
    }

    /// 事件顺序与转发内容保持不变
    #[tokio::test]
    async fn test_e2e_json_lines_payloads() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5 {
            writeln!(file, r#"{{"id":"e-{i}","device":"meter-{}"}}"#, i % 2).unwrap();
        }
        file.flush().unwrap();

        let sender = Arc::new(MockSender::new());
        let lookup = Arc::new(MockLookup::new());
        let mut record = DeviceRecord::named("meter-0");
        record.description = "basement meter".to_string();
        lookup.insert(record);

        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::new("events", "devices"),
            Arc::clone(&sender),
            lookup,
            Arc::new(JsonCodec::new()),
        )
        .build()
        .unwrap();

        let mut ingestion = IngestionPipeline::new(4);
        ingestion.register_source(Box::new(JsonLinesSource::open(file.path()).unwrap()));
        let rx = ingestion.take_receiver().unwrap();
        ingestion.start_all();

        while let Ok(event) = rx.recv().await {
            dispatcher.handle(event, &MockMarker::new()).await;
        }
        dispatcher.close().await;

        let ids: Vec<String> = sender
            .sent_to("events")
            .iter()
            .map(|payload| serde_json::from_slice::<Event>(payload).unwrap().id)
            .collect();
        assert_eq!(ids, vec!["e-0", "e-1", "e-2", "e-3", "e-4"]);

        let announced: Vec<DeviceRecord> = sender
            .sent_to("devices")
            .iter()
            .map(|payload| serde_json::from_slice(payload).unwrap())
            .collect();
        assert_eq!(announced.len(), 2);
        let meter = announced.iter().find(|d| d.name == "meter-0").unwrap();
        assert_eq!(meter.description, "basement meter");
    }

    /// Broker 故障恢复：发送失败时等待重试，恢复后全部送达
    #[tokio::test(start_paused = true)]
    async fn test_e2e_broker_outage_recovers() {
        let sender = Arc::new(MockSender::new());
        sender.fail_next("events", 3);

        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::new("events", "devices")
                .with_retry(RetryPolicy::fixed(Duration::from_millis(500))),
            Arc::clone(&sender),
            Arc::new(MockLookup::new()),
            Arc::new(JsonCodec::new()),
        )
        .build()
        .unwrap();

        let marker = MockMarker::new();
        let start = tokio::time::Instant::now();
        let first = dispatcher.handle(Event::new("e-1", "a"), &marker).await;
        let second = dispatcher.handle(Event::new("e-2", "a"), &marker).await;

        assert_eq!(first, DeliveryOutcome::Delivered { attempts: 4 });
        assert_eq!(second, DeliveryOutcome::Delivered { attempts: 1 });
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert_eq!(marker.marked(), vec!["e-1", "e-2"]);

        let snapshot = dispatcher.close().await;
        assert_eq!(snapshot.send_failures, 3);
        assert_eq!(snapshot.devices_detected, 1);
    }

    /// 设备元数据服务暂时不可用：后续事件触发重新公告
    #[tokio::test]
    async fn test_e2e_lookup_outage_retries_announcement() {
        let sender = Arc::new(MockSender::new());
        let lookup = Arc::new(MockLookup::new());
        lookup.fail_next("a", 2);

        let dispatcher = DispatcherBuilder::new(
            DispatcherConfig::new("events", "devices"),
            Arc::clone(&sender),
            Arc::clone(&lookup),
            Arc::new(JsonCodec::new()),
        )
        .build()
        .unwrap();

        for i in 0..4 {
            dispatcher
                .handle(Event::new(format!("e-{i}"), "a"), &MockMarker::new())
                .await;
        }
        let snapshot = dispatcher.close().await;

        assert_eq!(lookup.call_count("a"), 3);
        assert_eq!(sender.sent_to("devices").len(), 1);
        assert_eq!(snapshot.notify_failures, 2);
        assert_eq!(snapshot.devices_detected, 1);
    }

    /// 配置文件 -> create_dispatcher 装配
    #[tokio::test]
    async fn test_dispatcher_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let dead_letters = dir.path().join("dead.jsonl");
        let config_path = dir.path().join("forwarder.toml");
        std::fs::write(
            &config_path,
            format!(
                r#"
[mqtt]
server = "tcp://localhost:1883"
client_id = "gw-1"
event_topic = "north/events"
new_device_topic = "north/devices"
command_topic = "south/commands"

[metadata]
uri = "http://localhost:48081"

[dispatch]
send_failure_wait_ms = 1
dead_letter_path = "{}"

[dispatch.retry]
max_attempts = 2
"#,
                dead_letters.display()
            ),
        )
        .unwrap();

        let settings = config_loader::ConfigLoader::load_from_path(&config_path).unwrap();

        let sender = Arc::new(MockSender::new());
        sender.fail_next("north/events", 2);

        let dispatcher = create_dispatcher(
            &settings,
            Arc::clone(&sender),
            Arc::new(MockLookup::new()),
            Arc::new(JsonCodec::new()),
        )
        .unwrap();

        let outcome = dispatcher
            .handle(Event::new("e-1", "a"), &MockMarker::new())
            .await;
        assert_eq!(outcome, DeliveryOutcome::DeadLettered { attempts: 2 });

        let outcome = dispatcher
            .handle(Event::new("e-2", "a"), &MockMarker::new())
            .await;
        assert!(outcome.is_delivered());
        dispatcher.close().await;

        assert_eq!(sender.sent_to("north/devices").len(), 1);
        let lines = std::fs::read_to_string(&dead_letters).unwrap();
        assert_eq!(lines.lines().count(), 1);
        assert!(lines.contains("\"eventId\":\"e-1\""));
    }
}
