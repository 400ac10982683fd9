//! 配置校验模块
//!
//! 校验规则：
//! - 必填字符串非空 (server / client_id / topics / metadata.uri)
//! - broker URL 合法且协议受支持
//! - cert_file 与 key_file 成对出现
//! - 三个 topic 互不相同
//! - 报文大小上限、确认超时取值合法
//! - HTTP 服务地址为 http(s)
//! - 队列容量、重试参数取值合法

use std::collections::HashSet;

use contracts::{ContractError, DispatchSettings, ForwarderSettings, MqttSettings};
use url::Url;

/// 支持的 broker 协议
pub const PLAIN_SCHEMES: &[&str] = &["tcp", "mqtt"];
pub const TLS_SCHEMES: &[&str] = &["tls", "ssl", "mqtts"];

/// 校验 ForwarderSettings 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(settings: &ForwarderSettings) -> Result<(), ContractError> {
    validate_required(settings)?;
    validate_server(&settings.mqtt)?;
    validate_client_certificate(&settings.mqtt)?;
    validate_topics(&settings.mqtt)?;
    validate_limits(&settings.mqtt)?;
    validate_http_uri("metadata.uri", &settings.metadata.uri)?;
    if let Some(core_data) = &settings.core_data {
        validate_http_uri("core_data.uri", &core_data.uri)?;
    }
    validate_dispatch(&settings.dispatch)?;
    Ok(())
}

/// 校验必填字段非空
fn validate_required(settings: &ForwarderSettings) -> Result<(), ContractError> {
    let mqtt = &settings.mqtt;
    let required = [
        ("mqtt.server", mqtt.server.as_str()),
        ("mqtt.client_id", mqtt.client_id.as_str()),
        ("mqtt.event_topic", mqtt.event_topic.as_str()),
        ("mqtt.new_device_topic", mqtt.new_device_topic.as_str()),
        ("mqtt.command_topic", mqtt.command_topic.as_str()),
        ("metadata.uri", settings.metadata.uri.as_str()),
    ];

    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ContractError::config_validation(
                field,
                "missing required setting",
            ));
        }
    }
    Ok(())
}

/// 校验 broker 地址
fn validate_server(mqtt: &MqttSettings) -> Result<(), ContractError> {
    let url = Url::parse(&mqtt.server).map_err(|e| {
        ContractError::config_validation(
            "mqtt.server",
            format!("invalid broker url '{}': {e}", mqtt.server),
        )
    })?;

    let scheme = url.scheme();
    if !PLAIN_SCHEMES.contains(&scheme) && !TLS_SCHEMES.contains(&scheme) {
        return Err(ContractError::config_validation(
            "mqtt.server",
            format!("unsupported scheme '{scheme}'"),
        ));
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(ContractError::config_validation(
            "mqtt.server",
            "broker url has no host",
        ));
    }
    Ok(())
}

/// 校验客户端证书成对出现
fn validate_client_certificate(mqtt: &MqttSettings) -> Result<(), ContractError> {
    match (&mqtt.cert_file, &mqtt.key_file) {
        (Some(_), None) => Err(ContractError::config_validation(
            "mqtt.key_file",
            "cert_file is set but key_file is missing",
        )),
        (None, Some(_)) => Err(ContractError::config_validation(
            "mqtt.cert_file",
            "key_file is set but cert_file is missing",
        )),
        _ => Ok(()),
    }
}

/// 校验 topic 互不相同
fn validate_topics(mqtt: &MqttSettings) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (field, topic) in [
        ("mqtt.event_topic", &mqtt.event_topic),
        ("mqtt.new_device_topic", &mqtt.new_device_topic),
        ("mqtt.command_topic", &mqtt.command_topic),
    ] {
        if !seen.insert(topic) {
            return Err(ContractError::config_validation(
                field,
                format!("duplicate topic '{topic}'"),
            ));
        }
    }
    Ok(())
}

/// MQTT 剩余长度最多 4 字节编码
const MQTT_MAX_PACKET_SIZE: usize = 268_435_455 + 5;

/// 报文上限至少 1 KiB
const MIN_PACKET_SIZE: usize = 1024;

/// 校验报文大小上限与确认超时
fn validate_limits(mqtt: &MqttSettings) -> Result<(), ContractError> {
    if !(MIN_PACKET_SIZE..=MQTT_MAX_PACKET_SIZE).contains(&mqtt.max_packet_size) {
        return Err(ContractError::config_validation(
            "mqtt.max_packet_size",
            format!(
                "max_packet_size must be between {MIN_PACKET_SIZE} and {MQTT_MAX_PACKET_SIZE}, got {}",
                mqtt.max_packet_size
            ),
        ));
    }

    if mqtt.ack_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "mqtt.ack_timeout_ms",
            "ack_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

fn validate_http_uri(field: &str, uri: &str) -> Result<(), ContractError> {
    let url = Url::parse(uri)
        .map_err(|e| ContractError::config_validation(field, format!("invalid url '{uri}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ContractError::config_validation(
            field,
            format!("expected http or https, got '{other}'"),
        )),
    }
}

/// 校验分发参数
fn validate_dispatch(dispatch: &DispatchSettings) -> Result<(), ContractError> {
    if dispatch.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "dispatch.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }

    if dispatch.send_failure_wait_ms == 0 {
        return Err(ContractError::config_validation(
            "dispatch.send_failure_wait_ms",
            "send_failure_wait_ms must be > 0",
        ));
    }

    if dispatch.device_cache_capacity == Some(0) {
        return Err(ContractError::config_validation(
            "dispatch.device_cache_capacity",
            "device_cache_capacity must be > 0 when set",
        ));
    }

    let retry = &dispatch.retry;
    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        return Err(ContractError::config_validation(
            "dispatch.retry.backoff_multiplier",
            format!(
                "backoff_multiplier must be >= 1.0, got {}",
                retry.backoff_multiplier
            ),
        ));
    }

    if retry.max_interval_ms < dispatch.send_failure_wait_ms {
        return Err(ContractError::config_validation(
            "dispatch.retry.max_interval_ms",
            format!(
                "max_interval_ms ({}) must be >= send_failure_wait_ms ({})",
                retry.max_interval_ms, dispatch.send_failure_wait_ms
            ),
        ));
    }

    if retry.max_attempts == Some(0) {
        return Err(ContractError::config_validation(
            "dispatch.retry.max_attempts",
            "max_attempts must be > 0 when set",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CoreDataSettings, MetadataSettings};
    use std::path::PathBuf;

    fn minimal_settings() -> ForwarderSettings {
        ForwarderSettings {
            mqtt: MqttSettings {
                server: "tls://broker.example.com:8883".into(),
                client_id: "gateway-01".into(),
                user_name: "user".into(),
                password: "secret".into(),
                cert_file: None,
                key_file: None,
                ca_file: None,
                event_topic: "edge/events".into(),
                new_device_topic: "edge/devices".into(),
                command_topic: "edge/commands".into(),
                keep_alive_secs: 30,
                reconnect_interval_ms: 1000,
                connect_timeout_secs: 10,
                max_packet_size: 256 * 1024,
                ack_timeout_ms: 10_000,
            },
            metadata: MetadataSettings {
                uri: "http://localhost:48081".into(),
                timeout_ms: 5000,
            },
            core_data: None,
            dispatch: DispatchSettings::default(),
        }
    }

    #[test]
    fn test_valid_settings() {
        assert!(validate(&minimal_settings()).is_ok());
    }

    #[test]
    fn test_empty_client_id() {
        let mut settings = minimal_settings();
        settings.mqtt.client_id = "  ".into();
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("mqtt.client_id"));
    }

    #[test]
    fn test_unsupported_scheme() {
        let mut settings = minimal_settings();
        settings.mqtt.server = "ws://broker:80".into();
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_cert_without_key() {
        let mut settings = minimal_settings();
        settings.mqtt.cert_file = Some(PathBuf::from("client.crt"));
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("key_file"));
    }

    #[test]
    fn test_duplicate_topics() {
        let mut settings = minimal_settings();
        settings.mqtt.command_topic = settings.mqtt.event_topic.clone();
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("duplicate topic"));
    }

    #[test]
    fn test_packet_size_bounds() {
        let mut settings = minimal_settings();
        settings.mqtt.max_packet_size = 512;
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("mqtt.max_packet_size"));

        settings.mqtt.max_packet_size = 1024 * 1024;
        assert!(validate(&settings).is_ok());

        settings.mqtt.ack_timeout_ms = 0;
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("mqtt.ack_timeout_ms"));
    }

    #[test]
    fn test_core_data_must_be_http() {
        let mut settings = minimal_settings();
        settings.core_data = Some(CoreDataSettings {
            uri: "ftp://localhost:48080".into(),
            timeout_ms: 5000,
        });
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("core_data.uri"));
    }

    #[test]
    fn test_zero_queue_capacity() {
        let mut settings = minimal_settings();
        settings.dispatch.queue_capacity = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_backoff_multiplier_below_one() {
        let mut settings = minimal_settings();
        settings.dispatch.retry.backoff_multiplier = 0.5;
        let err = validate(&settings).unwrap_err();
        assert!(err.to_string().contains("backoff_multiplier"));
    }

    #[test]
    fn test_max_interval_below_wait() {
        let mut settings = minimal_settings();
        settings.dispatch.send_failure_wait_ms = 5000;
        settings.dispatch.retry.max_interval_ms = 1000;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn test_zero_max_attempts() {
        let mut settings = minimal_settings();
        settings.dispatch.retry.max_attempts = Some(0);
        assert!(validate(&settings).is_err());
    }
}
