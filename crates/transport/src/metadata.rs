//! HTTP client for the device metadata service

use std::time::Duration;

use contracts::{ContractError, DeviceLookup, DeviceRecord, MetadataSettings};
use reqwest::StatusCode;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Result, TransportError};

/// Resolves device names with `GET {uri}/api/v1/device/name/{name}`
#[derive(Debug, Clone)]
pub struct HttpDeviceLookup {
    client: reqwest::Client,
    base: Url,
}

impl HttpDeviceLookup {
    /// Create from settings
    pub fn new(settings: &MetadataSettings) -> Result<Self> {
        let base = Url::parse(&settings.uri)
            .map_err(|e| TransportError::invalid_endpoint(&settings.uri, e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(TransportError::invalid_endpoint(
                &settings.uri,
                "url cannot carry a path",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()?;

        Ok(Self { client, base })
    }

    fn device_url(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "v1", "device", "name", name]);
        }
        url
    }
}

impl DeviceLookup for HttpDeviceLookup {
    #[instrument(name = "metadata_device_for_name", skip(self))]
    async fn device_for_name(&self, name: &str) -> std::result::Result<DeviceRecord, ContractError> {
        let url = self.device_url(name);
        debug!(url = %url, "Resolving device");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ContractError::lookup(name, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ContractError::DeviceNotFound {
                device: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContractError::lookup(
                name,
                format!("unexpected status {status}: {}", body.trim()),
            ));
        }

        response
            .json::<DeviceRecord>()
            .await
            .map_err(|e| ContractError::lookup(name, format!("invalid device record: {e}")))
    }
}
