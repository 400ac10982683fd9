//! Mark-pushed implementations

use std::time::Duration;

use contracts::{ContractError, CoreDataSettings, Event, PushMarker};
use tracing::{instrument, trace};
use url::Url;

use crate::error::{Result, TransportError};

/// Marks events as pushed with `PUT {uri}/api/v1/event/id/{id}`
#[derive(Debug, Clone)]
pub struct CoreDataMarker {
    client: reqwest::Client,
    base: Url,
}

impl CoreDataMarker {
    /// Create from settings
    pub fn new(settings: &CoreDataSettings) -> Result<Self> {
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

    fn event_url(&self, id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "v1", "event", "id", id]);
        }
        url
    }
}

impl PushMarker for CoreDataMarker {
    #[instrument(name = "core_data_mark_pushed", skip(self, event), fields(event_id = %event.id))]
    async fn mark_pushed(&self, event: &Event) -> std::result::Result<(), ContractError> {
        let response = self
            .client
            .put(self.event_url(&event.id))
            .send()
            .await
            .map_err(|e| ContractError::mark_pushed(&event.id, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ContractError::mark_pushed(
            &event.id,
            format!("unexpected status {status}: {}", body.trim()),
        ))
    }
}

/// Marker for sources without upstream bookkeeping
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMarker;

impl PushMarker for NoopMarker {
    async fn mark_pushed(&self, event: &Event) -> std::result::Result<(), ContractError> {
        trace!(event_id = %event.id, "No upstream to mark");
        Ok(())
    }
}

/// Either marker, chosen from configuration
#[derive(Debug, Clone)]
pub enum UpstreamMarker {
    CoreData(CoreDataMarker),
    Noop(NoopMarker),
}

impl UpstreamMarker {
    /// Core data marker when configured, no-op otherwise
    pub fn from_settings(settings: Option<&CoreDataSettings>) -> Result<Self> {
        match settings {
            Some(settings) => Ok(Self::CoreData(CoreDataMarker::new(settings)?)),
            None => Ok(Self::Noop(NoopMarker)),
        }
    }
}

impl PushMarker for UpstreamMarker {
    async fn mark_pushed(&self, event: &Event) -> std::result::Result<(), ContractError> {
        match self {
            Self::CoreData(marker) => marker.mark_pushed(event).await,
            Self::Noop(marker) => marker.mark_pushed(event).await,
        }
    }
}
