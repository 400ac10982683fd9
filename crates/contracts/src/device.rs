//! DeviceRecord - metadata announced for a newly seen device

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Device metadata as returned by the metadata service
///
/// Fields the forwarder does not interpret are preserved in `extra` so the
/// announcement carries the full record northbound.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub admin_state: String,

    #[serde(default)]
    pub operating_state: String,

    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<NamedRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<NamedRef>,

    /// Protocol name -> property map
    #[serde(default)]
    pub protocols: HashMap<String, HashMap<String, String>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl DeviceRecord {
    /// Minimal record carrying only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Reference to a profile or service; only the name is interpreted
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
