use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DynamicMetrics, StaticMetrics};

/// One transmission to the collector.
#[derive(Clone, Debug, Serialize)]
pub struct MetricPayload {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    /// Present on the first payload and after each static refresh.
    #[serde(rename = "static_info", skip_serializing_if = "Option::is_none")]
    pub static_metrics: Option<StaticMetrics>,
    #[serde(rename = "metrics")]
    pub dynamic_metrics: DynamicMetrics,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ServerCommand {
    pub command: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ServerResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub commands: Vec<ServerCommand>,
}
