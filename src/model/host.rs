use serde::{Deserialize, Serialize};

// --- Slow-changing host facts, refreshed hourly ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Distribution id, e.g. `ubuntu`.
    pub platform: String,
    /// Distribution family, e.g. `debian`.
    pub platform_family: String,
    pub platform_version: String,
    pub os: String,
    pub arch: String,
    pub kernel_version: String,
    pub kernel_arch: String,
    pub virtualization: String,
    pub host_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub cpu_model: String,
    /// Physical cores.
    pub cpu_cores: usize,
    /// Logical processors.
    pub cpu_threads: usize,
    /// Bytes.
    pub total_memory: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub internal_ips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudInfo {
    /// `aws`, `gcp`, `azure` or `digitalocean`.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInventoryEntry {
    pub device: String,
    #[serde(rename = "mount")]
    pub mount_point: String,
    pub fstype: String,
    /// Capacity in bytes.
    pub total: u64,
}

/// Merged static snapshot. Each probe's contribution is independently
/// optional and flattened into one JSON object on the wire.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StaticMetrics {
    #[serde(flatten)]
    pub system: Option<SystemInfo>,
    #[serde(flatten)]
    pub hardware: Option<HardwareInfo>,
    #[serde(flatten)]
    pub network: Option<NetworkIdentity>,
    #[serde(flatten)]
    pub cloud: Option<CloudInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disks: Option<Vec<DiskInventoryEntry>>,
}

impl StaticMetrics {
    pub fn hostname(&self) -> Option<&str> {
        self.network
            .as_ref()
            .map(|n| n.hostname.as_str())
            .filter(|h| !h.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_none()
            && self.hardware.is_none()
            && self.network.is_none()
            && self.cloud.is_none()
            && self.disks.is_none()
    }
}
