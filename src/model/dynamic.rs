use serde::{Deserialize, Serialize};

// --- Windowed and instantaneous metrics sent every cycle ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub usage_percent: f64,
    pub load_avg_1m: f64,
    pub load_avg_5m: f64,
    pub load_avg_15m: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
    pub used_percent: f64,
    pub cached: u64,
    pub buffers: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SwapMetrics {
    pub total: u64,
    pub used: u64,
    pub used_percent: f64,
}

/// Space summed over every real (non-pseudo) filesystem.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskSpaceMetrics {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub used_percent: f64,
}

/// Aggregate rates across all block devices. Bandwidth is in MB/s (2^20).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskIoMetrics {
    pub read_mbps: f64,
    pub write_mbps: f64,
    pub read_iops: f64,
    pub write_iops: f64,
}

/// Aggregate bandwidth for one interface class. Rates in Mbps (10^6 bits),
/// totals in GB (10^9 bytes).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAggregateMetrics {
    pub send_mbps: f64,
    pub recv_mbps: f64,
    pub total_sent_gb: f64,
    pub total_recv_gb: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHealthMetrics {
    pub errors_in: u64,
    pub errors_out: u64,
    pub drops_in: u64,
    pub drops_out: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// Seconds since boot.
    pub uptime: u64,
    /// Unix timestamp.
    pub boot_time: u64,
    pub process_count: u64,
}

/// One cycle's worth of dynamic metrics. Any branch that failed is absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swap: Option<SwapMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_space: Option<DiskSpaceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_io: Option<DiskIoMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_public: Option<NetworkAggregateMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_private: Option<NetworkAggregateMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_health: Option<NetworkHealthMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemMetrics>,
}

impl DynamicMetrics {
    /// True when every branch failed.
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none()
            && self.memory.is_none()
            && self.swap.is_none()
            && self.disk_space.is_none()
            && self.disk_io.is_none()
            && self.network_public.is_none()
            && self.network_private.is_none()
            && self.network_health.is_none()
            && self.system.is_none()
    }
}
