use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::ProbeError;
use crate::model::{
    CloudInfo, DiskInventoryEntry, DiskIoSample, DiskSpaceMetrics, HardwareInfo, LoadAverage,
    MemorySample, NetworkIdentity, NetworkSample, SwapMetrics, SystemInfo, SystemMetrics,
};

pub mod cloud;
pub mod facts;
pub mod host;
pub mod linux;
pub mod network_info;

pub use facts::HostFacts;
pub use host::{
    HostCpu, HostDiskIo, HostDiskSpace, HostMemory, HostNetwork, HostSwap, HostSystem,
};

/// Filesystem types that never represent real storage.
pub const PSEUDO_FILESYSTEMS: &[&str] = &[
    "tmpfs", "devtmpfs", "devfs", "proc", "sysfs", "cgroup", "cgroup2", "nsfs", "overlay",
    "squashfs", "iso9660",
];

pub fn is_pseudo_filesystem(fs_type: &str) -> bool {
    PSEUDO_FILESYSTEMS.contains(&fs_type)
}

/// Run a blocking OS query on the blocking pool. A panic in `f` surfaces as
/// [`ProbeError::Task`].
pub async fn run_blocking<T, F>(f: F) -> Result<T, ProbeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProbeError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProbeError::Task(e.to_string()))?
}

// ── sampler sources ─────────────────────────────────────────────────────
//
// Each background sampler owns one source and calls it once per tick.
// Implementations (the `Host*` types) handle the OS-specific details.

pub trait CpuSource: Send + 'static {
    /// Busy percentage across all cores since the previous call.
    fn usage_percent(&mut self) -> Result<f64, ProbeError>;

    fn load_average(&mut self) -> Result<LoadAverage, ProbeError>;
}

pub trait MemorySource: Send + 'static {
    fn memory(&mut self) -> Result<MemorySample, ProbeError>;
}

pub trait DiskIoSource: Send + 'static {
    /// Cumulative counters for every whole block device.
    fn counters(&mut self) -> Result<DiskIoSample, ProbeError>;
}

pub trait NetworkSource: Send + 'static {
    /// Cumulative counters for every interface.
    fn counters(&mut self) -> Result<NetworkSample, ProbeError>;

    /// Addresses currently assigned to `interface`.
    fn addresses(&mut self, interface: &str) -> Result<Vec<IpAddr>, ProbeError>;
}

// ── one-shot sources ────────────────────────────────────────────────────

// Instantaneous queries made once per collection cycle. Each one is a
// separate source so a query stuck in the kernel only blocks itself.

pub trait SwapSource: Send + 'static {
    fn swap(&mut self) -> Result<SwapMetrics, ProbeError>;
}

pub trait DiskSpaceSource: Send + 'static {
    /// Space summed over every non-pseudo filesystem.
    fn disk_space(&mut self) -> Result<DiskSpaceMetrics, ProbeError>;
}

pub trait SystemSource: Send + 'static {
    fn system(&mut self) -> Result<SystemMetrics, ProbeError>;
}

/// Slow-changing host facts, queried on the static refresh cadence.
#[async_trait]
pub trait FactSource: Send + Sync + 'static {
    async fn system_info(&self) -> Result<SystemInfo, ProbeError>;

    async fn hardware(&self) -> Result<HardwareInfo, ProbeError>;

    async fn network_info(&self) -> Result<NetworkIdentity, ProbeError>;

    async fn cloud_info(&self) -> Result<CloudInfo, ProbeError>;

    async fn disk_inventory(&self) -> Result<Vec<DiskInventoryEntry>, ProbeError>;
}
