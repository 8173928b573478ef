//! Sources backed by the running host: sysinfo everywhere, procfs on Linux
//! for the counters sysinfo does not expose.

use std::collections::HashSet;
use std::net::IpAddr;

use sysinfo::{
    CpuRefreshKind, Disks, Networks, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System,
};

use super::{
    CpuSource, DiskIoSource, DiskSpaceSource, MemorySource, NetworkSource, SwapSource,
    SystemSource,
};
#[cfg(target_os = "linux")]
use super::linux;
use super::is_pseudo_filesystem;
use crate::error::ProbeError;
#[cfg(not(target_os = "linux"))]
use crate::model::InterfaceCounters;
use crate::model::{
    DiskIoSample, DiskSpaceMetrics, LoadAverage, MemorySample, NetworkSample, SwapMetrics,
    SystemMetrics,
};

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

// --- CPU ---

pub struct HostCpu {
    sys: System,
}

impl HostCpu {
    pub fn new() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage()),
        );
        // Usage is a delta; prime the baseline so the first tick is meaningful.
        sys.refresh_cpu_usage();
        Self { sys }
    }
}

impl Default for HostCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSource for HostCpu {
    fn usage_percent(&mut self) -> Result<f64, ProbeError> {
        self.sys.refresh_cpu_usage();
        if self.sys.cpus().is_empty() {
            return Err(ProbeError::Unsupported("cpu usage"));
        }
        Ok(self.sys.global_cpu_usage() as f64)
    }

    fn load_average(&mut self) -> Result<LoadAverage, ProbeError> {
        #[cfg(target_os = "linux")]
        {
            linux::read_loadavg()
        }
        #[cfg(not(target_os = "linux"))]
        {
            let load = System::load_average();
            Ok(LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            })
        }
    }
}

// --- Memory ---

pub struct HostMemory {
    sys: System,
}

impl HostMemory {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for HostMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource for HostMemory {
    fn memory(&mut self) -> Result<MemorySample, ProbeError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(ProbeError::Unsupported("memory statistics"));
        }
        let used = self.sys.used_memory();

        #[cfg(target_os = "linux")]
        let (cached, buffers) = linux::read_meminfo_cache().unwrap_or_default();
        #[cfg(not(target_os = "linux"))]
        let (cached, buffers) = (0, 0);

        Ok(MemorySample {
            total,
            used,
            free: self.sys.free_memory(),
            available: self.sys.available_memory(),
            used_percent: percent(used, total),
            cached,
            buffers,
        })
    }
}

// --- Disk I/O ---

#[derive(Default)]
pub struct HostDiskIo;

impl DiskIoSource for HostDiskIo {
    fn counters(&mut self) -> Result<DiskIoSample, ProbeError> {
        #[cfg(target_os = "linux")]
        {
            linux::read_diskstats()
        }
        #[cfg(not(target_os = "linux"))]
        {
            Err(ProbeError::Unsupported("per-device disk counters"))
        }
    }
}

// --- Network ---

pub struct HostNetwork {
    networks: Networks,
}

impl HostNetwork {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkSource for HostNetwork {
    fn counters(&mut self) -> Result<NetworkSample, ProbeError> {
        #[cfg(target_os = "linux")]
        {
            linux::read_net_dev()
        }
        #[cfg(not(target_os = "linux"))]
        {
            self.networks.refresh(true);
            Ok(self
                .networks
                .iter()
                .map(|(name, data)| {
                    let counters = InterfaceCounters {
                        bytes_sent: data.total_transmitted(),
                        bytes_recv: data.total_received(),
                        errors_in: data.total_errors_on_received(),
                        errors_out: data.total_errors_on_transmitted(),
                        drops_in: 0,
                        drops_out: 0,
                    };
                    (name.clone(), counters)
                })
                .collect())
        }
    }

    fn addresses(&mut self, interface: &str) -> Result<Vec<IpAddr>, ProbeError> {
        self.networks.refresh(true);
        let data = self.networks.get(interface).ok_or_else(|| {
            ProbeError::parse("network interfaces", format!("no interface {interface}"))
        })?;
        Ok(data.ip_networks().iter().map(|net| net.addr).collect())
    }
}

// --- Instant queries ---

pub struct HostSwap {
    sys: System,
}

impl HostSwap {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for HostSwap {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapSource for HostSwap {
    fn swap(&mut self) -> Result<SwapMetrics, ProbeError> {
        self.sys.refresh_memory();
        let total = self.sys.total_swap();
        let used = self.sys.used_swap();
        Ok(SwapMetrics {
            total,
            used,
            used_percent: percent(used, total),
        })
    }
}

pub struct HostDiskSpace {
    disks: Disks,
}

impl HostDiskSpace {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for HostDiskSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskSpaceSource for HostDiskSpace {
    fn disk_space(&mut self) -> Result<DiskSpaceMetrics, ProbeError> {
        self.disks.refresh(true);
        let mut seen = HashSet::new();
        let mut total = 0u64;
        let mut free = 0u64;
        for disk in &self.disks {
            let fs_type = disk.file_system().to_string_lossy();
            if is_pseudo_filesystem(&fs_type) {
                continue;
            }
            // Bind mounts and btrfs subvolumes show the same device repeatedly.
            if !seen.insert(disk.name().to_os_string()) {
                continue;
            }
            total = total.saturating_add(disk.total_space());
            free = free.saturating_add(disk.available_space());
        }
        if seen.is_empty() {
            return Err(ProbeError::Unsupported("disk space"));
        }
        let used = total.saturating_sub(free);
        Ok(DiskSpaceMetrics {
            total,
            used,
            free,
            used_percent: percent(used, total),
        })
    }
}

pub struct HostSystem {
    sys: System,
}

impl HostSystem {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for HostSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSource for HostSystem {
    fn system(&mut self) -> Result<SystemMetrics, ProbeError> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        Ok(SystemMetrics {
            uptime: System::uptime(),
            boot_time: System::boot_time(),
            process_count: self.sys.processes().len() as u64,
        })
    }
}
