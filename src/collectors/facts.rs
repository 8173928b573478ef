//! Host facts: OS, hardware, network identity, cloud and disk inventory.

use std::path::Path;

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, Networks, RefreshKind, System};

use super::network_info::{self, PublicIpCache};
#[cfg(target_os = "linux")]
use super::linux;
use super::{FactSource, cloud, is_pseudo_filesystem, run_blocking};
use crate::config::Tuning;
use crate::error::ProbeError;
use crate::model::{CloudInfo, DiskInventoryEntry, HardwareInfo, NetworkIdentity, SystemInfo};

const OS_RELEASE: &str = "/etc/os-release";
const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// [`FactSource`] for the running host.
pub struct HostFacts {
    client: reqwest::Client,
    public_ip: PublicIpCache,
}

impl HostFacts {
    pub fn new(tuning: &Tuning) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hostwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            public_ip: PublicIpCache::new(tuning.public_ip_ttl),
        })
    }
}

#[async_trait]
impl FactSource for HostFacts {
    async fn system_info(&self) -> Result<SystemInfo, ProbeError> {
        run_blocking(collect_system_info).await
    }

    async fn hardware(&self) -> Result<HardwareInfo, ProbeError> {
        run_blocking(collect_hardware).await
    }

    async fn network_info(&self) -> Result<NetworkIdentity, ProbeError> {
        let mut identity = run_blocking(collect_local_identity).await?;
        identity.public_ip = self
            .public_ip
            .get_or_fetch(|| network_info::fetch_public_ip(&self.client))
            .await;
        Ok(identity)
    }

    async fn cloud_info(&self) -> Result<CloudInfo, ProbeError> {
        cloud::detect(&self.client).await
    }

    async fn disk_inventory(&self) -> Result<Vec<DiskInventoryEntry>, ProbeError> {
        run_blocking(collect_disk_inventory).await
    }
}

// ── system ──────────────────────────────────────────────────────────────

fn collect_system_info() -> Result<SystemInfo, ProbeError> {
    let kernel_version =
        System::kernel_version().ok_or(ProbeError::Unsupported("kernel version"))?;
    let platform = System::distribution_id();
    let platform_family = std::fs::read_to_string(OS_RELEASE)
        .ok()
        .and_then(|content| os_release_family(&content))
        .unwrap_or_else(|| platform.clone());

    Ok(SystemInfo {
        platform_family,
        platform,
        platform_version: System::os_version().unwrap_or_default(),
        os: std::env::consts::OS.to_string(),
        arch: go_style_arch(std::env::consts::ARCH).to_string(),
        kernel_version,
        kernel_arch: std::env::consts::ARCH.to_string(),
        virtualization: detect_virtualization().to_string(),
        host_id: read_machine_id().unwrap_or_default(),
    })
}

/// First entry of `ID_LIKE`, e.g. `debian` for Ubuntu.
pub fn os_release_family(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let value = line.strip_prefix("ID_LIKE=")?;
        let value = value.trim().trim_matches('"');
        value.split_whitespace().next().map(str::to_string)
    })
}

/// Collectors expect the short architecture names (`amd64`, `arm64`).
pub fn go_style_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

fn read_machine_id() -> Option<String> {
    MACHINE_ID_PATHS.iter().find_map(|path| {
        let id = std::fs::read_to_string(path).ok()?;
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    })
}

fn detect_virtualization() -> &'static str {
    let read = |path: &str| std::fs::read_to_string(path).unwrap_or_default();
    let vendor = format!(
        "{} {}",
        read("/sys/class/dmi/id/sys_vendor"),
        read("/sys/class/dmi/id/product_name")
    );
    classify_virtualization(
        Path::new("/.dockerenv").exists(),
        &read("/proc/1/cgroup"),
        &vendor,
    )
}

/// Containers win over the hypervisor underneath them. Empty when nothing
/// matched.
pub fn classify_virtualization(
    dockerenv: bool,
    init_cgroup: &str,
    dmi_vendor: &str,
) -> &'static str {
    if dockerenv || init_cgroup.contains("docker") {
        return "docker";
    }
    if init_cgroup.contains("kubepods") {
        return "kubernetes";
    }
    if init_cgroup.contains("lxc") {
        return "lxc";
    }
    let vendor = dmi_vendor.to_ascii_lowercase();
    const HYPERVISORS: &[(&str, &str)] = &[
        ("kvm", "kvm"),
        ("qemu", "kvm"),
        ("amazon ec2", "kvm"),
        ("google", "kvm"),
        ("vmware", "vmware"),
        ("virtualbox", "vbox"),
        ("xen", "xen"),
        ("microsoft corporation", "hyperv"),
    ];
    HYPERVISORS
        .iter()
        .find(|(needle, _)| vendor.contains(needle))
        .map(|(_, name)| *name)
        .unwrap_or("")
}

// ── hardware ────────────────────────────────────────────────────────────

fn collect_hardware() -> Result<HardwareInfo, ProbeError> {
    let sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );
    let threads = sys.cpus().len();
    if threads == 0 {
        return Err(ProbeError::Unsupported("cpu inventory"));
    }
    let cpu_model = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_default();

    #[cfg(target_os = "linux")]
    let cores = linux::read(linux::CPUINFO)
        .ok()
        .and_then(|content| linux::parse_physical_cores(&content));
    #[cfg(not(target_os = "linux"))]
    let cores: Option<usize> = None;

    Ok(HardwareInfo {
        cpu_model,
        cpu_cores: cores.unwrap_or(threads),
        cpu_threads: threads,
        total_memory: sys.total_memory(),
    })
}

// ── network identity ────────────────────────────────────────────────────

fn collect_local_identity() -> Result<NetworkIdentity, ProbeError> {
    let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
    let networks = Networks::new_with_refreshed_list();
    Ok(NetworkIdentity {
        internal_ips: network_info::internal_ips(&networks),
        public_ip: None,
        fqdn: network_info::fqdn(&hostname),
        timezone: Some(network_info::timezone()),
        hostname,
    })
}

// ── disks ───────────────────────────────────────────────────────────────

fn collect_disk_inventory() -> Result<Vec<DiskInventoryEntry>, ProbeError> {
    let disks = Disks::new_with_refreshed_list();
    let mut entries: Vec<DiskInventoryEntry> = disks
        .iter()
        .filter(|disk| !is_pseudo_filesystem(&disk.file_system().to_string_lossy()))
        .map(|disk| DiskInventoryEntry {
            device: disk.name().to_string_lossy().into_owned(),
            mount_point: disk.mount_point().to_string_lossy().into_owned(),
            fstype: disk.file_system().to_string_lossy().into_owned(),
            total: disk.total_space(),
        })
        .collect();
    entries.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
    Ok(entries)
}
