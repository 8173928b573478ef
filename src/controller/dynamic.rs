use std::sync::{Arc, Mutex, TryLockError};

use tokio::time::Instant;

use crate::collectors::{
    DiskSpaceSource, HostCpu, HostDiskIo, HostDiskSpace, HostMemory, HostNetwork, HostSwap,
    HostSystem, SwapSource, SystemSource, run_blocking,
};
use crate::config::Tuning;
use crate::error::ProbeError;
use crate::model::DynamicMetrics;
use crate::sampler::{CpuSampler, DiskIoSampler, MemorySampler, NetworkSampler};

type Slot<S> = Arc<Mutex<Box<S>>>;

/// The one-shot queries made every cycle, each behind its own lock.
#[derive(Clone)]
pub struct InstantQueries {
    swap: Slot<dyn SwapSource>,
    disk_space: Slot<dyn DiskSpaceSource>,
    system: Slot<dyn SystemSource>,
}

impl InstantQueries {
    pub fn new(
        swap: impl SwapSource,
        disk_space: impl DiskSpaceSource,
        system: impl SystemSource,
    ) -> Self {
        Self {
            swap: Arc::new(Mutex::new(Box::new(swap) as Box<dyn SwapSource>)),
            disk_space: Arc::new(Mutex::new(Box::new(disk_space) as Box<dyn DiskSpaceSource>)),
            system: Arc::new(Mutex::new(Box::new(system) as Box<dyn SystemSource>)),
        }
    }

    pub fn from_host() -> Self {
        Self::new(HostSwap::new(), HostDiskSpace::new(), HostSystem::new())
    }
}

/// Run `f` on the source unless a previous call is still stuck in it. A
/// query that outlived its deadline keeps the lock; later cycles report
/// the field absent instead of queueing behind it.
fn query<S: ?Sized, T>(
    slot: &Mutex<Box<S>>,
    name: &'static str,
    f: impl FnOnce(&mut S) -> Result<T, ProbeError>,
) -> Result<T, ProbeError> {
    let mut source = match slot.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return Err(ProbeError::Busy(name)),
    };
    f(&mut **source)
}

/// Owns the four samplers plus the one-shot queries and assembles a
/// [`DynamicMetrics`] snapshot each cycle.
#[derive(Clone)]
pub struct DynamicCollector {
    cpu: CpuSampler,
    memory: MemorySampler,
    disk_io: DiskIoSampler,
    network: NetworkSampler,
    instant: InstantQueries,
}

impl DynamicCollector {
    pub fn new(
        cpu: CpuSampler,
        memory: MemorySampler,
        disk_io: DiskIoSampler,
        network: NetworkSampler,
        instant: InstantQueries,
    ) -> Self {
        Self {
            cpu,
            memory,
            disk_io,
            network,
            instant,
        }
    }

    /// Samplers and queries backed by the running host.
    pub fn from_host(tuning: &Tuning) -> Self {
        Self::new(
            CpuSampler::new(HostCpu::new(), tuning),
            MemorySampler::new(HostMemory::new(), tuning),
            DiskIoSampler::new(HostDiskIo, tuning),
            NetworkSampler::new(HostNetwork::new(), tuning),
            InstantQueries::from_host(),
        )
    }

    pub fn cpu(&self) -> &CpuSampler {
        &self.cpu
    }

    pub fn memory(&self) -> &MemorySampler {
        &self.memory
    }

    pub fn disk_io(&self) -> &DiskIoSampler {
        &self.disk_io
    }

    pub fn network(&self) -> &NetworkSampler {
        &self.network
    }

    pub fn start(&self) {
        self.cpu.start();
        self.memory.start();
        self.disk_io.start();
        self.network.start();
    }

    pub fn stop(&self) {
        self.cpu.stop();
        self.memory.stop();
        self.disk_io.stop();
        self.network.stop();
    }

    /// Collect every branch concurrently. Branches that fail or are still
    /// running at `deadline` are left out; this never fails as a whole.
    pub async fn collect(&self, deadline: Instant) -> DynamicMetrics {
        let cpu = self.cpu.clone();
        let memory = self.memory.clone();
        let disk_io = self.disk_io.clone();
        let network = self.network.clone();
        let swap = Arc::clone(&self.instant.swap);
        let disk_space = Arc::clone(&self.instant.disk_space);
        let system = Arc::clone(&self.instant.system);

        let (cpu, memory, disk_io, network, swap, disk_space, system) = tokio::join!(
            branch("cpu", deadline, move || cpu.collect()),
            branch("memory", deadline, move || memory.collect()),
            branch("disk_io", deadline, move || Ok(disk_io.collect())),
            branch("network", deadline, move || Ok(network.collect_all())),
            branch("swap", deadline, move || query(&swap, "swap", |s| s.swap())),
            branch("disk_space", deadline, move || {
                query(&disk_space, "disk_space", |s| s.disk_space())
            }),
            branch("system", deadline, move || query(&system, "system", |s| s.system())),
        );

        let (network_public, network_private, network_health) = match network {
            Some(traffic) => (
                Some(traffic.public),
                Some(traffic.private),
                Some(traffic.health),
            ),
            None => (None, None, None),
        };

        DynamicMetrics {
            cpu,
            memory,
            swap,
            disk_space,
            disk_io,
            network_public,
            network_private,
            network_health,
            system,
        }
    }
}

async fn branch<T, F>(name: &'static str, deadline: Instant, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProbeError> + Send + 'static,
{
    if Instant::now() >= deadline {
        tracing::debug!(branch = name, "no time left in the cycle, skipping");
        return None;
    }
    match tokio::time::timeout_at(deadline, run_blocking(f)).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::debug!(branch = name, error = %e, "collection branch failed");
            None
        }
        Err(_) => {
            tracing::debug!(branch = name, "collection branch missed the deadline");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::time::Duration;

    use super::*;
    use crate::collectors::{CpuSource, DiskIoSource, MemorySource, NetworkSource};
    use crate::model::{
        DiskIoSample, DiskSpaceMetrics, LoadAverage, MemorySample, NetworkSample, SwapMetrics,
        SystemMetrics,
    };

    struct Broken;

    fn broken<T>() -> Result<T, ProbeError> {
        Err(ProbeError::Unsupported("test"))
    }

    impl CpuSource for Broken {
        fn usage_percent(&mut self) -> Result<f64, ProbeError> {
            broken()
        }
        fn load_average(&mut self) -> Result<LoadAverage, ProbeError> {
            broken()
        }
    }

    impl MemorySource for Broken {
        fn memory(&mut self) -> Result<MemorySample, ProbeError> {
            broken()
        }
    }

    impl SwapSource for Broken {
        fn swap(&mut self) -> Result<SwapMetrics, ProbeError> {
            broken()
        }
    }

    impl DiskSpaceSource for Broken {
        fn disk_space(&mut self) -> Result<DiskSpaceMetrics, ProbeError> {
            broken()
        }
    }

    impl SystemSource for Broken {
        fn system(&mut self) -> Result<SystemMetrics, ProbeError> {
            broken()
        }
    }

    /// Readable but empty counters.
    struct Quiet;

    impl DiskIoSource for Quiet {
        fn counters(&mut self) -> Result<DiskIoSample, ProbeError> {
            Ok(HashMap::new())
        }
    }

    impl NetworkSource for Quiet {
        fn counters(&mut self) -> Result<NetworkSample, ProbeError> {
            Ok(HashMap::new())
        }
        fn addresses(&mut self, _: &str) -> Result<Vec<IpAddr>, ProbeError> {
            broken()
        }
    }

    struct Slow;

    impl CpuSource for Slow {
        fn usage_percent(&mut self) -> Result<f64, ProbeError> {
            Ok(1.0)
        }
        fn load_average(&mut self) -> Result<LoadAverage, ProbeError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(LoadAverage::default())
        }
    }

    struct Steady;

    impl SwapSource for Steady {
        fn swap(&mut self) -> Result<SwapMetrics, ProbeError> {
            Ok(SwapMetrics {
                total: 100,
                used: 25,
                used_percent: 25.0,
            })
        }
    }

    impl SystemSource for Steady {
        fn system(&mut self) -> Result<SystemMetrics, ProbeError> {
            Ok(SystemMetrics {
                uptime: 60,
                boot_time: 1_700_000_000,
                process_count: 42,
            })
        }
    }

    /// A statvfs on a dead network mount.
    struct Hung;

    impl DiskSpaceSource for Hung {
        fn disk_space(&mut self) -> Result<DiskSpaceMetrics, ProbeError> {
            std::thread::sleep(Duration::from_millis(700));
            Ok(DiskSpaceMetrics::default())
        }
    }

    fn collector(cpu: impl CpuSource, instant: InstantQueries) -> DynamicCollector {
        let tuning = Tuning::default();
        DynamicCollector::new(
            CpuSampler::new(cpu, &tuning),
            MemorySampler::new(Broken, &tuning),
            DiskIoSampler::new(Quiet, &tuning),
            NetworkSampler::new(Quiet, &tuning),
            instant,
        )
    }

    #[tokio::test]
    async fn failing_branches_are_left_out() {
        let c = collector(Broken, InstantQueries::new(Broken, Broken, Broken));
        let metrics = c.collect(Instant::now() + Duration::from_secs(5)).await;
        assert!(metrics.cpu.is_none());
        assert!(metrics.memory.is_none());
        assert!(metrics.swap.is_none());
        assert!(metrics.disk_space.is_none());
        assert!(metrics.system.is_none());
        // Empty windows still reduce to zero rates.
        assert_eq!(metrics.disk_io, Some(Default::default()));
        assert_eq!(metrics.network_public, Some(Default::default()));
        assert_eq!(metrics.network_health, Some(Default::default()));
    }

    #[tokio::test]
    async fn slow_branch_misses_the_deadline() {
        let c = collector(Slow, InstantQueries::new(Steady, Broken, Steady));
        let metrics = c.collect(Instant::now() + Duration::from_millis(200)).await;
        assert!(metrics.cpu.is_none());
        assert_eq!(metrics.swap.map(|s| s.used_percent), Some(25.0));
        assert_eq!(metrics.system.map(|s| s.process_count), Some(42));
        assert!(metrics.disk_space.is_none());
    }

    #[tokio::test]
    async fn expired_deadline_yields_an_empty_snapshot() {
        let c = collector(Broken, InstantQueries::new(Steady, Broken, Steady));
        let metrics = c.collect(Instant::now()).await;
        assert!(metrics.is_empty());
    }

    #[tokio::test]
    async fn hung_query_only_costs_its_own_field() {
        let c = collector(Broken, InstantQueries::new(Steady, Hung, Steady));
        for _ in 0..3 {
            let metrics = c.collect(Instant::now() + Duration::from_millis(150)).await;
            assert!(metrics.disk_space.is_none());
            assert_eq!(metrics.swap.map(|s| s.used), Some(25));
            assert_eq!(metrics.system.map(|s| s.uptime), Some(60));
        }
    }

    #[test]
    fn busy_source_is_reported_not_waited_on() {
        let slot: Mutex<Box<dyn SwapSource>> = Mutex::new(Box::new(Steady));
        let _held = slot.lock().unwrap();
        assert!(matches!(
            query(&slot, "swap", |s| s.swap()),
            Err(ProbeError::Busy("swap"))
        ));
    }
}
