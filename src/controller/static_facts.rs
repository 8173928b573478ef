use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::collectors::{FactSource, HostFacts};
use crate::config::Tuning;
use crate::error::{CollectError, ProbeError};
use crate::model::StaticMetrics;

#[derive(Default)]
struct Cache {
    /// When the last collection was attempted, successful or not.
    attempted: Option<Instant>,
    facts: Option<Arc<StaticMetrics>>,
}

/// Collects slow-changing host facts and caches the merged result.
pub struct StaticCollector {
    source: Arc<dyn FactSource>,
    refresh_after: Duration,
    cache: RwLock<Cache>,
}

impl StaticCollector {
    pub fn new(source: impl FactSource, tuning: &Tuning) -> Self {
        Self {
            source: Arc::new(source),
            refresh_after: tuning.static_refresh,
            cache: RwLock::new(Cache::default()),
        }
    }

    pub fn from_host(tuning: &Tuning) -> Result<Self, ProbeError> {
        Ok(Self::new(HostFacts::new(tuning)?, tuning))
    }

    /// True if no collection has been attempted yet or the last attempt is
    /// at least `static_refresh` old.
    pub fn should_refresh(&self) -> bool {
        match self.cache.read().unwrap_or_else(PoisonError::into_inner).attempted {
            None => true,
            Some(at) => at.elapsed() >= self.refresh_after,
        }
    }

    pub fn cached(&self) -> Option<Arc<StaticMetrics>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .facts
            .clone()
    }

    /// Query every fact source concurrently and cache the merge.
    ///
    /// A lookup that fails or is still running at `deadline` leaves its part
    /// absent. The attempt always counts toward the refresh schedule, so a
    /// lookup that keeps timing out is retried on the next refresh rather
    /// than every cycle. If every lookup fails the cached facts are left as
    /// they were.
    pub async fn collect(&self, deadline: Instant) -> Result<Arc<StaticMetrics>, CollectError> {
        if Instant::now() >= deadline {
            return Err(CollectError::DeadlineExceeded);
        }

        let source = &self.source;
        let (system, hardware, network, cloud, disks) = tokio::join!(
            bounded("system_info", deadline, source.system_info()),
            bounded("hardware", deadline, source.hardware()),
            bounded("network_info", deadline, source.network_info()),
            bounded("cloud_info", deadline, source.cloud_info()),
            bounded("disk_inventory", deadline, source.disk_inventory()),
        );

        let facts = StaticMetrics {
            system,
            hardware,
            network,
            cloud,
            disks,
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.attempted = Some(Instant::now());
        if facts.is_empty() {
            return Err(CollectError::NothingCollected);
        }
        let facts = Arc::new(facts);
        cache.facts = Some(Arc::clone(&facts));
        tracing::debug!(hostname = ?facts.hostname(), "static facts refreshed");
        Ok(facts)
    }
}

async fn bounded<T>(
    fact: &'static str,
    deadline: Instant,
    fut: impl Future<Output = Result<T, ProbeError>>,
) -> Option<T> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::debug!(fact, error = %e, "static lookup failed");
            None
        }
        Err(_) => {
            tracing::debug!(fact, "static lookup missed the deadline");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::model::{CloudInfo, DiskInventoryEntry, HardwareInfo, NetworkIdentity, SystemInfo};

    #[derive(Default)]
    struct Fake {
        fail_all: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
        /// How long `network_info` takes, like a public-IP lookup with
        /// outbound traffic dropped.
        stall: Option<Duration>,
    }

    impl Fake {
        fn check(&self) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_all.load(Ordering::SeqCst) {
                Err(ProbeError::Unsupported("fake"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl FactSource for Fake {
        async fn system_info(&self) -> Result<SystemInfo, ProbeError> {
            self.check()?;
            Ok(SystemInfo {
                platform: "debian".into(),
                ..Default::default()
            })
        }

        async fn hardware(&self) -> Result<HardwareInfo, ProbeError> {
            self.check()?;
            Ok(HardwareInfo {
                cpu_threads: 4,
                ..Default::default()
            })
        }

        async fn network_info(&self) -> Result<NetworkIdentity, ProbeError> {
            self.check()?;
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            Ok(NetworkIdentity {
                hostname: "node-7".into(),
                ..Default::default()
            })
        }

        async fn cloud_info(&self) -> Result<CloudInfo, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProbeError::Unsupported("cloud metadata"))
        }

        async fn disk_inventory(&self) -> Result<Vec<DiskInventoryEntry>, ProbeError> {
            self.check()?;
            Ok(Vec::new())
        }
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_is_due_after_the_threshold() {
        let statics = StaticCollector::new(Fake::default(), &Tuning::default());
        assert!(statics.should_refresh());

        let facts = statics.collect(soon()).await.unwrap();
        assert_eq!(facts.hostname(), Some("node-7"));
        assert!(facts.cloud.is_none());
        assert!(!statics.should_refresh());

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(!statics.should_refresh());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(statics.should_refresh());
    }

    #[tokio::test]
    async fn each_lookup_runs_once_per_collect() {
        let calls = Arc::new(AtomicUsize::new(0));
        let statics = StaticCollector::new(
            Fake {
                calls: Arc::clone(&calls),
                ..Default::default()
            },
            &Tuning::default(),
        );
        statics.collect(soon()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_is_cut_off_and_the_rest_is_cached() {
        let statics = StaticCollector::new(
            Fake {
                stall: Some(Duration::from_millis(500)),
                ..Default::default()
            },
            &Tuning::default(),
        );
        let started = Instant::now();
        let facts = statics
            .collect(started + Duration::from_millis(200))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(facts.network.is_none());
        assert_eq!(facts.system.as_ref().map(|s| s.platform.as_str()), Some("debian"));
        assert!(statics.cached().is_some());
        assert!(!statics.should_refresh());
    }

    #[tokio::test]
    async fn total_failure_keeps_earlier_facts() {
        let fail_all = Arc::new(AtomicBool::new(true));
        let statics = StaticCollector::new(
            Fake {
                fail_all: Arc::clone(&fail_all),
                ..Default::default()
            },
            &Tuning::default(),
        );
        assert!(matches!(
            statics.collect(soon()).await,
            Err(CollectError::NothingCollected)
        ));
        assert!(statics.cached().is_none());
        // The attempt still counts; no retry until the next refresh.
        assert!(!statics.should_refresh());

        fail_all.store(false, Ordering::SeqCst);
        statics.collect(soon()).await.unwrap();
        fail_all.store(true, Ordering::SeqCst);
        assert!(statics.collect(soon()).await.is_err());
        assert_eq!(
            statics.cached().and_then(|f| f.hostname().map(str::to_string)),
            Some("node-7".to_string())
        );
    }

    #[tokio::test]
    async fn expired_deadline_is_not_an_attempt() {
        let statics = StaticCollector::new(Fake::default(), &Tuning::default());
        assert!(matches!(
            statics.collect(Instant::now()).await,
            Err(CollectError::DeadlineExceeded)
        ));
        assert!(statics.should_refresh());
    }
}
