use std::collections::HashMap;

use crate::collectors::NetworkSource;
use crate::config::Tuning;
use crate::error::ProbeError;
use crate::model::{InterfaceKind, NetworkAggregateMetrics, NetworkHealthMetrics, NetworkSample};

use super::classifier::Classifier;
use super::{Probe, Sampler, SamplerState, Timestamped, mean_pair_rates};

const BITS_PER_MEGABIT: f64 = 1_000_000.0;
const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Reads interface counters and labels every interface it sees.
pub struct NetworkProbe {
    source: Box<dyn NetworkSource>,
    classifier: Classifier,
}

impl Probe for NetworkProbe {
    type Sample = NetworkSample;

    fn measure(&mut self) -> Result<NetworkSample, ProbeError> {
        let Self { source, classifier } = self;
        let counters = source.counters()?;
        for name in counters.keys() {
            classifier.classify(name, |iface| source.addresses(iface));
        }
        Ok(counters)
    }
}

/// Public, private and health figures computed from one drained window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkTraffic {
    pub public: NetworkAggregateMetrics,
    pub private: NetworkAggregateMetrics,
    pub health: NetworkHealthMetrics,
}

#[derive(Clone)]
pub struct NetworkSampler {
    inner: Sampler<NetworkProbe>,
}

impl NetworkSampler {
    pub fn new(source: impl NetworkSource, tuning: &Tuning) -> Self {
        Self {
            inner: Sampler::new(
                "network",
                NetworkProbe {
                    source: Box::new(source),
                    classifier: Classifier::new(),
                },
                tuning.sample_period,
                tuning.history_capacity,
            ),
        }
    }

    pub fn start(&self) -> bool {
        self.inner.start()
    }

    pub fn stop(&self) {
        self.inner.stop()
    }

    pub fn state(&self) -> SamplerState {
        self.inner.state()
    }

    pub fn sample_once(&self) {
        self.inner.sample_once()
    }

    pub fn kind_of(&self, interface: &str) -> Option<InterfaceKind> {
        self.inner.with_probe(|p| p.classifier.get(interface))
    }

    fn labels(&self) -> HashMap<String, InterfaceKind> {
        self.inner.with_probe(|p| p.classifier.labels())
    }

    /// Drain the window and aggregate interfaces of one kind.
    ///
    /// The window is consumed: asking for the other kind straight after
    /// sees an empty window and reports zeros. Use [`collect_all`] to get
    /// both from the same window.
    ///
    /// [`collect_all`]: NetworkSampler::collect_all
    pub fn collect_by_type(&self, kind: InterfaceKind) -> NetworkAggregateMetrics {
        let batch = self.inner.drain();
        aggregate(&batch, &self.labels(), kind)
    }

    /// Error and drop totals from the newest buffered reading, across every
    /// interface. Does not drain.
    pub fn collect_health(&self) -> NetworkHealthMetrics {
        self.inner
            .latest()
            .map(|s| health(&s.value))
            .unwrap_or_default()
    }

    /// Drain once and compute public, private and health together.
    pub fn collect_all(&self) -> NetworkTraffic {
        let batch = self.inner.drain();
        let labels = self.labels();
        NetworkTraffic {
            public: aggregate(&batch, &labels, InterfaceKind::Public),
            private: aggregate(&batch, &labels, InterfaceKind::Private),
            health: batch.last().map(|s| health(&s.value)).unwrap_or_default(),
        }
    }
}

pub fn health(sample: &NetworkSample) -> NetworkHealthMetrics {
    sample
        .values()
        .fold(NetworkHealthMetrics::default(), |mut acc, c| {
            acc.errors_in = acc.errors_in.saturating_add(c.errors_in);
            acc.errors_out = acc.errors_out.saturating_add(c.errors_out);
            acc.drops_in = acc.drops_in.saturating_add(c.drops_in);
            acc.drops_out = acc.drops_out.saturating_add(c.drops_out);
            acc
        })
}

/// Bandwidth for interfaces labelled `kind`: cumulative GB from the newest
/// reading and mean Mbps over consecutive pairs. All zero with fewer than
/// two readings.
pub fn aggregate(
    batch: &[Timestamped<NetworkSample>],
    labels: &HashMap<String, InterfaceKind>,
    kind: InterfaceKind,
) -> NetworkAggregateMetrics {
    if batch.len() < 2 {
        return NetworkAggregateMetrics::default();
    }
    let last = &batch[batch.len() - 1];
    let is_kind = |name: &str| labels.get(name) == Some(&kind);

    let (mut sent, mut recv) = (0u64, 0u64);
    for (_, c) in last.value.iter().filter(|(name, _)| is_kind(name)) {
        sent = sent.saturating_add(c.bytes_sent);
        recv = recv.saturating_add(c.bytes_recv);
    }

    let [send_bps, recv_bps] = mean_pair_rates(batch, |prev, curr| {
        let mut total = [0u64; 2];
        for (name, now) in curr.iter().filter(|(name, _)| is_kind(name)) {
            let Some(before) = prev.get(name) else {
                continue;
            };
            total[0] = total[0].saturating_add(now.bytes_sent.checked_sub(before.bytes_sent)?);
            total[1] = total[1].saturating_add(now.bytes_recv.checked_sub(before.bytes_recv)?);
        }
        Some(total)
    });

    NetworkAggregateMetrics {
        send_mbps: send_bps * 8.0 / BITS_PER_MEGABIT,
        recv_mbps: recv_bps * 8.0 / BITS_PER_MEGABIT,
        total_sent_gb: sent as f64 / BYTES_PER_GB,
        total_recv_gb: recv as f64 / BYTES_PER_GB,
    }
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;

    use chrono::DateTime;

    use super::*;
    use crate::model::InterfaceCounters;

    fn counters(sent: u64, recv: u64) -> InterfaceCounters {
        InterfaceCounters {
            bytes_sent: sent,
            bytes_recv: recv,
            ..Default::default()
        }
    }

    fn reading(secs: i64, ifaces: &[(&str, InterfaceCounters)]) -> Timestamped<NetworkSample> {
        Timestamped {
            at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            value: ifaces.iter().map(|(n, c)| (n.to_string(), *c)).collect(),
        }
    }

    fn labels() -> HashMap<String, InterfaceKind> {
        HashMap::from([
            ("eth0".to_string(), InterfaceKind::Public),
            ("eth1".to_string(), InterfaceKind::Private),
        ])
    }

    #[test]
    fn rates_and_totals_for_one_kind() {
        let batch = [
            reading(0, &[("eth0", counters(0, 0)), ("eth1", counters(0, 0))]),
            reading(
                2,
                &[("eth0", counters(2_000_000, 500_000)), ("eth1", counters(9, 9))],
            ),
        ];
        let public = aggregate(&batch, &labels(), InterfaceKind::Public);
        // 2 MB over 2 s = 1 MB/s = 8 Mbps
        assert_eq!(public.send_mbps, 8.0);
        assert_eq!(public.recv_mbps, 2.0);
        assert_eq!(public.total_sent_gb, 0.002);
        assert_eq!(public.total_recv_gb, 0.0005);
    }

    #[test]
    fn single_reading_is_all_zero() {
        let batch = [reading(0, &[("eth0", counters(5_000_000_000, 1))])];
        assert_eq!(
            aggregate(&batch, &labels(), InterfaceKind::Public),
            NetworkAggregateMetrics::default()
        );
    }

    #[test]
    fn health_sums_every_interface() {
        let sample: NetworkSample = [
            (
                "eth0".to_string(),
                InterfaceCounters {
                    errors_in: 1,
                    drops_out: 2,
                    ..Default::default()
                },
            ),
            (
                "lo".to_string(),
                InterfaceCounters {
                    errors_in: 3,
                    errors_out: 4,
                    drops_in: 5,
                    ..Default::default()
                },
            ),
        ]
        .into();
        assert_eq!(
            health(&sample),
            NetworkHealthMetrics {
                errors_in: 4,
                errors_out: 4,
                drops_in: 5,
                drops_out: 2,
            }
        );
    }

    #[test]
    fn health_saturates_instead_of_wrapping() {
        let near_max = InterfaceCounters {
            errors_in: u64::MAX - 1,
            drops_out: u64::MAX,
            ..Default::default()
        };
        let sample: NetworkSample = [
            ("eth0".to_string(), near_max),
            ("eth1".to_string(), near_max),
        ]
        .into();
        let total = health(&sample);
        assert_eq!(total.errors_in, u64::MAX);
        assert_eq!(total.drops_out, u64::MAX);
        assert_eq!(total.errors_out, 0);
    }

    struct Growing {
        ticks: u64,
    }

    impl NetworkSource for Growing {
        fn counters(&mut self) -> Result<NetworkSample, ProbeError> {
            self.ticks += 1;
            Ok([
                ("eth0".to_string(), counters(self.ticks * 1000, self.ticks * 1000)),
                ("eth1".to_string(), counters(self.ticks * 10, self.ticks * 10)),
            ]
            .into())
        }

        fn addresses(&mut self, interface: &str) -> Result<Vec<IpAddr>, ProbeError> {
            let ip = if interface == "eth0" { "203.0.113.9" } else { "10.0.0.9" };
            Ok(vec![ip.parse().unwrap()])
        }
    }

    #[test]
    fn probe_classifies_interfaces_as_it_samples() {
        let net = NetworkSampler::new(Growing { ticks: 0 }, &Tuning::default());
        assert_eq!(net.kind_of("eth0"), None);
        net.sample_once();
        assert_eq!(net.kind_of("eth0"), Some(InterfaceKind::Public));
        assert_eq!(net.kind_of("eth1"), Some(InterfaceKind::Private));
    }

    #[test]
    fn collect_health_does_not_drain() {
        let net = NetworkSampler::new(Growing { ticks: 0 }, &Tuning::default());
        assert_eq!(net.collect_health(), NetworkHealthMetrics::default());
        net.sample_once();
        net.collect_health();
        net.sample_once();
        // Both readings are still there for the totals.
        assert_eq!(net.collect_by_type(InterfaceKind::Public).total_sent_gb, 2000.0 / 1e9);
    }

    #[test]
    fn collect_all_reports_both_kinds_from_one_window() {
        let net = NetworkSampler::new(Growing { ticks: 0 }, &Tuning::default());
        net.sample_once();
        net.sample_once();
        let traffic = net.collect_all();
        assert_eq!(traffic.public.total_sent_gb, 2000.0 / 1e9);
        assert_eq!(traffic.private.total_sent_gb, 20.0 / 1e9);
        assert_eq!(net.collect_all(), NetworkTraffic::default());
    }
}
