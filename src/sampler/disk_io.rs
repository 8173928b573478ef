use crate::collectors::DiskIoSource;
use crate::config::Tuning;
use crate::error::ProbeError;
use crate::model::{DiskIoMetrics, DiskIoSample};

use super::{Probe, Sampler, SamplerState, Timestamped, mean_pair_rates};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub struct DiskIoProbe(Box<dyn DiskIoSource>);

impl Probe for DiskIoProbe {
    type Sample = DiskIoSample;

    fn measure(&mut self) -> Result<DiskIoSample, ProbeError> {
        self.0.counters()
    }
}

#[derive(Clone)]
pub struct DiskIoSampler {
    inner: Sampler<DiskIoProbe>,
}

impl DiskIoSampler {
    pub fn new(source: impl DiskIoSource, tuning: &Tuning) -> Self {
        Self {
            inner: Sampler::new(
                "disk_io",
                DiskIoProbe(Box::new(source)),
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

    pub fn collect(&self) -> DiskIoMetrics {
        reduce(&self.inner.drain())
    }
}

/// Summed deltas of devices present in both readings, as
/// `[read_bytes, write_bytes, read_ops, write_ops]`. `None` if any matched
/// counter decreased.
fn pair_delta(prev: &DiskIoSample, curr: &DiskIoSample) -> Option<[u64; 4]> {
    let mut total = [0u64; 4];
    for (device, now) in curr {
        let Some(before) = prev.get(device) else {
            continue;
        };
        let deltas = [
            now.read_bytes.checked_sub(before.read_bytes)?,
            now.write_bytes.checked_sub(before.write_bytes)?,
            now.read_ops.checked_sub(before.read_ops)?,
            now.write_ops.checked_sub(before.write_ops)?,
        ];
        for (t, d) in total.iter_mut().zip(deltas) {
            *t = t.saturating_add(d);
        }
    }
    Some(total)
}

/// Mean per-pair throughput (MB/s, 2^20 bytes) and IOPS over the batch.
/// Zero for fewer than two readings.
pub fn reduce(batch: &[Timestamped<DiskIoSample>]) -> DiskIoMetrics {
    let [read_bps, write_bps, read_iops, write_iops] = mean_pair_rates(batch, pair_delta);
    DiskIoMetrics {
        read_mbps: read_bps / BYTES_PER_MB,
        write_mbps: write_bps / BYTES_PER_MB,
        read_iops,
        write_iops,
    }
}
