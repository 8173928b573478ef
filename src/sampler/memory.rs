use crate::collectors::MemorySource;
use crate::config::Tuning;
use crate::error::ProbeError;
use crate::model::{MemoryMetrics, MemorySample};

use super::{Probe, Sampler, SamplerState, Timestamped};

pub struct MemoryProbe(Box<dyn MemorySource>);

impl Probe for MemoryProbe {
    type Sample = MemorySample;

    fn measure(&mut self) -> Result<MemorySample, ProbeError> {
        self.0.memory()
    }
}

#[derive(Clone)]
pub struct MemorySampler {
    inner: Sampler<MemoryProbe>,
}

impl MemorySampler {
    pub fn new(source: impl MemorySource, tuning: &Tuning) -> Self {
        Self {
            inner: Sampler::new(
                "memory",
                MemoryProbe(Box::new(source)),
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

    /// Mean of the drained window, or a fresh reading when nothing was
    /// buffered since the last call.
    pub fn collect(&self) -> Result<MemoryMetrics, ProbeError> {
        let batch = self.inner.drain();
        if batch.is_empty() {
            let fresh = self.inner.with_probe(|p| p.0.memory())?;
            return Ok(from_sample(fresh));
        }
        Ok(reduce(&batch))
    }
}

fn from_sample(s: MemorySample) -> MemoryMetrics {
    MemoryMetrics {
        total: s.total,
        used: s.used,
        free: s.free,
        available: s.available,
        used_percent: s.used_percent,
        cached: s.cached,
        buffers: s.buffers,
    }
}

/// Field-wise mean. Byte counts are summed in u128 and divided with
/// truncation. `batch` must not be empty.
pub fn reduce(batch: &[Timestamped<MemorySample>]) -> MemoryMetrics {
    let n = batch.len().max(1);
    let mean = |field: fn(&MemorySample) -> u64| -> u64 {
        let sum: u128 = batch.iter().map(|s| field(&s.value) as u128).sum();
        (sum / n as u128) as u64
    };
    MemoryMetrics {
        total: mean(|s| s.total),
        used: mean(|s| s.used),
        free: mean(|s| s.free),
        available: mean(|s| s.available),
        used_percent: batch.iter().map(|s| s.value.used_percent).sum::<f64>() / n as f64,
        cached: mean(|s| s.cached),
        buffers: mean(|s| s.buffers),
    }
}
