use crate::collectors::CpuSource;
use crate::config::Tuning;
use crate::error::ProbeError;
use crate::model::{CpuMetrics, LoadAverage};

use super::{Probe, Sampler, SamplerState, Timestamped};

pub struct CpuProbe(Box<dyn CpuSource>);

impl Probe for CpuProbe {
    type Sample = f64;

    fn measure(&mut self) -> Result<f64, ProbeError> {
        self.0.usage_percent()
    }
}

/// Samples global CPU usage; reports the window mean plus current load.
#[derive(Clone)]
pub struct CpuSampler {
    inner: Sampler<CpuProbe>,
}

impl CpuSampler {
    pub fn new(source: impl CpuSource, tuning: &Tuning) -> Self {
        Self {
            inner: Sampler::new(
                "cpu",
                CpuProbe(Box::new(source)),
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

    /// Drain the window and reduce it. A failed load-average query fails
    /// the whole call; the drained samples are not put back.
    pub fn collect(&self) -> Result<CpuMetrics, ProbeError> {
        let batch = self.inner.drain();
        let load = self.inner.with_probe(|p| p.0.load_average())?;
        Ok(reduce(&batch, load))
    }
}

/// Mean usage over the batch (0 when empty) combined with `load`.
pub fn reduce(batch: &[Timestamped<f64>], load: LoadAverage) -> CpuMetrics {
    let usage_percent = if batch.is_empty() {
        0.0
    } else {
        batch.iter().map(|s| s.value).sum::<f64>() / batch.len() as f64
    };
    CpuMetrics {
        usage_percent,
        load_avg_1m: load.one,
        load_avg_5m: load.five,
        load_avg_15m: load.fifteen,
    }
}
