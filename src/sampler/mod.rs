//! Background samplers: one task per resource class, each appending to a
//! bounded history that the collection cycle drains and reduces.

pub mod classifier;
pub mod cpu;
pub mod disk_io;
pub mod memory;
pub mod network;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;

pub use cpu::CpuSampler;
pub use disk_io::DiskIoSampler;
pub use memory::MemorySampler;
pub use network::NetworkSampler;

/// Lock a mutex, recovering the data if another thread panicked while
/// holding it. Every critical section here leaves the data consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Something that can take one reading of a host counter.
pub trait Probe: Send + 'static {
    type Sample: Clone + Send + 'static;

    fn measure(&mut self) -> Result<Self::Sample, ProbeError>;
}

/// A reading paired with the wall-clock time it was taken.
#[derive(Clone, Debug, PartialEq)]
pub struct Timestamped<T> {
    pub at: DateTime<Utc>,
    pub value: T,
}

impl<T> Timestamped<T> {
    pub fn now(value: T) -> Self {
        Self {
            at: Utc::now(),
            value,
        }
    }
}

/// Seconds between two readings; may be zero or negative if the clock moved.
pub(crate) fn elapsed_secs<T>(prev: &Timestamped<T>, curr: &Timestamped<T>) -> f64 {
    (curr.at - prev.at).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0
}

/// Average per-second rates over consecutive pairs of readings.
///
/// `delta` returns the counter increases between two readings, or `None` if
/// any counter went backwards; such pairs (and pairs with no elapsed time)
/// are skipped. Fewer than two readings, or no valid pair, yields zeros.
pub(crate) fn mean_pair_rates<T, const N: usize>(
    batch: &[Timestamped<T>],
    delta: impl Fn(&T, &T) -> Option<[u64; N]>,
) -> [f64; N] {
    let mut sums = [0.0; N];
    let mut pairs = 0usize;
    for pair in batch.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        let secs = elapsed_secs(prev, curr);
        if secs <= 0.0 {
            continue;
        }
        let Some(deltas) = delta(&prev.value, &curr.value) else {
            tracing::debug!("counter reset between samples, skipping pair");
            continue;
        };
        for (sum, d) in sums.iter_mut().zip(deltas) {
            *sum += d as f64 / secs;
        }
        pairs += 1;
    }
    if pairs > 0 {
        for sum in &mut sums {
            *sum /= pairs as f64;
        }
    }
    sums
}

/// Capped FIFO of readings. Oldest entries are evicted once full.
#[derive(Debug)]
pub struct History<T> {
    buf: VecDeque<Timestamped<T>>,
    capacity: usize,
}

impl<T: Clone> History<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Timestamped<T>) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Take every buffered reading, oldest first, leaving the history empty.
    pub fn drain(&mut self) -> Vec<Timestamped<T>> {
        self.buf.drain(..).collect()
    }

    pub fn latest(&self) -> Option<&Timestamped<T>> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
    Stopped,
}

struct Shared<T> {
    history: History<T>,
    state: SamplerState,
    cancel: Option<CancellationToken>,
}

/// A probe plus the background loop that feeds its history.
///
/// Clones share the same probe, history and loop.
pub struct Sampler<P: Probe> {
    name: &'static str,
    period: Duration,
    probe: Arc<Mutex<P>>,
    shared: Arc<Mutex<Shared<P::Sample>>>,
}

impl<P: Probe> Clone for Sampler<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            period: self.period,
            probe: Arc::clone(&self.probe),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Probe> Sampler<P> {
    pub fn new(name: &'static str, probe: P, period: Duration, capacity: usize) -> Self {
        Self {
            name,
            period,
            probe: Arc::new(Mutex::new(probe)),
            shared: Arc::new(Mutex::new(Shared {
                history: History::new(capacity),
                state: SamplerState::Idle,
                cancel: None,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> SamplerState {
        lock(&self.shared).state
    }

    /// Spawn the sampling loop on the current tokio runtime. The first
    /// reading is taken one period after start.
    ///
    /// Returns `false` without spawning if the loop is already running.
    pub fn start(&self) -> bool {
        let token = {
            let mut shared = lock(&self.shared);
            if shared.state == SamplerState::Running {
                return false;
            }
            let token = CancellationToken::new();
            shared.state = SamplerState::Running;
            shared.cancel = Some(token.clone());
            token
        };

        let sampler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + sampler.period, sampler.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let reader = sampler.clone();
                        let read = tokio::task::spawn_blocking(move || reader.sample_once());
                        if let Err(e) = read.await {
                            tracing::debug!(sampler = sampler.name, error = %e, "sampling task failed");
                        }
                    }
                }
            }
            tracing::debug!(sampler = sampler.name, "sampling loop exited");
        });

        tracing::debug!(sampler = self.name, period = ?self.period, "sampler started");
        true
    }

    /// Cancel the loop. A no-op unless running.
    pub fn stop(&self) {
        let mut shared = lock(&self.shared);
        if shared.state != SamplerState::Running {
            return;
        }
        if let Some(token) = shared.cancel.take() {
            token.cancel();
        }
        shared.state = SamplerState::Stopped;
    }

    /// Take one reading and append it. A failed reading is skipped.
    pub fn sample_once(&self) {
        let reading = lock(&self.probe).measure();
        match reading {
            Ok(value) => lock(&self.shared).history.push(Timestamped::now(value)),
            Err(e) => tracing::trace!(sampler = self.name, error = %e, "sample skipped"),
        }
    }

    pub fn drain(&self) -> Vec<Timestamped<P::Sample>> {
        lock(&self.shared).history.drain()
    }

    pub fn latest(&self) -> Option<Timestamped<P::Sample>> {
        lock(&self.shared).history.latest().cloned()
    }

    pub fn buffered(&self) -> usize {
        lock(&self.shared).history.len()
    }

    /// Run `f` with exclusive access to the probe, for one-off queries that
    /// share its OS handles.
    pub fn with_probe<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(&mut lock(&self.probe))
    }
}
