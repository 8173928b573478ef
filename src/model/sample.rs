use std::collections::HashMap;

use serde::Serialize;

// --- Raw readings taken by the background samplers ---

/// One instantaneous memory reading, in bytes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySample {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub available: u64,
    pub used_percent: f64,
    pub cached: u64,
    pub buffers: u64,
}

/// Cumulative counters for one block device since boot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

/// Device name → counters.
pub type DiskIoSample = HashMap<String, DiskCounters>;

/// Cumulative counters for one network interface since boot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub errors_in: u64,
    pub errors_out: u64,
    pub drops_in: u64,
    pub drops_out: u64,
}

/// Interface name → counters.
pub type NetworkSample = HashMap<String, InterfaceCounters>;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Whether an interface faces the public internet or a private network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Public,
    Private,
}
