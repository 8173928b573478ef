// Re-export all model types from submodules.

pub use dynamic::{
    CpuMetrics, DiskIoMetrics, DiskSpaceMetrics, DynamicMetrics, MemoryMetrics,
    NetworkAggregateMetrics, NetworkHealthMetrics, SwapMetrics, SystemMetrics,
};
pub use host::{
    CloudInfo, DiskInventoryEntry, HardwareInfo, NetworkIdentity, StaticMetrics, SystemInfo,
};
pub use payload::{MetricPayload, ServerCommand, ServerResponse};
pub use sample::{
    DiskCounters, DiskIoSample, InterfaceCounters, InterfaceKind, LoadAverage, MemorySample,
    NetworkSample,
};

mod dynamic;
mod host;
mod payload;
mod sample;
