//! hostwatch: a host telemetry agent.
//!
//! Background samplers keep a bounded window of CPU, memory, disk I/O and
//! network readings; every send interval the agent drains them into averages
//! and rates, merges in slow-changing host facts and posts the result to a
//! collector.

pub mod app;
pub mod collectors;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod model;
pub mod sampler;
pub mod transport;
