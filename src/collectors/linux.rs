//! procfs readers. Parsing is split from file access so the formats can be
//! tested against captured snippets.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::ProbeError;
use crate::model::{DiskCounters, DiskIoSample, InterfaceCounters, LoadAverage, NetworkSample};

pub const LOADAVG: &str = "/proc/loadavg";
pub const MEMINFO: &str = "/proc/meminfo";
pub const DISKSTATS: &str = "/proc/diskstats";
pub const NET_DEV: &str = "/proc/net/dev";
pub const CPUINFO: &str = "/proc/cpuinfo";

/// /proc/diskstats always counts 512-byte sectors, whatever the device's
/// real sector size.
const SECTOR_BYTES: u64 = 512;

pub fn read(path: &str) -> Result<String, ProbeError> {
    fs::read_to_string(path).map_err(|source| ProbeError::Read {
        path: path.to_string(),
        source,
    })
}

// ── parsers ─────────────────────────────────────────────────────────────

/// `0.52 0.58 0.59 1/467 12345`
pub fn parse_loadavg(content: &str) -> Result<LoadAverage, ProbeError> {
    let fields: Vec<f64> = content
        .split_whitespace()
        .take(3)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| ProbeError::parse(LOADAVG, format!("{e}")))?;
    match fields.as_slice() {
        [one, five, fifteen] => Ok(LoadAverage {
            one: *one,
            five: *five,
            fifteen: *fifteen,
        }),
        _ => Err(ProbeError::parse(LOADAVG, "expected 3 load figures")),
    }
}

/// Return `(cached, buffers)` in bytes from /proc/meminfo. Missing lines
/// count as zero.
pub fn parse_meminfo_cache(content: &str) -> (u64, u64) {
    let mut cached = 0;
    let mut buffers = 0;
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let kib: u64 = rest
            .trim()
            .trim_end_matches("kB")
            .trim()
            .parse()
            .unwrap_or(0);
        match key {
            "Cached" => cached = kib * 1024,
            "Buffers" => buffers = kib * 1024,
            _ => {}
        }
    }
    (cached, buffers)
}

/// Parse /proc/diskstats into per-device counters for whole block devices
/// (partitions are excluded so their I/O is not counted twice).
pub fn parse_diskstats(content: &str) -> DiskIoSample {
    let mut result = HashMap::new();
    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        // Fields (0-indexed):
        //  2  name
        //  3  reads completed
        //  5  sectors read
        //  7  writes completed
        //  9  sectors written
        if parts.len() < 10 || !is_block_device(parts[2]) {
            continue;
        }
        let field = |i: usize| parts[i].parse::<u64>().unwrap_or(0);
        result.insert(
            parts[2].to_string(),
            DiskCounters {
                read_ops: field(3),
                read_bytes: field(5) * SECTOR_BYTES,
                write_ops: field(7),
                write_bytes: field(9) * SECTOR_BYTES,
            },
        );
    }
    result
}

/// Parse /proc/net/dev into per-interface counters.
pub fn parse_net_dev(content: &str) -> NetworkSample {
    let mut result = HashMap::new();
    // First two lines are headers.
    for line in content.lines().skip(2) {
        let Some((iface, rest)) = line.trim().split_once(':') else {
            continue;
        };
        let cols: Vec<u64> = rest
            .split_whitespace()
            .map(|c| c.parse().unwrap_or(0))
            .collect();
        // rx: bytes packets errs drop ... (8 columns), then tx: bytes packets errs drop ...
        if cols.len() < 12 {
            continue;
        }
        result.insert(
            iface.trim().to_string(),
            InterfaceCounters {
                bytes_recv: cols[0],
                errors_in: cols[2],
                drops_in: cols[3],
                bytes_sent: cols[8],
                errors_out: cols[10],
                drops_out: cols[11],
            },
        );
    }
    result
}

/// Count distinct (physical id, core id) pairs in /proc/cpuinfo. Returns
/// `None` when the kernel does not report topology (common on ARM).
pub fn parse_physical_cores(content: &str) -> Option<usize> {
    let mut cores = std::collections::HashSet::new();
    let mut physical = "";
    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim() {
            "physical id" => physical = value.trim(),
            "core id" => {
                cores.insert((physical.to_string(), value.trim().to_string()));
            }
            _ => {}
        }
    }
    (!cores.is_empty()).then_some(cores.len())
}

// ── readers ─────────────────────────────────────────────────────────────

pub fn read_loadavg() -> Result<LoadAverage, ProbeError> {
    parse_loadavg(&read(LOADAVG)?)
}

pub fn read_meminfo_cache() -> Result<(u64, u64), ProbeError> {
    Ok(parse_meminfo_cache(&read(MEMINFO)?))
}

pub fn read_diskstats() -> Result<DiskIoSample, ProbeError> {
    Ok(parse_diskstats(&read(DISKSTATS)?))
}

pub fn read_net_dev() -> Result<NetworkSample, ProbeError> {
    Ok(parse_net_dev(&read(NET_DEV)?))
}

// ── block-device detection ──────────────────────────────────────────────

/// Return `true` if `name` looks like a whole block device rather than a
/// partition. Uses /sys/block/<name> when available, otherwise falls back
/// to name-pattern heuristics.
pub fn is_block_device(name: &str) -> bool {
    if name.starts_with("loop") || name.starts_with("ram") {
        return false;
    }
    if Path::new(&format!("/sys/block/{name}")).exists() {
        return true;
    }
    let bytes = name.as_bytes();
    // sda, vda (not sda1)
    if (name.starts_with("sd") || name.starts_with("vd"))
        && name.len() == 3
        && bytes[2].is_ascii_alphabetic()
    {
        return true;
    }
    // xvda (not xvda1)
    if name.starts_with("xvd") && name.len() == 4 && bytes[3].is_ascii_alphabetic() {
        return true;
    }
    // nvme0n1 (not nvme0n1p1)
    if let Some(rest) = name.strip_prefix("nvme") {
        return rest.contains('n') && !rest.contains('p');
    }
    // mmcblk0 (not mmcblk0p1)
    if let Some(rest) = name.strip_prefix("mmcblk") {
        return !rest.contains('p');
    }
    // dm-0 (device-mapper / LVM)
    name.starts_with("dm-")
}
