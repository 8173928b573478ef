//! Network identity: addresses, hostname, FQDN, timezone and the cached
//! public IP.

use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use sysinfo::Networks;
use tokio::time::Instant;

use crate::sampler::classifier::is_private;
use crate::sampler::lock;

pub const PUBLIC_IP_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org",
    "https://icanhazip.com",
    "https://ifconfig.me",
];

const PUBLIC_IP_TIMEOUT: Duration = Duration::from_secs(3);

/// Remembers the last public IP for a fixed TTL so the hourly refresh does
/// not hit the lookup services more than needed.
pub struct PublicIpCache {
    ttl: Duration,
    entry: Mutex<Option<(Instant, String)>>,
}

impl PublicIpCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// The cached address, if still fresh.
    pub fn get(&self) -> Option<String> {
        lock(&self.entry)
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, ip)| ip.clone())
    }

    pub fn put(&self, ip: String) {
        *lock(&self.entry) = Some((Instant::now(), ip));
    }

    /// Return the fresh cached address or call `fetch`, caching a success.
    /// Failures are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        if let Some(ip) = self.get() {
            return Some(ip);
        }
        let ip = fetch().await?;
        self.put(ip.clone());
        Some(ip)
    }
}

/// Ask each lookup service in turn; the first reply that parses as an IP
/// address wins.
pub async fn fetch_public_ip(client: &reqwest::Client) -> Option<String> {
    for endpoint in PUBLIC_IP_ENDPOINTS {
        let reply = client
            .get(*endpoint)
            .timeout(PUBLIC_IP_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let body = match reply {
            Ok(resp) => resp.text().await,
            Err(e) => Err(e),
        };
        match body {
            Ok(text) => {
                let ip = text.trim();
                if ip.parse::<IpAddr>().is_ok() {
                    return Some(ip.to_string());
                }
                tracing::debug!(endpoint, "public IP service returned garbage");
            }
            Err(e) => tracing::debug!(endpoint, error = %e, "public IP lookup failed"),
        }
    }
    None
}

/// Private, non-loopback addresses across all interfaces, sorted and
/// de-duplicated.
pub fn internal_ips(networks: &Networks) -> Vec<String> {
    let mut ips: Vec<IpAddr> = networks
        .iter()
        .flat_map(|(_, data)| data.ip_networks().iter().map(|net| net.addr))
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified() && is_private(ip))
        .collect();
    ips.sort();
    ips.dedup();
    ips.into_iter().map(|ip| ip.to_string()).collect()
}

/// `hostname -f`, when it yields something more specific than the short
/// name.
pub fn fqdn(hostname: &str) -> Option<String> {
    let output = std::process::Command::new("hostname")
        .arg("-f")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!name.is_empty() && name != hostname).then_some(name)
}

/// IANA zone name from `TZ`, `/etc/timezone` or the `/etc/localtime` link,
/// falling back to the current UTC offset.
pub fn timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        let tz = tz.trim_start_matches(':').trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    if let Ok(content) = std::fs::read_to_string("/etc/timezone") {
        let tz = content.trim();
        if !tz.is_empty() {
            return tz.to_string();
        }
    }
    if let Some(tz) = std::fs::read_link("/etc/localtime")
        .ok()
        .and_then(|target| zone_from_link(&target.to_string_lossy()))
    {
        return tz;
    }
    chrono::Local::now().offset().to_string()
}

/// `/usr/share/zoneinfo/Europe/Berlin` → `Europe/Berlin`.
pub fn zone_from_link(target: &str) -> Option<String> {
    target
        .split_once("zoneinfo/")
        .map(|(_, zone)| zone.to_string())
        .filter(|zone| !zone.is_empty())
}
