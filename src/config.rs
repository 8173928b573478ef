//! Agent configuration: operating cadence plus credentials and endpoints.
//!
//! Values are resolved from (highest precedence first) CLI flags, the process
//! environment, the env file and finally the built-in defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_SERVER_URL: &str = "https://ingest.hostwatch.dev/v1/agent/metrics";
pub const DEFAULT_ENV_FILE: &str = "/etc/hostwatch/env";

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(1);
/// 10 minutes of history at the default sample period.
pub const DEFAULT_HISTORY_CAPACITY: usize = 600;
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_STATIC_REFRESH: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_PUBLIC_IP_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_UNINSTALL_DELAY: Duration = Duration::from_secs(2);

/// Exit status after an authentication failure. Supervisors are expected to
/// list it in `RestartPreventExitStatus`.
pub const AUTH_FAILED_EXIT_CODE: u8 = 3;

const ENV_TOKEN: &str = "HOSTWATCH_TOKEN";
const ENV_SERVER_URL: &str = "HOSTWATCH_SERVER_URL";
const ENV_DEBUG: &str = "HOSTWATCH_DEBUG";
const ENV_UNINSTALL_CMD: &str = "HOSTWATCH_UNINSTALL_CMD";
const ENV_LOG_DIR: &str = "HOSTWATCH_LOG_DIR";
const ENV_SEND_INTERVAL: &str = "HOSTWATCH_SEND_INTERVAL_SECS";

/// Fixed operating parameters, injected into every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub sample_period: Duration,
    pub history_capacity: usize,
    pub send_interval: Duration,
    pub static_refresh: Duration,
    pub cycle_deadline: Duration,
    pub public_ip_ttl: Duration,
    pub uninstall_delay: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            sample_period: DEFAULT_SAMPLE_PERIOD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            send_interval: DEFAULT_SEND_INTERVAL,
            static_refresh: DEFAULT_STATIC_REFRESH,
            cycle_deadline: DEFAULT_CYCLE_DEADLINE,
            public_ip_ttl: DEFAULT_PUBLIC_IP_TTL,
            uninstall_delay: DEFAULT_UNINSTALL_DELAY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub server_url: String,

    /// Bearer token; required by `run`.
    pub token: Option<String>,

    pub debug: bool,

    /// When set, logs are also written to a daily-rolling file here.
    pub log_dir: Option<PathBuf>,

    /// Shell command run (via `sh -c`) when the collector asks the agent to
    /// uninstall itself. Unset means the request is only logged.
    pub uninstall_command: Option<String>,

    pub tuning: Tuning,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            token: None,
            debug: false,
            log_dir: None,
            uninstall_command: None,
            tuning: Tuning::default(),
        }
    }
}

impl AgentConfig {
    /// Resolve configuration from the process environment, falling back to
    /// `env_file` for keys the environment does not set.
    pub fn load(env_file: &Path) -> Result<Self> {
        let file_vars = read_env_file(env_file)
            .with_context(|| format!("loading env file {}", env_file.display()))?;
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .or_else(|| file_vars.get(key).cloned())
        })
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(url) = lookup(ENV_SERVER_URL) {
            cfg.server_url = url;
        }
        cfg.token = lookup(ENV_TOKEN);
        cfg.debug = lookup(ENV_DEBUG).is_some_and(|v| is_truthy(&v));
        cfg.uninstall_command = lookup(ENV_UNINSTALL_CMD);
        cfg.log_dir = lookup(ENV_LOG_DIR).map(PathBuf::from);

        if let Some(raw) = lookup(ENV_SEND_INTERVAL) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SEND_INTERVAL} must be a number of seconds"))?;
            if secs == 0 {
                bail!("{ENV_SEND_INTERVAL} must be greater than zero");
            }
            cfg.tuning.send_interval = Duration::from_secs(secs);
        }

        Ok(cfg)
    }

    /// Token for `run`; the agent refuses to start without one.
    pub fn require_token(&self) -> Result<&str> {
        match self.token.as_deref() {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => bail!("{ENV_TOKEN} is not set; configure it in the environment or the env file"),
        }
    }
}

fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Read `KEY=VALUE` lines. A missing file yields an empty map.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_env_file(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| {
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(v);
            (k.trim().to_string(), v.to_string())
        })
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn parse_env_file_skips_comments_and_blank_lines() {
        let vars = parse_env_file(
            "# token issued at login\n\nHOSTWATCH_TOKEN = abc123\nHOSTWATCH_DEBUG=\"true\"\nnot a pair\n",
        );
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["HOSTWATCH_TOKEN"], "abc123");
        assert_eq!(vars["HOSTWATCH_DEBUG"], "true");
    }

    #[test]
    fn parse_env_file_keeps_equals_in_values() {
        let vars = parse_env_file("HOSTWATCH_SERVER_URL=https://x.test/m?a=b\n");
        assert_eq!(vars["HOSTWATCH_SERVER_URL"], "https://x.test/m?a=b");
    }

    #[test]
    fn defaults_match_operating_parameters() {
        let cfg = AgentConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.server_url, DEFAULT_SERVER_URL);
        assert_eq!(cfg.tuning.sample_period, Duration::from_secs(1));
        assert_eq!(cfg.tuning.history_capacity, 600);
        assert_eq!(cfg.tuning.send_interval, Duration::from_secs(15));
        assert_eq!(cfg.tuning.static_refresh, Duration::from_secs(3600));
        assert_eq!(cfg.tuning.cycle_deadline, Duration::from_secs(10));
        assert_eq!(cfg.tuning.public_ip_ttl, Duration::from_secs(300));
        assert!(!cfg.debug);
        assert!(cfg.require_token().is_err());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let cfg = AgentConfig::from_lookup(lookup_from(&[
            ("HOSTWATCH_TOKEN", "tok"),
            ("HOSTWATCH_SERVER_URL", "http://localhost:9000/ingest"),
            ("HOSTWATCH_DEBUG", "1"),
            ("HOSTWATCH_SEND_INTERVAL_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(cfg.require_token().unwrap(), "tok");
        assert_eq!(cfg.server_url, "http://localhost:9000/ingest");
        assert!(cfg.debug);
        assert_eq!(cfg.tuning.send_interval, Duration::from_secs(30));
    }

    #[test]
    fn zero_send_interval_is_rejected() {
        let res = AgentConfig::from_lookup(lookup_from(&[("HOSTWATCH_SEND_INTERVAL_SECS", "0")]));
        assert!(res.is_err());
    }

    #[test]
    fn missing_env_file_is_not_an_error() {
        let vars = read_env_file(Path::new("/nonexistent/hostwatch/env")).unwrap();
        assert!(vars.is_empty());
    }
}
