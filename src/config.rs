//! Runtime configuration.
//!
//! Flat env-keyed configuration with defaults. Every key is read as the
//! uppercased name, with a `PAGEPILOT_`-prefixed variant taking precedence
//! so deployments can namespace their environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub action_timeout_ms: u64,
    pub navigate_timeout_ms: u64,
    pub locator_timeout_ms: u64,
    pub spa_stabilize_ms: u64,
    pub max_retries: u32,
    pub locator_retries: u32,
    pub max_plan: usize,
    pub max_chunk: usize,
    pub browser_refresh_interval: u64,
    pub use_fresh_context: bool,
    pub index_mode: bool,
    pub start_url: Option<String>,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub max_redirects: u32,
    pub save_debug_artifacts: bool,
    pub debug_dir: PathBuf,
    pub worker_pool: usize,
    pub task_grace_seconds: u64,
    /// Executor re-resolves `index=N` against a fresh catalog on staleness
    /// when set. Defaults off: the planner controls retry.
    pub relocate_on_stale: bool,
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            action_timeout_ms: 10_000,
            navigate_timeout_ms: 15_000,
            locator_timeout_ms: 7_000,
            spa_stabilize_ms: 3_000,
            max_retries: 3,
            locator_retries: 3,
            max_plan: 50,
            max_chunk: 10,
            browser_refresh_interval: 50,
            use_fresh_context: false,
            index_mode: true,
            start_url: None,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            max_redirects: 10,
            save_debug_artifacts: true,
            debug_dir: PathBuf::from("runs"),
            worker_pool: 4,
            task_grace_seconds: 300,
            relocate_on_stale: false,
            bind_addr: "127.0.0.1:8700".to_string(),
        }
    }
}

impl Config {
    /// Build a configuration from the process environment.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            action_timeout_ms: env_u64("ACTION_TIMEOUT_MS", d.action_timeout_ms),
            navigate_timeout_ms: env_u64("NAVIGATE_TIMEOUT_MS", d.navigate_timeout_ms),
            locator_timeout_ms: env_u64("LOCATOR_TIMEOUT_MS", d.locator_timeout_ms),
            spa_stabilize_ms: env_u64("SPA_STABILIZE_MS", d.spa_stabilize_ms),
            max_retries: env_u64("MAX_RETRIES", u64::from(d.max_retries)) as u32,
            locator_retries: env_u64("LOCATOR_RETRIES", u64::from(d.locator_retries)) as u32,
            max_plan: env_u64("MAX_PLAN", d.max_plan as u64) as usize,
            max_chunk: env_u64("MAX_CHUNK", d.max_chunk as u64) as usize,
            browser_refresh_interval: env_u64(
                "BROWSER_REFRESH_INTERVAL",
                d.browser_refresh_interval,
            ),
            use_fresh_context: env_bool("USE_FRESH_CONTEXT", d.use_fresh_context),
            index_mode: env_bool("INDEX_MODE", d.index_mode),
            start_url: env_string("START_URL").or(d.start_url),
            allowed_domains: env_csv("ALLOWED_DOMAINS"),
            blocked_domains: env_csv("BLOCKED_DOMAINS"),
            max_redirects: env_u64("MAX_REDIRECTS", u64::from(d.max_redirects)) as u32,
            save_debug_artifacts: env_bool("SAVE_DEBUG_ARTIFACTS", d.save_debug_artifacts),
            debug_dir: env_string("DEBUG_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.debug_dir),
            worker_pool: env_u64("WORKER_POOL", d.worker_pool as u64) as usize,
            task_grace_seconds: env_u64("TASK_GRACE_SECONDS", d.task_grace_seconds),
            relocate_on_stale: env_bool("RELOCATE_ON_STALE", d.relocate_on_stale),
            bind_addr: env_string("BIND_ADDR").unwrap_or(d.bind_addr),
        }
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn navigate_timeout(&self) -> Duration {
        Duration::from_millis(self.navigate_timeout_ms)
    }

    pub fn locator_timeout(&self) -> Duration {
        Duration::from_millis(self.locator_timeout_ms)
    }

    pub fn task_grace(&self) -> Duration {
        Duration::from_secs(self.task_grace_seconds)
    }

    /// Domain policy check used before navigation. An empty allow-list
    /// allows everything not explicitly blocked.
    pub fn domain_allowed(&self, host: &str) -> bool {
        let matches = |list: &[String]| {
            list.iter()
                .any(|d| host == d || host.ends_with(&format!(".{d}")))
        };
        if matches(&self.blocked_domains) {
            return false;
        }
        self.allowed_domains.is_empty() || matches(&self.allowed_domains)
    }
}

fn lookup(key: &str) -> Option<String> {
    std::env::var(format!("PAGEPILOT_{key}"))
        .or_else(|_| std::env::var(key))
        .ok()
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match lookup(key).as_deref() {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

fn env_string(key: &str) -> Option<String> {
    lookup(key)
}

fn env_csv(key: &str) -> Vec<String> {
    lookup(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = Config::default();
        assert_eq!(c.action_timeout_ms, 10_000);
        assert_eq!(c.navigate_timeout_ms, 15_000);
        assert_eq!(c.max_plan, 50);
        assert_eq!(c.max_chunk, 10);
        assert_eq!(c.worker_pool, 4);
        assert_eq!(c.task_grace_seconds, 300);
        assert!(c.index_mode);
        assert!(!c.use_fresh_context);
        assert!(!c.relocate_on_stale);
    }

    #[test]
    fn domain_policy_blocklist_wins() {
        let c = Config {
            allowed_domains: vec!["example.com".into()],
            blocked_domains: vec!["bad.example.com".into()],
            ..Config::default()
        };
        assert!(c.domain_allowed("example.com"));
        assert!(c.domain_allowed("shop.example.com"));
        assert!(!c.domain_allowed("bad.example.com"));
        assert!(!c.domain_allowed("other.org"));
    }

    #[test]
    fn empty_allowlist_allows_everything_unblocked() {
        let c = Config::default();
        assert!(c.domain_allowed("anything.net"));
    }
}
