//! # Configuration
//!
//! [`LabConfig`] holds everything needed to reach the lab access backend and
//! its realtime hub.
//!
//! ## Loading Priority
//!
//! Configuration is loaded from the first source that provides a value:
//!
//! 1. Explicit struct fields (programmatic construction)
//! 2. TOML config file at an explicit path
//! 3. `LAB_ACCESS_CONFIG` pointing at a TOML file
//! 4. `./lab-access.toml` in the current directory
//! 5. `~/.config/lab-access/lab-access.toml`
//! 6. Environment variables only (`LAB_API_URL`, `LAB_TOKEN_FILE`)
//!
//! `LAB_API_URL` and `LAB_TOKEN_FILE` always override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::dashboard::ChartMode;
use crate::error::{LabError, LabResult};

/// Default REST base URL. The hub lives next to it, without the `/api` suffix.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Path of the realtime hub relative to the backend root.
pub const HUB_PATH: &str = "/hubs/log";

/// Reconnect delays used after the hub connection drops, in milliseconds.
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 5] = [0, 2000, 5000, 10000, 20000];

/// Default REST request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Default hub handshake timeout in seconds.
const DEFAULT_HUB_HANDSHAKE_TIMEOUT_SECS: u64 = 15;

/// Default hub invocation timeout in seconds.
const DEFAULT_HUB_INVOKE_TIMEOUT_SECS: u64 = 15;

/// Default time without any server message before the hub connection is
/// considered dead, in seconds.
const DEFAULT_HUB_SERVER_TIMEOUT_SECS: u64 = 30;

/// Default interval between client keep-alive pings, in seconds.
const DEFAULT_HUB_KEEP_ALIVE_SECS: u64 = 15;

/// Default delay between dashboard mount and hub connect, in milliseconds.
const DEFAULT_HUB_CONNECT_DELAY_MS: u64 = 500;

/// Configuration for the lab access client.
///
/// # Examples
///
/// ```
/// use lab_access_client::config::LabConfig;
///
/// let config = LabConfig::new("https://lab.example.sch.id/api");
/// assert_eq!(config.hub_url(), "https://lab.example.sch.id/hubs/log");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabConfig {
    /// REST base URL, including the `/api` prefix.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// File holding the persisted bearer token. Defaults to
    /// `~/.config/lab-access/session.json`.
    #[serde(default)]
    pub token_file: Option<PathBuf>,

    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Realtime hub configuration.
    #[serde(default)]
    pub hub: HubConfig,

    /// Dashboard behaviour.
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

/// Timeout settings for REST and hub operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Timeout for a single REST request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for negotiate + transport connect + handshake, in seconds.
    #[serde(default = "default_hub_handshake_timeout")]
    pub hub_handshake_timeout_secs: u64,

    /// Timeout for a hub invocation to complete, in seconds.
    #[serde(default = "default_hub_invoke_timeout")]
    pub hub_invoke_timeout_secs: u64,

    /// Silence from the server after which the connection is declared lost.
    /// Only applies to transports without inherent keep-alive.
    #[serde(default = "default_hub_server_timeout")]
    pub hub_server_timeout_secs: u64,

    /// Interval between client ping messages.
    #[serde(default = "default_hub_keep_alive")]
    pub hub_keep_alive_secs: u64,
}

/// Which transport the hub connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubTransportKind {
    /// HTTP long polling (GET poll, POST send, DELETE close).
    LongPolling,
    /// A single WebSocket.
    WebSockets,
}

/// Realtime hub settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Open the hub connection on dashboard mount.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Transport to use.
    #[serde(default = "default_transport")]
    pub transport: HubTransportKind,

    /// Connect the WebSocket directly without the negotiate round-trip.
    /// Ignored for long polling.
    #[serde(default)]
    pub skip_negotiation: bool,

    /// Fixed reconnect schedule in milliseconds. Each entry is one attempt.
    #[serde(default = "default_reconnect_delays")]
    pub reconnect_delays_ms: Vec<u64>,

    /// Delay between dashboard mount and the connect attempt.
    #[serde(default = "default_hub_connect_delay")]
    pub connect_delay_ms: u64,
}

/// Dashboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Chart mode selected on mount.
    #[serde(default)]
    pub default_chart_mode: ChartMode,

    /// Re-fetch stats on this interval in addition to push updates.
    /// 0 disables polling.
    #[serde(default)]
    pub poll_interval_secs: u64,
}

// ─── Defaults ───────────────────────────────────────────────────────────

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_transport() -> HubTransportKind {
    HubTransportKind::LongPolling
}

fn default_reconnect_delays() -> Vec<u64> {
    DEFAULT_RECONNECT_DELAYS_MS.to_vec()
}

fn default_hub_connect_delay() -> u64 {
    DEFAULT_HUB_CONNECT_DELAY_MS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_hub_handshake_timeout() -> u64 {
    DEFAULT_HUB_HANDSHAKE_TIMEOUT_SECS
}

fn default_hub_invoke_timeout() -> u64 {
    DEFAULT_HUB_INVOKE_TIMEOUT_SECS
}

fn default_hub_server_timeout() -> u64 {
    DEFAULT_HUB_SERVER_TIMEOUT_SECS
}

fn default_hub_keep_alive() -> u64 {
    DEFAULT_HUB_KEEP_ALIVE_SECS
}

// ─── Default impls ──────────────────────────────────────────────────────

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            hub_handshake_timeout_secs: DEFAULT_HUB_HANDSHAKE_TIMEOUT_SECS,
            hub_invoke_timeout_secs: DEFAULT_HUB_INVOKE_TIMEOUT_SECS,
            hub_server_timeout_secs: DEFAULT_HUB_SERVER_TIMEOUT_SECS,
            hub_keep_alive_secs: DEFAULT_HUB_KEEP_ALIVE_SECS,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            transport: HubTransportKind::LongPolling,
            skip_negotiation: false,
            reconnect_delays_ms: default_reconnect_delays(),
            connect_delay_ms: DEFAULT_HUB_CONNECT_DELAY_MS,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_chart_mode: ChartMode::Monthly,
            poll_interval_secs: 0,
        }
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

// ─── LabConfig impl ────────────────────────────────────────────────────

impl LabConfig {
    /// Create a config for the given REST base URL (all other fields use defaults).
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token_file: None,
            timeouts: TimeoutConfig::default(),
            hub: HubConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }

    /// Load config from environment variables.
    ///
    /// Optional: `LAB_API_URL`, `LAB_TOKEN_FILE`
    ///
    /// # Errors
    /// Returns [`LabError::ConfigError`] if `LAB_API_URL` is set but empty.
    pub fn from_env() -> LabResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load config from a TOML file, with environment variable overrides.
    ///
    /// # Errors
    /// Returns [`LabError::ConfigError`] if the file cannot be read or parsed.
    #[cfg(feature = "config-toml")]
    pub fn from_file(path: impl AsRef<Path>) -> LabResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| LabError::ConfigError {
            reason: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;
        let mut config: Self = toml::from_str(&contents)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Discover and load config from the standard search path:
    ///
    /// 1. Explicit path (if `Some`)
    /// 2. `LAB_ACCESS_CONFIG` environment variable
    /// 3. `./lab-access.toml`
    /// 4. `~/.config/lab-access/lab-access.toml`
    ///
    /// Falls back to environment-variable-only config if no file is found.
    ///
    /// # Errors
    /// Returns [`LabError::ConfigError`] if a discovered file is invalid.
    #[cfg(feature = "config-toml")]
    pub fn discover(explicit_path: Option<&Path>) -> LabResult<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var("LAB_ACCESS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        let local_path = PathBuf::from("lab-access.toml");
        if local_path.exists() {
            return Self::from_file(&local_path);
        }

        if let Some(config_path) = config_dir().map(|dir| dir.join("lab-access.toml")) {
            if config_path.exists() {
                return Self::from_file(&config_path);
            }
        }

        Self::from_env()
    }

    fn apply_env_overrides(&mut self) -> LabResult<()> {
        if let Ok(url) = std::env::var("LAB_API_URL") {
            if url.trim().is_empty() {
                return Err(LabError::ConfigError {
                    reason: "LAB_API_URL is set but empty".into(),
                });
            }
            self.api_url = url;
        }
        if let Ok(path) = std::env::var("LAB_TOKEN_FILE") {
            self.token_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// REST base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// URL of the realtime hub: the API URL with its `/api` suffix removed,
    /// followed by [`HUB_PATH`].
    pub fn hub_url(&self) -> String {
        let base = self.api_base();
        let root = base.strip_suffix("/api").unwrap_or(base);
        format!("{root}{HUB_PATH}")
    }

    /// Path of the token file, falling back to the per-user config directory.
    pub fn token_path(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| {
            config_dir().map_or_else(
                || PathBuf::from("lab-access-session.json"),
                |dir| dir.join("session.json"),
            )
        })
    }

    /// REST request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_timeout_secs)
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

/// Platform-appropriate config directory.
fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|dir| PathBuf::from(dir).join("lab-access"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .ok()
            .map(|dir| PathBuf::from(dir).join(".config").join("lab-access"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        saved: Vec<(&'static str, Option<OsString>)>,
    }

    impl EnvGuard {
        fn capture(keys: &[&'static str]) -> Self {
            let saved = keys.iter().map(|k| (*k, std::env::var_os(k))).collect();
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                // SAFETY: tests touching the environment serialize on ENV_LOCK.
                unsafe {
                    if let Some(value) = value {
                        std::env::set_var(key, value);
                    } else {
                        std::env::remove_var(key);
                    }
                }
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unique_temp_dir(label: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "lab-access-config-tests-{}-{}-{}",
            label,
            std::process::id(),
            now
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_new_defaults() {
        let config = LabConfig::new("http://lab.local/api");
        assert_eq!(config.api_url, "http://lab.local/api");
        assert!(config.hub.enabled);
        assert_eq!(config.hub.transport, HubTransportKind::LongPolling);
        assert!(!config.hub.skip_negotiation);
        assert_eq!(config.hub.reconnect_delays_ms, vec![0, 2000, 5000, 10000, 20000]);
        assert_eq!(config.hub.connect_delay_ms, 500);
        assert_eq!(config.dashboard.default_chart_mode, ChartMode::Monthly);
        assert_eq!(config.dashboard.poll_interval_secs, 0);
        assert_eq!(config.timeouts.hub_server_timeout_secs, 30);
    }

    #[test]
    fn test_hub_url_strips_api_suffix() {
        assert_eq!(
            LabConfig::new("http://localhost:5000/api").hub_url(),
            "http://localhost:5000/hubs/log"
        );
        assert_eq!(
            LabConfig::new("https://lab.example/api/").hub_url(),
            "https://lab.example/hubs/log"
        );
        assert_eq!(
            LabConfig::new("https://lab.example").hub_url(),
            "https://lab.example/hubs/log"
        );
    }

    #[test]
    fn test_token_path_explicit() {
        let mut config = LabConfig::default();
        config.token_file = Some(PathBuf::from("/tmp/token.json"));
        assert_eq!(config.token_path(), PathBuf::from("/tmp/token.json"));
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_deserialize_toml() {
        let toml_str = r#"
            api_url = "https://lab.example/api"
            token_file = "/var/lib/lab/session.json"

            [timeouts]
            request_timeout_secs = 5

            [hub]
            transport = "web_sockets"
            skip_negotiation = true
            reconnect_delays_ms = [0, 1000]

            [dashboard]
            default_chart_mode = "daily"
            poll_interval_secs = 60
        "#;

        let config: LabConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_url, "https://lab.example/api");
        assert_eq!(
            config.token_file,
            Some(PathBuf::from("/var/lib/lab/session.json"))
        );
        assert_eq!(config.timeouts.request_timeout_secs, 5);
        assert_eq!(config.timeouts.hub_keep_alive_secs, 15);
        assert_eq!(config.hub.transport, HubTransportKind::WebSockets);
        assert!(config.hub.skip_negotiation);
        assert_eq!(config.hub.reconnect_delays_ms, vec![0, 1000]);
        assert_eq!(config.dashboard.default_chart_mode, ChartMode::Daily);
        assert_eq!(config.dashboard.poll_interval_secs, 60);
    }

    #[test]
    fn test_from_env_overrides() {
        let _lock = env_lock();
        let _env = EnvGuard::capture(&["LAB_API_URL", "LAB_TOKEN_FILE"]);

        // SAFETY: serialized on ENV_LOCK.
        unsafe {
            std::env::remove_var("LAB_API_URL");
            std::env::remove_var("LAB_TOKEN_FILE");
        }
        let config = LabConfig::from_env().unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);

        unsafe {
            std::env::set_var("LAB_API_URL", "http://env.example/api");
            std::env::set_var("LAB_TOKEN_FILE", "/tmp/env-token.json");
        }
        let config = LabConfig::from_env().unwrap();
        assert_eq!(config.api_url, "http://env.example/api");
        assert_eq!(config.token_path(), PathBuf::from("/tmp/env-token.json"));

        unsafe {
            std::env::set_var("LAB_API_URL", "  ");
        }
        let err = LabConfig::from_env().unwrap_err();
        assert!(matches!(err, LabError::ConfigError { .. }));
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_from_file_env_precedence_and_errors() {
        let _lock = env_lock();
        let _env = EnvGuard::capture(&["LAB_API_URL", "LAB_TOKEN_FILE"]);
        let dir = unique_temp_dir("from-file");

        let path = dir.join("lab-access.toml");
        fs::write(&path, "api_url = \"http://file.example/api\"\n").unwrap();

        unsafe {
            std::env::remove_var("LAB_API_URL");
            std::env::remove_var("LAB_TOKEN_FILE");
        }
        let config = LabConfig::from_file(&path).unwrap();
        assert_eq!(config.api_url, "http://file.example/api");

        unsafe {
            std::env::set_var("LAB_API_URL", "http://env.example/api");
        }
        let config = LabConfig::from_file(&path).unwrap();
        assert_eq!(config.api_url, "http://env.example/api");

        let missing = LabConfig::from_file(dir.join("missing.toml")).unwrap_err();
        assert!(missing.to_string().contains("Failed to read config file"));

        let invalid = dir.join("invalid.toml");
        fs::write(&invalid, "api_url = [").unwrap();
        assert!(matches!(
            LabConfig::from_file(&invalid).unwrap_err(),
            LabError::ConfigError { .. }
        ));

        fs::remove_dir_all(dir).unwrap();
    }
}
