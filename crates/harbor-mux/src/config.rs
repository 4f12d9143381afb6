use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::session::Dimensions;

/// Settings key for the persisted terminal row count.
pub const SETTING_TERMINAL_ROWS: &str = "terminal_rows";

/// Supplies the child process environment at spawn time.
///
/// Resolution logic (PATH fixing, toolchain variables) belongs to the
/// surrounding application; the registry only applies the result.
pub trait EnvResolver: Send + Sync {
    fn resolve(&self) -> Vec<(String, String)>;
}

/// Default resolver: pass the parent process environment through.
pub struct InheritEnv;

impl EnvResolver for InheritEnv {
    fn resolve(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}

/// External settings store, injected rather than read from globals.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

/// In-memory settings, for tests and hosts without persistence.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

/// Registry construction-time configuration.
#[derive(Clone)]
pub struct RegistryConfig {
    /// Maximum retained scrollback lines per session.
    pub scrollback_limit: usize,
    /// Pump tick driving coalesced flushes, one visual refresh interval.
    pub flush_interval: Duration,
    /// Minimum spacing between output-observer emissions per session.
    pub side_channel_interval: Duration,
    /// A `Running` session with no output for this long gets trimmed.
    pub idle_threshold: Duration,
    /// Spacing between idle sweeps.
    pub sweep_interval: Duration,
    /// Window for coalescing rapid viewport geometry events.
    pub resize_debounce: Duration,
    /// Geometry used until the display surface reports a real size.
    pub default_dimensions: Dimensions,
    pub env: Arc<dyn EnvResolver>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            scrollback_limit: 10_000,
            flush_interval: Duration::from_micros(16_667), // ~60Hz
            side_channel_interval: Duration::from_millis(100),
            idle_threshold: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            resize_debounce: Duration::from_millis(50),
            default_dimensions: Dimensions { columns: 80, rows: 24 },
            env: Arc::new(InheritEnv),
            settings: Arc::new(MemorySettings::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_settings_roundtrip() {
        let settings = MemorySettings::default();
        assert_eq!(settings.get("missing"), None);
        settings.set("terminal_rows", "40");
        assert_eq!(settings.get("terminal_rows"), Some("40".to_string()));
        settings.set("terminal_rows", "50");
        assert_eq!(settings.get("terminal_rows"), Some("50".to_string()));
    }

    #[test]
    fn test_inherit_env_includes_path() {
        let vars = InheritEnv.resolve();
        assert!(vars.iter().any(|(k, _)| k == "PATH"));
    }

    #[test]
    fn test_default_config_constants() {
        let config = RegistryConfig::default();
        assert_eq!(config.side_channel_interval, Duration::from_millis(100));
        assert_eq!(config.idle_threshold, Duration::from_secs(300));
        assert_eq!(config.resize_debounce, Duration::from_millis(50));
        assert_eq!(config.default_dimensions.columns, 80);
    }
}
