//! Runtime configuration.

use tracing::warn;

/// Environment variable overriding [`RuntimeConfig::registry_capacity`].
pub const REGISTRY_CAPACITY_ENV: &str = "SEEOBJ_REGISTRY_CAPACITY";

/// Environment variable overriding [`RuntimeConfig::leak_check`].
pub const LEAK_CHECK_ENV: &str = "SEEOBJ_LEAK_CHECK";

/// Configuration of a [`Runtime`](crate::Runtime).
///
/// # Example
///
/// ```rust
/// use seeobj::RuntimeConfig;
///
/// let config = RuntimeConfig::new()
///     .with_registry_capacity(16)
///     .with_leak_check(false);
///
/// assert_eq!(config.registry_capacity, 16);
/// assert!(!config.leak_check);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of class definitions the registry is pre-sized for.
    pub registry_capacity: usize,
    /// Warn at teardown about classes that are still referenced.
    pub leak_check: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            registry_capacity: 64,
            leak_check: true,
        }
    }
}

impl RuntimeConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registry capacity.
    #[must_use]
    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    /// Enables or disables the teardown leak check.
    #[must_use]
    pub fn with_leak_check(mut self, enabled: bool) -> Self {
        self.leak_check = enabled;
        self
    }

    /// Defaults overlaid with `SEEOBJ_REGISTRY_CAPACITY` and
    /// `SEEOBJ_LEAK_CHECK`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with the values `lookup` returns for the
    /// environment keys. Unparseable values are ignored.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(REGISTRY_CAPACITY_ENV) {
            match raw.trim().parse() {
                Ok(capacity) => config.registry_capacity = capacity,
                Err(_) => warn!(key = REGISTRY_CAPACITY_ENV, value = %raw, "ignoring unparseable value"),
            }
        }

        if let Some(raw) = lookup(LEAK_CHECK_ENV) {
            match parse_flag(&raw) {
                Some(enabled) => config.leak_check = enabled,
                None => warn!(key = LEAK_CHECK_ENV, value = %raw, "ignoring unparseable value"),
            }
        }

        config
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert_eq!(config.registry_capacity, 64);
        assert!(config.leak_check);
        assert_eq!(config, RuntimeConfig::new());
    }

    #[test]
    fn test_lookup_overrides() {
        let config = RuntimeConfig::from_lookup(|key| match key {
            REGISTRY_CAPACITY_ENV => Some(" 8 ".to_string()),
            LEAK_CHECK_ENV => Some("off".to_string()),
            _ => None,
        });

        assert_eq!(config.registry_capacity, 8);
        assert!(!config.leak_check);
    }

    #[test]
    fn test_lookup_ignores_garbage() {
        let config = RuntimeConfig::from_lookup(|_| Some("many".to_string()));
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
