//! Engine configuration.

use std::env;

use tracing::warn;

use orderdesk_observability::LogConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Lot given to a fresh ghost item when the line has no items yet.
    pub default_lot: String,
    /// Keep one empty entry line at the tail of every opened document.
    pub ensure_empty_row: bool,
    pub log: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_lot: String::new(),
            ensure_empty_row: true,
            log: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from the process environment, after an optional `.env` file.
    ///
    /// Unset variables keep their defaults; unparsable ones are reported and
    /// ignored.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            default_lot: get("ORDERDESK_DEFAULT_LOT")
                .map(|lot| lot.trim().to_string())
                .unwrap_or(defaults.default_lot),
            ensure_empty_row: flag(&get, "ORDERDESK_ENSURE_EMPTY_ROW", defaults.ensure_empty_row),
            log: LogConfig {
                filter: get("ORDERDESK_LOG_FILTER")
                    .filter(|f| !f.trim().is_empty())
                    .unwrap_or(defaults.log.filter),
                json: flag(&get, "ORDERDESK_LOG_JSON", defaults.log.json),
            },
        }
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    let Some(raw) = get(key) else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(key, value = %raw, default, "invalid boolean in environment; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ORDERDESK_DEFAULT_LOT", " GEN "),
            ("ORDERDESK_ENSURE_EMPTY_ROW", "no"),
            ("ORDERDESK_LOG_FILTER", "orderdesk=debug"),
            ("ORDERDESK_LOG_JSON", "0"),
        ]));
        assert_eq!(config.default_lot, "GEN");
        assert!(!config.ensure_empty_row);
        assert_eq!(config.log.filter, "orderdesk=debug");
        assert!(!config.log.json);
    }

    #[test]
    fn invalid_flags_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[("ORDERDESK_ENSURE_EMPTY_ROW", "maybe")]));
        assert!(config.ensure_empty_row);
    }
}
