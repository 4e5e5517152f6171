//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChimeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CHIME_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::ChimeSettings;

/// Resolve the settings file path.
///
/// `$CHIME_HOME/settings.json` when `CHIME_HOME` is set, otherwise
/// `~/.chime/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(dir) = std::env::var("CHIME_HOME").ok().filter(|v| !v.is_empty()) {
        return PathBuf::from(dir).join("settings.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chime").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChimeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, defaults are used. Invalid JSON or a failed
/// validation is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChimeSettings> {
    load_with(path, &|name| std::env::var(name).ok())
}

fn load_with(path: &Path, env: &dyn Fn(&str) -> Option<String>) -> Result<ChimeSettings> {
    let defaults = serde_json::to_value(ChimeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChimeSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides read through `env`.
///
/// Invalid values are ignored with a warning (the file/default value stays).
fn apply_overrides(settings: &mut ChimeSettings, env: &dyn Fn(&str) -> Option<String>) {
    let reader = EnvReader { env };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = reader.string("CHIME_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = reader.u16("CHIME_PORT", 0, 65535) {
        settings.server.port = v;
    }

    // ── Connection policy ───────────────────────────────────────────
    if let Some(v) = reader.u64("CHIME_WRITE_WAIT_MS", 1, 600_000) {
        settings.connection.write_wait_ms = v;
    }
    if let Some(v) = reader.u64("CHIME_PING_PERIOD_MS", 1, 3_600_000) {
        settings.connection.ping_period_ms = v;
    }
    if let Some(v) = reader.u64("CHIME_PONG_WAIT_MS", 1, 3_600_000) {
        settings.connection.pong_wait_ms = v;
    }
    if let Some(v) = reader.usize("CHIME_MAX_MESSAGE_SIZE", 1, 64 * 1024 * 1024) {
        settings.connection.max_message_size = v;
    }
    if let Some(v) = reader.usize("CHIME_SEND_BUFFER", 1, 1_000_000) {
        settings.connection.send_buffer = v;
    }

    // ── Auth ────────────────────────────────────────────────────────
    if let Some(v) = reader.string("CHIME_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = reader.string("CHIME_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = reader.bool("CHIME_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

struct EnvReader<'a> {
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, kind: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let val = (self.env)(name)?;
        let result = parse(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, kind, "invalid env var, ignoring");
        }
        result
    }

    fn bool(&self, name: &str) -> Option<bool> {
        self.parsed(name, "bool", parse_bool)
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        self.parsed(name, "u16", |v| parse_u16_range(v, min, max))
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        self.parsed(name, "u64", |v| parse_u64_range(v, min, max))
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        self.parsed(name, "usize", |v| parse_usize_range(v, min, max))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_with ───────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_with(Path::new("/nonexistent/settings.json"), &no_env).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.connection.send_buffer, 256);
    }

    #[test]
    fn load_partial_file_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":9000},"connection":{"sendBuffer":16}}"#,
        )
        .unwrap();

        let settings = load_with(&path, &no_env).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.connection.send_buffer, 16);
        assert_eq!(settings.connection.pong_wait_ms, 70_000);
    }

    #[test]
    fn load_invalid_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_matches!(load_with(&path, &no_env), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"connection":{"pingPeriodMs":5000,"pongWaitMs":4000}}"#,
        )
        .unwrap();
        assert_matches!(
            load_with(&path, &no_env),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server":{"port":9000}}"#).unwrap();

        let env = env_from(&[
            ("CHIME_PORT", "9100"),
            ("CHIME_SEND_BUFFER", "32"),
            ("CHIME_JWT_SECRET", "s3cret"),
            ("CHIME_LOG_JSON", "yes"),
        ]);
        let settings = load_with(&path, &env).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.connection.send_buffer, 32);
        assert_eq!(settings.auth.jwt_secret, "s3cret");
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let env = env_from(&[
            ("CHIME_PORT", "not-a-port"),
            ("CHIME_SEND_BUFFER", "0"),
            ("CHIME_LOG_JSON", "maybe"),
            ("CHIME_HOST", ""),
        ]);
        let mut settings = ChimeSettings::default();
        apply_overrides(&mut settings, &env);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.connection.send_buffer, 256);
        assert!(!settings.logging.json);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn timing_env_overrides() {
        let env = env_from(&[
            ("CHIME_WRITE_WAIT_MS", "500"),
            ("CHIME_PING_PERIOD_MS", "1000"),
            ("CHIME_PONG_WAIT_MS", "1500"),
            ("CHIME_MAX_MESSAGE_SIZE", "1024"),
        ]);
        let mut settings = ChimeSettings::default();
        apply_overrides(&mut settings, &env);
        assert_eq!(settings.connection.write_wait_ms, 500);
        assert_eq!(settings.connection.ping_period_ms, 1000);
        assert_eq!(settings.connection.pong_wait_ms, 1500);
        assert_eq!(settings.connection.max_message_size, 1024);
        assert!(settings.validate().is_ok());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("nope"), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("80", 1, 65535), Some(80));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 10, 20), None);
        assert_eq!(parse_usize_range("15", 10, 20), Some(15));
        assert_eq!(parse_usize_range("-1", 0, 20), None);
    }
}
