use std::collections::HashMap;

use super::*;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    move |key| map.get(key).cloned()
}

// =============================================================================
// env_parse
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse(&lookup(&[]), "X", 42).expect("parse");
    assert_eq!(val, 42);
}

#[test]
fn env_parse_blank_returns_default() {
    let val: u64 = env_parse(&lookup(&[("X", "  ")]), "X", 7).expect("parse");
    assert_eq!(val, 7);
}

#[test]
fn env_parse_present_valid() {
    let val: u64 = env_parse(&lookup(&[("X", "99")]), "X", 0).expect("parse");
    assert_eq!(val, 99);
}

#[test]
fn env_parse_present_invalid_is_error() {
    let err = env_parse::<u64>(&lookup(&[("X", "notanumber")]), "X", 0).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "X", ref value } if value == "notanumber"));
}

// =============================================================================
// MapConfig
// =============================================================================

#[test]
fn defaults_when_nothing_set() {
    let config = MapConfig::from_lookup(lookup(&[])).expect("config");
    assert_eq!(config, MapConfig::default());
    assert_eq!(config.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.save_policy, SavePolicy::Explicit);
}

#[test]
fn auto_policy_uses_interval() {
    let config = MapConfig::from_lookup(lookup(&[
        ("MAPNOTES_SAVE_POLICY", "auto"),
        ("MAPNOTES_AUTOSAVE_INTERVAL_MS", "500"),
    ]))
    .expect("config");
    assert_eq!(config.save_policy, SavePolicy::AutoSave { min_interval: Duration::from_millis(500) });
}

#[test]
fn auto_policy_default_interval() {
    let config = MapConfig::from_lookup(lookup(&[("MAPNOTES_SAVE_POLICY", "auto")])).expect("config");
    assert_eq!(config.save_policy, SavePolicy::auto());
}

#[test]
fn unknown_policy_is_error() {
    let err = MapConfig::from_lookup(lookup(&[("MAPNOTES_SAVE_POLICY", "sometimes")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "MAPNOTES_SAVE_POLICY", .. }));
    assert_eq!(err.error_code(), "E_CONFIG");
}

#[test]
fn reads_url_token_and_zoom() {
    let config = MapConfig::from_lookup(lookup(&[
        ("MAPNOTES_BASE_URL", "https://maps.example.com"),
        ("MAPNOTES_SESSION_TOKEN", "abc"),
        ("MAPNOTES_MAP_ZOOM", "16.5"),
    ]))
    .expect("config");
    assert_eq!(config.base_url, "https://maps.example.com");
    assert_eq!(config.session_token.as_deref(), Some("abc"));
    assert!((config.map_zoom - 16.5).abs() < f64::EPSILON);
}

#[test]
fn blank_token_is_none() {
    let config = MapConfig::from_lookup(lookup(&[("MAPNOTES_SESSION_TOKEN", "")])).expect("config");
    assert!(config.session_token.is_none());
}

#[test]
fn negative_zoom_is_error() {
    let err = MapConfig::from_lookup(lookup(&[("MAPNOTES_MAP_ZOOM", "-1")])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "MAPNOTES_MAP_ZOOM", .. }));
}
