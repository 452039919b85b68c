use std::path::Path;

use polyjudge::config::{JAVASCRIPT_TIMEOUT_MS, NATIVE_TIMEOUT_MS};
use polyjudge::{Config, ConfigError, EXAMPLE_CONFIG, Language};

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/configs");

fn fixture(name: &str) -> String {
    format!("{FIXTURES_PATH}/{name}")
}

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture("valid_full.toml")).expect("Failed to load config");

    assert_eq!(config.limits_for(Language::JavaScript).timeout_ms, Some(3000));
    assert_eq!(config.limits_for(Language::Python).timeout_ms, Some(20000));
    assert_eq!(config.python.mounts.len(), 1);
    assert_eq!(config.c.args, vec!["picoc", "-s", "{source}"]);
    assert_eq!(config.c.source_name, "solution.c");
    assert_eq!(
        config.cpp.compile_service.as_deref(),
        Some("http://compiler.internal:4000")
    );
    assert_eq!(config.java.endpoints.len(), 1);
    assert_eq!(config.limits_for(Language::Java).timeout_ms, Some(10000));
}

#[test]
fn test_language_limits_layer_over_defaults() {
    let config = Config::from_file(fixture("valid_full.toml")).expect("Failed to load config");

    let cpp = config.limits_for(Language::Cpp);
    assert_eq!(cpp.timeout_ms, Some(8000));
    assert_eq!(cpp.memory_limit, Some(65536));
    assert_eq!(cpp.max_output, Some(512));

    let c = config.limits_for(Language::C);
    assert_eq!(c.timeout_ms, Some(NATIVE_TIMEOUT_MS));
    assert_eq!(c.memory_limit, Some(131072));
}

#[test]
fn test_load_minimal_config() {
    let config = Config::from_file(fixture("valid_minimal.toml")).expect("Failed to load config");

    assert_eq!(config.limits_for(Language::JavaScript).timeout_ms, Some(1000));
    assert_eq!(config.cpp.source_name, "main.cpp");
    assert_eq!(config.java.endpoints.len(), 2);
}

#[test]
fn test_load_with_explicit_path() {
    let config = Config::load(Some(Path::new(&fixture("valid_minimal.toml"))))
        .expect("Failed to load config");
    assert_eq!(config.limits_for(Language::JavaScript).timeout_ms, Some(1000));
}

#[test]
fn test_embedded_example_is_the_default() {
    let config = Config::parse_toml(EXAMPLE_CONFIG).expect("Failed to parse example config");
    assert_eq!(
        config.limits_for(Language::JavaScript).timeout_ms,
        Some(JAVASCRIPT_TIMEOUT_MS)
    );
    assert_eq!(config.python.module, Config::default().python.module);
}

#[test]
fn test_load_invalid_python_timeout() {
    let result = Config::from_file(fixture("invalid_python_timeout.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_missing_placeholder() {
    let result = Config::from_file(fixture("invalid_missing_placeholder.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_java_endpoint() {
    let result = Config::from_file(fixture("invalid_java_endpoint.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_syntax() {
    let result = Config::from_file(fixture("invalid_syntax.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
