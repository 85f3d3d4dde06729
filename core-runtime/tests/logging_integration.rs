//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_query, LogFormat, LoggingConfig,
};

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("core_sync=debug");

    assert!(init_logging(config.clone()).is_ok());
    // A second global subscriber is rejected
    assert!(init_logging(config).is_err());

    tracing::info!(target: "core_sync", job_id = "job-1", "logging ready");
}

#[test]
fn test_credential_redaction() {
    assert_eq!(redact_if_sensitive("access_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("dam_api_key", "k-1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("signature", "deadbeef"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("client_secret", "s"), "[REDACTED]");
}

#[test]
fn test_email_redaction() {
    let redacted = redact_if_sensitive("uploaded_by", "editor@example.com");

    assert!(redacted.starts_with('e'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_sync_fields_pass_through() {
    assert_eq!(redact_if_sensitive("asset_id", "A-12345"), "A-12345");
    assert_eq!(redact_if_sensitive("tenant_id", "acme"), "acme");
    assert_eq!(redact_if_sensitive("status", "running"), "running");
}

#[test]
fn test_download_url_query_stripped() {
    assert_eq!(
        strip_query("https://cdn.dam.example/v7/a.png?Expires=1&Signature=x"),
        "https://cdn.dam.example/v7/a.png"
    );
    assert_eq!(strip_query(""), "");
}

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false)
        .with_thread_info(true);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
    assert!(config.display_thread_info);
}
