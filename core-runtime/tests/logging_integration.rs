//! Integration tests for logging helpers

use core_runtime::logging::{
    init_logging, strip_path, LogFormat, LogLevel, LogTarget, LoggingConfig,
};

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_target(LogTarget::Stderr);

    assert!(init_logging(config.clone()).is_ok());
    // A global subscriber is already installed
    assert!(init_logging(config).is_err());

    tracing::info!(file = %strip_path("/srv/uploads/a.jpg"), "logging initialized");
}

#[test]
fn test_verbosity_levels() {
    assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
    assert_eq!(LogLevel::from_verbosity(1), LogLevel::Info);
    assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
    assert_eq!(LogLevel::from_verbosity(7), LogLevel::Trace);
    assert!(LogLevel::Trace < LogLevel::Warn);
}

#[test]
fn test_custom_filter_is_validated() {
    let config = LoggingConfig::default().with_filter("core_migration=[");
    assert!(init_logging(config).is_err());
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/var/www/uploads/2024/05/photo.jpg"), "photo.jpg");
    assert_eq!(strip_path("D:\\data\\file.png"), "file.png");
    assert_eq!(strip_path("filename.gif"), "filename.gif");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}
