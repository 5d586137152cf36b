use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn upload_ceiling_defaults_to_50_mib() {
    let raw = RawSettings::default();
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.intake.max_upload_bytes.get(),
        DEFAULT_MAX_UPLOAD_BYTES
    );
}

#[test]
fn upload_ceiling_can_be_overridden_via_cli() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        intake_max_upload_bytes: Some(1_572_864),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.intake.max_upload_bytes.get(), 1_572_864);
}

#[test]
fn zero_upload_ceiling_is_rejected() {
    let mut raw = RawSettings::default();
    raw.intake.max_upload_bytes = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ceiling must not validate");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "intake.max_upload_bytes",
            ..
        }
    ));
}

#[test]
fn conversion_defaults_are_tunable_and_nonzero() {
    let raw = RawSettings::default();
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.conversion.timeout,
        Duration::from_secs(DEFAULT_CONVERSION_TIMEOUT_SECS)
    );
    assert_eq!(
        settings.conversion.retention_window,
        Duration::from_secs(DEFAULT_RETENTION_MINUTES * 60)
    );

    let mut raw = RawSettings::default();
    raw.conversion.timeout_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn engine_paths_default_and_override() {
    let raw = RawSettings::default();
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.engines.office_cli_path,
        PathBuf::from(DEFAULT_OFFICE_CLI_PATH)
    );

    let args = CliArgs::parse_from([
        "papermill",
        "--engines-office-cli-path",
        "/opt/libreoffice/soffice",
        "--conversion-timeout-seconds",
        "90",
    ]);
    let mut raw = RawSettings::default();
    raw.apply_overrides(&args.overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.engines.office_cli_path,
        PathBuf::from("/opt/libreoffice/soffice")
    );
    assert_eq!(settings.conversion.timeout, Duration::from_secs(90));
}

#[test]
fn invalid_log_level_is_reported_with_key() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("shouting".to_string());

    let err = Settings::from_raw(raw).expect_err("invalid level must not validate");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}
