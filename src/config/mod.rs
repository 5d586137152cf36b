//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU64, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "papermill";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_STORAGE_DIR: &str = "artifacts";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_CONVERSION_TIMEOUT_SECS: u64 = 45;
const DEFAULT_RETENTION_MINUTES: u64 = 15;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub(crate) const DEFAULT_OFFICE_CLI_PATH: &str = "soffice";
pub(crate) const DEFAULT_PDF_LAYOUT_CLI_PATH: &str = "pdfslice";

/// Command-line arguments for the Papermill binary.
#[derive(Debug, Parser)]
#[command(name = "papermill", version, about = "Papermill conversion server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PAPERMILL_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the artifact storage directory.
    #[arg(long = "storage-directory", value_name = "PATH")]
    pub storage_directory: Option<PathBuf>,

    /// Override the upload size ceiling in bytes.
    #[arg(long = "intake-max-upload-bytes", value_name = "BYTES")]
    pub intake_max_upload_bytes: Option<u64>,

    /// Override the wall-clock timeout for one engine invocation.
    #[arg(long = "conversion-timeout-seconds", value_name = "SECONDS")]
    pub conversion_timeout_seconds: Option<u64>,

    /// Override the retention window for converted artifacts.
    #[arg(long = "conversion-retention-minutes", value_name = "MINUTES")]
    pub conversion_retention_minutes: Option<u64>,

    /// Override the expiry sweep cadence.
    #[arg(long = "conversion-sweep-interval-seconds", value_name = "SECONDS")]
    pub conversion_sweep_interval_seconds: Option<u64>,

    /// Override the office-suite converter executable path.
    #[arg(long = "engines-office-cli-path", value_name = "PATH")]
    pub engines_office_cli_path: Option<PathBuf>,

    /// Override the PDF layout extractor executable path.
    #[arg(long = "engines-pdf-layout-cli-path", value_name = "PATH")]
    pub engines_pdf_layout_cli_path: Option<PathBuf>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub intake: IntakeSettings,
    pub conversion: ConversionSettings,
    pub engines: EngineSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct IntakeSettings {
    pub max_upload_bytes: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub timeout: Duration,
    pub retention_window: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub office_cli_path: PathBuf,
    pub pdf_layout_cli_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings in one step.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PAPERMILL").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    intake: RawIntakeSettings,
    conversion: RawConversionSettings,
    engines: RawEngineSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIntakeSettings {
    max_upload_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawConversionSettings {
    timeout_seconds: Option<u64>,
    retention_minutes: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    office_cli_path: Option<PathBuf>,
    pdf_layout_cli_path: Option<PathBuf>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.intake_max_upload_bytes {
            self.intake.max_upload_bytes = Some(limit);
        }
        if let Some(seconds) = overrides.conversion_timeout_seconds {
            self.conversion.timeout_seconds = Some(seconds);
        }
        if let Some(minutes) = overrides.conversion_retention_minutes {
            self.conversion.retention_minutes = Some(minutes);
        }
        if let Some(seconds) = overrides.conversion_sweep_interval_seconds {
            self.conversion.sweep_interval_seconds = Some(seconds);
        }
        if let Some(path) = overrides.engines_office_cli_path.as_ref() {
            self.engines.office_cli_path = Some(path.clone());
        }
        if let Some(path) = overrides.engines_pdf_layout_cli_path.as_ref() {
            self.engines.pdf_layout_cli_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            storage,
            intake,
            conversion,
            engines,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            storage: build_storage_settings(storage),
            intake: build_intake_settings(intake)?,
            conversion: build_conversion_settings(conversion)?,
            engines: build_engine_settings(engines),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = format!("{host}:{port}").parse::<SocketAddr>().map_err(|err| {
        LoadError::invalid("server.host", format!("`{host}` is not a valid host: {err}"))
    })?;

    let graceful_shutdown = Duration::from_secs(
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
    );

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(raw) => LevelFilter::from_str(&raw).map_err(|_| {
            LoadError::invalid(
                "logging.level",
                format!("`{raw}` is not one of trace|debug|info|warn|error"),
            )
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_storage_settings(storage: RawStorageSettings) -> StorageSettings {
    StorageSettings {
        directory: storage
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
    }
}

fn build_intake_settings(intake: RawIntakeSettings) -> Result<IntakeSettings, LoadError> {
    let max_upload_bytes = intake.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
    let max_upload_bytes = NonZeroU64::new(max_upload_bytes).ok_or_else(|| {
        LoadError::invalid(
            "intake.max_upload_bytes",
            "upload ceiling must be greater than zero",
        )
    })?;

    Ok(IntakeSettings { max_upload_bytes })
}

fn build_conversion_settings(
    conversion: RawConversionSettings,
) -> Result<ConversionSettings, LoadError> {
    let timeout_seconds = conversion
        .timeout_seconds
        .unwrap_or(DEFAULT_CONVERSION_TIMEOUT_SECS);
    let timeout_seconds = NonZeroU64::new(timeout_seconds).ok_or_else(|| {
        LoadError::invalid(
            "conversion.timeout_seconds",
            "conversion timeout must be greater than zero",
        )
    })?;

    let retention_minutes = conversion
        .retention_minutes
        .unwrap_or(DEFAULT_RETENTION_MINUTES);
    let retention_minutes = NonZeroU64::new(retention_minutes).ok_or_else(|| {
        LoadError::invalid(
            "conversion.retention_minutes",
            "retention window must be greater than zero",
        )
    })?;

    let sweep_interval_seconds = conversion
        .sweep_interval_seconds
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
    let sweep_interval_seconds = NonZeroU64::new(sweep_interval_seconds).ok_or_else(|| {
        LoadError::invalid(
            "conversion.sweep_interval_seconds",
            "sweep interval must be greater than zero",
        )
    })?;

    Ok(ConversionSettings {
        timeout: Duration::from_secs(timeout_seconds.get()),
        retention_window: Duration::from_secs(retention_minutes.get() * 60),
        sweep_interval: Duration::from_secs(sweep_interval_seconds.get()),
    })
}

fn build_engine_settings(engines: RawEngineSettings) -> EngineSettings {
    EngineSettings {
        office_cli_path: engines
            .office_cli_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OFFICE_CLI_PATH)),
        pdf_layout_cli_path: engines
            .pdf_layout_cli_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PDF_LAYOUT_CLI_PATH)),
    }
}

#[cfg(test)]
mod tests;
