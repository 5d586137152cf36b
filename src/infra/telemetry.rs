use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "papermill_jobs_submitted_total",
            Unit::Count,
            "Total number of conversion jobs accepted by the upload guard."
        );
        describe_counter!(
            "papermill_jobs_rejected_total",
            Unit::Count,
            "Total number of uploads rejected before a job was created."
        );
        describe_counter!(
            "papermill_jobs_succeeded_total",
            Unit::Count,
            "Total number of conversion jobs that produced an artifact."
        );
        describe_counter!(
            "papermill_jobs_failed_total",
            Unit::Count,
            "Total number of conversion jobs that failed."
        );
        describe_counter!(
            "papermill_jobs_expired_total",
            Unit::Count,
            "Total number of jobs whose artifacts were removed after retention."
        );
        describe_gauge!(
            "papermill_active_jobs",
            Unit::Count,
            "Conversion jobs currently between acceptance and a terminal state."
        );
        describe_histogram!(
            "papermill_conversion_ms",
            Unit::Milliseconds,
            "Engine invocation latency in milliseconds."
        );
        describe_counter!(
            "papermill_artifact_delete_failures_total",
            Unit::Count,
            "Artifact deletions that could not be verified and need operator follow-up."
        );
    });
}
