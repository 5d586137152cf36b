//! Shared fixtures for the HTTP-level integration tests.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use tempfile::TempDir;

use papermill::application::intake::IntakeService;
use papermill::application::pipeline::ConversionPipeline;
use papermill::application::retention::RetentionManager;
use papermill::application::tracker::JobTracker;
use papermill::config::{ConversionSettings, EngineSettings};
use papermill::infra::engines::Engines;
use papermill::infra::http::{AppState, build_router};
use papermill::infra::storage::ArtifactStorage;

pub const BOUNDARY: &str = "papermill-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub tracker: Arc<JobTracker>,
    pub storage: Arc<ArtifactStorage>,
}

pub struct TestAppOptions {
    pub office_cli: PathBuf,
    pub pdf_layout_cli: PathBuf,
    pub timeout: Duration,
    pub retention_window: Duration,
    pub max_upload_bytes: u64,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            office_cli: PathBuf::from("/bin/false"),
            pdf_layout_cli: PathBuf::from("/bin/false"),
            timeout: Duration::from_secs(5),
            retention_window: Duration::from_secs(60),
            max_upload_bytes: 1024 * 1024,
        }
    }
}

pub fn build_app(dir: &TempDir, options: TestAppOptions) -> TestApp {
    let storage =
        Arc::new(ArtifactStorage::new(dir.path().join("artifacts")).expect("artifact storage"));
    let tracker = Arc::new(JobTracker::new());
    let retention = Arc::new(RetentionManager::new(
        Arc::clone(&storage),
        Arc::clone(&tracker),
    ));

    let engine_settings = EngineSettings {
        office_cli_path: options.office_cli,
        pdf_layout_cli_path: options.pdf_layout_cli,
    };
    let engines = Arc::new(Engines::from_settings(&engine_settings, options.timeout));

    let conversion = ConversionSettings {
        timeout: options.timeout,
        retention_window: options.retention_window,
        sweep_interval: Duration::from_secs(60),
    };

    let pipeline = Arc::new(ConversionPipeline::new(
        Arc::clone(&tracker),
        Arc::clone(&storage),
        engines,
        Arc::clone(&retention),
        conversion,
    ));
    let intake = Arc::new(IntakeService::new(
        Arc::clone(&tracker),
        Arc::clone(&storage),
        options.max_upload_bytes.try_into().expect("nonzero ceiling"),
    ));

    let state = AppState {
        tracker: Arc::clone(&tracker),
        intake,
        pipeline,
        storage: Arc::clone(&storage),
    };
    let router = build_router(state, options.max_upload_bytes);

    TestApp {
        router,
        tracker,
        storage,
    }
}

/// Assemble a multipart form with a `file` part and a `target_format` part.
pub fn multipart_body(
    filename: &str,
    content_type: &str,
    data: &[u8],
    target_format: &str,
) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(
        format!(
            "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; \
             name=\"target_format\"\r\n\r\n{target_format}\r\n--{BOUNDARY}--\r\n"
        )
        .as_bytes(),
    );
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
