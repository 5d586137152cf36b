use std::{future::IntoFuture, process, sync::Arc};

use papermill::{
    application::{
        error::AppError, intake::IntakeService, pipeline::ConversionPipeline,
        retention::RetentionManager, tracker::JobTracker,
    },
    config,
    infra::{
        engines::Engines,
        error::InfraError,
        http::{self, AppState},
        storage::ArtifactStorage,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let app = build_application_context(&settings)?;

    let sweeper = app
        .retention
        .spawn_sweeper(settings.conversion.sweep_interval);

    let result = serve_http(&settings, app.state).await;

    sweeper.abort();
    let _ = sweeper.await;

    result
}

struct ApplicationContext {
    state: AppState,
    retention: Arc<RetentionManager>,
}

fn build_application_context(
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let storage = Arc::new(
        ArtifactStorage::new(settings.storage.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    let tracker = Arc::new(JobTracker::new());
    let retention = Arc::new(RetentionManager::new(
        Arc::clone(&storage),
        Arc::clone(&tracker),
    ));
    let engines = Arc::new(Engines::from_settings(
        &settings.engines,
        settings.conversion.timeout,
    ));
    let pipeline = Arc::new(ConversionPipeline::new(
        Arc::clone(&tracker),
        Arc::clone(&storage),
        engines,
        Arc::clone(&retention),
        settings.conversion.clone(),
    ));
    let intake = Arc::new(IntakeService::new(
        Arc::clone(&tracker),
        Arc::clone(&storage),
        settings.intake.max_upload_bytes,
    ));

    Ok(ApplicationContext {
        state: AppState {
            tracker,
            intake,
            pipeline,
            storage,
        },
        retention,
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state, settings.intake.max_upload_bytes.get());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "papermill::serve",
        addr = %settings.server.addr,
        "Papermill listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let mut server_task = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server_task => {
            return flatten_server_result(joined);
        }
        _ = tokio::signal::ctrl_c() => {
            info!(target = "papermill::serve", "Shutdown signal received; draining connections");
        }
    }

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server_task).await {
        Ok(joined) => flatten_server_result(joined),
        Err(_) => {
            warn!(
                target = "papermill::serve",
                grace = ?settings.server.graceful_shutdown,
                "Graceful shutdown grace period elapsed; aborting server"
            );
            server_task.abort();
            Ok(())
        }
    }
}

fn flatten_server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}
