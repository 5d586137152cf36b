//! External conversion engines.
//!
//! Each engine wraps one CLI executable invoked as an isolated subprocess,
//! one invocation per job, under a caller-imposed wall-clock timeout. On
//! timeout the child is killed and reaped, never abandoned.

mod office;
mod pdf_layout;

pub use office::OfficeEngine;
pub use pdf_layout::PdfLayoutEngine;

use std::{
    io::{self, ErrorKind},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use thiserror::Error;
use tokio::{io::AsyncReadExt, process::Command};

use crate::config::EngineSettings;
use crate::domain::formats::{DocumentFormat, EngineId};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine executable unavailable: {0}")]
    NotFound(io::Error),
    #[error("failed to spawn engine process: {0}")]
    Spawn(io::Error),
    #[error("engine invocation failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("engine exceeded the {timeout:?} wall-clock timeout and was killed")]
    Timeout { timeout: Duration },
    #[error("engine exited successfully but produced no output artifact")]
    MissingOutput,
    #[error("i/o failure during engine invocation: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Whether the failure was the timeout path (partial output possible).
    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::Timeout { .. })
    }
}

/// The full engine complement, addressed by [`EngineId`].
#[derive(Debug)]
pub struct Engines {
    office: OfficeEngine,
    pdf_layout: PdfLayoutEngine,
}

impl Engines {
    pub fn from_settings(settings: &EngineSettings, timeout: Duration) -> Self {
        Self {
            office: OfficeEngine::new(settings.office_cli_path.clone(), timeout),
            pdf_layout: PdfLayoutEngine::new(settings.pdf_layout_cli_path.clone(), timeout),
        }
    }

    /// Run one conversion through the engine owning the pair.
    pub async fn convert(
        &self,
        engine: EngineId,
        input: &std::path::Path,
        target: DocumentFormat,
        output: &std::path::Path,
    ) -> Result<(), EngineError> {
        match engine {
            EngineId::Office => self.office.convert(input, target, output).await,
            EngineId::PdfLayout => self.pdf_layout.convert(input, target, output).await,
        }
    }
}

struct FinishedProcess {
    status: ExitStatus,
    stderr: String,
}

/// Spawn the command and wait for it under `timeout`.
///
/// Stderr is drained concurrently so a chatty engine cannot deadlock on a
/// full pipe. On timeout the child is killed and reaped before returning.
async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<FinishedProcess, EngineError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            EngineError::NotFound(err)
        } else {
            EngineError::Spawn(err)
        }
    })?;

    let mut stderr_pipe = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buffer = String::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buffer).await;
        }
        buffer
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            stderr_task.abort();
            return Err(EngineError::Io(err));
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            stderr_task.abort();
            return Err(EngineError::Timeout { timeout });
        }
    };

    let stderr = stderr_task.await.unwrap_or_default();
    Ok(FinishedProcess { status, stderr })
}

fn check_exit(finished: FinishedProcess) -> Result<(), EngineError> {
    if finished.status.success() {
        return Ok(());
    }
    Err(EngineError::Cli {
        exit_code: finished.status.code(),
        stderr: finished.stderr,
    })
}
