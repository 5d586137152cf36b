//! PDF layout extraction engine.
//!
//! Drives a PDF-to-Word CLI (`pdfslice` by default) that rebuilds editable
//! documents from PDF text and layout, including OCR of scanned pages. The
//! CLI contract is `<cli> convert --input <pdf> --output <path>`; the output
//! format is inferred from the output extension.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::formats::DocumentFormat;

use super::{EngineError, check_exit, run_with_timeout};

#[derive(Debug, Clone)]
pub struct PdfLayoutEngine {
    cli_path: PathBuf,
    timeout: Duration,
}

impl PdfLayoutEngine {
    pub fn new(cli_path: PathBuf, timeout: Duration) -> Self {
        Self { cli_path, timeout }
    }

    pub async fn convert(
        &self,
        input: &Path,
        target: DocumentFormat,
        output: &Path,
    ) -> Result<(), EngineError> {
        let started_at = Instant::now();

        let mut command = Command::new(&self.cli_path);
        command
            .arg("convert")
            .arg("--input")
            .arg(input)
            .arg("--output")
            .arg(output);

        let finished = run_with_timeout(command, self.timeout).await.map_err(|err| {
            warn!(
                target = "infra::engines::pdf_layout",
                op = "pdf_layout::convert",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                input = %input.display(),
                target_format = target.as_str(),
                error = %err,
                "PDF layout engine invocation did not complete"
            );
            err
        })?;
        check_exit(finished).map_err(|err| {
            warn!(
                target = "infra::engines::pdf_layout",
                op = "pdf_layout::convert",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                input = %input.display(),
                target_format = target.as_str(),
                error = %err,
                "PDF layout engine reported failure"
            );
            err
        })?;

        if tokio::fs::metadata(output).await.is_err() {
            return Err(EngineError::MissingOutput);
        }

        info!(
            target = "infra::engines::pdf_layout",
            op = "pdf_layout::convert",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            target_format = target.as_str(),
            output = %output.display(),
            "PDF layout conversion finished"
        );

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-pdfslice");
        fs::write(&path, body).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    #[tokio::test]
    async fn writes_output_at_the_requested_path() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            r#"#!/bin/sh
set -eu
out=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --output)
      shift
      out="$1"
      ;;
  esac
  shift
done
printf 'docx bytes' > "$out"
"#,
        );

        let input = dir.path().join("scan.pdf");
        fs::write(&input, b"%PDF-1.4").expect("input");
        let output = dir.path().join("output.docx");

        let engine = PdfLayoutEngine::new(script, Duration::from_secs(5));
        engine
            .convert(&input, DocumentFormat::Docx, &output)
            .await
            .expect("conversion succeeds");
        assert_eq!(fs::read(&output).expect("output"), b"docx bytes");
    }

    #[tokio::test]
    async fn missing_executable_is_not_found() {
        let dir = TempDir::new().expect("temp dir");
        let engine = PdfLayoutEngine::new(
            dir.path().join("no-such-binary"),
            Duration::from_secs(5),
        );

        let input = dir.path().join("scan.pdf");
        fs::write(&input, b"%PDF-1.4").expect("input");
        let err = engine
            .convert(&input, DocumentFormat::Docx, &dir.path().join("out.docx"))
            .await
            .expect_err("spawn failure");
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
