//! Office-suite conversion engine.
//!
//! Drives a headless office-suite CLI (`soffice` by default) which converts
//! between office formats and renders them to PDF. The CLI writes its result
//! as `<input stem>.<ext>` inside `--outdir`, so each invocation gets a fresh
//! scratch directory next to the requested output and the produced file is
//! renamed into place afterwards.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use tokio::process::Command;
use tracing::{info, warn};

use crate::domain::formats::DocumentFormat;

use super::{EngineError, check_exit, run_with_timeout};

#[derive(Debug, Clone)]
pub struct OfficeEngine {
    cli_path: PathBuf,
    timeout: Duration,
}

impl OfficeEngine {
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

        let scratch_parent = output.parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::Builder::new()
            .prefix("office-")
            .tempdir_in(scratch_parent)?;

        // Isolated profile dir: concurrent soffice invocations refuse to
        // share a user installation.
        let profile = scratch.path().join("profile");
        tokio::fs::create_dir_all(&profile).await?;

        let mut command = Command::new(&self.cli_path);
        command
            .arg(format!(
                "-env:UserInstallation=file://{}",
                profile.display()
            ))
            .arg("--headless")
            .arg("--convert-to")
            .arg(target.extension())
            .arg("--outdir")
            .arg(scratch.path())
            .arg(input);

        let finished = run_with_timeout(command, self.timeout).await.map_err(|err| {
            warn!(
                target = "infra::engines::office",
                op = "office::convert",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                input = %input.display(),
                target_format = target.as_str(),
                error = %err,
                "Office engine invocation did not complete"
            );
            err
        })?;
        check_exit(finished).map_err(|err| {
            warn!(
                target = "infra::engines::office",
                op = "office::convert",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                input = %input.display(),
                target_format = target.as_str(),
                error = %err,
                "Office engine reported failure"
            );
            err
        })?;

        let produced = expected_output(input, target, scratch.path());
        match tokio::fs::rename(&produced, output).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::MissingOutput);
            }
            Err(err) => return Err(EngineError::Io(err)),
        }

        info!(
            target = "infra::engines::office",
            op = "office::convert",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            target_format = target.as_str(),
            output = %output.display(),
            "Office engine conversion finished"
        );

        Ok(())
    }
}

fn expected_output(input: &Path, target: DocumentFormat, outdir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("document");
    outdir.join(format!("{stem}.{}", target.extension()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};
    use tempfile::TempDir;

    fn make_executable(path: &PathBuf) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-soffice");
        fs::write(&path, body).expect("write script");
        make_executable(&path);
        path
    }

    #[tokio::test]
    async fn converts_into_the_requested_output_path() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            r#"#!/bin/sh
set -eu
outdir=""
input=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --outdir)
      shift
      outdir="$1"
      ;;
    --convert-to|--headless|-env:*)
      ;;
    *)
      input="$1"
      ;;
  esac
  shift
done
stem=$(basename "$input")
stem="${stem%.*}"
printf 'converted' > "$outdir/$stem.pdf"
"#,
        );

        let input = dir.path().join("report.docx");
        fs::write(&input, b"source bytes").expect("input");
        let output = dir.path().join("out").join("output.pdf");
        fs::create_dir_all(output.parent().unwrap()).expect("outdir");

        let engine = OfficeEngine::new(script, Duration::from_secs(5));
        engine
            .convert(&input, DocumentFormat::Pdf, &output)
            .await
            .expect("conversion succeeds");

        assert_eq!(fs::read(&output).expect("output"), b"converted");
    }

    #[tokio::test]
    async fn nonzero_exit_surfaces_cli_error_with_stderr() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            r#"#!/bin/sh
echo "source import failed" >&2
exit 77
"#,
        );

        let input = dir.path().join("broken.doc");
        fs::write(&input, b"x").expect("input");
        let output = dir.path().join("output.pdf");

        let engine = OfficeEngine::new(script, Duration::from_secs(5));
        let err = engine
            .convert(&input, DocumentFormat::Pdf, &output)
            .await
            .expect_err("cli failure");
        match err {
            EngineError::Cli { exit_code, stderr } => {
                assert_eq!(exit_code, Some(77));
                assert!(stderr.contains("source import failed"));
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_engine_is_killed_at_the_timeout() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            &dir,
            r#"#!/bin/sh
sleep 30
"#,
        );

        let input = dir.path().join("slow.docx");
        fs::write(&input, b"x").expect("input");
        let output = dir.path().join("output.pdf");

        let engine = OfficeEngine::new(script, Duration::from_millis(200));
        let started = Instant::now();
        let err = engine
            .convert(&input, DocumentFormat::Pdf, &output)
            .await
            .expect_err("timeout");
        assert!(err.is_timeout(), "unexpected error variant: {err:?}");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "timeout path must not wait for the child's natural exit"
        );
    }

    #[tokio::test]
    async fn successful_exit_without_output_is_missing_output() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(&dir, "#!/bin/sh\nexit 0\n");

        let input = dir.path().join("report.docx");
        fs::write(&input, b"x").expect("input");
        let output = dir.path().join("output.pdf");

        let engine = OfficeEngine::new(script, Duration::from_secs(5));
        let err = engine
            .convert(&input, DocumentFormat::Pdf, &output)
            .await
            .expect_err("missing output");
        assert!(matches!(err, EngineError::MissingOutput));
    }
}
