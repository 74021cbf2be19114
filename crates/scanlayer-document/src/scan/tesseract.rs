// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tesseract recognizer — runs the `tesseract` CLI with its PDF renderer and
// reads the resulting single-page PDF back as a fragment.

use std::io::{self, ErrorKind, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use scanlayer_core::error::{Result, ScanlayerError};
use tempfile::TempDir;
use tracing::{debug, instrument, warn};

use crate::image::bitmap::EnhancedBitmap;
use crate::pdf::fragment::PageFragment;
use crate::scan::recognize::{RecognitionContext, TextRecognizer};

const NOT_FOUND_HINT: &str = "tesseract not found (install tesseract-ocr)";

/// How often a running engine is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Recognizer that shells out to Tesseract.
///
/// The binary, languages, segmentation mode and timeout all come from the
/// [`RecognitionConfig`](scanlayer_core::RecognitionConfig) passed with each
/// call; the recognizer itself holds no state.
#[derive(Debug, Clone, Default)]
pub struct TesseractRecognizer;

impl TesseractRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl TextRecognizer for TesseractRecognizer {
    #[instrument(skip_all, fields(page = context.page_number, width = bitmap.width(), height = bitmap.height()))]
    fn recognize(&self, bitmap: &EnhancedBitmap, context: &RecognitionContext<'_>) -> Result<PageFragment> {
        let page = context.page_number;
        let config = context.config;

        let workdir = TempDir::new()?;
        let image_path = workdir.path().join("page.png");
        let outbase = workdir.path().join("page");
        std::fs::write(&image_path, bitmap.to_png_bytes()?)?;

        let mut command = Command::new(&config.binary);
        command
            .arg(&image_path)
            .arg(&outbase)
            .args(config.tesseract_args(context.dpi))
            .arg("pdf");

        let timeout = config.page_timeout_secs.map(Duration::from_secs);
        run_engine(command, timeout, page)?;

        let pdf = std::fs::read(outbase.with_extension("pdf")).map_err(|err| ScanlayerError::Recognition {
            page,
            detail: format!("tesseract produced no PDF: {err}"),
        })?;
        debug!(bytes_len = pdf.len(), "Tesseract fragment read");

        PageFragment::from_pdf_bytes(&pdf, page, context.tracker)
    }
}

/// The parts of a child process the supervision loop needs.
trait EngineProcess {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;
    fn kill(&mut self) -> io::Result<()>;
    fn wait(&mut self) -> io::Result<ExitStatus>;
}

impl EngineProcess for Child {
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Child::try_wait(self)
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ExitStatus> {
        Child::wait(self)
    }
}

/// Poll `process` until it exits. On timeout, or if its status cannot be
/// read, the process is killed and reaped before the error is returned.
fn supervise(process: &mut impl EngineProcess, timeout: Option<Duration>, page: usize) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        match process.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(err) => {
                warn!(page, %err, "Lost track of OCR engine, killing it");
                let _ = process.kill();
                let _ = process.wait();
                return Err(err.into());
            }
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                warn!(page, seconds = limit.as_secs(), "OCR engine timed out, killing it");
                let _ = process.kill();
                let _ = process.wait();
                return Err(ScanlayerError::RecognitionTimeout {
                    page,
                    seconds: limit.as_secs(),
                });
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Run `command` to completion, killing it once `timeout` has elapsed.
///
/// Stdout is discarded; stderr is collected for the error message.
fn run_engine(mut command: Command, timeout: Option<Duration>, page: usize) -> Result<()> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| ScanlayerError::Recognition {
            page,
            detail: match err.kind() {
                ErrorKind::NotFound => NOT_FOUND_HINT.to_string(),
                _ => format!("failed to start OCR engine: {err}"),
            },
        })?;

    // Drain stderr concurrently so a chatty engine cannot fill the pipe and stall.
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = String::new();
            let _ = stderr.read_to_string(&mut buffer);
            buffer
        })
    });

    let status = supervise(&mut child, timeout, page)?;

    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if !status.success() {
        return Err(ScanlayerError::Recognition {
            page,
            detail: format!("tesseract exited with {status}: {}", stderr.trim()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleTracker;
    use image::{GrayImage, Luma};
    use scanlayer_core::config::RecognitionConfig;

    #[test]
    fn missing_binary_names_the_package() {
        let tracker = HandleTracker::new();
        let config = RecognitionConfig {
            binary: "/nonexistent/bin/tesseract".into(),
            ..RecognitionConfig::default()
        };
        let context = RecognitionContext {
            config: &config,
            dpi: 300,
            page_number: 3,
            tracker: &tracker,
        };
        let bitmap = EnhancedBitmap::from_gray(GrayImage::from_pixel(8, 8, Luma([255u8])));

        let err = TesseractRecognizer::new()
            .recognize(&bitmap, &context)
            .expect_err("binary is missing");
        match err {
            ScanlayerError::Recognition { page, detail } => {
                assert_eq!(page, 3);
                assert!(detail.contains("tesseract-ocr"), "{detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tracker.open_handles(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn failing_engine_reports_stderr() {
        let mut command = Command::new("sh");
        command.args(["-c", "echo 'Failed loading language jpn' >&2; exit 1"]);
        let err = run_engine(command, None, 2).expect_err("engine fails");
        match err {
            ScanlayerError::Recognition { page, detail } => {
                assert_eq!(page, 2);
                assert!(detail.contains("Failed loading language jpn"), "{detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn slow_engine_is_killed_on_timeout() {
        let mut command = Command::new("sleep");
        command.arg("30");
        let started = Instant::now();
        let err = run_engine(command, Some(Duration::from_millis(100)), 5).expect_err("times out");
        assert!(matches!(err, ScanlayerError::RecognitionTimeout { page: 5, .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[derive(Default)]
    struct UnreadableProcess {
        killed: bool,
        reaped: bool,
    }

    impl EngineProcess for UnreadableProcess {
        fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
            Err(io::Error::other("status unavailable"))
        }

        fn kill(&mut self) -> io::Result<()> {
            self.killed = true;
            Ok(())
        }

        fn wait(&mut self) -> io::Result<ExitStatus> {
            self.reaped = true;
            Err(io::Error::other("status unavailable"))
        }
    }

    #[test]
    fn unreadable_status_kills_and_reaps_the_engine() {
        let mut process = UnreadableProcess::default();
        let err = supervise(&mut process, Some(Duration::from_secs(60)), 4).expect_err("status error");
        assert!(matches!(err, ScanlayerError::Io(_)), "{err:?}");
        assert!(process.killed);
        assert!(process.reaped);
    }

    #[cfg(unix)]
    #[test]
    fn successful_engine_passes() {
        let command = Command::new("true");
        run_engine(command, Some(Duration::from_secs(5)), 1).expect("true succeeds");
    }
}
