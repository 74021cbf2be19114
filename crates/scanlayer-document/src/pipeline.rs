// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion pipeline — drives a scanned PDF through rasterization,
// enhancement, recognition and reassembly into a searchable PDF.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rayon::prelude::*;
use scanlayer_core::config::PipelineConfig;
use scanlayer_core::error::{Result, ScanlayerError};
use scanlayer_core::types::{PipelineResult, PipelineStage, ProgressUpdate, RunId};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, instrument, warn};

use crate::handle::HandleTracker;
use crate::pdf::assembler::DocumentAssembler;
use crate::pdf::fragment::PageFragment;
use crate::pdf::source::{Page, SourceDocument};
use crate::raster::{PageRasterizer, PdftoppmRasterizer};
use crate::scan::enhance::ImageEnhancer;
use crate::scan::recognize::{RecognitionContext, TextRecognizer};
use crate::scan::tesseract::TesseractRecognizer;

/// Cooperative stop signal for a running conversion.
///
/// Clones share the same flag. The pipeline checks it before each page (or
/// each window of pages when running in parallel).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// The scanned-PDF-to-searchable-PDF converter.
///
/// Holds no per-document state: every call opens its own source and output
/// documents and closes both before returning, whether it succeeds, fails
/// or is cancelled. Any page error aborts the whole conversion.
pub struct Pipeline<R = PdftoppmRasterizer, T = TesseractRecognizer> {
    rasterizer: R,
    recognizer: T,
    enhancer: ImageEnhancer,
    config: PipelineConfig,
    tracker: HandleTracker,
}

impl Pipeline {
    /// Pipeline with `pdftoppm` rendering and Tesseract recognition.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_components(config, PdftoppmRasterizer::default(), TesseractRecognizer::new())
    }
}

impl<R, T> Pipeline<R, T>
where
    R: PageRasterizer,
    T: TextRecognizer,
{
    /// Pipeline with caller-supplied rasterizer and recognizer.
    pub fn with_components(config: PipelineConfig, rasterizer: R, recognizer: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rasterizer,
            recognizer,
            enhancer: ImageEnhancer::new(config.enhance.clone()),
            config,
            tracker: HandleTracker::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open-handle accounting shared by every document this pipeline opens.
    pub fn tracker(&self) -> &HandleTracker {
        &self.tracker
    }

    pub fn rasterizer(&self) -> &R {
        &self.rasterizer
    }

    /// Convert `pdf` into a searchable PDF with the same pages, in the same
    /// order, and the same document metadata.
    ///
    /// `on_progress` is called with `(i, N)` as page `i` (one-based) starts.
    pub fn process(&self, pdf: &[u8], mut on_progress: impl FnMut(&ProgressUpdate)) -> Result<Vec<u8>> {
        self.run(pdf, &mut on_progress, &CancellationToken::new())
            .map(|(bytes, _)| bytes)
    }

    /// Like [`process`](Self::process), for a named input, with cancellation.
    ///
    /// The result records the run id, input fingerprint and completion time.
    pub fn process_named(
        &self,
        source_filename: &str,
        pdf: &[u8],
        mut on_progress: impl FnMut(&ProgressUpdate),
        cancel: &CancellationToken,
    ) -> Result<PipelineResult> {
        let run_id = RunId::new();
        let source_sha256 = hex::encode(Sha256::digest(pdf));
        let span = info_span!("pipeline_run", %run_id, source = source_filename, sha256 = %source_sha256);
        let _entered = span.enter();

        let (bytes, page_count) = self.run(pdf, &mut on_progress, cancel)?;
        Ok(PipelineResult {
            run_id,
            bytes,
            source_filename: source_filename.to_string(),
            source_sha256,
            page_count,
            completed_at: Utc::now(),
        })
    }

    fn run(
        &self,
        pdf: &[u8],
        on_progress: &mut dyn FnMut(&ProgressUpdate),
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, usize)> {
        let mut stage = StageLog::default();
        let result = self.run_stages(pdf, on_progress, cancel, &mut stage);
        match &result {
            Ok((bytes, pages)) => {
                stage.enter(PipelineStage::Done);
                info!(pages, bytes_len = bytes.len(), "Conversion complete");
            }
            Err(err) => {
                let failed_in = stage.current;
                stage.enter(PipelineStage::Failed);
                warn!(?failed_in, %err, "Conversion failed");
            }
        }
        result
    }

    /// Body of a run. Both document handles are locals here, so they are
    /// released before the caller sees the result.
    #[instrument(skip_all, fields(bytes_len = pdf.len(), workers = self.config.workers))]
    fn run_stages(
        &self,
        pdf: &[u8],
        on_progress: &mut dyn FnMut(&ProgressUpdate),
        cancel: &CancellationToken,
        stage: &mut StageLog,
    ) -> Result<(Vec<u8>, usize)> {
        stage.enter(PipelineStage::Opening);
        let source = SourceDocument::open(pdf, &self.tracker)?;
        let mut assembler = DocumentAssembler::new(&self.tracker);
        let total = source.page_count();

        stage.enter(PipelineStage::PerPage);
        if self.config.workers <= 1 {
            self.convert_sequential(&source, &mut assembler, on_progress, cancel)?;
        } else {
            self.convert_parallel(&source, &mut assembler, on_progress, cancel)?;
        }

        stage.enter(PipelineStage::Finalizing);
        let bytes = assembler.finalize(source.metadata())?;
        assembler.close();
        source.close();
        Ok((bytes, total))
    }

    fn convert_sequential(
        &self,
        source: &SourceDocument,
        assembler: &mut DocumentAssembler,
        on_progress: &mut dyn FnMut(&ProgressUpdate),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = source.page_count();
        for index in 0..total {
            if cancel.is_cancelled() {
                return Err(ScanlayerError::Cancelled { pages_done: index });
            }
            on_progress(&ProgressUpdate::page(index + 1, total));
            let fragment = self.convert_page(source.page(index)?)?;
            assembler.append(fragment)?;
        }
        Ok(())
    }

    /// Pages are converted `workers` at a time on a dedicated pool, then
    /// appended in index order before the next window starts.
    fn convert_parallel(
        &self,
        source: &SourceDocument,
        assembler: &mut DocumentAssembler,
        on_progress: &mut dyn FnMut(&ProgressUpdate),
        cancel: &CancellationToken,
    ) -> Result<()> {
        let workers = self.config.workers;
        let total = source.page_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("scanlayer-page-{i}"))
            .build()
            .map_err(|err| ScanlayerError::Config(format!("failed to start worker pool: {err}")))?;

        for start in (0..total).step_by(workers) {
            if cancel.is_cancelled() {
                return Err(ScanlayerError::Cancelled { pages_done: start });
            }
            let end = (start + workers).min(total);
            for index in start..end {
                on_progress(&ProgressUpdate::page(index + 1, total));
            }

            let fragments: Vec<Result<PageFragment>> = pool.install(|| {
                (start..end)
                    .into_par_iter()
                    .map(|index| source.page(index).and_then(|page| self.convert_page(page)))
                    .collect()
            });
            debug!(start, end, "Window converted");

            for fragment in fragments {
                assembler.append(fragment?)?;
            }
        }
        Ok(())
    }

    /// Rasterize, enhance and recognize one page.
    #[instrument(skip_all, fields(page = page.number()))]
    fn convert_page(&self, page: Page<'_>) -> Result<PageFragment> {
        let dpi = self.config.dpi;
        let raster = self.rasterizer.rasterize(page, dpi)?;
        let enhanced = self.enhancer.enhance(&raster);
        drop(raster);

        let context = RecognitionContext {
            config: &self.config.recognition,
            dpi,
            page_number: page.number(),
            tracker: &self.tracker,
        };
        self.recognizer.recognize(&enhanced, &context)
    }
}

/// Current lifecycle stage of one run, logged on every transition.
#[derive(Debug)]
struct StageLog {
    current: PipelineStage,
}

impl Default for StageLog {
    fn default() -> Self {
        Self {
            current: PipelineStage::Idle,
        }
    }
}

impl StageLog {
    fn enter(&mut self, next: PipelineStage) {
        debug!(from = ?self.current, to = ?next, "Pipeline stage");
        self.current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::metadata::DocumentMetadata;
    use crate::test_support::{ScriptedRasterizer, ScriptedRecognizer, blank_pdf, blank_pdf_with_info, page_count};
    use lopdf::{Document, Object, StringFormat, dictionary};

    fn config(workers: usize) -> PipelineConfig {
        PipelineConfig {
            dpi: 36,
            workers,
            ..PipelineConfig::default()
        }
    }

    fn pipeline(
        workers: usize,
        rasterizer: ScriptedRasterizer,
        recognizer: ScriptedRecognizer,
    ) -> Pipeline<ScriptedRasterizer, ScriptedRecognizer> {
        Pipeline::with_components(config(workers), rasterizer, recognizer).expect("valid config")
    }

    /// Text drawn on each output page, in page order.
    fn page_labels(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).expect("output parses");
        doc.get_pages()
            .values()
            .map(|id| {
                let content = doc.get_page_content(*id).expect("content");
                let content = String::from_utf8_lossy(&content).into_owned();
                let start = content.find("(page ").expect("label present") + 1;
                let end = start + content[start..].find(')').expect("label closes");
                content[start..end].to_string()
            })
            .collect()
    }

    #[test]
    fn single_blank_page_keeps_title() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let input = blank_pdf(1, Some("Quarterly Report"));

        let output = p.process(&input, |_| {}).expect("conversion succeeds");
        assert!(!output.is_empty());
        assert_eq!(page_count(&output), 1);

        let metadata = DocumentMetadata::from_document(&Document::load_mem(&output).expect("parse"));
        assert_eq!(metadata.title(), Some("Quarterly Report"));
        assert_eq!(p.tracker().open_handles(), 0);
    }

    #[test]
    fn pages_and_metadata_are_preserved_in_order() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let input = blank_pdf(4, Some("Ledger"));

        let output = p.process(&input, |_| {}).expect("conversion succeeds");
        assert_eq!(page_labels(&output), vec!["page 1", "page 2", "page 3", "page 4"]);

        let before = DocumentMetadata::from_document(&Document::load_mem(&input).expect("parse input"));
        let after = DocumentMetadata::from_document(&Document::load_mem(&output).expect("parse output"));
        assert!(!before.is_empty());
        for (key, value) in before.iter() {
            assert_eq!(after.get(key), Some(value), "metadata key {key}");
        }
    }

    #[test]
    fn progress_counts_every_page_once() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let mut seen = Vec::new();
        p.process(&blank_pdf(3, None), |update| seen.push(update.clone()))
            .expect("conversion succeeds");

        let done: Vec<usize> = seen.iter().map(|u| u.pages_done).collect();
        assert_eq!(done, vec![1, 2, 3]);
        assert!(seen.iter().all(|u| u.pages_total == 3));
        assert_eq!(seen[1].message, "Processing page 2/3");
    }

    #[test]
    fn render_failure_on_second_page_aborts() {
        let p = pipeline(1, ScriptedRasterizer::failing_on(2), ScriptedRecognizer::default());
        let result = p.process(&blank_pdf(3, None), |_| {});

        assert!(matches!(result, Err(ScanlayerError::Render { page: 2, .. })));
        // Nothing after the failing page is attempted.
        assert_eq!(p.rasterizer().rendered(), vec![1, 2]);
        assert_eq!(p.tracker().open_handles(), 0);
    }

    #[test]
    fn recognition_failure_releases_every_handle() {
        for failing in [1, 3, 5] {
            for workers in [1, 3] {
                let p = pipeline(workers, ScriptedRasterizer::default(), ScriptedRecognizer::failing_on(failing));
                let result = p.process(&blank_pdf(5, Some("x")), |_| {});
                assert!(
                    matches!(result, Err(ScanlayerError::Recognition { page, .. }) if page == failing),
                    "page {failing}, workers={workers}: {result:?}"
                );
                assert_eq!(p.tracker().open_handles(), 0, "page {failing}, workers={workers}");
            }
        }
    }

    #[test]
    fn pdfdoc_encoded_title_is_copied_byte_for_byte() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let input = blank_pdf_with_info(
            1,
            dictionary! {
                "Title" => Object::String(vec![0x41, 0x85, 0x42], StringFormat::Literal),
            },
        );

        let output = p.process(&input, |_| {}).expect("conversion succeeds");
        let doc = Document::load_mem(&output).expect("parse");
        let info = doc
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .expect("info dictionary");
        let title = info.get(b"Title").and_then(Object::as_str).expect("title string");
        assert_eq!(title, &[0x41, 0x85, 0x42]);
        assert_eq!(DocumentMetadata::from_document(&doc).title(), Some("A\u{2013}B"));
    }

    #[test]
    fn empty_document_yields_empty_output_with_metadata() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let mut calls = 0;
        let output = p
            .process(&blank_pdf(0, Some("Nothing here")), |_| calls += 1)
            .expect("conversion succeeds");

        assert_eq!(calls, 0);
        assert_eq!(page_count(&output), 0);
        let metadata = DocumentMetadata::from_document(&Document::load_mem(&output).expect("parse"));
        assert_eq!(metadata.title(), Some("Nothing here"));
    }

    #[test]
    fn unreadable_input_is_an_open_error() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let result = p.process(b"%PDF-1.4 truncated", |_| {});
        assert!(matches!(result, Err(ScanlayerError::Open(_))));
        assert_eq!(p.tracker().open_handles(), 0);
    }

    #[test]
    fn parallel_workers_keep_page_order_and_progress_order() {
        let p = pipeline(3, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let mut done = Vec::new();
        let output = p
            .process(&blank_pdf(7, None), |update| done.push(update.pages_done))
            .expect("conversion succeeds");

        assert_eq!(done, (1..=7).collect::<Vec<_>>());
        let expected: Vec<String> = (1..=7).map(|n| format!("page {n}")).collect();
        assert_eq!(page_labels(&output), expected);
        assert_eq!(p.tracker().open_handles(), 0);
    }

    #[test]
    fn cancellation_stops_between_pages() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result = p.process_named(
            "scan.pdf",
            &blank_pdf(4, None),
            |update| {
                if update.pages_done == 2 {
                    trigger.cancel();
                }
            },
            &cancel,
        );

        assert!(matches!(result, Err(ScanlayerError::Cancelled { pages_done: 2 })));
        assert_eq!(p.rasterizer().rendered(), vec![1, 2]);
        assert_eq!(p.tracker().open_handles(), 0);
    }

    #[test]
    fn named_run_records_fingerprint_and_output_name() {
        let p = pipeline(1, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        let input = blank_pdf(2, None);
        let result = p
            .process_named("uploads/scan.pdf", &input, |_| {}, &CancellationToken::new())
            .expect("conversion succeeds");

        assert_eq!(result.page_count, 2);
        assert_eq!(result.output_filename(), "OCR_scan.pdf");
        assert_eq!(result.source_sha256, hex::encode(Sha256::digest(&input)));
        assert_eq!(result.source_sha256.len(), 64);
        assert_eq!(page_count(&result.bytes), 2);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let bad = PipelineConfig {
            dpi: 5,
            ..PipelineConfig::default()
        };
        let result = Pipeline::with_components(bad, ScriptedRasterizer::default(), ScriptedRecognizer::default());
        assert!(matches!(result, Err(ScanlayerError::Config(_))));
    }
}
