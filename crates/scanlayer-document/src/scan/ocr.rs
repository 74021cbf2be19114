// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-process recognizer built on the pure-Rust `ocrs` engine.
//
// Only available with the `ocr` feature. The engine needs two model files,
// `text-detection.rten` and `text-recognition.rten`, which `ocrs-cli`
// downloads to `$XDG_CACHE_HOME/ocrs` (or `~/.cache/ocrs`) on first use.
//
// `ocrs` ships Latin-script models only; the language list in
// `RecognitionConfig` does not select a model here, and a warning is logged
// once when it names a non-Latin script. Text reaches the page through
// `FragmentBuilder`, whose WinAnsi text layer cannot hold CJK anyway. The
// per-page timeout is not enforced, since an in-process engine cannot be
// interrupted.

use std::path::{Path, PathBuf};
use std::sync::Once;

use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use scanlayer_core::error::{Result, ScanlayerError};
use tracing::{debug, info, instrument, warn};

use crate::image::bitmap::EnhancedBitmap;
use crate::pdf::fragment::{FragmentBuilder, PageFragment, TextSpan};
use crate::scan::recognize::{RecognitionContext, TextRecognizer};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// Tesseract language codes written in the Latin alphabet.
const LATIN_SCRIPT_LANGUAGES: &[&str] = &[
    "afr", "aze", "bos", "cat", "ces", "cym", "dan", "deu", "eng", "enm", "epo", "est", "eus", "fin", "fra", "frk",
    "frm", "gle", "glg", "hrv", "hun", "ind", "isl", "ita", "lat", "lav", "lit", "mlt", "msa", "nld", "nor", "osd",
    "pol", "por", "ron", "slk", "slv", "spa", "sqi", "swa", "swe", "tgl", "tur", "uzb", "vie",
];

/// Configured languages the Latin-only models cannot read.
fn non_latin_languages(languages: &[String]) -> Vec<&str> {
    languages
        .iter()
        .map(|lang| lang.trim())
        .filter(|lang| !LATIN_SCRIPT_LANGUAGES.contains(lang))
        .collect()
}

fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Locations of the two `ocrs` model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrsModels {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl Default for OcrsModels {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrsModels {
    /// Models named `text-detection.rten` / `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn is_available(&self) -> bool {
        self.detection.exists() && self.recognition.exists()
    }

    fn load(path: &Path, role: &str) -> Result<Model> {
        if !path.exists() {
            return Err(ScanlayerError::Config(format!(
                "{role} model not found at {}; run `ocrs-cli` once to download models",
                path.display()
            )));
        }
        Model::load_file(path).map_err(|err| {
            ScanlayerError::Config(format!("failed to load {role} model from {}: {err}", path.display()))
        })
    }
}

/// Recognizer running `ocrs` on the calling thread.
///
/// Detected text lines become [`TextSpan`]s at their bounding boxes and the
/// fragment is built with [`FragmentBuilder`].
pub struct OcrsRecognizer {
    engine: OcrEngine,
    language_check: Once,
}

impl OcrsRecognizer {
    /// Load both models. This is the expensive step; reuse the recognizer.
    #[instrument(skip_all, fields(detection = %models.detection.display()))]
    pub fn new(models: &OcrsModels) -> Result<Self> {
        let detection_model = OcrsModels::load(&models.detection, "detection")?;
        let recognition_model = OcrsModels::load(&models.recognition, "recognition")?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| ScanlayerError::Config(format!("failed to initialise ocrs engine: {err}")))?;

        info!("ocrs engine ready");
        Ok(Self {
            engine,
            language_check: Once::new(),
        })
    }

    fn spans(&self, bitmap: &EnhancedBitmap, page: usize) -> Result<Vec<TextSpan>> {
        let failed = |stage: &str, err: String| ScanlayerError::Recognition {
            page,
            detail: format!("{stage} failed: {err}"),
        };

        let rgb = image::DynamicImage::ImageLuma8(bitmap.as_gray().clone()).to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|err| failed("image import", err.to_string()))?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| failed("preprocessing", err.to_string()))?;

        let words = self
            .engine
            .detect_words(&input)
            .map_err(|err| failed("word detection", err.to_string()))?;
        let lines = self.engine.find_text_lines(&input, &words);
        let texts = self
            .engine
            .recognize_text(&input, &lines)
            .map_err(|err| failed("line recognition", err.to_string()))?;

        let spans: Vec<TextSpan> = texts
            .iter()
            .flatten()
            .filter_map(|line| {
                let text = line.to_string();
                if text.trim().is_empty() {
                    return None;
                }
                let rect = line.bounding_rect();
                Some(TextSpan {
                    text,
                    left: rect.left() as f32,
                    top: rect.top() as f32,
                    width: rect.width() as f32,
                    height: rect.height() as f32,
                })
            })
            .collect();

        debug!(words = words.len(), lines = spans.len(), "ocrs recognition complete");
        Ok(spans)
    }
}

impl TextRecognizer for OcrsRecognizer {
    #[instrument(skip_all, fields(page = context.page_number))]
    fn recognize(&self, bitmap: &EnhancedBitmap, context: &RecognitionContext<'_>) -> Result<PageFragment> {
        self.language_check.call_once(|| {
            let unsupported = non_latin_languages(&context.config.languages);
            if !unsupported.is_empty() {
                warn!(?unsupported, "ocrs reads Latin script only; these languages will not be recognised");
            }
        });
        let spans = self.spans(bitmap, context.page_number)?;
        FragmentBuilder::new(context.dpi).build(bitmap, &spans, context.page_number, context.tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_from_dir_use_well_known_names() {
        let models = OcrsModels::from_dir("/tmp/my-models");
        assert_eq!(models.detection, PathBuf::from("/tmp/my-models/text-detection.rten"));
        assert_eq!(models.recognition, PathBuf::from("/tmp/my-models/text-recognition.rten"));
    }

    #[test]
    fn cjk_languages_are_flagged_as_non_latin() {
        let languages: Vec<String> = ["eng", "jpn", "deu", "chi_sim", "jpn_vert"].map(String::from).to_vec();
        assert_eq!(non_latin_languages(&languages), vec!["jpn", "chi_sim", "jpn_vert"]);
        assert!(non_latin_languages(&["fra".to_string()]).is_empty());
    }

    #[test]
    fn missing_models_are_a_config_error() {
        let models = OcrsModels::from_dir("/nonexistent/path/ocr-models");
        assert!(!models.is_available());
        assert!(matches!(OcrsRecognizer::new(&models), Err(ScanlayerError::Config(_))));
    }
}
