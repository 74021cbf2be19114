// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration: rasterization resolution, enhancement chain
// parameters, and the recognition engine's option surface.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanlayerError};

/// Default rasterization resolution in dots per inch.
pub const DEFAULT_DPI: u32 = 300;

/// Settings for one document conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rasterization resolution. Also passed to the engine as its DPI hint.
    pub dpi: u32,
    /// Pages processed concurrently. `1` keeps everything on the calling thread.
    pub workers: usize,
    /// Preprocessing chain parameters.
    pub enhance: EnhanceConfig,
    /// Recognition engine options.
    pub recognition: RecognitionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: DEFAULT_DPI,
            workers: 1,
            enhance: EnhanceConfig::default(),
            recognition: RecognitionConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file. Missing fields fall back to their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(36..=1200).contains(&self.dpi) {
            return Err(ScanlayerError::Config(format!(
                "dpi must be between 36 and 1200, got {}",
                self.dpi
            )));
        }
        if self.workers == 0 {
            return Err(ScanlayerError::Config("workers must be at least 1".into()));
        }
        self.enhance.validate()?;
        self.recognition.validate()
    }
}

/// How the local threshold of the binarization stage is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveMethod {
    /// Gaussian-weighted neighbourhood mean.
    Gaussian,
    /// Unweighted box mean over the neighbourhood.
    Mean,
}

/// Parameters of the fixed preprocessing chain.
///
/// The order of the stages never changes; only their parameters do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Side of the square smoothing kernel (odd).
    pub blur_kernel: u32,
    /// Side of the binarization neighbourhood (odd).
    pub threshold_block: u32,
    /// Subtracted from the local mean before comparison.
    pub threshold_bias: i32,
    pub threshold_method: AdaptiveMethod,
    /// Side of the median denoise window (odd).
    pub median_kernel: u32,
    pub clahe_clip_limit: f32,
    /// Tiles per axis for contrast-limited equalization.
    pub clahe_tiles: u32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 3,
            threshold_block: 15,
            threshold_bias: 10,
            threshold_method: AdaptiveMethod::Gaussian,
            median_kernel: 3,
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
        }
    }
}

impl EnhanceConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("blur_kernel", self.blur_kernel),
            ("threshold_block", self.threshold_block),
            ("median_kernel", self.median_kernel),
        ] {
            if size < 3 || size % 2 == 0 {
                return Err(ScanlayerError::Config(format!(
                    "{name} must be an odd number >= 3, got {size}"
                )));
            }
        }
        if self.clahe_clip_limit.is_nan() || self.clahe_clip_limit <= 0.0 {
            return Err(ScanlayerError::Config(format!(
                "clahe_clip_limit must be positive, got {}",
                self.clahe_clip_limit
            )));
        }
        if self.clahe_tiles == 0 {
            return Err(ScanlayerError::Config("clahe_tiles must be at least 1".into()));
        }
        Ok(())
    }
}

/// Options handed to the recognition engine for every page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// OCR engine mode (OEM). 3 = default engine selection.
    pub engine_mode: u8,
    /// Page segmentation mode (PSM). 6 = a single uniform block of text.
    pub page_segmentation: u8,
    /// Language models combined for recognition, in priority order.
    pub languages: Vec<String>,
    /// Keep runs of spaces between words in the text layer.
    pub preserve_interword_spaces: bool,
    /// Upper bound on a single page's recognition. `None` waits forever.
    pub page_timeout_secs: Option<u64>,
    /// Engine executable; resolved through `PATH` when not absolute.
    pub binary: PathBuf,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            engine_mode: 3,
            page_segmentation: 6,
            languages: vec!["jpn".into(), "jpn_vert".into()],
            preserve_interword_spaces: true,
            page_timeout_secs: Some(300),
            binary: PathBuf::from("tesseract"),
        }
    }
}

impl RecognitionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() || self.languages.iter().any(|l| l.trim().is_empty()) {
            return Err(ScanlayerError::Config(
                "at least one non-empty language model is required".into(),
            ));
        }
        if self.engine_mode > 3 {
            return Err(ScanlayerError::Config(format!(
                "engine_mode must be 0-3, got {}",
                self.engine_mode
            )));
        }
        if self.page_segmentation > 13 {
            return Err(ScanlayerError::Config(format!(
                "page_segmentation must be 0-13, got {}",
                self.page_segmentation
            )));
        }
        if self.page_timeout_secs == Some(0) {
            return Err(ScanlayerError::Config("page_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// `+`-joined language list, e.g. `jpn+jpn_vert`.
    pub fn language_spec(&self) -> String {
        self.languages.join("+")
    }

    /// Engine options as command-line arguments, with `dpi` as the
    /// resolution hint.
    pub fn tesseract_args(&self, dpi: u32) -> Vec<String> {
        vec![
            "--oem".into(),
            self.engine_mode.to_string(),
            "--psm".into(),
            self.page_segmentation.to_string(),
            "-l".into(),
            self.language_spec(),
            "--dpi".into(),
            dpi.to_string(),
            "-c".into(),
            format!(
                "preserve_interword_spaces={}",
                u8::from(self.preserve_interword_spaces)
            ),
        ]
    }
}
