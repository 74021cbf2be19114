// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for whoever sits in front of the converter.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The presentation layer decides how to show them; the pipeline never does.

use crate::error::ScanlayerError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Worth trying the same file again (busy machine, slow engine).
    Transient,
    /// The user or an administrator must change something first.
    ActionRequired,
    /// This file will not convert no matter how often it is retried.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether retrying the same input can succeed.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `ScanlayerError` into a `HumanError`.
pub fn humanize_error(err: &ScanlayerError) -> HumanError {
    match err {
        ScanlayerError::Open(_) => HumanError {
            message: "This file couldn't be read as a PDF.".into(),
            suggestion: "The file may be damaged, password-protected, or not a PDF at all. Try opening it in a PDF viewer first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanlayerError::Render { page, detail } => {
            if detail.contains("not found") {
                HumanError {
                    message: "The page renderer isn't installed.".into(),
                    suggestion: "Install poppler-utils (it provides pdftoppm), then try again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: format!("Page {page} couldn't be turned into an image."),
                    suggestion: "That page may be damaged. Try re-saving the PDF from another program.".into(),
                    retriable: false,
                    severity: Severity::Permanent,
                }
            }
        }

        ScanlayerError::Recognition { page, detail } => humanize_recognition_error(*page, detail),

        ScanlayerError::RecognitionTimeout { page, seconds } => HumanError {
            message: format!("Reading the text on page {page} took too long."),
            suggestion: format!(
                "The page took more than {seconds} seconds. Try again when the machine is less busy, or raise the timeout."
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanlayerError::Assembly(_) => HumanError {
            message: "The searchable PDF couldn't be put together.".into(),
            suggestion: "Try again. If this keeps happening, please report it with the original file.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanlayerError::Image(_) => HumanError {
            message: "A page image couldn't be processed.".into(),
            suggestion: "The page may be unusually large. Try a lower resolution.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        ScanlayerError::Cancelled { .. } => HumanError {
            message: "The conversion was stopped.".into(),
            suggestion: "Start it again whenever you're ready.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        ScanlayerError::Config(detail) => HumanError {
            message: "The converter settings aren't valid.".into(),
            suggestion: format!("Fix the setting and try again. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        ScanlayerError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                HumanError {
                    message: "The file couldn't be found.".into(),
                    suggestion: "It may have been moved or deleted. Try choosing the file again.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "There's no permission to read or write that file.".into(),
                    suggestion: "Check the file permissions, or copy the file somewhere else first.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                }
            }
        }

        ScanlayerError::Serialization(_) => HumanError {
            message: "The settings file couldn't be read.".into(),
            suggestion: "Check that the settings file is valid JSON.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },
    }
}

/// Parse engine-specific failure details into human-readable messages.
fn humanize_recognition_error(page: usize, detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("not found") && lower.contains("tesseract") {
        HumanError {
            message: "The text recognition engine isn't installed.".into(),
            suggestion: "Install tesseract-ocr, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("failed loading language") || lower.contains("traineddata") {
        HumanError {
            message: "A language pack for text recognition is missing.".into(),
            suggestion: "Install the language data for the configured languages (for example tesseract-ocr-jpn and tesseract-ocr-jpn-vert).".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else {
        HumanError {
            message: format!("Text recognition didn't work on page {page}."),
            suggestion: format!("Try again. If this keeps happening, the scan may be unreadable. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = ScanlayerError::RecognitionTimeout { page: 3, seconds: 300 };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
        assert!(human.message.contains("page 3"));
    }

    #[test]
    fn missing_engine_is_action_required() {
        let err = ScanlayerError::Recognition {
            page: 1,
            detail: "tesseract not found (install tesseract-ocr)".into(),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn missing_language_pack_is_action_required() {
        let err = ScanlayerError::Recognition {
            page: 1,
            detail: "Failed loading language 'jpn_vert'".into(),
        };
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }

    #[test]
    fn broken_pdf_is_permanent() {
        let human = humanize_error(&ScanlayerError::Open("invalid file header".into()));
        assert_eq!(human.severity, Severity::Permanent);
    }

    #[test]
    fn missing_renderer_is_action_required() {
        let err = ScanlayerError::Render {
            page: 1,
            detail: "pdftoppm not found (install poppler-utils)".into(),
        };
        assert_eq!(humanize_error(&err).severity, Severity::ActionRequired);
    }
}
