//! Core data types, errors, and the structured JSON result shapes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outcome of an identification run.
///
/// A tagged verdict instead of an ad hoc map with optional keys: every
/// variant carries exactly the fields it needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Best score cleared the similarity threshold.
    Match { label: String, confidence: f32 },
    /// Nothing in the reference set was close enough. Carries the best
    /// score observed (possibly zero) and invites a `learn` call.
    Unknown { confidence: f32 },
    /// The input file exists but is not a decodable image.
    Invalid { reason: String },
    /// The input path does not exist.
    NotFound { path: PathBuf },
}

/// Outcome of a successful learning event.
#[derive(Debug, Clone, PartialEq)]
pub struct Learned {
    pub label: String,
    pub stored_path: PathBuf,
}

/// One append-only entry in the learning audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnLogEntry {
    pub timestamp: String,
    pub plant_name: String,
    pub image_path: String,
    pub original_path: String,
}

/// JSON shape returned to callers of `identify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_learning: Option<bool>,
}

/// JSON shape returned to callers of `learn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}

impl IdentifyReport {
    /// Project an identification outcome onto the wire shape.
    pub fn from_result(result: FloraResult<Verdict>) -> Self {
        match result {
            Ok(Verdict::Match { label, confidence }) => Self {
                success: true,
                message: Some(format!(
                    "Plant identified as {label} with {:.1}% confidence",
                    confidence * 100.0
                )),
                plant_name: Some(label),
                confidence: Some(round3(confidence)),
                error: None,
                needs_learning: None,
            },
            Ok(Verdict::Unknown { confidence }) => Self {
                success: false,
                plant_name: None,
                confidence: Some(round3(confidence)),
                message: None,
                error: Some(
                    "I do not know this plant. Please help me learn by providing its name."
                        .to_string(),
                ),
                needs_learning: Some(true),
            },
            Ok(Verdict::Invalid { reason }) => Self::error(format!("Invalid image file: {reason}")),
            Ok(Verdict::NotFound { path }) => {
                Self::error(format!("Image file not found: {}", path.display()))
            }
            Err(e) => Self::error(format!("Plant identification failed: {e}")),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            plant_name: None,
            confidence: None,
            message: None,
            error: Some(message),
            needs_learning: None,
        }
    }
}

impl LearnReport {
    /// Project a learning outcome onto the wire shape.
    pub fn from_result(result: FloraResult<Learned>) -> Self {
        match result {
            Ok(learned) => Self {
                success: true,
                message: Some(format!(
                    "Successfully learned new plant: {}",
                    learned.label
                )),
                plant_name: Some(learned.label),
                stored_path: Some(learned.stored_path.display().to_string()),
                error: None,
            },
            Err(FloraError::FileNotFound(path)) => {
                Self::error(format!("Image file not found: {}", path.display()))
            }
            Err(FloraError::EmptyLabel) => Self::error("Plant name cannot be empty".to_string()),
            Err(e) => Self::error(format!("Learning failed: {e}")),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            plant_name: None,
            stored_path: None,
            message: None,
            error: Some(message),
        }
    }
}

/// Errors that can occur in the identification pipeline.
#[derive(thiserror::Error, Debug)]
pub enum FloraError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("plant name cannot be empty")]
    EmptyLabel,

    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("descriptor length mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("descriptor cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type FloraResult<T> = Result<T, FloraError>;
