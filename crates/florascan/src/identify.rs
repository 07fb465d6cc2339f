//! Identification orchestration: preprocess, extract, scan, decide.

use std::path::Path;
use std::sync::Arc;

use crate::features::extract;
use crate::preprocess::preprocess;
use crate::store::ReferenceStore;
use crate::types::{FloraError, FloraResult, Verdict};

/// Compares a query image against the full reference set and applies
/// the accept/reject threshold.
pub struct IdentificationService {
    store: Arc<ReferenceStore>,
}

impl IdentificationService {
    pub fn new(store: Arc<ReferenceStore>) -> Self {
        Self { store }
    }

    /// Identify the plant in an image file.
    ///
    /// Missing paths and undecodable files become `NotFound` and
    /// `Invalid` verdicts; unexpected I/O or cache faults propagate as
    /// errors for the caller to report.
    pub fn identify(&self, path: &Path) -> FloraResult<Verdict> {
        if !path.exists() {
            return Ok(Verdict::NotFound {
                path: path.to_path_buf(),
            });
        }

        let config = self.store.config();
        let img = match preprocess(path, config.image_size) {
            Ok(img) => img,
            Err(FloraError::InvalidImage(reason)) => {
                return Ok(Verdict::Invalid { reason });
            }
            Err(e) => return Err(e),
        };

        let query = extract(&img)?;
        let (label, score) = self.store.best_match(&query)?;

        tracing::debug!(
            "best match for {}: {:?} at {:.3} (threshold {:.3})",
            path.display(),
            label,
            score,
            config.similarity_threshold
        );

        match label {
            Some(label) if score > config.similarity_threshold => Ok(Verdict::Match {
                label,
                confidence: score,
            }),
            _ => Ok(Verdict::Unknown { confidence: score }),
        }
    }
}
