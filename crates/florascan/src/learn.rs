//! Teaching flow: persist a labeled image, refresh the descriptor
//! cache, and append an audit log entry.

use std::path::Path;
use std::sync::Arc;

use crate::store::ReferenceStore;
use crate::types::{FloraError, FloraResult, Learned, LearnLogEntry};

/// Grows the learned reference set from user-provided labels.
pub struct LearningService {
    store: Arc<ReferenceStore>,
}

impl LearningService {
    pub fn new(store: Arc<ReferenceStore>) -> Self {
        Self { store }
    }

    /// Learn a new plant from an image and its name.
    ///
    /// The image is copied (never moved) into the learned directory,
    /// its descriptor replaces any cached one for the label, and one
    /// entry is appended to the learning log.
    pub fn learn(&self, path: &Path, name: &str) -> FloraResult<Learned> {
        if !path.exists() {
            return Err(FloraError::FileNotFound(path.to_path_buf()));
        }
        if name.trim().is_empty() {
            return Err(FloraError::EmptyLabel);
        }

        let label = normalize_label(name);
        let stored_path = self.store.admit_learned_image(path, &label)?;

        // Descriptor comes from the stored copy, the file future scans
        // will see.
        let vector = self.store.descriptor_for(&stored_path)?;
        self.store.put_descriptor(&label, vector)?;

        self.store.append_log(LearnLogEntry {
            timestamp: chrono::Local::now().to_rfc3339(),
            plant_name: label.clone(),
            image_path: stored_path.display().to_string(),
            original_path: path.display().to_string(),
        })?;

        tracing::info!("learned new plant {label} from {}", path.display());

        Ok(Learned { label, stored_path })
    }
}

/// Trim, lowercase, and replace spaces with underscores.
pub fn normalize_label(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}
