//! Service configuration and path resolution.

use std::path::{Path, PathBuf};

use crate::preprocess::IMAGE_SIZE;

/// Accept/reject threshold applied to the best similarity score.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Subdirectory of the data dir holding the static labeled dataset.
const DATASET_SUBDIR: &str = "plant_dataset";

/// Subdirectory of the data dir holding learned images and the log.
const LEARNED_SUBDIR: &str = "learned_plants";

/// Descriptor cache filename inside the data dir.
const CACHE_FILENAME: &str = "descriptors.fsdc";

/// Learning audit log filename inside the learned dir.
const LOG_FILENAME: &str = "learning_log.json";

/// Everything the identification and learning services need, injected
/// once at construction — no hidden globals.
#[derive(Debug, Clone)]
pub struct FloraConfig {
    /// Static dataset: one subdirectory per label, `*.jpg` files.
    pub dataset_dir: PathBuf,
    /// Flat directory of learned `{label}_{timestamp}_{hash8}.jpg` files.
    pub learned_dir: PathBuf,
    /// Persisted descriptor cache file.
    pub cache_file: PathBuf,
    /// Append-only learning log.
    pub log_file: PathBuf,
    /// Best score must strictly exceed this to count as a match.
    pub similarity_threshold: f32,
    /// Canonical square resolution for descriptor computation.
    pub image_size: u32,
}

impl FloraConfig {
    /// Derive the standard layout under a single data directory.
    pub fn new(data_dir: &Path) -> Self {
        let learned_dir = data_dir.join(LEARNED_SUBDIR);
        Self {
            dataset_dir: data_dir.join(DATASET_SUBDIR),
            log_file: learned_dir.join(LOG_FILENAME),
            learned_dir,
            cache_file: data_dir.join(CACHE_FILENAME),
            similarity_threshold: DEFAULT_THRESHOLD,
            image_size: IMAGE_SIZE,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// Resolve the data directory: explicit flag > `FLORASCAN_DATA_DIR`
/// env var > `./data`.
pub fn resolve_data_dir(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var("FLORASCAN_DATA_DIR") {
        return PathBuf::from(env_path);
    }

    PathBuf::from("data")
}
