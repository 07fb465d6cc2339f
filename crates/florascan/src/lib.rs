//! FloraScan — content-based plant identification: deterministic image
//! descriptors, nearest-neighbor matching against a growable reference
//! set, and an online learning loop.

pub mod cache;
pub mod config;
pub mod features;
pub mod identify;
pub mod learn;
pub mod preprocess;
pub mod similarity;
pub mod store;
pub mod types;

pub use cache::DescriptorCache;
pub use config::{resolve_data_dir, FloraConfig, DEFAULT_THRESHOLD};
pub use features::{extract, FEATURE_DIM};
pub use identify::IdentificationService;
pub use learn::{normalize_label, LearningService};
pub use preprocess::{preprocess, PreprocessedImage, IMAGE_SIZE};
pub use similarity::cosine_similarity;
pub use store::{ReferenceStore, StoreStats};
pub use types::*;
