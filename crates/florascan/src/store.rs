//! Reference set: the static labeled dataset plus the learned images,
//! with nearest-neighbor lookup and descriptor-cache maintenance.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::cache::DescriptorCache;
use crate::config::FloraConfig;
use crate::features::{extract, FEATURE_DIM};
use crate::preprocess::preprocess;
use crate::similarity::cosine_similarity;
use crate::types::{FloraResult, LearnLogEntry};

/// Counts reported by [`ReferenceStore::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub dataset_labels: usize,
    pub dataset_images: usize,
    pub learned_images: usize,
    pub cached_descriptors: usize,
}

/// Owns the on-disk learned-image directory, the descriptor cache, and
/// the learning log. The static dataset directory is read-only.
///
/// An in-process mutex serializes every cache/log read-modify-write so
/// a long-lived store is safe to share across threads. Cross-process
/// callers are expected to run one invocation at a time.
pub struct ReferenceStore {
    config: FloraConfig,
    state: Mutex<()>,
}

impl ReferenceStore {
    pub fn new(config: FloraConfig) -> Self {
        Self {
            config,
            state: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &FloraConfig {
        &self.config
    }

    /// Compute the descriptor for an image file from scratch.
    pub fn descriptor_for(&self, path: &Path) -> FloraResult<Vec<f32>> {
        let img = preprocess(path, self.config.image_size)?;
        extract(&img)
    }

    /// Scan the full reference set and return the best label and score.
    ///
    /// Always visits every entry: static images are recomputed fresh,
    /// learned images resolve through the descriptor cache. Strictly
    /// greater comparisons over a sorted enumeration mean ties go to
    /// the first entry in label-then-filename order, deterministically.
    pub fn best_match(&self, query: &[f32]) -> FloraResult<(Option<String>, f32)> {
        let mut best_label: Option<String> = None;
        let mut best_score = 0.0f32;

        self.scan_static(query, &mut best_label, &mut best_score)?;
        self.scan_learned(query, &mut best_label, &mut best_score)?;

        Ok((best_label, best_score))
    }

    fn scan_static(
        &self,
        query: &[f32],
        best_label: &mut Option<String>,
        best_score: &mut f32,
    ) -> FloraResult<()> {
        if !self.config.dataset_dir.exists() {
            return Ok(());
        }

        for (label, dir) in sorted_label_dirs(&self.config.dataset_dir)? {
            for file in sorted_jpegs(&dir)? {
                let descriptor = match self.descriptor_for(&file) {
                    Ok(d) => d,
                    Err(e) => {
                        // One bad reference image must never abort a scan.
                        tracing::warn!("skipping reference image {}: {e}", file.display());
                        continue;
                    }
                };
                let score = cosine_similarity(query, &descriptor)?;
                if score > *best_score {
                    *best_score = score;
                    *best_label = Some(label.clone());
                }
            }
        }

        Ok(())
    }

    fn scan_learned(
        &self,
        query: &[f32],
        best_label: &mut Option<String>,
        best_score: &mut f32,
    ) -> FloraResult<()> {
        if !self.config.learned_dir.exists() {
            return Ok(());
        }

        let _guard = lock(&self.state);
        let mut cache = self.load_cache_tolerant();
        let mut dirty = false;

        for file in sorted_jpegs(&self.config.learned_dir)? {
            let Some(label) = learned_label(&file) else {
                tracing::warn!("unparseable learned filename: {}", file.display());
                continue;
            };

            let descriptor = match cache.get(&label) {
                Some(v) if v.len() == FEATURE_DIM => v.clone(),
                _ => match self.descriptor_for(&file) {
                    Ok(d) => {
                        cache.insert(label.clone(), d.clone());
                        dirty = true;
                        d
                    }
                    Err(e) => {
                        tracing::warn!("skipping learned image {}: {e}", file.display());
                        continue;
                    }
                },
            };

            let score = cosine_similarity(query, &descriptor)?;
            if score > *best_score {
                *best_score = score;
                *best_label = Some(label);
            }
        }

        // Flush at most once per scan, and only if a miss was filled.
        if dirty {
            cache.save(&self.config.cache_file)?;
        }

        Ok(())
    }

    /// Copy a new labeled image into the learned directory under a
    /// unique `{label}_{timestamp}_{hash8}.jpg` name and return the
    /// stored path.
    pub fn admit_learned_image(&self, source: &Path, label: &str) -> FloraResult<PathBuf> {
        let content = std::fs::read(source)?;
        let hex = blake3::hash(&content).to_hex();
        let hash8 = &hex.as_str()[..8];
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{label}_{timestamp}_{hash8}.jpg");

        std::fs::create_dir_all(&self.config.learned_dir)?;
        let destination = self.config.learned_dir.join(filename);
        std::fs::copy(source, &destination)?;
        Ok(destination)
    }

    /// Overwrite the cached descriptor for a label (last writer wins).
    pub fn put_descriptor(&self, label: &str, vector: Vec<f32>) -> FloraResult<()> {
        let _guard = lock(&self.state);
        let mut cache = self.load_cache_tolerant();
        cache.insert(label.to_string(), vector);
        cache.save(&self.config.cache_file)
    }

    /// Append one entry to the learning log.
    pub fn append_log(&self, entry: LearnLogEntry) -> FloraResult<()> {
        let _guard = lock(&self.state);

        let mut entries: Vec<LearnLogEntry> = if self.config.log_file.exists() {
            let raw = std::fs::read(&self.config.log_file)?;
            serde_json::from_slice(&raw)?
        } else {
            Vec::new()
        };

        entries.push(entry);

        if let Some(parent) = self.config.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            &self.config.log_file,
            serde_json::to_vec_pretty(&entries)?,
        )?;
        Ok(())
    }

    /// Recompute the descriptor cache from every learned image,
    /// discarding whatever was cached before. Returns the number of
    /// cached labels.
    pub fn rebuild_cache(&self) -> FloraResult<usize> {
        let _guard = lock(&self.state);
        let mut cache = DescriptorCache::default();

        if self.config.learned_dir.exists() {
            for file in sorted_jpegs(&self.config.learned_dir)? {
                let Some(label) = learned_label(&file) else {
                    tracing::warn!("unparseable learned filename: {}", file.display());
                    continue;
                };
                match self.descriptor_for(&file) {
                    Ok(d) => cache.insert(label, d),
                    Err(e) => {
                        tracing::warn!("skipping learned image {}: {e}", file.display());
                    }
                }
            }
        }

        cache.save(&self.config.cache_file)?;
        Ok(cache.len())
    }

    /// Count reference-set contents.
    pub fn stats(&self) -> FloraResult<StoreStats> {
        let mut dataset_labels = 0;
        let mut dataset_images = 0;
        if self.config.dataset_dir.exists() {
            for (_, dir) in sorted_label_dirs(&self.config.dataset_dir)? {
                dataset_labels += 1;
                dataset_images += sorted_jpegs(&dir)?.len();
            }
        }

        let learned_images = if self.config.learned_dir.exists() {
            sorted_jpegs(&self.config.learned_dir)?.len()
        } else {
            0
        };

        let cached_descriptors = {
            let _guard = lock(&self.state);
            self.load_cache_tolerant().len()
        };

        Ok(StoreStats {
            dataset_labels,
            dataset_images,
            learned_images,
            cached_descriptors,
        })
    }

    /// A corrupt cache file degrades to an empty cache; descriptors
    /// are recomputed on the next scan.
    fn load_cache_tolerant(&self) -> DescriptorCache {
        match DescriptorCache::load(&self.config.cache_file) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(
                    "descriptor cache unreadable, rebuilding from learned images: {e}"
                );
                DescriptorCache::default()
            }
        }
    }
}

fn lock(state: &Mutex<()>) -> std::sync::MutexGuard<'_, ()> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Label encoded in a learned filename: the stem up to the first `_`.
fn learned_label(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let label = stem.split('_').next()?;
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg"))
}

/// Files under `dir` with the dataset extension, sorted by filename.
fn sorted_jpegs(dir: &Path) -> FloraResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_jpeg(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Immediate subdirectories of the dataset root, sorted by name. The
/// directory name is the label.
fn sorted_label_dirs(dir: &Path) -> FloraResult<Vec<(String, PathBuf)>> {
    let mut dirs: Vec<(String, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter_map(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| (n.to_string(), p.clone()))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise_jpeg(path: &Path, seed: u32) {
        let img = image::RgbImage::from_fn(64, 64, |x, y| {
            let mut v = x.wrapping_mul(374_761_393)
                ^ y.wrapping_mul(668_265_263)
                ^ seed.wrapping_mul(2_654_435_761);
            v ^= v >> 13;
            v = v.wrapping_mul(1_274_126_177);
            image::Rgb([(v & 0xFF) as u8, ((v >> 8) & 0xFF) as u8, ((v >> 16) & 0xFF) as u8])
        });
        img.save(path).unwrap();
    }

    fn store_in(dir: &Path) -> ReferenceStore {
        ReferenceStore::new(FloraConfig::new(dir))
    }

    #[test]
    fn learned_label_parsing() {
        assert_eq!(
            learned_label(Path::new("rose_20240101_120000_abcd1234.jpg")),
            Some("rose".to_string())
        );
        assert_eq!(learned_label(Path::new("fern.jpg")), Some("fern".to_string()));
        assert_eq!(learned_label(Path::new("_x.jpg")), None);
    }

    #[test]
    fn empty_store_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let (label, score) = store.best_match(&vec![1.0; FEATURE_DIM]).unwrap();
        assert_eq!(label, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn static_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let label_dir = store.config().dataset_dir.join("maize");
        std::fs::create_dir_all(&label_dir).unwrap();
        noise_jpeg(&label_dir.join("sample.jpg"), 7);

        let query = store.descriptor_for(&label_dir.join("sample.jpg")).unwrap();
        let (label, score) = store.best_match(&query).unwrap();
        assert_eq!(label.as_deref(), Some("maize"));
        assert!(score > 0.999);
    }

    #[test]
    fn corrupt_reference_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let label_dir = store.config().dataset_dir.join("maize");
        std::fs::create_dir_all(&label_dir).unwrap();
        // Sorted first, so the scan hits the corrupt file before the
        // real one.
        std::fs::write(label_dir.join("aaa.jpg"), b"not an image").unwrap();
        noise_jpeg(&label_dir.join("real.jpg"), 3);

        let query = store.descriptor_for(&label_dir.join("real.jpg")).unwrap();
        let (label, score) = store.best_match(&query).unwrap();
        assert_eq!(label.as_deref(), Some("maize"));
        assert!(score > 0.999);
    }

    #[test]
    fn learned_scan_fills_cache_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::create_dir_all(&store.config().learned_dir).unwrap();
        let learned = store
            .config()
            .learned_dir
            .join("rose_20240101_120000_abcd1234.jpg");
        noise_jpeg(&learned, 11);

        let query = store.descriptor_for(&learned).unwrap();
        let (label, score) = store.best_match(&query).unwrap();
        assert_eq!(label.as_deref(), Some("rose"));
        assert!(score > 0.999);

        // The miss was flushed to disk.
        let cache = DescriptorCache::load(&store.config().cache_file).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("rose").is_some());
    }

    #[test]
    fn cache_hit_short_circuits_recomputation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::create_dir_all(&store.config().learned_dir).unwrap();
        let learned = store
            .config()
            .learned_dir
            .join("rose_20240101_120000_abcd1234.jpg");
        noise_jpeg(&learned, 11);

        // Poison the cache entry: if the scan honors the cache, the
        // zero vector scores 0 and no match is found.
        store.put_descriptor("rose", vec![0.0; FEATURE_DIM]).unwrap();

        let query = store.descriptor_for(&learned).unwrap();
        let (label, score) = store.best_match(&query).unwrap();
        assert_eq!(label, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn rebuild_cache_recomputes_from_images() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::create_dir_all(&store.config().learned_dir).unwrap();
        let learned = store
            .config()
            .learned_dir
            .join("rose_20240101_120000_abcd1234.jpg");
        noise_jpeg(&learned, 11);

        store.put_descriptor("rose", vec![0.0; FEATURE_DIM]).unwrap();
        assert_eq!(store.rebuild_cache().unwrap(), 1);

        let query = store.descriptor_for(&learned).unwrap();
        let (label, score) = store.best_match(&query).unwrap();
        assert_eq!(label.as_deref(), Some("rose"));
        assert!(score > 0.999);
    }

    #[test]
    fn corrupt_cache_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::write(&store.config().cache_file, b"garbage").unwrap();
        assert_eq!(store.load_cache_tolerant().len(), 0);
    }

    #[test]
    fn cache_with_oversized_length_field_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        // Well-formed header whose length field lies about the payload.
        let mut buf = Vec::new();
        DescriptorCache::default().write_to(&mut buf).unwrap();
        buf[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(&store.config().cache_file, &buf).unwrap();

        assert_eq!(store.load_cache_tolerant().len(), 0);

        // A scan over the bad cache still completes.
        std::fs::create_dir_all(&store.config().learned_dir).unwrap();
        let learned = store
            .config()
            .learned_dir
            .join("rose_20240101_120000_abcd1234.jpg");
        noise_jpeg(&learned, 11);

        let query = store.descriptor_for(&learned).unwrap();
        let (label, score) = store.best_match(&query).unwrap();
        assert_eq!(label.as_deref(), Some("rose"));
        assert!(score > 0.999);
    }

    #[test]
    fn admitted_filename_encodes_label_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let src = dir.path().join("input.jpg");
        noise_jpeg(&src, 5);

        let stored = store.admit_learned_image(&src, "bell_pepper").unwrap();
        let name = stored.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("bell_pepper_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(learned_label(&stored).as_deref(), Some("bell"));

        // Copy, not move: the source survives.
        assert!(src.exists());
        assert_eq!(
            std::fs::read(&src).unwrap(),
            std::fs::read(&stored).unwrap()
        );
    }

    #[test]
    fn log_appends_preserve_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        for name in ["rose", "fern"] {
            store
                .append_log(LearnLogEntry {
                    timestamp: "2024-01-01T12:00:00+00:00".to_string(),
                    plant_name: name.to_string(),
                    image_path: format!("/learned/{name}.jpg"),
                    original_path: format!("/input/{name}.jpg"),
                })
                .unwrap();
        }

        let raw = std::fs::read(&store.config().log_file).unwrap();
        let entries: Vec<LearnLogEntry> = serde_json::from_slice(&raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].plant_name, "rose");
        assert_eq!(entries[1].plant_name, "fern");
    }

    #[test]
    fn stats_counts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let label_dir = store.config().dataset_dir.join("maize");
        std::fs::create_dir_all(&label_dir).unwrap();
        noise_jpeg(&label_dir.join("a.jpg"), 1);
        noise_jpeg(&label_dir.join("b.jpg"), 2);
        std::fs::create_dir_all(&store.config().learned_dir).unwrap();
        noise_jpeg(
            &store.config().learned_dir.join("rose_20240101_120000_abcd1234.jpg"),
            3,
        );
        store.put_descriptor("rose", vec![1.0; FEATURE_DIM]).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.dataset_labels, 1);
        assert_eq!(stats.dataset_images, 2);
        assert_eq!(stats.learned_images, 1);
        assert_eq!(stats.cached_descriptors, 1);
    }
}
