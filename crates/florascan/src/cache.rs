//! On-disk descriptor cache: label → feature vector.
//!
//! Framed binary file: a fixed 32-byte little-endian header followed by
//! a JSON payload. Not compatible with any foreign cache format — after
//! a migration the cache is re-derived from the learned images instead.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::types::{FloraError, FloraResult};

/// Magic bytes: "FSDC"
const CACHE_MAGIC: u32 = 0x46534443;

/// Current format version.
const FORMAT_VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 32;

/// In-memory descriptor cache with whole-file load/save.
///
/// At most one vector per label; inserting for an existing label
/// replaces the previous vector (last writer wins).
#[derive(Debug, Clone, Default)]
pub struct DescriptorCache {
    entries: BTreeMap<String, Vec<f32>>,
}

impl DescriptorCache {
    /// Load a cache file, or return an empty cache if the file does
    /// not exist yet.
    pub fn load(path: &Path) -> FloraResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut file = std::fs::File::open(path)?;
        Self::read_from(&mut file)
    }

    /// Read a cache from any reader.
    pub fn read_from<R: Read>(reader: &mut R) -> FloraResult<Self> {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header)?;

        let magic = read_u32(&header[0..4]);
        if magic != CACHE_MAGIC {
            return Err(FloraError::Cache(format!(
                "invalid magic: expected 0x{CACHE_MAGIC:08X}, got 0x{magic:08X}"
            )));
        }

        let version = read_u16(&header[4..6]);
        if version != FORMAT_VERSION {
            return Err(FloraError::Cache(format!("unsupported version: {version}")));
        }

        let entry_count = read_u64(&header[8..16]);
        let payload_len = read_u64(&header[16..24]);

        // The length field is untrusted: read at most that many bytes
        // and reject a short payload instead of preallocating.
        let mut payload = Vec::new();
        reader.take(payload_len).read_to_end(&mut payload)?;
        if payload.len() as u64 != payload_len {
            return Err(FloraError::Cache(format!(
                "truncated payload: expected {payload_len} bytes, got {}",
                payload.len()
            )));
        }

        let entries: BTreeMap<String, Vec<f32>> = serde_json::from_slice(&payload)
            .map_err(|e| FloraError::Cache(format!("deserialization failed: {e}")))?;

        if entries.len() as u64 != entry_count {
            return Err(FloraError::Cache(format!(
                "entry count mismatch: header says {entry_count}, payload has {}",
                entries.len()
            )));
        }

        Ok(Self { entries })
    }

    /// Write the cache to a file, creating parent directories as
    /// needed.
    pub fn save(&self, path: &Path) -> FloraResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        self.write_to(&mut file)
    }

    /// Write the cache to any writer.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> FloraResult<()> {
        let payload = serde_json::to_vec(&self.entries)
            .map_err(|e| FloraError::Cache(format!("serialization failed: {e}")))?;

        let mut header = [0u8; HEADER_SIZE];
        write_u32(&mut header[0..4], CACHE_MAGIC);
        write_u16(&mut header[4..6], FORMAT_VERSION);
        write_u16(&mut header[6..8], 0); // flags
        write_u64(&mut header[8..16], self.entries.len() as u64);
        write_u64(&mut header[16..24], payload.len() as u64);

        writer.write_all(&header)?;
        writer.write_all(&payload)?;
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Vec<f32>> {
        self.entries.get(label)
    }

    /// Insert or replace the vector for a label.
    pub fn insert(&mut self, label: String, vector: Vec<f32>) {
        self.entries.insert(label, vector);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Little-endian byte helpers
fn write_u16(buf: &mut [u8], val: u16) {
    buf[..2].copy_from_slice(&val.to_le_bytes());
}
fn write_u32(buf: &mut [u8], val: u32) {
    buf[..4].copy_from_slice(&val.to_le_bytes());
}
fn write_u64(buf: &mut [u8], val: u64) {
    buf[..8].copy_from_slice(&val.to_le_bytes());
}
fn read_u16(buf: &[u8]) -> u16 {
    u16::from_le_bytes([buf[0], buf[1]])
}
fn read_u32(buf: &[u8]) -> u32 {
    u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]])
}
fn read_u64(buf: &[u8]) -> u64 {
    u64::from_le_bytes([buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7]])
}
