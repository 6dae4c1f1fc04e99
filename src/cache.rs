//! Output fingerprint cache for incremental builds.
//!
//! Rendered entities are written only when their bytes changed. The writer
//! keeps a SHA-256 fingerprint per destination path; a second build with the
//! same content finds a matching fingerprint and skips the write entirely.
//!
//! # Design
//!
//! The cache is keyed by **destination path** (`/blog/post/index.html`), not
//! by source: the question it answers is "does the file at this output path
//! already hold these exact bytes?".
//!
//! A hit requires:
//! 1. An entry for the destination with an equal fingerprint
//! 2. The destination file still exists on disk
//!
//! The second check makes a hand-deleted output file come back on the next
//! build even though its fingerprint is cached.
//!
//! ## Storage
//!
//! By default the cache lives for the lifetime of the [`Site`](crate::site::Site)
//! only (e.g. a watch session rebuilding in one process). With
//! `cache.persist = true` it is saved as JSON at
//! `<output_dir>/.siteforge-cache.json` and reloaded on the next run. The
//! manifest file itself is never treated as a stale output.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the cache manifest file within the output directory.
pub const MANIFEST_FILENAME: &str = ".siteforge-cache.json";

/// Bump to invalidate existing manifests when the format changes.
const MANIFEST_VERSION: u32 = 1;

/// Destination path → content fingerprint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct OutputCache {
    pub version: u32,
    pub entries: HashMap<String, String>,
}

impl Default for OutputCache {
    fn default() -> Self {
        Self::empty()
    }
}

impl OutputCache {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: HashMap::new(),
        }
    }

    /// Load from the output directory. Returns an empty cache if the file
    /// doesn't exist or can't be parsed (version mismatch, corruption).
    pub fn load(output_dir: &Path) -> Self {
        let content = match std::fs::read_to_string(manifest_path(output_dir)) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str::<Self>(&content) {
            Ok(cache) if cache.version == MANIFEST_VERSION => cache,
            _ => Self::empty(),
        }
    }

    pub fn save(&self, output_dir: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(manifest_path(output_dir), json)
    }

    /// Whether `destination` already holds content with `fingerprint`.
    pub fn is_unchanged(&self, destination: &str, fingerprint: &str, output_dir: &Path) -> bool {
        self.entries
            .get(destination)
            .is_some_and(|cached| cached == fingerprint)
            && output_dir.join(destination.trim_start_matches('/')).is_file()
    }

    pub fn insert(&mut self, destination: String, fingerprint: String) {
        self.entries.insert(destination, fingerprint);
    }

    pub fn remove(&mut self, destination: &str) {
        self.entries.remove(destination);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of `bytes` as a hex string.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Resolve the cache manifest path for an output directory.
pub fn manifest_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MANIFEST_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // =========================================================================
    // Lookups
    // =========================================================================

    #[test]
    fn hit_requires_matching_fingerprint_and_file() {
        let tmp = TempDir::new().unwrap();
        let mut cache = OutputCache::empty();
        let fp = fingerprint(b"<p>hi</p>");
        cache.insert("/blog/index.html".into(), fp.clone());

        // File doesn't exist yet
        assert!(!cache.is_unchanged("/blog/index.html", &fp, tmp.path()));

        fs::create_dir_all(tmp.path().join("blog")).unwrap();
        fs::write(tmp.path().join("blog/index.html"), "<p>hi</p>").unwrap();
        assert!(cache.is_unchanged("/blog/index.html", &fp, tmp.path()));
        assert!(!cache.is_unchanged("/blog/index.html", &fingerprint(b"other"), tmp.path()));
    }

    #[test]
    fn unknown_destination_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = OutputCache::empty();
        fs::write(tmp.path().join("a.html"), "x").unwrap();
        assert!(!cache.is_unchanged("/a.html", &fingerprint(b"x"), tmp.path()));
    }

    #[test]
    fn remove_forgets_entry() {
        let mut cache = OutputCache::empty();
        cache.insert("/a.html".into(), "f".into());
        cache.remove("/a.html");
        assert!(cache.is_empty());
    }

    // =========================================================================
    // Save / Load
    // =========================================================================

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut cache = OutputCache::empty();
        cache.insert("/x.html".into(), "f1".into());
        cache.insert("/y/index.html".into(), "f2".into());
        cache.save(tmp.path()).unwrap();

        let loaded = OutputCache::load(tmp.path());
        assert_eq!(loaded, cache);
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(OutputCache::load(tmp.path()).is_empty());
    }

    #[test]
    fn load_corrupt_json_returns_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(manifest_path(tmp.path()), "not json").unwrap();
        assert!(OutputCache::load(tmp.path()).is_empty());
    }

    #[test]
    fn load_wrong_version_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let json = format!(
            r#"{{"version": {}, "entries": {{"/a.html": "f"}}}}"#,
            MANIFEST_VERSION + 1
        );
        fs::write(manifest_path(tmp.path()), json).unwrap();
        assert!(OutputCache::load(tmp.path()).is_empty());
    }

    // =========================================================================
    // Fingerprints
    // =========================================================================

    #[test]
    fn fingerprint_is_sha256_hex() {
        let fp = fingerprint(b"hello world");
        assert_eq!(fp.len(), 64);
        assert_eq!(fp, fingerprint(b"hello world"));
        assert_ne!(fp, fingerprint(b"hello world!"));
    }
}
