//! Output materialization and stale-output tracking.
//!
//! The writer is shared by every worker during content processing. Per build:
//!
//! 1. [`OutputWriter::begin`] snapshots the existing output tree into the
//!    *stale* sets (files and directories).
//! 2. [`OutputWriter::write`] claims a destination, un-stales it and all its
//!    ancestor directories, then either writes rendered content (skipped on a
//!    fingerprint hit) or copies the source file (skipped unless the source
//!    is strictly newer).
//! 3. [`OutputWriter::cleanup`] deletes whatever is still stale: files
//!    first, then directories, deepest first. Failures are ignored.
//!
//! A destination claimed by two different entities in one build is an error
//! reported to the second caller; the first output stands.

use crate::cache::{self, OutputCache};
use crate::content::{ContentId, ContentObject};
use crate::stats::WriteStats;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("same url output `{destination}` produced by {first} and {second}")]
    SameUrl {
        destination: String,
        first: String,
        second: String,
    },
    #[error("cannot create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} has neither content nor a source file")]
    NoSource(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Fingerprint hit; file left untouched.
    Unchanged,
    Copied,
    /// Destination is at least as new as the source.
    CopySkipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Claim {
    id: ContentId,
    source: String,
}

#[derive(Debug, Default)]
struct TrackingState {
    /// Destination → every entity that claimed it, owner first.
    claims: HashMap<String, Vec<Claim>>,
    stale_files: HashSet<String>,
    stale_dirs: HashSet<String>,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU32,
    unchanged: AtomicU32,
    copied: AtomicU32,
    copy_skipped: AtomicU32,
    stale_deleted: AtomicU32,
    collisions: AtomicU32,
}

impl Counters {
    fn reset(&self) {
        for counter in [
            &self.written,
            &self.unchanged,
            &self.copied,
            &self.copy_skipped,
            &self.stale_deleted,
            &self.collisions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Virtual ancestors of a destination: `/a/b/c.html` → `/a`, `/a/b`.
fn ancestors(destination: &str) -> impl Iterator<Item = &str> {
    destination
        .match_indices('/')
        .map(|(pos, _)| &destination[..pos])
        .filter(|dir| !dir.is_empty())
}

/// Virtual path of `path` relative to `root`, `/`-separated.
fn to_virtual(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    if out.is_empty() { None } else { Some(out) }
}

#[derive(Debug)]
pub struct OutputWriter {
    output_dir: PathBuf,
    persist: bool,
    cache: Mutex<OutputCache>,
    state: Mutex<TrackingState>,
    counters: Counters,
}

impl OutputWriter {
    /// With `persist`, the fingerprint cache is reloaded from the output
    /// directory and saved back by [`finish`](Self::finish).
    pub fn new(output_dir: impl Into<PathBuf>, persist: bool) -> Self {
        let output_dir = output_dir.into();
        let cache = if persist {
            OutputCache::load(&output_dir)
        } else {
            OutputCache::empty()
        };
        Self {
            output_dir,
            persist,
            cache: Mutex::new(cache),
            state: Mutex::new(TrackingState::default()),
            counters: Counters::default(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn physical(&self, destination: &str) -> PathBuf {
        self.output_dir.join(destination.trim_start_matches('/'))
    }

    /// Start a build: forget last build's claims and mark the whole
    /// existing output tree as stale.
    pub fn begin(&self) {
        self.counters.reset();
        let mut state = lock(&self.state);
        *state = TrackingState::default();

        if !self.output_dir.is_dir() {
            return;
        }
        for entry in WalkDir::new(&self.output_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            let Some(path) = to_virtual(&self.output_dir, entry.path()) else {
                continue;
            };
            if entry.file_type().is_dir() {
                state.stale_dirs.insert(path);
            } else if path != format!("/{}", cache::MANIFEST_FILENAME) {
                state.stale_files.insert(path);
            }
        }
        debug!(
            files = state.stale_files.len(),
            dirs = state.stale_dirs.len(),
            "tracked previous outputs"
        );
    }

    /// Claim `destination` for `page` and materialize it.
    pub fn write(&self, page: &ContentObject, destination: &str) -> Result<WriteOutcome, WriteError> {
        self.claim(page, destination)?;

        let target = self.physical(destination);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| WriteError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        match page.content.as_deref() {
            Some(text) => self.write_rendered(destination, &target, text),
            None => self.copy_source(page, destination, &target),
        }
    }

    fn claim(&self, page: &ContentObject, destination: &str) -> Result<(), WriteError> {
        let mut state = lock(&self.state);
        let claim = Claim {
            id: page.id(),
            source: page.describe(),
        };
        let claims = state.claims.entry(destination.to_string()).or_default();
        if let Some(owner) = claims.first().filter(|owner| owner.id != claim.id) {
            let err = WriteError::SameUrl {
                destination: destination.to_string(),
                first: owner.source.clone(),
                second: claim.source.clone(),
            };
            claims.push(claim);
            Counters::bump(&self.counters.collisions);
            return Err(err);
        }
        if claims.is_empty() {
            claims.push(claim);
        }

        state.stale_files.remove(destination);
        for dir in ancestors(destination) {
            state.stale_dirs.remove(dir);
        }
        Ok(())
    }

    fn write_rendered(
        &self,
        destination: &str,
        target: &Path,
        text: &str,
    ) -> Result<WriteOutcome, WriteError> {
        let fingerprint = cache::fingerprint(text.as_bytes());
        if lock(&self.cache).is_unchanged(destination, &fingerprint, &self.output_dir) {
            Counters::bump(&self.counters.unchanged);
            return Ok(WriteOutcome::Unchanged);
        }
        fs::write(target, text).map_err(|source| WriteError::Write {
            path: target.to_path_buf(),
            source,
        })?;
        lock(&self.cache).insert(destination.to_string(), fingerprint);
        Counters::bump(&self.counters.written);
        Ok(WriteOutcome::Written)
    }

    fn copy_source(
        &self,
        page: &ContentObject,
        destination: &str,
        target: &Path,
    ) -> Result<WriteOutcome, WriteError> {
        let Some(source) = page.file() else {
            return Err(WriteError::NoSource(page.describe()));
        };
        let up_to_date = fs::metadata(target)
            .and_then(|m| m.modified())
            .is_ok_and(|existing| source.modified <= existing);
        if up_to_date {
            Counters::bump(&self.counters.copy_skipped);
            return Ok(WriteOutcome::CopySkipped);
        }
        fs::copy(&source.physical, target).map_err(|err| WriteError::Copy {
            from: source.physical.clone(),
            to: target.to_path_buf(),
            source: err,
        })?;
        lock(&self.cache).remove(destination);
        Counters::bump(&self.counters.copied);
        Ok(WriteOutcome::Copied)
    }

    /// Delete outputs not produced by this build. Returns the number of
    /// files and directories removed.
    pub fn cleanup(&self) -> usize {
        let (files, mut dirs) = {
            let mut state = lock(&self.state);
            (
                std::mem::take(&mut state.stale_files),
                std::mem::take(&mut state.stale_dirs)
                    .into_iter()
                    .collect::<Vec<_>>(),
            )
        };

        let mut removed = 0;
        for file in &files {
            if fs::remove_file(self.physical(file)).is_ok() {
                lock(&self.cache).remove(file);
                removed += 1;
            }
        }
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.matches('/').count()));
        for dir in &dirs {
            if fs::remove_dir(self.physical(dir)).is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "removed stale outputs");
        }
        self.counters
            .stale_deleted
            .fetch_add(removed as u32, Ordering::Relaxed);
        removed
    }

    /// Persist the fingerprint cache when enabled.
    pub fn finish(&self) {
        if !self.persist || !self.output_dir.is_dir() {
            return;
        }
        if let Err(err) = lock(&self.cache).save(&self.output_dir) {
            warn!(path = %cache::manifest_path(&self.output_dir).display(), "cannot save output cache: {err}");
        }
    }

    /// Destinations claimed in the current build, sorted.
    pub fn written_paths(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut paths: Vec<String> = state.claims.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of entities that claimed `destination` this build.
    pub fn claim_count(&self, destination: &str) -> usize {
        lock(&self.state).claims.get(destination).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> WriteStats {
        let load = |counter: &AtomicU32| counter.load(Ordering::Relaxed);
        WriteStats {
            written: load(&self.counters.written),
            unchanged: load(&self.counters.unchanged),
            copied: load(&self.counters.copied),
            copy_skipped: load(&self.counters.copy_skipped),
            stale_deleted: load(&self.counters.stale_deleted),
            collisions: load(&self.counters.collisions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_type::ContentType;
    use crate::test_helpers::{set_mtime, static_file, write_file};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn rendered(url: &str, text: &str) -> ContentObject {
        ContentObject::dynamic(url, ContentType::HTML, text.to_string())
    }

    // =========================================================================
    // Rendered content
    // =========================================================================

    #[test]
    fn writes_rendered_content_and_creates_dirs() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        let page = rendered("/blog/post/", "<p>hi</p>");
        let outcome = writer.write(&page, "/blog/post/index.html").unwrap();
        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(
            fs::read_to_string(out.path().join("blog/post/index.html")).unwrap(),
            "<p>hi</p>"
        );
    }

    #[test]
    fn unchanged_content_is_not_rewritten() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        let page = rendered("/a/", "same");

        writer.begin();
        assert_eq!(writer.write(&page, "/a/index.html").unwrap(), WriteOutcome::Written);

        writer.begin();
        let again = rendered("/a/", "same");
        assert_eq!(writer.write(&again, "/a/index.html").unwrap(), WriteOutcome::Unchanged);
        assert_eq!(writer.stats().unchanged, 1);
        assert_eq!(writer.stats().written, 0);

        writer.begin();
        let changed = rendered("/a/", "different");
        assert_eq!(writer.write(&changed, "/a/index.html").unwrap(), WriteOutcome::Written);
    }

    #[test]
    fn deleted_output_is_rewritten_despite_cache() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        writer.write(&rendered("/a/", "x"), "/a/index.html").unwrap();
        fs::remove_file(out.path().join("a/index.html")).unwrap();

        writer.begin();
        assert_eq!(
            writer.write(&rendered("/a/", "x"), "/a/index.html").unwrap(),
            WriteOutcome::Written
        );
    }

    // =========================================================================
    // Collisions
    // =========================================================================

    #[test]
    fn second_entity_on_same_destination_is_rejected() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        let first = rendered("/x/", "first");
        let second = rendered("/x/", "second");

        writer.write(&first, "/x/index.html").unwrap();
        let err = writer.write(&second, "/x/index.html").unwrap_err();
        assert!(matches!(err, WriteError::SameUrl { .. }));
        assert_eq!(
            fs::read_to_string(out.path().join("x/index.html")).unwrap(),
            "first"
        );
        assert_eq!(writer.claim_count("/x/index.html"), 2);
        assert_eq!(writer.stats().collisions, 1);
    }

    #[test]
    fn claims_reset_between_builds() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        writer.write(&rendered("/x/", "a"), "/x/index.html").unwrap();
        writer.begin();
        assert!(writer.write(&rendered("/x/", "a"), "/x/index.html").is_ok());
    }

    // =========================================================================
    // Source copies
    // =========================================================================

    #[test]
    fn copies_only_when_source_is_newer() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let source = write_file(src.path(), "css/site.css", "body{}");
        let now = SystemTime::now();
        set_mtime(&source, now - Duration::from_secs(60));

        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        let file = static_file(src.path(), "/css/site.css");
        assert_eq!(writer.write(&file, "/css/site.css").unwrap(), WriteOutcome::Copied);
        assert_eq!(
            fs::read_to_string(out.path().join("css/site.css")).unwrap(),
            "body{}"
        );

        writer.begin();
        let file = static_file(src.path(), "/css/site.css");
        assert_eq!(writer.write(&file, "/css/site.css").unwrap(), WriteOutcome::CopySkipped);

        fs::write(&source, "body{color:red}").unwrap();
        set_mtime(&source, now + Duration::from_secs(60));
        writer.begin();
        let file = static_file(src.path(), "/css/site.css");
        assert_eq!(writer.write(&file, "/css/site.css").unwrap(), WriteOutcome::Copied);
        assert_eq!(
            fs::read_to_string(out.path().join("css/site.css")).unwrap(),
            "body{color:red}"
        );
    }

    #[test]
    fn dynamic_entity_without_content_is_an_error() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        let mut page = rendered("/x/", "");
        page.content = None;
        assert!(matches!(
            writer.write(&page, "/x/index.html"),
            Err(WriteError::NoSource(_))
        ));
    }

    // =========================================================================
    // Stale cleanup
    // =========================================================================

    #[test]
    fn cleanup_removes_only_stale_outputs() {
        let out = TempDir::new().unwrap();
        write_file(out.path(), "old/page/index.html", "old");
        write_file(out.path(), "old/keep.txt", "old");
        write_file(out.path(), "blog/stale.html", "old");
        write_file(out.path(), "blog/post/index.html", "old");

        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        writer
            .write(&rendered("/blog/post/", "new"), "/blog/post/index.html")
            .unwrap();
        let removed = writer.cleanup();

        assert!(out.path().join("blog/post/index.html").exists());
        assert!(!out.path().join("blog/stale.html").exists());
        assert!(!out.path().join("old").exists());
        // Three stale files, then the emptied old/page and old directories.
        assert_eq!(removed, 5);
        assert_eq!(writer.stats().stale_deleted, 5);
    }

    #[test]
    fn cleanup_keeps_manifest_file() {
        let out = TempDir::new().unwrap();
        write_file(out.path(), cache::MANIFEST_FILENAME, "{}");
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        writer.cleanup();
        assert!(cache::manifest_path(out.path()).exists());
    }

    #[test]
    fn ancestors_of_destination() {
        let dirs: Vec<&str> = ancestors("/a/b/c.html").collect();
        assert_eq!(dirs, vec!["/a", "/a/b"]);
        assert_eq!(ancestors("/c.html").count(), 0);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn persisted_cache_survives_a_new_writer() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), true);
        writer.begin();
        writer.write(&rendered("/a/", "x"), "/a/index.html").unwrap();
        writer.finish();
        assert!(cache::manifest_path(out.path()).exists());

        let reopened = OutputWriter::new(out.path(), true);
        reopened.begin();
        assert_eq!(
            reopened.write(&rendered("/a/", "x"), "/a/index.html").unwrap(),
            WriteOutcome::Unchanged
        );
    }

    #[test]
    fn non_persistent_writer_saves_nothing() {
        let out = TempDir::new().unwrap();
        let writer = OutputWriter::new(out.path(), false);
        writer.begin();
        writer.write(&rendered("/a/", "x"), "/a/index.html").unwrap();
        writer.finish();
        assert!(!cache::manifest_path(out.path()).exists());
    }
}
