//! Shared test utilities for the siteforge test suite.
//!
//! Provides entity constructors, closure-backed processors, filesystem
//! helpers and lookups over a built [`SiteContent`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let src = setup_fixtures();
//! let out = TempDir::new().unwrap();
//! let mut site = Site::new(src.path(), out.path(), test_config()).unwrap();
//! site.build().unwrap();
//!
//! let post = find_page(site.content(), "/blog/post.md");
//! assert_eq!(post.url, "/blog/post/");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

use crate::config::SiteConfig;
use crate::content::{ContentObject, FileSource};
use crate::content_type::ContentTypeRegistry;
use crate::processor::{
    ContentProcessor, ContentStage, ProcessContext, ProcessingResult, ProcessorError,
    SiteProcessor, SiteStage, StageContext,
};
use crate::site::SiteContent;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/content/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/content");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Single worker, sequential processing: deterministic ordering.
pub fn test_config() -> SiteConfig {
    let mut config = SiteConfig::default();
    config.processing.max_processes = Some(1);
    config.processing.parallel_content = false;
    config
}

pub fn single_thread_pool() -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
}

// =========================================================================
// Entity constructors
// =========================================================================

fn virtual_object(path: &str, has_front_matter: bool) -> ContentObject {
    let source = FileSource {
        path: path.to_string(),
        physical: PathBuf::from(path.trim_start_matches('/')),
        length: 0,
        modified: SystemTime::UNIX_EPOCH,
    };
    let content_type = ContentTypeRegistry::default().classify(path);
    let mut object = ContentObject::from_file(source, content_type);
    object.has_front_matter = has_front_matter;
    object
}

/// File-backed entity with front matter; no file on disk.
pub fn page_object(path: &str) -> ContentObject {
    virtual_object(path, true)
}

/// File-backed entity without front matter; no file on disk.
pub fn file_object(path: &str) -> ContentObject {
    virtual_object(path, false)
}

/// Static entity for a real file at `root` + `path`.
pub fn static_file(root: &Path, path: &str) -> ContentObject {
    let physical = root.join(path.trim_start_matches('/'));
    let metadata = fs::metadata(&physical).unwrap();
    let source = FileSource {
        path: path.to_string(),
        physical,
        length: metadata.len(),
        modified: metadata.modified().unwrap(),
    };
    let content_type = ContentTypeRegistry::default().classify(path);
    ContentObject::from_file(source, content_type)
}

// =========================================================================
// Closure-backed processors
// =========================================================================

type ContentFn = dyn Fn(&mut ContentObject, ContentStage, &ProcessContext<'_>) -> Result<ProcessingResult, ProcessorError>
    + Send
    + Sync;

pub struct FnProcessor {
    name: String,
    f: Box<ContentFn>,
}

impl FnProcessor {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ContentObject, ContentStage, &ProcessContext<'_>) -> Result<ProcessingResult, ProcessorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl ContentProcessor for FnProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_process(
        &self,
        page: &mut ContentObject,
        stage: ContentStage,
        cx: &ProcessContext<'_>,
    ) -> Result<ProcessingResult, ProcessorError> {
        (self.f)(page, stage, cx)
    }
}

type SiteFn = dyn Fn(SiteStage, &mut SiteContent, &StageContext<'_>) -> Result<(), ProcessorError> + Send + Sync;

pub struct FnSiteProcessor {
    name: String,
    f: Box<SiteFn>,
}

impl FnSiteProcessor {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(SiteStage, &mut SiteContent, &StageContext<'_>) -> Result<(), ProcessorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl SiteProcessor for FnSiteProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(
        &self,
        stage: SiteStage,
        content: &mut SiteContent,
        cx: &StageContext<'_>,
    ) -> Result<(), ProcessorError> {
        (self.f)(stage, content, cx)
    }
}

// =========================================================================
// Site content lookups (panic with a clear message on miss)
// =========================================================================

/// Find a loaded page by source path. Panics if not found.
pub fn find_page<'a>(content: &'a SiteContent, path: &str) -> &'a ContentObject {
    content
        .pages
        .iter()
        .find(|p| p.path() == Some(path))
        .unwrap_or_else(|| {
            let paths = page_paths(content);
            panic!("page '{path}' not found. Available: {paths:?}")
        })
}

/// All page source paths in canonical order.
pub fn page_paths(content: &SiteContent) -> Vec<&str> {
    content.pages.iter().filter_map(|p| p.path()).collect()
}

/// All page URLs in canonical order.
pub fn page_urls(content: &SiteContent) -> Vec<&str> {
    content.pages.iter().map(|p| p.url.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Site;

    #[test]
    fn fixture_site_builds_cleanly() {
        let src = setup_fixtures();
        let out = TempDir::new().unwrap();
        let mut site = Site::open(src.path(), out.path()).unwrap();
        let report = site.build().unwrap();

        assert!(!report.has_errors, "fixture site should build: {report:?}");
        let post = find_page(site.content(), "/blog/post.md");
        assert_eq!(post.url, "/blog/post/");
        assert!(page_urls(site.content()).contains(&"/blog/"));
    }
}
