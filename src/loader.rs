//! Content discovery and loading.
//!
//! Loading runs in two passes:
//!
//! 1. **Discover + classify (parallel).** The content root is walked
//!    breadth-first. Every file gets a default weight from its position in
//!    its directory listing (10, 20, 30, ...). Files are then opened on the
//!    rayon pool: a short prefix decides whether the file opens with a
//!    front matter fence (a *page*) or not (a *static file*, copied as-is).
//!    Results come back over a channel to a single aggregator, which is the
//!    only code that touches the output collections.
//!
//! 2. **Evaluate (single-threaded).** Pages are sorted by path, their front
//!    matter is applied and their body is rendered one at a time, since the
//!    renderer may hold shared mutable state. Finally every entity is
//!    initialized (URL derivation) and pages are put in canonical order.
//!
//! A file that fails to load or render is logged, recorded on the build
//! context and dropped; it never reaches either collection.
//!
//! ```text
//! content/
//! ├── config.toml          skipped (site config)
//! ├── .siteforge/          skipped (reserved)
//! ├── .git/                skipped (hidden)
//! ├── index.md             page,   weight 10
//! ├── logo.png             static, weight 20
//! └── blog/
//!     └── post.md          page,   weight 10
//! ```

use crate::config::{CONFIG_FILENAME, ContentConfig, SiteConfig};
use crate::content::{ContentObject, Dependency, FileSource, sort_canonical};
use crate::content_type::ContentTypeRegistry;
use crate::context::BuildContext;
use crate::frontmatter::{FrontMatterError, FrontMatterRegistry};
use crate::render::{RenderContext, Renderer};
use crate::url;
use crate::value::ScriptObject;
use std::collections::VecDeque;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, error};

/// Directory reserved for tool-internal state; never treated as content.
pub const RESERVED_FOLDER: &str = ".siteforge";

/// Default weight step between consecutive files of one directory.
pub const WEIGHT_INCREMENT: i64 = 10;

/// Bytes read to classify a file: a UTF-8 BOM plus any fence marker.
const PREFIX_LEN: usize = 16;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Inclusion predicate over virtual paths (`/blog/post.md`, `/drafts`).
pub type PathFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path}: {source}")]
    FrontMatter {
        path: String,
        #[source]
        source: FrontMatterError,
    },
    #[error("{path}: page with front matter is not valid UTF-8")]
    Encoding { path: String },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> LoadError + '_ {
    move |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Skip hidden entries and the configured exclude prefixes.
pub fn default_filter(config: &ContentConfig) -> PathFilter {
    let excludes: Vec<String> = config
        .excludes
        .iter()
        .map(|ex| format!("/{}", ex.trim_matches('/')))
        .filter(|ex| ex.len() > 1)
        .collect();
    Arc::new(move |path: &str| {
        if url::file_name(path).starts_with('.') {
            return false;
        }
        !excludes
            .iter()
            .any(|ex| path == ex || path.strip_prefix(ex.as_str()).is_some_and(|r| r.starts_with('/')))
    })
}

/// A file found by the directory walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub path: String,
    pub physical: PathBuf,
    pub weight: i64,
}

/// Walk `root` breadth-first.
///
/// Failing to read the root is an error. Failing to read a subdirectory is
/// logged and recorded, and the walk continues.
pub fn discover(
    root: &Path,
    filter: &PathFilter,
    cx: &BuildContext,
) -> Result<Vec<Discovered>, LoadError> {
    let mut found = Vec::new();
    let mut queue: VecDeque<(PathBuf, String)> = VecDeque::new();
    queue.push_back((root.to_path_buf(), String::from("/")));

    while let Some((dir, virtual_dir)) = queue.pop_front() {
        let entries = match read_sorted(&dir) {
            Ok(entries) => entries,
            Err(err) if dir == root => return Err(err),
            Err(err) => {
                error!("{err}");
                cx.record_error();
                continue;
            }
        };

        let mut position = 0;
        for (name, physical) in entries {
            let virtual_path = format!("{virtual_dir}{name}");
            let is_dir = fs::metadata(&physical).map(|m| m.is_dir()).unwrap_or(false);
            if is_dir {
                if name != RESERVED_FOLDER && filter(&virtual_path) {
                    queue.push_back((physical, format!("{virtual_path}/")));
                }
                continue;
            }
            if virtual_dir == "/" && name == CONFIG_FILENAME {
                continue;
            }
            if !filter(&virtual_path) {
                continue;
            }
            position += 1;
            found.push(Discovered {
                path: virtual_path,
                physical,
                weight: position * WEIGHT_INCREMENT,
            });
        }
    }
    Ok(found)
}

/// Directory entries sorted by file name. Non-UTF-8 names are skipped.
fn read_sorted(dir: &Path) -> Result<Vec<(String, PathBuf)>, LoadError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        if let Ok(name) = entry.file_name().into_string() {
            entries.push((name, entry.path()));
        }
    }
    entries.sort();
    Ok(entries)
}

/// A page waiting for the evaluation pass.
#[derive(Debug)]
pub struct PendingPage {
    pub page: ContentObject,
    pub front_matter: ScriptObject,
    pub body: String,
}

#[derive(Debug)]
pub enum Loaded {
    Page(PendingPage),
    Static(ContentObject),
}

/// Classify and read one discovered file.
pub fn load_file(
    discovered: Discovered,
    types: &ContentTypeRegistry,
    front_matter: &FrontMatterRegistry,
) -> Result<Loaded, LoadError> {
    let Discovered {
        path,
        physical,
        weight,
    } = discovered;
    let metadata = fs::metadata(&physical).map_err(io_error(&physical))?;
    let mut file = fs::File::open(&physical).map_err(io_error(&physical))?;

    let mut bytes = Vec::with_capacity(PREFIX_LEN);
    file.by_ref()
        .take(PREFIX_LEN as u64)
        .read_to_end(&mut bytes)
        .map_err(io_error(&physical))?;

    let content_type = types.classify(&path);
    let source = FileSource {
        path: path.clone(),
        physical: physical.clone(),
        length: metadata.len(),
        modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    };
    let mut page = ContentObject::from_file(source, content_type);
    page.weight = weight;

    if bytes.contains(&0) {
        return Ok(Loaded::Static(page));
    }
    let prefix = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
    let Some(parser) = front_matter.find(prefix) else {
        return Ok(Loaded::Static(page));
    };

    file.read_to_end(&mut bytes).map_err(io_error(&physical))?;
    let text = String::from_utf8(bytes).map_err(|_| LoadError::Encoding { path: path.clone() })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let parsed = parser
        .parse(text)
        .map_err(|source| LoadError::FrontMatter {
            path: path.clone(),
            source,
        })?;
    page.has_front_matter = true;
    Ok(Loaded::Page(PendingPage {
        page,
        front_matter: parsed.values,
        body: text[parsed.body_start..].to_string(),
    }))
}

/// Loaded entities, initialized and in canonical order.
#[derive(Debug, Default)]
pub struct LoadedContent {
    pub pages: Vec<ContentObject>,
    pub static_files: Vec<ContentObject>,
    /// Pages dropped because their front matter or renderer discarded them.
    pub discarded: usize,
}

/// Everything the loader needs from the site.
pub struct Loader<'a> {
    pub config: &'a SiteConfig,
    pub types: &'a ContentTypeRegistry,
    pub front_matter: &'a FrontMatterRegistry,
    pub renderer: &'a dyn Renderer,
    pub filter: &'a PathFilter,
    pub pool: &'a rayon::ThreadPool,
}

impl Loader<'_> {
    pub fn load(&self, root: &Path, cx: &BuildContext) -> Result<LoadedContent, LoadError> {
        let discovered = discover(root, self.filter, cx)?;
        debug!(files = discovered.len(), "discovered content files");

        let (mut pending, mut static_files) = self.read_all(discovered, cx);
        pending.sort_by(|a, b| a.page.path().cmp(&b.page.path()));
        static_files.sort_by(|a, b| a.path().cmp(&b.path()));

        let mut loaded = LoadedContent::default();
        let render_cx = RenderContext {
            config: self.config,
            build: cx,
        };
        for PendingPage {
            mut page,
            front_matter,
            body,
        } in pending
        {
            page.apply_front_matter(front_matter);
            if let Some(file) = page.file() {
                let dependency = Dependency::File(file.physical.clone());
                page.dependencies.push(dependency);
            }
            if page.discard {
                loaded.discarded += 1;
                continue;
            }

            match self.renderer.render(&mut page, &body, &render_cx) {
                Ok(output) => page.content = Some(output),
                Err(err) => {
                    error!(span = %err.span, entity = %page.describe(), "render failed: {}", err.message);
                    cx.record_error();
                    continue;
                }
            }
            if page.discard {
                loaded.discarded += 1;
                continue;
            }

            page.initialize(&self.config.urls, self.types, cx);
            loaded.pages.push(page);
        }

        for file in &mut static_files {
            file.initialize(&self.config.urls, self.types, cx);
        }
        loaded.static_files = static_files;
        sort_canonical(&mut loaded.pages);

        debug!(
            pages = loaded.pages.len(),
            static_files = loaded.static_files.len(),
            discarded = loaded.discarded,
            "content loaded"
        );
        Ok(loaded)
    }

    /// Read every file on the pool, aggregating on the calling thread.
    fn read_all(
        &self,
        discovered: Vec<Discovered>,
        cx: &BuildContext,
    ) -> (Vec<PendingPage>, Vec<ContentObject>) {
        let mut pages = Vec::new();
        let mut static_files = Vec::new();
        let types = self.types;
        let front_matter = self.front_matter;

        self.pool.in_place_scope(|scope| {
            let (tx, rx) = mpsc::channel();
            for file in discovered {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let path = file.path.clone();
                    // Receiver outlives every sender in this scope.
                    let _ = tx.send((path, load_file(file, types, front_matter)));
                });
            }
            drop(tx);

            for (path, result) in rx {
                match result {
                    Ok(Loaded::Page(page)) => pages.push(page),
                    Ok(Loaded::Static(file)) => static_files.push(file),
                    Err(err) => {
                        error!(path = %path, "{err}");
                        cx.record_error();
                    }
                }
            }
        });
        (pages, static_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_type::ContentType;
    use crate::render::{PassthroughRenderer, RenderError, span_at};
    use crate::test_helpers::{single_thread_pool, write_file};
    use tempfile::TempDir;

    fn load_with(
        root: &Path,
        config: &SiteConfig,
        renderer: &dyn Renderer,
    ) -> (LoadedContent, BuildContext) {
        let types = ContentTypeRegistry::default();
        let front_matter = FrontMatterRegistry::default();
        let filter = default_filter(&config.content);
        let pool = single_thread_pool();
        let loader = Loader {
            config,
            types: &types,
            front_matter: &front_matter,
            renderer,
            filter: &filter,
            pool: &pool,
        };
        let cx = BuildContext::new();
        let loaded = loader.load(root, &cx).unwrap();
        (loaded, cx)
    }

    fn load(root: &Path) -> (LoadedContent, BuildContext) {
        load_with(root, &SiteConfig::default(), &PassthroughRenderer)
    }

    fn paths(objects: &[ContentObject]) -> Vec<&str> {
        objects.iter().filter_map(|o| o.path()).collect()
    }

    // =========================================================================
    // Discovery
    // =========================================================================

    #[test]
    fn discover_is_breadth_first_with_listing_weights() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "b.txt", "b");
        write_file(tmp.path(), "a.txt", "a");
        write_file(tmp.path(), "sub/deep/z.txt", "z");
        write_file(tmp.path(), "sub/y.txt", "y");

        let filter = default_filter(&ContentConfig::default());
        let found = discover(tmp.path(), &filter, &BuildContext::new()).unwrap();
        let summary: Vec<(&str, i64)> = found.iter().map(|d| (d.path.as_str(), d.weight)).collect();
        assert_eq!(
            summary,
            vec![
                ("/a.txt", 10),
                ("/b.txt", 20),
                ("/sub/y.txt", 10),
                ("/sub/deep/z.txt", 10),
            ]
        );
    }

    #[test]
    fn discover_skips_reserved_hidden_and_config() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "config.toml", "");
        write_file(tmp.path(), ".siteforge/state.json", "{}");
        write_file(tmp.path(), ".git/HEAD", "ref");
        write_file(tmp.path(), ".htaccess", "deny");
        write_file(tmp.path(), "docs/config.toml", "kept = true");
        write_file(tmp.path(), "page.md", "x");

        let filter = default_filter(&ContentConfig::default());
        let found = discover(tmp.path(), &filter, &BuildContext::new()).unwrap();
        let paths: Vec<&str> = found.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/page.md", "/docs/config.toml"]);
    }

    #[test]
    fn discover_honours_excludes() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "drafts/wip.md", "x");
        write_file(tmp.path(), "drafts-old.md", "x");
        write_file(tmp.path(), "blog/secret.md", "x");
        write_file(tmp.path(), "blog/post.md", "x");

        let config = ContentConfig {
            excludes: vec!["drafts".to_string(), "/blog/secret.md".to_string()],
            ..ContentConfig::default()
        };
        let filter = default_filter(&config);
        let found = discover(tmp.path(), &filter, &BuildContext::new()).unwrap();
        let paths: Vec<&str> = found.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["/drafts-old.md", "/blog/post.md"]);
    }

    #[test]
    fn discover_missing_root_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let filter = default_filter(&ContentConfig::default());
        let result = discover(&tmp.path().join("nope"), &filter, &BuildContext::new());
        assert!(matches!(result, Err(LoadError::Io { .. })));
    }

    #[test]
    fn custom_filter_prunes_directories() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "keep/a.md", "x");
        write_file(tmp.path(), "skip/b.md", "x");
        let filter: PathFilter = Arc::new(|path: &str| !path.starts_with("/skip"));
        let found = discover(tmp.path(), &filter, &BuildContext::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/keep/a.md");
    }

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn front_matter_makes_a_page() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "post.md", "---\ntitle: Hi\n---\nBody");
        write_file(tmp.path(), "notes.md", "Just text");

        let (loaded, cx) = load(tmp.path());
        assert!(!cx.has_errors());
        assert_eq!(paths(&loaded.pages), vec!["/post.md"]);
        assert_eq!(paths(&loaded.static_files), vec!["/notes.md"]);

        let page = &loaded.pages[0];
        assert!(page.has_front_matter);
        assert_eq!(page.title.as_deref(), Some("Hi"));
        assert_eq!(page.content.as_deref(), Some("Body"));
        assert_eq!(page.url, "/post/");
        assert_eq!(page.content_type, ContentType::MARKDOWN);

        let file = &loaded.static_files[0];
        assert!(file.content.is_none());
        assert_eq!(file.url, "/notes.md");
    }

    #[test]
    fn bom_before_fence_is_accepted() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "bom.md", "\u{feff}---\ntitle: Bom\n---\nBody");
        let (loaded, _) = load(tmp.path());
        assert_eq!(loaded.pages.len(), 1);
        assert_eq!(loaded.pages[0].title.as_deref(), Some("Bom"));
    }

    #[test]
    fn nul_byte_in_prefix_means_static() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("blob.bin"), b"---\n\0binary\n---\n").unwrap();
        let (loaded, _) = load(tmp.path());
        assert!(loaded.pages.is_empty());
        assert_eq!(paths(&loaded.static_files), vec!["/blob.bin"]);
    }

    #[test]
    fn toml_front_matter_is_detected() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "page.html", "+++\ntitle = \"T\"\n+++\n<p>x</p>");
        let (loaded, _) = load(tmp.path());
        assert_eq!(loaded.pages[0].title.as_deref(), Some("T"));
        assert_eq!(loaded.pages[0].url, "/page/");
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn broken_front_matter_drops_the_file() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "bad.md", "---\ntitle: [oops\n---\nBody");
        write_file(tmp.path(), "good.md", "---\ntitle: ok\n---\nBody");
        let (loaded, cx) = load(tmp.path());
        assert_eq!(cx.error_count(), 1);
        assert_eq!(paths(&loaded.pages), vec!["/good.md"]);
        assert!(loaded.static_files.is_empty());
    }

    #[test]
    fn invalid_utf8_page_is_dropped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("bad.md"), b"---\ntitle: x\n---\n\xff\xfe").unwrap();
        let (loaded, cx) = load(tmp.path());
        assert!(cx.has_errors());
        assert!(loaded.pages.is_empty());
    }

    #[test]
    fn render_error_drops_the_page() {
        struct Failing;
        impl Renderer for Failing {
            fn render(
                &self,
                page: &mut ContentObject,
                body: &str,
                _cx: &RenderContext<'_>,
            ) -> Result<String, RenderError> {
                match body.find("{{") {
                    Some(pos) => Err(RenderError::new(
                        span_at(page.path().unwrap_or_default(), body, pos),
                        "unclosed tag",
                    )),
                    None => Ok(body.to_string()),
                }
            }
        }

        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "bad.md", "---\n---\nline\n{{ oops");
        write_file(tmp.path(), "good.md", "---\n---\nfine");
        let (loaded, cx) = load_with(tmp.path(), &SiteConfig::default(), &Failing);
        assert_eq!(cx.error_count(), 1);
        assert_eq!(paths(&loaded.pages), vec!["/good.md"]);
    }

    // =========================================================================
    // Evaluation pass
    // =========================================================================

    #[test]
    fn front_matter_weight_overrides_listing_weight() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.md", "---\nweight: 5\n---\n");
        write_file(tmp.path(), "b.md", "---\nweight: 1\n---\n");
        write_file(tmp.path(), "c.md", "---\n---\n");
        let (loaded, _) = load(tmp.path());
        assert_eq!(paths(&loaded.pages), vec!["/b.md", "/a.md", "/c.md"]);
        assert_eq!(loaded.pages[2].weight, 30);
    }

    #[test]
    fn discarded_pages_are_dropped() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "draft.md", "---\ndiscard: true\n---\n");
        write_file(tmp.path(), "live.md", "---\n---\n");
        let (loaded, cx) = load(tmp.path());
        assert!(!cx.has_errors());
        assert_eq!(loaded.discarded, 1);
        assert_eq!(paths(&loaded.pages), vec!["/live.md"]);
    }

    #[test]
    fn source_file_is_recorded_as_dependency() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.md", "---\n---\n");
        let (loaded, _) = load(tmp.path());
        assert_eq!(
            loaded.pages[0].dependencies,
            vec![Dependency::File(tmp.path().join("a.md"))]
        );
    }

    #[test]
    fn parallel_pool_loads_everything() {
        let tmp = TempDir::new().unwrap();
        for i in 0..40 {
            write_file(tmp.path(), &format!("p{i:02}.md"), "---\n---\nx");
            write_file(tmp.path(), &format!("s{i:02}.css"), "body{}");
        }
        let config = SiteConfig::default();
        let types = ContentTypeRegistry::default();
        let front_matter = FrontMatterRegistry::default();
        let filter = default_filter(&config.content);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let loader = Loader {
            config: &config,
            types: &types,
            front_matter: &front_matter,
            renderer: &PassthroughRenderer,
            filter: &filter,
            pool: &pool,
        };
        let loaded = loader.load(tmp.path(), &BuildContext::new()).unwrap();
        assert_eq!(loaded.pages.len(), 40);
        assert_eq!(loaded.static_files.len(), 40);
        // Deterministic order despite unordered completion.
        assert_eq!(loaded.static_files[0].path(), Some("/s00.css"));
    }
}
