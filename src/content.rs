//! The content entity model.
//!
//! A [`ContentObject`] is one unit of discovered or generated content: a page
//! (source file with front matter), a static file (copied verbatim), or a
//! dynamic page synthesized by a processor. Entities are rebuilt from scratch
//! on every build; nothing here is persisted.
//!
//! ## URL derivation
//!
//! [`ContentObject::initialize`] turns the raw URL (the source path, or the
//! `url` set in front matter) into the final site URL:
//!
//! ```text
//! /blog/post.md      + front matter   →  /blog/post/
//! /blog/post.md      + as_file        →  /blog/post.html
//! /docs/index.md     + front matter   →  /docs/
//! /css/site.css      (static)         →  /css/site.css
//! url: /:section/:year/:slug/         →  /blog/2024/hello/
//! ```
//!
//! [`ContentObject::destination_path`] then maps the URL to the output file:
//! a URL ending in `/` gets the configured index file appended.

use crate::config::UrlsConfig;
use crate::content_type::{ContentType, ContentTypeRegistry};
use crate::context::BuildContext;
use crate::url::{self, UrlError};
use crate::value::ScriptObject;
use chrono::{Datelike, NaiveDateTime};
use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;
use tracing::warn;

/// Layout type given to entities that do not declare one.
pub const DEFAULT_LAYOUT_TYPE: &str = "single";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an entity, used to tell two entities apart
/// when they claim the same UID or output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(u64);

impl ContentId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Where an entity's bytes come from.
#[derive(Debug, Clone)]
pub enum ContentSource {
    File(FileSource),
    /// Synthesized by a processor; only in-memory content.
    Dynamic,
}

/// A file discovered under the content root.
#[derive(Debug, Clone)]
pub struct FileSource {
    /// Virtual, `/`-rooted path relative to the content root.
    pub path: String,
    /// Physical location on disk.
    pub physical: PathBuf,
    pub length: u64,
    pub modified: SystemTime,
}

/// Something an entity's render depended on, for incremental invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dependency {
    File(PathBuf),
    Page(String),
}

#[derive(Debug, Clone)]
pub struct ContentObject {
    id: ContentId,
    pub source: ContentSource,
    /// Site-relative output URL; mutable until written.
    pub url: String,
    /// Author-assigned cross-reference key.
    pub uid: Option<String>,
    pub content_type: ContentType,
    /// Top-level directory of the source path (empty at the root).
    pub section: String,
    pub path_in_section: String,
    pub weight: i64,
    pub date: Option<NaiveDateTime>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub layout: Option<String>,
    pub layout_type: String,
    /// Rendered output. `None` means the source file is copied instead.
    pub content: Option<String>,
    pub summary: Option<String>,
    /// Once set, the entity is dropped from all further processing.
    pub discard: bool,
    pub has_front_matter: bool,
    /// The URL was set explicitly (front matter or processor), so no
    /// extension stripping is applied.
    pub url_explicit: bool,
    /// Parsed front matter, as authored.
    pub front_matter: ScriptObject,
    /// Entity-local variables for the rendering collaborator.
    pub locals: ScriptObject,
    pub dependencies: Vec<Dependency>,
}

impl ContentObject {
    /// Entity backed by a file under the content root.
    pub fn from_file(source: FileSource, content_type: ContentType) -> Self {
        let (section, path_in_section) = url::split_section(&source.path);
        let url = source.path.clone();
        let mut object = Self::blank(ContentSource::File(source), url, content_type);
        object.section = section;
        object.path_in_section = path_in_section;
        object
    }

    /// Entity synthesized in memory, published at `url`.
    pub fn dynamic(url: impl Into<String>, content_type: ContentType, content: String) -> Self {
        let url = url.into();
        let mut object = Self::blank(ContentSource::Dynamic, url.clone(), content_type);
        let (section, path_in_section) = url::split_section(&url);
        object.section = section;
        object.path_in_section = path_in_section;
        object.content = Some(content);
        object.url_explicit = true;
        object
    }

    fn blank(source: ContentSource, url: String, content_type: ContentType) -> Self {
        Self {
            id: ContentId::next(),
            source,
            url,
            uid: None,
            content_type,
            section: String::new(),
            path_in_section: String::new(),
            weight: 0,
            date: None,
            title: None,
            slug: None,
            layout: None,
            layout_type: DEFAULT_LAYOUT_TYPE.to_string(),
            content: None,
            summary: None,
            discard: false,
            has_front_matter: false,
            url_explicit: false,
            front_matter: ScriptObject::new(),
            locals: ScriptObject::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn id(&self) -> ContentId {
        self.id
    }

    /// Virtual source path; `None` for dynamic entities.
    pub fn path(&self) -> Option<&str> {
        match &self.source {
            ContentSource::File(file) => Some(&file.path),
            ContentSource::Dynamic => None,
        }
    }

    pub fn file(&self) -> Option<&FileSource> {
        match &self.source {
            ContentSource::File(file) => Some(file),
            ContentSource::Dynamic => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.source, ContentSource::Dynamic)
    }

    /// A human-readable identity for log messages.
    pub fn describe(&self) -> String {
        match self.path() {
            Some(path) => path.to_string(),
            None => format!("<dynamic {}>", self.url),
        }
    }

    /// Slug, falling back to the slugified title, then the file stem.
    pub fn effective_slug(&self) -> String {
        if let Some(slug) = self.slug.as_deref().filter(|s| !s.is_empty()) {
            return slug.to_string();
        }
        if let Some(title) = self.title.as_deref() {
            return url::slugify(title);
        }
        url::slugify(url::file_stem(self.path().unwrap_or(&self.url)))
    }

    /// Copy well-known front matter keys onto the entity and keep the whole
    /// object for the renderer.
    ///
    /// Recognized keys: `title`, `url`, `uid`, `weight`, `date`, `slug`,
    /// `layout`, `layout_type`, `summary`, `discard`.
    pub fn apply_front_matter(&mut self, front_matter: ScriptObject) {
        if let Some(title) = front_matter.get_str("title") {
            self.title = Some(title.to_string());
        }
        if let Some(url) = front_matter.get_str("url") {
            self.url = url.to_string();
            self.url_explicit = true;
        }
        if let Some(uid) = front_matter.get_str("uid") {
            self.uid = Some(uid.to_string());
        }
        if let Some(weight) = front_matter.get_i64("weight") {
            self.weight = weight;
        }
        if let Some(date) = front_matter.get_date("date") {
            self.date = Some(date);
        }
        if let Some(slug) = front_matter.get_str("slug") {
            self.slug = Some(slug.to_string());
        }
        if let Some(layout) = front_matter.get_str("layout") {
            self.layout = Some(layout.to_string());
        }
        if let Some(layout_type) = front_matter.get_str("layout_type") {
            self.layout_type = layout_type.to_string();
        }
        if let Some(summary) = front_matter.get_str("summary") {
            self.summary = Some(summary.to_string());
        }
        if let Some(discard) = front_matter.get_bool("discard") {
            self.discard = discard;
        }
        self.front_matter = front_matter;
    }

    /// Derive the final URL: substitute placeholders, then apply HTML folding.
    ///
    /// Folding only applies to pages (entities with front matter) whose type
    /// is HTML-like and whose URL was not set explicitly:
    /// - base name `index` (or `readme` when enabled) collapses to the parent
    ///   directory with a trailing slash
    /// - otherwise the extension is stripped and the URL becomes a folder
    ///   URL, or in file-as-URL mode the extension becomes the default page
    ///   extension (`/post.md` → `/post.html`)
    ///
    /// The URL is final afterwards, so index snapshots link to what is
    /// written. URLs already ending in `/` are left untouched. Unresolvable
    /// placeholders count as warnings in `cx`.
    pub fn initialize(&mut self, urls: &UrlsConfig, types: &ContentTypeRegistry, cx: &BuildContext) {
        if self.title.is_none() {
            let stem = url::file_stem(self.path().unwrap_or(&self.url));
            if !stem.is_empty() {
                self.title = Some(stem.to_string());
            }
        }

        let raw = if self.url.is_empty() {
            self.path().unwrap_or("/").to_string()
        } else {
            self.url.clone()
        };

        let mut resolved = if raw.contains(':') {
            self.substitute(&raw, urls, cx)
        } else {
            raw
        };
        if let Ok(normalized) = url::normalize(&resolved) {
            resolved = normalized;
        }

        if resolved.ends_with('/') {
            self.url = resolved;
            return;
        }

        let foldable = (self.has_front_matter || self.is_dynamic())
            && !self.url_explicit
            && types.is_html_like(&self.content_type);
        if foldable {
            let stem = url::file_stem(&resolved);
            let is_index = stem.eq_ignore_ascii_case("index")
                || (urls.readme_as_index && stem.eq_ignore_ascii_case("readme"));
            if is_index {
                resolved = url::parent_dir(&resolved);
            } else if urls.as_file {
                resolved = url::change_extension(&resolved, &urls.default_page_ext);
            } else {
                resolved = format!("{}/", url::strip_extension(&resolved));
            }
        }
        self.url = resolved;
    }

    fn substitute(&self, raw: &str, urls: &UrlsConfig, cx: &BuildContext) -> String {
        let slug = self.effective_slug();
        let (resolved, unknown) = url::substitute_placeholders(raw, |token| match token {
            "year" => self.date.map(|d| format!("{:04}", d.year())),
            "short_year" => self.date.map(|d| format!("{:02}", d.year() % 100)),
            "month" => self.date.map(|d| format!("{:02}", d.month())),
            "day" => self.date.map(|d| format!("{:02}", d.day())),
            "slug" => Some(slug.clone()),
            "title" => self.title.as_deref().map(url::slugify),
            "section" => Some(self.section.clone()),
            "path" => self
                .path()
                .map(|p| url::parent_dir(p).trim_matches('/').to_string()),
            "filename" => self.path().map(|p| url::file_stem(p).to_string()),
            "output_ext" => Some(urls.default_page_ext.clone()),
            _ => None,
        });
        for token in unknown {
            warn!(
                entity = %self.describe(),
                placeholder = %token,
                "unknown or unresolvable url placeholder removed"
            );
            cx.record_warning();
        }
        resolved
    }

    /// Output file path for the current URL.
    ///
    /// An invalid URL is reported and reverted to the source path. Dynamic
    /// entities have nothing to revert to, so they fail instead.
    pub fn destination_path(&mut self, urls: &UrlsConfig, cx: &BuildContext) -> Result<String, UrlError> {
        if !url::is_valid_url_path(&self.url) {
            let Some(path) = self.path().map(str::to_string) else {
                return Err(UrlError::Malformed(self.url.clone()));
            };
            warn!(
                entity = %self.describe(),
                url = %self.url,
                "invalid url, reverting to source path"
            );
            cx.record_warning();
            self.url = path;
        }
        if self.url.ends_with('/') {
            Ok(format!("{}{}", self.url, urls.index_file))
        } else {
            Ok(self.url.clone())
        }
    }

    /// Retype the entity. Moving to the default page type (HTML) also moves
    /// a file URL onto the default page extension.
    pub fn change_content_type(&mut self, content_type: ContentType, urls: &UrlsConfig) {
        if content_type == self.content_type {
            return;
        }
        if content_type == ContentType::HTML && !self.url.ends_with('/') {
            self.url = url::change_extension(&self.url, &urls.default_page_ext);
        }
        self.content_type = content_type;
    }

    /// Canonical ordering: weight, then date, then source path.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then_with(|| self.date.cmp(&other.date))
            .then_with(|| self.path().cmp(&other.path()))
            .then_with(|| self.url.cmp(&other.url))
    }
}

/// Sort entities into canonical weight/date order.
pub fn sort_canonical(objects: &mut [ContentObject]) {
    objects.sort_by(ContentObject::canonical_cmp);
}
