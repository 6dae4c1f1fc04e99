//! UID and path index over every entity in a build.
//!
//! Built once after loading (and extended with dynamic pages before
//! processing), then shared read-only with content processors and the
//! renderer. Entries are snapshots: they record the URL an entity had when it
//! was registered. Page URLs are final by then, file-as-URL mode included
//! (`/post.md` is registered as `/post.html`).
//!
//! ## Link resolution
//!
//! [`PageIndex::resolve_url`] turns author-written links into site URLs:
//!
//! ```text
//! https://example.com/      →  unchanged (has a scheme)
//! xref:about                →  URL of the page with uid "about"
//! /blog/post.md             →  /blog/post/           (path is indexed)
//! ../other.md  (from /a/b/) →  /a/other/
//! /missing.png?v=2          →  /missing.png?v=2      (unknown paths pass)
//! ```
//!
//! Absolute results are prefixed with `base_url` and `base_path`.

use crate::config::SiteConfig;
use crate::content::{ContentId, ContentObject};
use crate::content_type::ContentType;
use crate::context::BuildContext;
use crate::url::{self, UrlError};
use std::collections::HashMap;
use thiserror::Error;
use tracing::error;

const XREF_SCHEME: &str = "xref:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("uid `{uid}` of {duplicate} is already used by {existing}")]
    DuplicateUid {
        uid: String,
        existing: String,
        duplicate: String,
    },
}

/// Snapshot of an indexed entity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPage {
    pub id: ContentId,
    pub path: Option<String>,
    pub url: String,
    pub uid: Option<String>,
    pub content_type: ContentType,
    pub title: Option<String>,
}

impl IndexedPage {
    fn of(page: &ContentObject) -> Self {
        Self {
            id: page.id(),
            path: page.path().map(str::to_string),
            url: page.url.clone(),
            uid: page.uid.clone(),
            content_type: page.content_type.clone(),
            title: page.title.clone(),
        }
    }

    fn describe(&self) -> String {
        self.path
            .clone()
            .unwrap_or_else(|| format!("<dynamic {}>", self.url))
    }
}

#[derive(Debug, Clone)]
pub struct PageIndex {
    by_path: HashMap<String, IndexedPage>,
    by_uid: HashMap<String, IndexedPage>,
    base_url: String,
    base_path: String,
    index_file: String,
}

impl Default for PageIndex {
    fn default() -> Self {
        Self::new(&SiteConfig::default())
    }
}

impl PageIndex {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            by_path: HashMap::new(),
            by_uid: HashMap::new(),
            base_url: config.base_url.clone(),
            base_path: config.base_path.clone(),
            index_file: config.urls.index_file.clone(),
        }
    }

    /// Index `objects`, logging and recording duplicate UIDs.
    pub fn build<'a>(
        config: &SiteConfig,
        objects: impl IntoIterator<Item = &'a ContentObject>,
        cx: &BuildContext,
    ) -> Self {
        let mut index = Self::new(config);
        for object in objects {
            index.register_logged(object, cx);
        }
        index
    }

    /// Register one entity.
    ///
    /// The path table is last-write-wins. The UID table keeps the first
    /// entity that claimed a UID; a different entity claiming it again is an
    /// error and is left out of the UID table.
    pub fn register(&mut self, page: &ContentObject) -> Result<(), IndexError> {
        let entry = IndexedPage::of(page);
        let key = page.path().unwrap_or(&page.url).to_string();
        self.by_path.insert(key, entry.clone());

        let Some(uid) = page.uid.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(());
        };
        match self.by_uid.get(uid) {
            Some(existing) if existing.id != entry.id => Err(IndexError::DuplicateUid {
                uid: uid.to_string(),
                existing: existing.describe(),
                duplicate: page.describe(),
            }),
            _ => {
                self.by_uid.insert(uid.to_string(), entry);
                Ok(())
            }
        }
    }

    pub fn register_logged(&mut self, page: &ContentObject, cx: &BuildContext) {
        if let Err(err) = self.register(page) {
            error!("{err}");
            cx.record_error();
        }
    }

    pub fn find_by_path(&self, path: &str) -> Option<&IndexedPage> {
        self.by_path.get(path)
    }

    pub fn find_by_uid(&self, uid: &str) -> Option<&IndexedPage> {
        self.by_uid.get(uid)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Link form of an entity URL: a trailing index file is folded away.
    fn link_url(&self, url: &str) -> String {
        match url.strip_suffix(self.index_file.as_str()) {
            Some(dir) if dir.ends_with('/') => dir.to_string(),
            _ => url.to_string(),
        }
    }

    /// Resolve an author-written link.
    ///
    /// `relative = true` returns a site-rooted path; otherwise the result is
    /// composed with the configured base URL and base path. Query strings and
    /// fragments are carried over.
    pub fn resolve_url(
        &self,
        from: Option<&ContentObject>,
        raw: &str,
        relative: bool,
    ) -> Result<String, UrlError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(UrlError::Malformed(raw.to_string()));
        }
        let (target, suffix) = match raw.find(['?', '#']) {
            Some(pos) => raw.split_at(pos),
            None => (raw, ""),
        };

        let resolved = if let Some(uid) = target.strip_prefix(XREF_SCHEME) {
            let page = self
                .find_by_uid(uid)
                .ok_or_else(|| UrlError::UnknownUid(uid.to_string()))?;
            self.link_url(&page.url)
        } else if target.contains(':') || target.starts_with("//") {
            return Ok(raw.to_string());
        } else {
            let absolute = if target.starts_with('/') {
                target.to_string()
            } else {
                let from = from.ok_or_else(|| UrlError::MissingOrigin(raw.to_string()))?;
                format!("{}{}", url::parent_dir(&from.url), target)
            };
            let normalized = url::normalize(&absolute)?;
            match self.find_by_path(&normalized) {
                Some(page) => self.link_url(&page.url),
                None => normalized,
            }
        };

        let link = format!("{resolved}{suffix}");
        if relative {
            Ok(link)
        } else {
            Ok(url::join_base(&self.base_url, &self.base_path, &link))
        }
    }
}
