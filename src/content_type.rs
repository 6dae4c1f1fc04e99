//! Semantic content types and the extension registry.
//!
//! Every entity carries a [`ContentType`] derived from its file extension.
//! The type is mutable: a processor that converts Markdown to HTML retypes
//! the entity so that later processors (minifiers, layout wrappers) see HTML.
//!
//! A subset of types is *HTML-like*. Those types participate in URL folding:
//! `/docs/index.md` publishes at `/docs/`, and `/blog/post.md` with front
//! matter publishes at `/blog/post/`.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Semantic type of a content entity (`html`, `markdown`, `css`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentType(Cow<'static, str>);

impl ContentType {
    /// Transient state before classification.
    pub const EMPTY: ContentType = ContentType(Cow::Borrowed(""));
    pub const HTML: ContentType = ContentType(Cow::Borrowed("html"));
    pub const MARKDOWN: ContentType = ContentType(Cow::Borrowed("markdown"));
    pub const CSS: ContentType = ContentType(Cow::Borrowed("css"));
    pub const SCSS: ContentType = ContentType(Cow::Borrowed("scss"));
    pub const JAVASCRIPT: ContentType = ContentType(Cow::Borrowed("js"));
    pub const JSON: ContentType = ContentType(Cow::Borrowed("json"));
    pub const XML: ContentType = ContentType(Cow::Borrowed("xml"));
    pub const YAML: ContentType = ContentType(Cow::Borrowed("yaml"));
    pub const TOML: ContentType = ContentType(Cow::Borrowed("toml"));
    pub const TEXT: ContentType = ContentType(Cow::Borrowed("text"));
    /// Files without an extension.
    pub const BINARY: ContentType = ContentType(Cow::Borrowed("binary"));

    /// Build a custom type. Names are case-insensitive.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into().to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps file extensions to content types and tracks which types are HTML-like.
#[derive(Debug, Clone)]
pub struct ContentTypeRegistry {
    extensions: HashMap<String, ContentType>,
    html_like: HashSet<ContentType>,
}

impl Default for ContentTypeRegistry {
    fn default() -> Self {
        let mut registry = Self {
            extensions: HashMap::new(),
            html_like: HashSet::new(),
        };
        for (ext, ty) in [
            ("html", ContentType::HTML),
            ("htm", ContentType::HTML),
            ("md", ContentType::MARKDOWN),
            ("markdown", ContentType::MARKDOWN),
            ("css", ContentType::CSS),
            ("scss", ContentType::SCSS),
            ("sass", ContentType::SCSS),
            ("js", ContentType::JAVASCRIPT),
            ("mjs", ContentType::JAVASCRIPT),
            ("json", ContentType::JSON),
            ("xml", ContentType::XML),
            ("yml", ContentType::YAML),
            ("yaml", ContentType::YAML),
            ("toml", ContentType::TOML),
            ("txt", ContentType::TEXT),
        ] {
            registry.register(ext, ty);
        }
        registry.register_html_like(ContentType::HTML);
        registry.register_html_like(ContentType::MARKDOWN);
        registry
    }
}

impl ContentTypeRegistry {
    /// Map an extension (with or without the leading dot) to a type.
    pub fn register(&mut self, extension: &str, content_type: ContentType) {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        self.extensions.insert(ext, content_type);
    }

    pub fn register_html_like(&mut self, content_type: ContentType) {
        self.html_like.insert(content_type);
    }

    pub fn is_html_like(&self, content_type: &ContentType) -> bool {
        self.html_like.contains(content_type)
    }

    /// Classify a path by its extension.
    ///
    /// Unregistered extensions become a type named after the extension
    /// (`logo.png` → `png`), so the result is never [`ContentType::EMPTY`].
    pub fn classify(&self, path: &str) -> ContentType {
        match crate::url::extension(path) {
            Some(ext) => self
                .extensions
                .get(&ext)
                .cloned()
                .unwrap_or_else(|| ContentType::new(ext)),
            None => ContentType::BINARY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_registered_extensions() {
        let registry = ContentTypeRegistry::default();
        assert_eq!(registry.classify("/blog/post.md"), ContentType::MARKDOWN);
        assert_eq!(registry.classify("/index.HTML"), ContentType::HTML);
        assert_eq!(registry.classify("/css/site.scss"), ContentType::SCSS);
    }

    #[test]
    fn unknown_extension_becomes_its_own_type() {
        let registry = ContentTypeRegistry::default();
        assert_eq!(registry.classify("/img/logo.PNG"), ContentType::new("png"));
        assert_eq!(registry.classify("/CNAME"), ContentType::BINARY);
    }

    #[test]
    fn html_like_types() {
        let registry = ContentTypeRegistry::default();
        assert!(registry.is_html_like(&ContentType::HTML));
        assert!(registry.is_html_like(&ContentType::MARKDOWN));
        assert!(!registry.is_html_like(&ContentType::CSS));
    }

    #[test]
    fn custom_registration() {
        let mut registry = ContentTypeRegistry::default();
        let adoc = ContentType::new("AsciiDoc");
        registry.register(".adoc", adoc.clone());
        registry.register_html_like(adoc.clone());
        assert_eq!(registry.classify("/guide.adoc"), adoc);
        assert!(registry.is_html_like(&ContentType::new("asciidoc")));
    }
}
