//! Rendering collaborator contract.
//!
//! The core does not evaluate templates itself. During the single-threaded
//! second loader pass every page body is handed to a [`Renderer`], together
//! with the page (whose `front_matter` and `locals` it may read and mutate)
//! and a [`RenderContext`] carrying site-wide state.
//!
//! Renderers are not assumed to be reentrant; the loader never calls one
//! from more than one thread at a time.

use crate::config::SiteConfig;
use crate::content::ContentObject;
use crate::context::BuildContext;
use std::fmt;
use thiserror::Error;

/// Location in a source file, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    pub path: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{span}: {message}")]
pub struct RenderError {
    pub span: SourceSpan,
    pub message: String,
}

impl RenderError {
    pub fn new(span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// Site-wide objects visible to the renderer.
pub struct RenderContext<'a> {
    pub config: &'a SiteConfig,
    pub build: &'a BuildContext,
}

pub trait Renderer: Send + Sync {
    /// Render `body` for `page`, returning the output text.
    fn render(
        &self,
        page: &mut ContentObject,
        body: &str,
        cx: &RenderContext<'_>,
    ) -> Result<String, RenderError>;
}

/// Returns the body unchanged.
#[derive(Debug, Default)]
pub struct PassthroughRenderer;

impl Renderer for PassthroughRenderer {
    fn render(
        &self,
        _page: &mut ContentObject,
        body: &str,
        _cx: &RenderContext<'_>,
    ) -> Result<String, RenderError> {
        Ok(body.to_string())
    }
}

/// Translate a byte offset into a 1-based line/column span.
pub fn span_at(path: &str, text: &str, offset: usize) -> SourceSpan {
    let offset = offset.min(text.len());
    let before = text.get(..offset).unwrap_or(text);
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(pos) => before[pos + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    SourceSpan {
        path: path.to_string(),
        line,
        column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::page_object;

    #[test]
    fn passthrough_returns_body() {
        let config = SiteConfig::default();
        let build = BuildContext::new();
        let cx = RenderContext {
            config: &config,
            build: &build,
        };
        let mut page = page_object("/a.md");
        let out = PassthroughRenderer.render(&mut page, "hello", &cx).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn span_at_counts_lines_and_columns() {
        let text = "line one\nline two\nthird";
        assert_eq!(span_at("/a.md", text, 0).line, 1);
        let span = span_at("/a.md", text, 14);
        assert_eq!((span.line, span.column), (2, 6));
        assert_eq!(span.to_string(), "/a.md:2:6");
    }

    #[test]
    fn render_error_display_includes_span() {
        let err = RenderError::new(span_at("/a.md", "x", 0), "unknown variable");
        assert_eq!(err.to_string(), "/a.md:1:1: unknown variable");
    }
}
