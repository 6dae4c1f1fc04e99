//! Markdown to HTML content processor.
//!
//! Converts the rendered body of every Markdown page with `pulldown-cmark`
//! and retypes the page to HTML, so processors that only want HTML pick it up
//! on the next pipeline scan. When the page has no summary yet, the first
//! paragraph becomes one.

use crate::content::ContentObject;
use crate::content_type::ContentType;
use crate::processor::{
    ContentProcessor, ContentStage, ProcessContext, ProcessingResult, ProcessorError,
};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html as md_html};

#[derive(Debug, Default)]
pub struct MarkdownProcessor;

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

/// Convert Markdown to HTML, returning the document and its first paragraph.
pub fn to_html(markdown: &str) -> (String, Option<String>) {
    let events: Vec<Event<'_>> = Parser::new_ext(markdown, options()).collect();

    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    md_html::push_html(&mut html, events.iter().cloned());

    let start = events
        .iter()
        .position(|e| matches!(e, Event::Start(Tag::Paragraph)));
    let summary = start.and_then(|start| {
        let len = events[start..]
            .iter()
            .position(|e| matches!(e, Event::End(TagEnd::Paragraph)))?;
        let mut out = String::new();
        md_html::push_html(&mut out, events[start..=start + len].iter().cloned());
        Some(out.trim_end().to_string())
    });

    (html, summary)
}

impl ContentProcessor for MarkdownProcessor {
    fn name(&self) -> &str {
        "markdown"
    }

    fn try_process(
        &self,
        page: &mut ContentObject,
        stage: ContentStage,
        cx: &ProcessContext<'_>,
    ) -> Result<ProcessingResult, ProcessorError> {
        if stage != ContentStage::Running || page.content_type != ContentType::MARKDOWN {
            return Ok(ProcessingResult::None);
        }
        let Some(body) = page.content.as_deref() else {
            return Ok(ProcessingResult::None);
        };

        let (html, summary) = to_html(body);
        page.content = Some(html);
        if page.summary.is_none() {
            page.summary = summary;
        }
        page.change_content_type(ContentType::HTML, &cx.config.urls);
        Ok(ProcessingResult::Continue)
    }
}
