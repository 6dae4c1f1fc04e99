//! Processor contracts and the per-entity pipeline engine.
//!
//! Two kinds of processors plug into a build:
//!
//! - [`ContentProcessor`]s act on one entity at a time. Each one inspects the
//!   entity and answers [`ProcessingResult::None`] (not mine),
//!   [`ProcessingResult::Continue`] (acted, others may follow) or
//!   [`ProcessingResult::Break`] (acted, nobody else touches it this stage).
//! - [`SiteProcessor`]s act on the whole site once per [`SiteStage`]. They
//!   may add dynamic pages or rewrite collections.
//!
//! ## Pipeline algorithm
//!
//! ```text
//! pending = [p0, p1, p2, p3]        (p3 registered last = highest priority)
//!
//! scan p3 → None, p2 → Continue     pending = [p0, p1, p3]   restart
//! scan p3 → Continue                pending = [p0, p1]       restart
//! scan p1 → None, p0 → None         no taker                 done
//! ```
//!
//! A processor that acted is removed from the pending list, so each one fires
//! at most once per entity per stage. Retyping an entity (Markdown becomes
//! HTML) lets a processor that passed earlier claim it on the rescan, without
//! ever looping.

use crate::config::SiteConfig;
use crate::content::ContentObject;
use crate::content_type::ContentTypeRegistry;
use crate::context::BuildContext;
use crate::index::PageIndex;
use crate::render::RenderError;
use crate::site::SiteContent;
use crate::stats::ProcessorStats;
use std::fmt;
use std::io;
use std::time::Instant;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingResult {
    None,
    Continue,
    Break,
}

/// Which pass over the content a content processor is being asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentStage {
    /// Single-threaded pass right after loading, once the index exists.
    AfterLoading,
    /// Main processing pass, followed by output writing.
    Running,
}

/// Site-wide build phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SiteStage {
    BeforeInitializing,
    BeforeLoading,
    AfterLoading,
    BeforeProcessing,
    AfterProcessing,
}

impl SiteStage {
    pub const ALL: [SiteStage; 5] = [
        SiteStage::BeforeInitializing,
        SiteStage::BeforeLoading,
        SiteStage::AfterLoading,
        SiteStage::BeforeProcessing,
        SiteStage::AfterProcessing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStage::BeforeInitializing => "before-initializing",
            SiteStage::BeforeLoading => "before-loading",
            SiteStage::AfterLoading => "after-loading",
            SiteStage::BeforeProcessing => "before-processing",
            SiteStage::AfterProcessing => "after-processing",
        }
    }
}

impl fmt::Display for SiteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("{0}")]
    Failed(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

/// What a content processor can see besides the entity itself.
pub struct ProcessContext<'a> {
    pub config: &'a SiteConfig,
    pub types: &'a ContentTypeRegistry,
    pub index: &'a PageIndex,
    pub build: &'a BuildContext,
}

/// What a site processor can see besides the site content.
pub struct StageContext<'a> {
    pub config: &'a SiteConfig,
    pub types: &'a ContentTypeRegistry,
    pub build: &'a BuildContext,
}

pub trait ContentProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn try_process(
        &self,
        page: &mut ContentObject,
        stage: ContentStage,
        cx: &ProcessContext<'_>,
    ) -> Result<ProcessingResult, ProcessorError>;
}

pub trait SiteProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(
        &self,
        stage: SiteStage,
        content: &mut SiteContent,
        cx: &StageContext<'_>,
    ) -> Result<(), ProcessorError>;
}

/// How one entity fared in one pipeline run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Processors that acted (returned `Continue` or `Break`, or failed).
    pub processed: usize,
    /// Stopped by a `Break` or a processor failure.
    pub broke: bool,
    /// A processor returned an error.
    pub failed: bool,
}

/// Run `processors` over one entity for one stage.
///
/// Processor errors are logged, recorded on the build context and end the
/// run as if the processor had returned `Break`.
pub fn run_pipeline<P>(
    processors: &[P],
    page: &mut ContentObject,
    stage: ContentStage,
    cx: &ProcessContext<'_>,
    stats: &ProcessorStats,
) -> PipelineOutcome
where
    P: AsRef<dyn ContentProcessor>,
{
    let mut pending: Vec<usize> = (0..processors.len()).collect();
    let mut outcome = PipelineOutcome::default();

    while !page.discard && !pending.is_empty() {
        let mut claimed = None;
        for slot in (0..pending.len()).rev() {
            let processor = processors[pending[slot]].as_ref();
            let started = Instant::now();
            let result = processor.try_process(page, stage, cx);
            let acted = !matches!(result, Ok(ProcessingResult::None));
            stats.record(processor.name(), started.elapsed(), acted);

            match result {
                Ok(ProcessingResult::None) => continue,
                Ok(result) => {
                    claimed = Some((slot, result));
                    break;
                }
                Err(err) => {
                    error!(
                        processor = processor.name(),
                        entity = %page.describe(),
                        "processor failed: {err}"
                    );
                    cx.build.record_error();
                    outcome.processed += 1;
                    outcome.broke = true;
                    outcome.failed = true;
                    return outcome;
                }
            }
        }

        let Some((slot, result)) = claimed else {
            break;
        };
        pending.remove(slot);
        outcome.processed += 1;
        if result == ProcessingResult::Break {
            outcome.broke = true;
            break;
        }
    }
    outcome
}
