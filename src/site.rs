//! Build orchestration.
//!
//! A [`Site`] owns everything one build needs (config, registries, renderer,
//! processors, output writer, thread pool) and runs the stages in a fixed
//! order:
//!
//! ```text
//! before-initializing → before-loading → load content
//!   → after-loading (index built, site processors, content processors)
//!   → before-processing (dynamic pages added and indexed)
//!   → process layout-type groups in weight order, writing each entity
//!   → after-processing → clean up stale outputs → finalize statistics
//! ```
//!
//! Two kinds of failure stop a build early:
//!
//! - A site processor error is fatal: it is logged and the rest of the build,
//!   stale cleanup included, is skipped. The report names the stage.
//! - Any recorded error (parse failure, URL collision, duplicate UID...) is
//!   noticed at the next checkpoint, after which no further processing runs.
//!
//! Stale outputs are only deleted by a build that recorded no errors, no
//! matter in which group the error happened, so a broken source file never
//! wipes the published site.
//!
//! The writer (and its fingerprint cache) lives as long as the `Site`, so
//! rebuilding through the same `Site` skips unchanged writes.

use crate::config::{self, ConfigError, SiteConfig};
use crate::content::{ContentObject, sort_canonical};
use crate::content_type::ContentTypeRegistry;
use crate::context::BuildContext;
use crate::frontmatter::FrontMatterRegistry;
use crate::index::PageIndex;
use crate::loader::{self, LoadError, Loader, PathFilter};
use crate::markdown::MarkdownProcessor;
use crate::processor::{
    ContentProcessor, ContentStage, ProcessContext, SiteProcessor, SiteStage, StageContext,
    run_pipeline,
};
use crate::render::{PassthroughRenderer, Renderer};
use crate::stats::{BuildStats, ProcessorStats};
use crate::writer::OutputWriter;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("cannot load content: {0}")]
    Load(#[from] LoadError),
}

/// The entity collections of one build.
#[derive(Debug, Default)]
pub struct SiteContent {
    pub pages: Vec<ContentObject>,
    pub static_files: Vec<ContentObject>,
    /// Pages synthesized by site processors.
    pub dynamic_pages: Vec<ContentObject>,
    pub index: PageIndex,
}

impl SiteContent {
    fn new(config: &SiteConfig) -> Self {
        Self {
            index: PageIndex::new(config),
            ..Self::default()
        }
    }

    /// Queue a synthesized page; it is initialized and indexed before
    /// processing starts.
    pub fn add_dynamic(&mut self, page: ContentObject) {
        self.dynamic_pages.push(page);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentObject> {
        self.pages
            .iter()
            .chain(&self.static_files)
            .chain(&self.dynamic_pages)
    }

    pub fn len(&self) -> usize {
        self.pages.len() + self.static_files.len() + self.dynamic_pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub has_errors: bool,
    pub error_count: usize,
    pub warning_count: usize,
    /// Stage whose site processor failed, if any.
    pub aborted_at: Option<SiteStage>,
    pub stats: BuildStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Page,
    Static,
    Dynamic,
}

struct Slot {
    origin: Origin,
    page: ContentObject,
}

enum Flow {
    /// Every group processed.
    Completed,
    /// Stopped at a has-errors checkpoint.
    Skipped,
    /// A site processor failed.
    Aborted(SiteStage),
}

pub struct Site {
    root: PathBuf,
    config: SiteConfig,
    types: ContentTypeRegistry,
    front_matter: FrontMatterRegistry,
    renderer: Box<dyn Renderer>,
    site_processors: Vec<Box<dyn SiteProcessor>>,
    content_processors: Vec<Box<dyn ContentProcessor>>,
    filter: PathFilter,
    writer: OutputWriter,
    pool: rayon::ThreadPool,
    content: SiteContent,
}

impl Site {
    /// Open the site at `root`, reading `config.toml` from it.
    pub fn open(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Result<Self, BuildError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        Self::new(root, output_dir, config)
    }

    /// Site with the stock registries, the pass-through renderer and the
    /// Markdown processor.
    pub fn new(
        root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        config: SiteConfig,
    ) -> Result<Self, BuildError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config::effective_threads(&config.processing))
            .build()?;
        Ok(Self {
            root: root.into(),
            filter: loader::default_filter(&config.content),
            writer: OutputWriter::new(output_dir, config.cache.persist),
            content: SiteContent::new(&config),
            types: ContentTypeRegistry::default(),
            front_matter: FrontMatterRegistry::default(),
            renderer: Box::new(PassthroughRenderer),
            site_processors: Vec::new(),
            content_processors: vec![Box::new(MarkdownProcessor)],
            pool,
            config,
        })
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Register a content processor. Later registrations are consulted first.
    pub fn add_content_processor(&mut self, processor: impl ContentProcessor + 'static) -> &mut Self {
        self.content_processors.push(Box::new(processor));
        self
    }

    pub fn add_site_processor(&mut self, processor: impl SiteProcessor + 'static) -> &mut Self {
        self.site_processors.push(Box::new(processor));
        self
    }

    pub fn types_mut(&mut self) -> &mut ContentTypeRegistry {
        &mut self.types
    }

    pub fn front_matter_mut(&mut self) -> &mut FrontMatterRegistry {
        &mut self.front_matter
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Entities of the last build, in canonical order.
    pub fn content(&self) -> &SiteContent {
        &self.content
    }

    pub fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    /// Run a full build.
    ///
    /// Returns `Err` only when the content root cannot be read. Everything
    /// else is reported through the [`BuildReport`].
    pub fn build(&mut self) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let cx = BuildContext::new();
        let mut stats = BuildStats::default();
        let site_stats = ProcessorStats::default();
        let content_stats = ProcessorStats::default();

        self.content = SiteContent::new(&self.config);
        self.writer.begin();

        let flow = self.run(&cx, &mut stats, &site_stats, &content_stats)?;
        let aborted_at = match flow {
            Flow::Completed if !cx.has_errors() => {
                self.writer.cleanup();
                None
            }
            Flow::Completed | Flow::Skipped => {
                debug!("errors recorded, skipping stale output cleanup");
                None
            }
            Flow::Aborted(stage) => Some(stage),
        };
        self.writer.finish();

        stats.pages = self.content.pages.len();
        stats.static_files = self.content.static_files.len();
        stats.dynamic_pages = self.content.dynamic_pages.len();
        stats.processors = content_stats.snapshot();
        stats.site_processors = site_stats.snapshot();
        stats.writes = self.writer.stats();
        stats.elapsed = started.elapsed();

        let report = BuildReport {
            has_errors: cx.has_errors(),
            error_count: cx.error_count(),
            warning_count: cx.warning_count(),
            aborted_at,
            stats,
        };
        info!(
            pages = report.stats.pages,
            static_files = report.stats.static_files,
            errors = report.error_count,
            elapsed_ms = report.stats.elapsed.as_millis() as u64,
            "build finished"
        );
        Ok(report)
    }

    /// Load and index the content without processing or writing anything.
    pub fn check(&mut self) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let cx = BuildContext::new();
        let mut stats = BuildStats::default();

        self.content = SiteContent::new(&self.config);
        self.load(&cx, &mut stats)?;

        stats.pages = self.content.pages.len();
        stats.static_files = self.content.static_files.len();
        stats.elapsed = started.elapsed();
        Ok(BuildReport {
            has_errors: cx.has_errors(),
            error_count: cx.error_count(),
            warning_count: cx.warning_count(),
            aborted_at: None,
            stats,
        })
    }

    fn run(
        &mut self,
        cx: &BuildContext,
        stats: &mut BuildStats,
        site_stats: &ProcessorStats,
        content_stats: &ProcessorStats,
    ) -> Result<Flow, BuildError> {
        for stage in [SiteStage::BeforeInitializing, SiteStage::BeforeLoading] {
            if !self.run_site_stage(stage, cx, stats, site_stats) {
                return Ok(Flow::Aborted(stage));
            }
        }

        self.load(cx, stats)?;
        if !self.run_site_stage(SiteStage::AfterLoading, cx, stats, site_stats) {
            return Ok(Flow::Aborted(SiteStage::AfterLoading));
        }
        self.run_after_loading(cx, stats, content_stats);
        if cx.has_errors() {
            return Ok(Flow::Skipped);
        }

        if !self.run_site_stage(SiteStage::BeforeProcessing, cx, stats, site_stats) {
            return Ok(Flow::Aborted(SiteStage::BeforeProcessing));
        }
        self.register_dynamic_pages(cx);
        if cx.has_errors() {
            return Ok(Flow::Skipped);
        }

        let processing = Instant::now();
        let completed = self.process_all(cx, stats, content_stats);
        stats.processing = processing.elapsed();

        if !self.run_site_stage(SiteStage::AfterProcessing, cx, stats, site_stats) {
            return Ok(Flow::Aborted(SiteStage::AfterProcessing));
        }
        Ok(if completed { Flow::Completed } else { Flow::Skipped })
    }

    /// Load content and build the index.
    fn load(&mut self, cx: &BuildContext, stats: &mut BuildStats) -> Result<(), BuildError> {
        let started = Instant::now();
        let loaded = Loader {
            config: &self.config,
            types: &self.types,
            front_matter: &self.front_matter,
            renderer: self.renderer.as_ref(),
            filter: &self.filter,
            pool: &self.pool,
        }
        .load(&self.root, cx)?;

        stats.discarded += loaded.discarded;
        self.content.pages = loaded.pages;
        self.content.static_files = loaded.static_files;
        self.content.index = PageIndex::build(
            &self.config,
            self.content.pages.iter().chain(&self.content.static_files),
            cx,
        );
        stats.loading = started.elapsed();
        info!(
            pages = self.content.pages.len(),
            static_files = self.content.static_files.len(),
            "content loaded"
        );
        Ok(())
    }

    /// Run every site processor for `stage`. Returns `false` if one failed.
    fn run_site_stage(
        &mut self,
        stage: SiteStage,
        cx: &BuildContext,
        stats: &mut BuildStats,
        site_stats: &ProcessorStats,
    ) -> bool {
        let started = Instant::now();
        let stage_cx = StageContext {
            config: &self.config,
            types: &self.types,
            build: cx,
        };
        for processor in &self.site_processors {
            let timer = Instant::now();
            let result = processor.process(stage, &mut self.content, &stage_cx);
            site_stats.record(processor.name(), timer.elapsed(), true);
            if let Err(err) = result {
                error!(stage = %stage, processor = processor.name(), "stage failed, aborting build: {err}");
                cx.record_error();
                stats.stages.push((stage, started.elapsed()));
                return false;
            }
        }
        stats.stages.push((stage, started.elapsed()));
        true
    }

    /// Single-threaded content pass right after loading.
    fn run_after_loading(
        &mut self,
        cx: &BuildContext,
        stats: &mut BuildStats,
        content_stats: &ProcessorStats,
    ) {
        let pcx = ProcessContext {
            config: &self.config,
            types: &self.types,
            index: &self.content.index,
            build: cx,
        };
        let mut collections = [
            std::mem::take(&mut self.content.pages),
            std::mem::take(&mut self.content.static_files),
        ];
        for collection in &mut collections {
            for page in collection.iter_mut() {
                run_pipeline(
                    &self.content_processors,
                    page,
                    ContentStage::AfterLoading,
                    &pcx,
                    content_stats,
                );
            }
            let before = collection.len();
            collection.retain(|page| !page.discard);
            stats.discarded += before - collection.len();
        }
        let [pages, static_files] = collections;
        self.content.pages = pages;
        self.content.static_files = static_files;
    }

    fn register_dynamic_pages(&mut self, cx: &BuildContext) {
        for page in &mut self.content.dynamic_pages {
            page.initialize(&self.config.urls, &self.types, cx);
            self.content.index.register_logged(page, cx);
        }
        if !self.content.dynamic_pages.is_empty() {
            debug!(count = self.content.dynamic_pages.len(), "registered dynamic pages");
        }
    }

    /// Process and write every entity, group by group. Returns `false` when
    /// a has-errors checkpoint stopped processing before the last group.
    fn process_all(
        &mut self,
        cx: &BuildContext,
        stats: &mut BuildStats,
        content_stats: &ProcessorStats,
    ) -> bool {
        let mut groups: BTreeMap<(i32, String), Vec<Slot>> = BTreeMap::new();
        let collections = [
            (Origin::Page, std::mem::take(&mut self.content.pages)),
            (Origin::Static, std::mem::take(&mut self.content.static_files)),
            (Origin::Dynamic, std::mem::take(&mut self.content.dynamic_pages)),
        ];
        for (origin, collection) in collections {
            for page in collection {
                let key = (
                    self.config.layout_weight(&page.layout_type),
                    page.layout_type.clone(),
                );
                groups.entry(key).or_default().push(Slot { origin, page });
            }
        }

        let mut completed = true;
        {
            let pcx = ProcessContext {
                config: &self.config,
                types: &self.types,
                index: &self.content.index,
                build: cx,
            };
            for ((weight, layout_type), group) in groups.iter_mut() {
                if cx.has_errors() {
                    debug!(layout_type = %layout_type, "errors recorded, skipping group");
                    completed = false;
                    continue;
                }
                debug!(layout_type = %layout_type, weight, entities = group.len(), "processing group");
                let process = |slot: &mut Slot| self.process_entity(&mut slot.page, &pcx, content_stats);
                if self.config.processing.parallel_content {
                    self.pool.install(|| group.par_iter_mut().for_each(process));
                } else {
                    group.iter_mut().for_each(process);
                }
            }
        }

        for slot in groups.into_values().flatten() {
            if slot.page.discard {
                stats.discarded += 1;
                continue;
            }
            match slot.origin {
                Origin::Page => self.content.pages.push(slot.page),
                Origin::Static => self.content.static_files.push(slot.page),
                Origin::Dynamic => self.content.dynamic_pages.push(slot.page),
            }
        }
        sort_canonical(&mut self.content.pages);
        sort_canonical(&mut self.content.static_files);
        sort_canonical(&mut self.content.dynamic_pages);
        completed
    }

    /// Run the content pipeline over one entity and write it.
    fn process_entity(&self, page: &mut ContentObject, pcx: &ProcessContext<'_>, stats: &ProcessorStats) {
        let outcome = run_pipeline(&self.content_processors, page, ContentStage::Running, pcx, stats);
        if page.discard || outcome.failed {
            return;
        }
        if page.content_type.is_empty() {
            error!(entity = %page.describe(), "entity reached output without a content type");
            pcx.build.record_error();
            return;
        }

        let destination = match page.destination_path(&self.config.urls, pcx.build) {
            Ok(destination) => destination,
            Err(err) => {
                error!(entity = %page.describe(), "{err}");
                pcx.build.record_error();
                return;
            }
        };
        match self.writer.write(page, &destination) {
            Ok(outcome) => debug!(destination = %destination, ?outcome, "output"),
            Err(err) => {
                error!(entity = %page.describe(), "{err}");
                pcx.build.record_error();
            }
        }
    }
}
