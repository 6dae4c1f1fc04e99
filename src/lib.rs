//! # Siteforge
//!
//! An incremental static site build engine. A tree of source files (pages
//! with front matter, plus static assets) becomes a tree of output files,
//! and rebuilding an unchanged tree rewrites nothing.
//!
//! # Architecture: Staged Build
//!
//! One build runs a fixed sequence of stages. Site processors hook into the
//! named stages; content processors transform one entity at a time:
//!
//! ```text
//! before-initializing → before-loading
//!   → load      content/  →  pages + static files   (concurrent walk)
//!   → after-loading         index built, AfterLoading content pass
//!   → before-processing     dynamic pages added and indexed
//!   → process   layout-type groups in weight order → dist/
//!   → after-processing → stale cleanup → statistics
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`site`] | Orchestrator: runs the stages, owns the pool, writer and registries |
//! | [`loader`] | Breadth-first discovery, page/static classification, front matter parsing |
//! | [`processor`] | Processor traits, stage enums and the per-entity pipeline |
//! | [`content`] | The `ContentObject` entity: URL derivation, destination paths, ordering |
//! | [`index`] | Path and UID lookup tables, cross-reference URL resolution |
//! | [`writer`] | Output materialization, collision detection, stale output cleanup |
//! | [`cache`] | SHA-256 fingerprints of written outputs, optionally persisted as JSON |
//! | [`frontmatter`] | Pluggable front matter providers (YAML `---`, TOML `+++`) |
//! | [`render`] | Rendering collaborator contract and the pass-through renderer |
//! | [`markdown`] | Built-in Markdown → HTML content processor |
//! | [`content_type`] | Extension → content type registry |
//! | [`url`] | Virtual path helpers: placeholders, validation, slugs |
//! | [`value`] | Typed property bag for front matter and locals |
//! | [`context`] | Per-build error and warning counters |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`stats`] | Per-processor, per-stage and writer statistics |
//! | [`output`] | CLI output formatting of check listings and build reports |
//!
//! # Design Decisions
//!
//! ## Each Processor Acts Once Per Stage
//!
//! A processor may retype an entity (Markdown becomes HTML) so that another
//! processor now wants it. The pipeline keeps a pending list per entity,
//! rescans it from the highest priority after every hit and removes the
//! processor that acted. Loops are impossible: the number of hits is bounded
//! by the number of processors. See [`processor::run_pipeline`].
//!
//! ## Errors Are Counted, Not Thrown
//!
//! A broken page must not take the rest of the site down. Per-entity
//! failures are logged through `tracing` and counted in a
//! [`context::BuildContext`] passed to every stage. The orchestrator checks
//! the counter between phases and stops processing once it is non-zero.
//! Only a failing site processor aborts the build outright.
//!
//! ## Output Is Never Rewritten Without Cause
//!
//! Rendered content is fingerprinted; a destination whose fingerprint
//! matches the last write is skipped. Static files are copied only when the
//! source is newer. Everything the build claims is removed from the stale
//! set, and whatever remains is deleted at the end, but only after a clean
//! pass: an error anywhere leaves the previous output in place.
//!
//! ## Single Writer During Loading
//!
//! Files are read and classified on the worker pool, but results flow
//! through a channel to one aggregator on the calling thread, so the page
//! collections need no locks. Front matter evaluation and rendering then run
//! one page at a time on that thread, because a [`render::Renderer`] may keep
//! shared evaluation state.

pub mod cache;
pub mod config;
pub mod content;
pub mod content_type;
pub mod context;
pub mod frontmatter;
pub mod index;
pub mod loader;
pub mod markdown;
pub mod output;
pub mod processor;
pub mod render;
pub mod site;
pub mod stats;
pub mod url;
pub mod value;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
