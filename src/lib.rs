//! `renderpipe` is a template-render stage for build pipelines. It renders
//! in-memory file objects through [`minijinja`](https://docs.rs/minijinja)
//! and emits them back into the pipeline with an adjusted file extension,
//! wrapping the engine with configuration normalization, layered per-file
//! context assembly, and on-disk locals discovery.
//!
//! ## Processing Pipeline
//!
//! ```text
//! PipelineFile (path + contents + data)
//!   → Options normalizer (StageOptions → StageConfig + configured engine)
//!   → Locals resolver (sibling data files merged into the render context)
//!   → Stage driver (render via minijinja, rewrite extension, push downstream)
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Options normalization: the user options record, the
//!   derived stage configuration, and `renderpipe.toml` discovery.
//! - [`locals`] — Locals discovery: pattern substitution, sibling-file
//!   globbing, and suffix-selected loading of JSON, TOML, YAML, KDL, and
//!   INI records.
//!
//! ## Key Types
//!
//! - [`StageOptions`] — The single user-facing options record.
//! - [`StageConfig`] — The derived stage configuration, immutable after
//!   construction.
//! - [`RenderStage`] — The pipeline-mode transform.
//! - [`DirectRenderer`] — The direct-render function sharing the same
//!   configured environment.
//! - [`PipelineFile`] — The file object traveling through the pipeline.
//! - [`Engine`] — The configured template engine handle.
//!
//! ## Context Layering
//!
//! Every render starts from a clone of the base context and overlays, in
//! order: the functions collected from the options, the file's attached
//! `data`, and any locals discovered next to the file on disk. Values under
//! `data` in the options are engine-level globals instead, visible inside
//! every template regardless of the per-file context.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use renderpipe::StageOptions;
//! use renderpipe::pipeline;
//! use renderpipe::PipelineFile;
//!
//! let options = StageOptions {
//! 	src: Some("templates".into()),
//! 	..Default::default()
//! };
//! let stage = pipeline(&options).unwrap();
//!
//! let file = PipelineFile::buffer("templates/index.njk", "Hello {{ name }}");
//! let batch = stage.run([file]);
//! assert!(batch.is_ok());
//! ```

pub use config::*;
pub use engine::*;
pub use error::*;
pub use file::*;
pub use locals::*;
pub use stage::*;

pub mod config;
mod engine;
mod error;
mod file;
pub mod locals;
mod stage;

#[cfg(test)]
mod __fixtures;
