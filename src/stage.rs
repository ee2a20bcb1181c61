use crate::config::ExtensionPolicy;
use crate::config::StageConfig;
use crate::config::StageOptions;
use crate::config::configure;
use crate::error::RenderPipeError;
use crate::error::RenderPipeResult;
use crate::file::DataMap;
use crate::file::FileContents;
use crate::file::PipelineFile;
use crate::file::replace_extension;
use crate::locals::assign_locals;

/// Downstream end of the pipeline as seen by the render stage.
///
/// `push` hands a finished file to the next stage; `error` surfaces a
/// failure event without terminating the pipeline. The `Result` returned by
/// [`RenderStage::transform`] plays the role of the per-file completion
/// callback.
pub trait FileSink {
	/// Receive a transformed file.
	fn push(&mut self, file: PipelineFile);
	/// Receive a failure event for the current file.
	fn error(&mut self, error: &RenderPipeError);
}

/// Result of driving a batch of files through a stage.
///
/// Per-file failures never halt the batch; every file is processed
/// independently and failures are collected here.
#[derive(Debug, Default)]
pub struct BatchResult {
	/// Files pushed downstream, in input order.
	pub files: Vec<PipelineFile>,
	/// Per-file failures, in input order.
	pub errors: Vec<RenderPipeError>,
}

impl BatchResult {
	/// Returns `true` when every file rendered successfully.
	pub fn is_ok(&self) -> bool {
		self.errors.is_empty()
	}
}

/// A pipeline stage rendering each inbound file through the configured
/// engine.
///
/// The stage is stateless across files: every render clones the base
/// context and keeps all other state local, so the same stage can process
/// any number of files against the shared engine handle.
#[derive(Clone, Debug)]
pub struct RenderStage {
	/// The stage configuration, shared read-only across renders.
	pub config: StageConfig,
}

impl RenderStage {
	/// Transform a single file.
	///
	/// Null-contents files pass through unchanged. Streamed contents fail
	/// with [`RenderPipeError::UnsupportedInput`]. Otherwise the file's
	/// contents are replaced by the rendered output, its extension is
	/// rewritten unless the stage inherits extensions, and the file is
	/// pushed into `sink`. On failure nothing is pushed: the error is
	/// emitted on the sink when the stage is configured to surface errors,
	/// and returned either way.
	pub fn transform(
		&self,
		mut file: PipelineFile,
		sink: &mut dyn FileSink,
	) -> RenderPipeResult<()> {
		if file.is_null() {
			sink.push(file);
			return Ok(());
		}
		if file.is_stream() {
			let error = RenderPipeError::UnsupportedInput {
				path: file.path.display().to_string(),
			};
			return self.fail(sink, error);
		}

		let mut context = self.config.context.clone();
		if let Some(data) = &file.data {
			context.overlay(data);
		}
		if self.config.locals.is_some() {
			assign_locals(&mut context, &self.config, &file);
		}

		if self.config.verbose {
			tracing::info!(path = %file.path.display(), "rendering template");
		} else {
			tracing::debug!(path = %file.path.display(), "rendering template");
		}

		let rendered = if self.config.render_string {
			let source = file.contents_text().into_owned();
			let origin = file.path.display().to_string();
			self.config.env.render_str(&source, &origin, &context)
		} else {
			self.config.env.render_path(&file.path, &context)
		};

		match rendered {
			Ok(output) => {
				file.contents = FileContents::Buffer(output.into_bytes());
				if let ExtensionPolicy::Replace(extension) = &self.config.extension {
					file.path = replace_extension(&file.path, extension);
				}
				sink.push(file);
				Ok(())
			}
			Err(error) => self.fail(sink, error),
		}
	}

	/// Drive a whole batch through the stage, collecting outputs and
	/// per-file failures.
	pub fn run<I>(&self, files: I) -> BatchResult
	where
		I: IntoIterator<Item = PipelineFile>,
	{
		let mut collector = PushCollector::default();
		let mut errors = Vec::new();
		for file in files {
			if let Err(error) = self.transform(file, &mut collector) {
				errors.push(error);
			}
		}

		BatchResult {
			files: collector.files,
			errors,
		}
	}

	fn fail(&self, sink: &mut dyn FileSink, error: RenderPipeError) -> RenderPipeResult<()> {
		if self.config.errors {
			sink.error(&error);
		}
		Err(error)
	}
}

/// Sink that collects pushed files and ignores emitted events. Emitted
/// errors reach [`BatchResult::errors`] through the transform result
/// instead, so recording them here would double-count.
#[derive(Debug, Default)]
struct PushCollector {
	files: Vec<PipelineFile>,
}

impl FileSink for PushCollector {
	fn push(&mut self, file: PipelineFile) {
		self.files.push(file);
	}

	fn error(&mut self, _error: &RenderPipeError) {}
}

/// A caller-invoked rendering function sharing the stage's configured
/// environment. Intended for interactive or one-off rendering: no locals
/// discovery, no path manipulation, no extension rewrite.
#[derive(Clone, Debug)]
pub struct DirectRenderer {
	/// The stage configuration, shared read-only across renders.
	pub config: StageConfig,
}

impl DirectRenderer {
	/// Render a template string against the base context overlaid with
	/// `data`.
	pub fn render(&self, contents: &str, data: Option<&DataMap>) -> RenderPipeResult<String> {
		let mut context = self.config.context.clone();
		if let Some(data) = data {
			context.overlay(data);
		}
		self.config.env.render_str(contents, "<string>", &context)
	}
}

/// Either factory product, for callers driving the mode through options.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Factory {
	/// A pipeline stage ([`StageOptions::piping`] true).
	Stage(RenderStage),
	/// A direct-render function ([`StageOptions::piping`] false).
	Renderer(DirectRenderer),
}

/// Build a pipeline stage from user options.
pub fn pipeline(options: &StageOptions) -> RenderPipeResult<RenderStage> {
	Ok(RenderStage {
		config: configure(options)?,
	})
}

/// Build a direct-render function from user options.
pub fn renderer(options: &StageOptions) -> RenderPipeResult<DirectRenderer> {
	Ok(DirectRenderer {
		config: configure(options)?,
	})
}

/// Compatibility entry point selecting the factory through
/// [`StageOptions::piping`]. Prefer calling [`pipeline`] or [`renderer`]
/// directly.
pub fn create(options: &StageOptions) -> RenderPipeResult<Factory> {
	let config = configure(options)?;
	Ok(if config.piping {
		Factory::Stage(RenderStage { config })
	} else {
		Factory::Renderer(DirectRenderer { config })
	})
}
