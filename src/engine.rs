use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use minijinja::value::Rest;

use crate::config::Context;
use crate::config::EngineOptions;
use crate::error::RenderPipeError;
use crate::error::RenderPipeResult;

/// A template filter registered on the engine by name.
///
/// The first argument is the value being filtered, the rest are the filter's
/// call arguments.
pub type FilterFn = Arc<
	dyn Fn(minijinja::Value, Vec<minijinja::Value>) -> Result<minijinja::Value, minijinja::Error>
		+ Send
		+ Sync,
>;

/// A callable exposed to templates through the base render context.
pub type ContextFn = Arc<
	dyn Fn(Vec<minijinja::Value>) -> Result<minijinja::Value, minijinja::Error> + Send + Sync,
>;

/// An engine extension installed during configuration.
///
/// An extension receives the environment once, after all other engine
/// options are applied, and may register whatever it needs: globals, extra
/// filters, tests, or templates.
pub trait EngineExtension: Send + Sync {
	/// Install the extension into the environment under `name`.
	fn register(&self, name: &str, env: &mut minijinja::Environment<'static>);
}

/// The configured template engine.
///
/// Wraps a [`minijinja::Environment`] whose loader is rooted at the stage's
/// source directory, so template inheritance and includes resolve relative
/// to that root in both render modes.
#[derive(Clone, Debug)]
pub struct Engine {
	env: minijinja::Environment<'static>,
	root: Option<PathBuf>,
}

impl Engine {
	/// Build an environment from the residual engine options.
	///
	/// Trailing newlines are kept by default so that a template without
	/// directives renders byte-identical to its source.
	pub fn configure(src: Option<&Path>, options: &EngineOptions) -> RenderPipeResult<Self> {
		let mut env = minijinja::Environment::new();
		let root = src.map(Path::to_path_buf);
		let loader_root = root.clone().unwrap_or_else(|| PathBuf::from("."));
		env.set_loader(minijinja::path_loader(loader_root));
		env.set_keep_trailing_newline(options.keep_trailing_newline.unwrap_or(true));

		if let Some(trim) = options.trim_blocks {
			env.set_trim_blocks(trim);
		}
		if let Some(lstrip) = options.lstrip_blocks {
			env.set_lstrip_blocks(lstrip);
		}
		match options.autoescape {
			Some(true) => env.set_auto_escape_callback(|_| minijinja::AutoEscape::Html),
			Some(false) => env.set_auto_escape_callback(|_| minijinja::AutoEscape::None),
			// Default policy: escape based on the template name's extension.
			None => {}
		}
		if options.throw_on_undefined.unwrap_or(false) {
			env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
		} else {
			// Undefined lookups chain and render as empty, like the template
			// dialects this stage is fed from.
			env.set_undefined_behavior(minijinja::UndefinedBehavior::Chainable);
		}
		if let Some(syntax) = build_syntax(options)? {
			env.set_syntax(syntax);
		}
		if options.watch.unwrap_or(false) {
			tracing::warn!("template watching is not supported, ignoring `watch`");
		}

		Ok(Self { env, root })
	}

	/// Register an engine-level global, visible inside every template
	/// regardless of the per-file context.
	pub fn add_global(&mut self, name: &str, value: &serde_json::Value) {
		self.env
			.add_global(name.to_string(), minijinja::Value::from_serialize(value));
	}

	/// Register a named filter.
	pub fn add_filter(&mut self, name: &str, filter: FilterFn) {
		self.env.add_filter(
			name.to_string(),
			move |value: minijinja::Value, args: Rest<minijinja::Value>| filter(value, args.0),
		);
	}

	/// Install an extension.
	pub fn add_extension(&mut self, name: &str, extension: &dyn EngineExtension) {
		extension.register(name, &mut self.env);
	}

	/// Render the template at `path` through the loader.
	pub fn render_path(&self, path: &Path, context: &Context) -> RenderPipeResult<String> {
		let name = self.template_name(path);
		let template = self
			.env
			.get_template(&name)
			.map_err(|error| render_error(&name, &error))?;
		template
			.render(context.to_value())
			.map_err(|error| render_error(&name, &error))
	}

	/// Render an in-memory template source. Includes and inheritance still
	/// resolve through the loader. `origin` names the source in errors.
	pub fn render_str(
		&self,
		source: &str,
		origin: &str,
		context: &Context,
	) -> RenderPipeResult<String> {
		self.env
			.render_str(source, context.to_value())
			.map_err(|error| render_error(origin, &error))
	}

	/// The loader-relative template name for a file path. Paths outside the
	/// source root pass through unchanged.
	pub fn template_name(&self, path: &Path) -> String {
		let relative = self
			.root
			.as_deref()
			.and_then(|root| path.strip_prefix(root).ok())
			.unwrap_or(path);
		relative.to_string_lossy().replace('\\', "/")
	}
}

/// Wrap a context callable as a template value.
pub(crate) fn function_value(function: ContextFn) -> minijinja::Value {
	minijinja::Value::from_function(move |args: Rest<minijinja::Value>| function(args.0))
}

fn build_syntax(options: &EngineOptions) -> RenderPipeResult<Option<minijinja::syntax::SyntaxConfig>> {
	if options.block_delimiters.is_none()
		&& options.variable_delimiters.is_none()
		&& options.comment_delimiters.is_none()
	{
		return Ok(None);
	}

	let mut builder = minijinja::syntax::SyntaxConfig::builder();
	if let Some((open, close)) = &options.block_delimiters {
		builder.block_delimiters(open.clone(), close.clone());
	}
	if let Some((open, close)) = &options.variable_delimiters {
		builder.variable_delimiters(open.clone(), close.clone());
	}
	if let Some((open, close)) = &options.comment_delimiters {
		builder.comment_delimiters(open.clone(), close.clone());
	}

	builder
		.build()
		.map(Some)
		.map_err(|error| RenderPipeError::Config(format!("invalid template delimiters: {error}")))
}

/// Flatten a minijinja error and its source chain into a single reason.
/// Nested errors carry the interesting detail for missing includes and
/// failing filters.
fn render_error(path: &str, error: &minijinja::Error) -> RenderPipeError {
	let mut reason = error.to_string();
	let mut source = std::error::Error::source(error);
	while let Some(current) = source {
		reason.push_str(": ");
		reason.push_str(&current.to_string());
		source = current.source();
	}

	RenderPipeError::Render {
		path: path.to_string(),
		reason,
	}
}
