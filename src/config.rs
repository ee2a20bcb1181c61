use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Deserialize;

use crate::engine::ContextFn;
use crate::engine::Engine;
use crate::engine::EngineExtension;
use crate::engine::FilterFn;
use crate::engine::function_value;
use crate::error::RenderPipeError;
use crate::error::RenderPipeResult;
use crate::file::DataMap;
use crate::locals::validate_pattern;

/// Default output extension for rendered files.
pub const DEFAULT_EXTENSION: &str = ".html";

/// Sentinel extension value that leaves output paths unchanged.
pub const INHERIT_EXTENSION: &str = "inherit";

/// Default locals pattern used when locals discovery is enabled without an
/// explicit pattern. Matches the structured-data sibling forms the loader
/// registry supports.
pub const DEFAULT_LOCALS_PATTERN: &str = "<filename>.{json,toml,yaml,yml}";

/// Supported options file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["renderpipe.toml", ".renderpipe.toml", ".config/renderpipe.toml"];

/// Locals discovery configuration.
///
/// Backward-compatible boolean entries enable the default pattern:
///
/// ```toml
/// locals = true
/// ```
///
/// A string entry supplies a custom glob. `<filename>` expands to the file
/// name with its suffix, `<filename_noext>` to the file stem:
///
/// ```toml
/// locals = "<filename_noext>.data.{json,toml}"
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
#[non_exhaustive]
pub enum LocalsSpec {
	/// `true` enables discovery with [`DEFAULT_LOCALS_PATTERN`], `false`
	/// disables it.
	Enabled(bool),
	/// A custom glob pattern with `<filename>` / `<filename_noext>`
	/// placeholders.
	Pattern(String),
}

impl LocalsSpec {
	/// The effective pattern, or `None` when discovery is disabled.
	pub fn pattern(&self) -> Option<&str> {
		match self {
			Self::Enabled(true) => Some(DEFAULT_LOCALS_PATTERN),
			Self::Enabled(false) => None,
			Self::Pattern(pattern) => Some(pattern.as_str()),
		}
	}
}

/// What happens to an output file's path extension after a render.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtensionPolicy {
	/// Leave the path untouched.
	Inherit,
	/// Replace the final suffix with the stored extension.
	Replace(String),
}

impl ExtensionPolicy {
	/// Resolve the policy from the raw option. Absent means
	/// [`DEFAULT_EXTENSION`]; the literal `inherit` suppresses rewriting.
	pub fn from_option(extension: Option<&str>) -> Self {
		match extension {
			None => Self::Replace(DEFAULT_EXTENSION.to_string()),
			Some(value) if value == INHERIT_EXTENSION => Self::Inherit,
			Some(value) => Self::Replace(value.to_string()),
		}
	}
}

/// Template filters keyed by name.
#[derive(Clone, Default, Deref, DerefMut)]
pub struct FilterMap(BTreeMap<String, FilterFn>);

impl FilterMap {
	/// Insert a filter from a plain closure.
	pub fn add<F>(&mut self, name: impl Into<String>, filter: F)
	where
		F: Fn(minijinja::Value, Vec<minijinja::Value>) -> Result<minijinja::Value, minijinja::Error>
			+ Send
			+ Sync
			+ 'static,
	{
		self.0.insert(name.into(), Arc::new(filter));
	}
}

impl fmt::Debug for FilterMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.0.keys()).finish()
	}
}

/// Context callables keyed by name.
#[derive(Clone, Default, Deref, DerefMut)]
pub struct FunctionMap(BTreeMap<String, ContextFn>);

impl FunctionMap {
	/// Insert a callable from a plain closure.
	pub fn add<F>(&mut self, name: impl Into<String>, function: F)
	where
		F: Fn(Vec<minijinja::Value>) -> Result<minijinja::Value, minijinja::Error>
			+ Send
			+ Sync
			+ 'static,
	{
		self.0.insert(name.into(), Arc::new(function));
	}
}

impl fmt::Debug for FunctionMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.0.keys()).finish()
	}
}

/// Engine extensions keyed by name.
#[derive(Clone, Default, Deref, DerefMut)]
pub struct ExtensionMap(BTreeMap<String, Arc<dyn EngineExtension>>);

impl ExtensionMap {
	/// Insert an extension.
	pub fn add(&mut self, name: impl Into<String>, extension: impl EngineExtension + 'static) {
		self.0.insert(name.into(), Arc::new(extension));
	}
}

impl fmt::Debug for ExtensionMap {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_set().entries(self.0.keys()).finish()
	}
}

/// Grouped filter, extension, and function registrations.
///
/// Entries here are merged under the same-named top-level maps on
/// [`StageOptions`], with the top-level key winning on collision.
#[derive(Clone, Debug, Default)]
pub struct GlobalsOptions {
	/// Filters registered on the engine.
	pub filters: FilterMap,
	/// Extensions installed into the engine.
	pub extensions: ExtensionMap,
	/// Callables merged into the base render context.
	pub functions: FunctionMap,
}

/// Options forwarded to engine configuration.
///
/// This is the residual of the user options record: everything the stage
/// consumes lives on [`StageOptions`] directly and never reaches the engine.
///
/// ```toml
/// [engine]
/// trim_blocks = true
/// variable_delimiters = ["<<", ">>"]
/// ```
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct EngineOptions {
	/// Watch templates for changes. Defaults to `false` so a batch driver
	/// never keeps the process alive; `true` is not supported by the engine
	/// and is ignored with a warning.
	pub watch: Option<bool>,
	/// Force HTML auto-escaping on (`true`) or off (`false`). Absent means
	/// the engine escapes based on the template name's extension.
	pub autoescape: Option<bool>,
	/// Remove the newline following a block tag.
	pub trim_blocks: Option<bool>,
	/// Strip leading whitespace before a block tag on its line.
	pub lstrip_blocks: Option<bool>,
	/// Keep a trailing newline in the rendered output. Defaults to `true`.
	pub keep_trailing_newline: Option<bool>,
	/// Fail the render on undefined variables instead of printing nothing.
	pub throw_on_undefined: Option<bool>,
	/// Custom `{% %}` delimiters.
	pub block_delimiters: Option<(String, String)>,
	/// Custom `{{ }}` delimiters.
	pub variable_delimiters: Option<(String, String)>,
	/// Custom `{# #}` delimiters.
	pub comment_delimiters: Option<(String, String)>,
}

/// User options for building a render stage.
///
/// All fields are optional. The data-only subset can be loaded from a
/// `renderpipe.toml` file; filters, extensions, and functions are attached
/// programmatically afterwards.
///
/// ```toml
/// src = "templates"
/// extension = ".html"
/// locals = true
///
/// [data]
/// site = { name = "example", version = "1.0" }
///
/// [engine]
/// trim_blocks = true
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StageOptions {
	/// Root directory for template lookup.
	pub src: Option<PathBuf>,
	/// Output path suffix, or `inherit` to leave paths unchanged. Defaults
	/// to `.html`.
	pub extension: Option<String>,
	/// Emit render failures on the stage. Defaults to `true`.
	pub errors: Option<bool>,
	/// Render templates from the file's in-memory contents rather than
	/// re-reading them by path. Defaults to `false`.
	pub render_string: Option<bool>,
	/// Build a pipeline stage (`true`, the default) or a direct-render
	/// function (`false`). Only consulted by [`create`](crate::create).
	pub piping: Option<bool>,
	/// Log locals discovery and render steps at info level instead of
	/// debug. Defaults to `false`.
	pub verbose: Option<bool>,
	/// Locals discovery configuration. Absent means disabled.
	pub locals: Option<LocalsSpec>,
	/// Values registered as engine-level globals, visible inside every
	/// template regardless of the per-file context.
	pub data: DataMap,
	/// Grouped registrations; overridden per key by the top-level maps.
	#[serde(skip)]
	pub globals: GlobalsOptions,
	/// Filters registered on the engine. Wins over `globals.filters`.
	#[serde(skip)]
	pub filters: FilterMap,
	/// Extensions installed into the engine. Wins over `globals.extensions`.
	#[serde(skip)]
	pub extensions: ExtensionMap,
	/// Callables merged into the base render context. Wins over
	/// `globals.functions`.
	#[serde(skip)]
	pub functions: FunctionMap,
	/// Residual options forwarded to engine configuration.
	pub engine: EngineOptions,
}

impl StageOptions {
	/// Resolve the options file path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load options from the first discovered options file at `root`.
	/// Returns `None` if no file exists.
	pub fn load(root: &Path) -> RenderPipeResult<Option<Self>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let options: Self = toml::from_str(&content)
			.map_err(|error| RenderPipeError::Config(error.to_string()))?;

		Ok(Some(options))
	}
}

/// The base render context.
///
/// Holds the callables collected from the merged function maps. Every
/// render starts from a clone of this map and overlays per-file data and
/// locals onto the clone, so the base stays untouched across files.
#[derive(Clone, Debug, Default, Deref, DerefMut)]
pub struct Context(BTreeMap<String, minijinja::Value>);

impl Context {
	/// Convert per-file data entries into template values and insert them,
	/// overwriting existing keys.
	pub fn overlay(&mut self, data: &DataMap) {
		for (key, value) in data {
			self.0
				.insert(key.clone(), minijinja::Value::from_serialize(value));
		}
	}

	/// The context as a single template value.
	pub fn to_value(&self) -> minijinja::Value {
		minijinja::Value::from_iter(self.0.iter().map(|(k, v)| (k.clone(), v.clone())))
	}
}

/// Stage configuration derived from [`StageOptions`], immutable after
/// construction. One `StageConfig` lives as long as the stage or renderer
/// built from it.
#[derive(Clone, Debug)]
pub struct StageConfig {
	/// Base render context (callables only).
	pub context: Context,
	/// The configured engine handle, shared across renders.
	pub env: Engine,
	/// Output path extension policy.
	pub extension: ExtensionPolicy,
	/// Root directory for template lookup.
	pub src: Option<PathBuf>,
	/// Whether render failures are emitted on the stage.
	pub errors: bool,
	/// Resolved locals pattern, or `None` when discovery is disabled.
	pub locals: Option<String>,
	/// Render from in-memory contents rather than by path.
	pub render_string: bool,
	/// Pipeline mode vs. direct-render mode.
	pub piping: bool,
	/// Elevated logging for locals discovery and render steps.
	pub verbose: bool,
}

/// Normalize user options into a [`StageConfig`] with a configured engine.
///
/// The options record is only read, never altered. Later steps depend on
/// earlier ones: the globals merge feeds the context, the context is sealed
/// before the engine is configured, and filter/extension registration runs
/// last against the fully configured environment.
pub fn configure(options: &StageOptions) -> RenderPipeResult<StageConfig> {
	let errors = options.errors.unwrap_or(true);
	let globals = merged_globals(options);

	let locals = options
		.locals
		.as_ref()
		.and_then(LocalsSpec::pattern)
		.map(str::to_string);
	if let Some(pattern) = &locals {
		validate_pattern(pattern)?;
	}

	let mut context = Context::default();
	for (name, function) in globals.functions.iter() {
		context.insert(name.clone(), function_value(function.clone()));
	}

	let extension = ExtensionPolicy::from_option(options.extension.as_deref());
	let src = options.src.clone();

	let mut engine_options = options.engine.clone();
	engine_options.watch.get_or_insert(false);
	let mut env = Engine::configure(src.as_deref(), &engine_options)?;
	for (name, value) in &options.data {
		env.add_global(name, value);
	}
	for (name, filter) in globals.filters.iter() {
		env.add_filter(name, filter.clone());
	}
	for (name, extension) in globals.extensions.iter() {
		env.add_extension(name, extension.as_ref());
	}

	Ok(StageConfig {
		context,
		env,
		extension,
		src,
		errors,
		locals,
		render_string: options.render_string.unwrap_or(false),
		piping: options.piping.unwrap_or(true),
		verbose: options.verbose.unwrap_or(false),
	})
}

/// Merge the grouped registrations under the top-level maps, the top-level
/// key winning on collision.
pub(crate) fn merged_globals(options: &StageOptions) -> GlobalsOptions {
	let mut merged = options.globals.clone();
	merged.filters.extend(
		options
			.filters
			.iter()
			.map(|(name, filter)| (name.clone(), filter.clone())),
	);
	merged.extensions.extend(
		options
			.extensions
			.iter()
			.map(|(name, extension)| (name.clone(), extension.clone())),
	);
	merged.functions.extend(
		options
			.functions
			.iter()
			.map(|(name, function)| (name.clone(), function.clone())),
	);
	merged
}
