use std::path::Path;
use std::path::PathBuf;

use globset::Glob;

use crate::config::Context;
use crate::config::StageConfig;
use crate::error::RenderPipeError;
use crate::error::RenderPipeResult;
use crate::file::DataMap;
use crate::file::PipelineFile;

/// Placeholder expanded to the file name including its suffix.
pub const FILENAME_PLACEHOLDER: &str = "<filename>";

/// Placeholder expanded to the file name with its suffix removed.
pub const FILENAME_NOEXT_PLACEHOLDER: &str = "<filename_noext>";

/// Merge locals discovered next to `file` into `context`.
///
/// Locals are sibling files matching the configured pattern, loaded as
/// key/value records and merged in lexicographic order, later matches
/// winning on key collision. Missing locals are a normal condition; a file
/// that fails to load is skipped so that one bad locals file cannot poison
/// a build.
pub(crate) fn assign_locals(context: &mut Context, config: &StageConfig, file: &PipelineFile) {
	let Some(configured) = &config.locals else {
		return;
	};

	let dir = file.path.parent().filter(|parent| !parent.as_os_str().is_empty());
	let dir = dir.unwrap_or_else(|| Path::new("."));
	let pattern = substitute_pattern(configured, &file.path);
	if config.verbose {
		tracing::info!(pattern = %pattern, dir = %dir.display(), "searching for locals");
	} else {
		tracing::debug!(pattern = %pattern, dir = %dir.display(), "searching for locals");
	}

	let found = find_locals_files(dir, &pattern);
	if config.verbose {
		tracing::info!(count = found.len(), "found locals files");
	} else {
		tracing::debug!(count = found.len(), "found locals files");
	}

	for path in found {
		match load_locals_file(&path) {
			Ok(locals) => {
				tracing::debug!(path = %path.display(), "using locals file");
				context.overlay(&locals);
			}
			Err(error) => {
				tracing::warn!(path = %path.display(), %error, "skipping locals file");
			}
		}
	}
}

/// Expand the filename placeholders in a locals pattern. Substitution is
/// plain text replacement; a pattern containing neither placeholder passes
/// through unchanged.
pub fn substitute_pattern(pattern: &str, path: &Path) -> String {
	let base = path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();
	let stem = path
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_default();

	pattern
		.replace(FILENAME_PLACEHOLDER, &base)
		.replace(FILENAME_NOEXT_PLACEHOLDER, &stem)
}

/// Check that a configured pattern still compiles once the placeholders are
/// expanded. Run at configuration time so a broken pattern fails the
/// factory instead of silently skipping locals on every file.
pub(crate) fn validate_pattern(pattern: &str) -> RenderPipeResult<()> {
	let sample = substitute_pattern(pattern, Path::new("sample.tpl"));
	Glob::new(&sample).map(|_| ()).map_err(|error| {
		RenderPipeError::Config(format!("invalid locals pattern `{pattern}`: {error}"))
	})
}

/// Sibling files of `dir` whose names match `pattern`, sorted for a
/// deterministic merge order. Directories never match.
fn find_locals_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
	let matcher = match Glob::new(pattern) {
		Ok(glob) => glob.compile_matcher(),
		Err(error) => {
			tracing::warn!(pattern, %error, "locals pattern does not compile, skipping");
			return Vec::new();
		}
	};

	let entries = match std::fs::read_dir(dir) {
		Ok(entries) => entries,
		Err(error) => {
			tracing::debug!(dir = %dir.display(), %error, "locals directory is not readable");
			return Vec::new();
		}
	};

	let mut found = Vec::new();
	for entry in entries.flatten() {
		let is_file = entry.file_type().is_ok_and(|file_type| file_type.is_file());
		if !is_file {
			continue;
		}
		let name = entry.file_name();
		if matcher.is_match(Path::new(&name)) {
			found.push(entry.path());
		}
	}

	found.sort();
	found
}

/// Load a locals file as a key/value record, choosing the parser by suffix.
fn load_locals_file(path: &Path) -> RenderPipeResult<DataMap> {
	let path_display = path.display().to_string();
	let content = std::fs::read_to_string(path).map_err(|error| RenderPipeError::LocalsLoad {
		path: path_display.clone(),
		reason: error.to_string(),
	})?;
	let format = path
		.extension()
		.and_then(|extension| extension.to_str())
		.unwrap_or("")
		.to_ascii_lowercase();

	let value = parse_locals(&content, &format, &path_display)?;
	match value {
		serde_json::Value::Object(map) => Ok(map),
		_ => {
			Err(RenderPipeError::LocalsLoad {
				path: path_display,
				reason: "expected a top-level mapping".to_string(),
			})
		}
	}
}

/// Parse locals content into a `serde_json::Value` based on its format.
pub(crate) fn parse_locals(
	content: &str,
	format: &str,
	path_display: &str,
) -> RenderPipeResult<serde_json::Value> {
	match format {
		"json" => {
			serde_json::from_str(content).map_err(|error| {
				RenderPipeError::LocalsLoad {
					path: path_display.to_string(),
					reason: error.to_string(),
				}
			})
		}
		"toml" => {
			let value: toml::Value = toml::from_str(content).map_err(|error| {
				RenderPipeError::LocalsLoad {
					path: path_display.to_string(),
					reason: error.to_string(),
				}
			})?;
			Ok(toml_to_json(value))
		}
		"yaml" | "yml" => {
			serde_yaml_ng::from_str(content).map_err(|error| {
				RenderPipeError::LocalsLoad {
					path: path_display.to_string(),
					reason: error.to_string(),
				}
			})
		}
		"kdl" => {
			let document: kdl::KdlDocument = content.parse().map_err(|error: kdl::KdlError| {
				RenderPipeError::LocalsLoad {
					path: path_display.to_string(),
					reason: error.to_string(),
				}
			})?;
			Ok(kdl_to_json(&document))
		}
		"ini" => {
			serde_ini::from_str(content).map_err(|error| {
				RenderPipeError::LocalsLoad {
					path: path_display.to_string(),
					reason: error.to_string(),
				}
			})
		}
		other => Err(RenderPipeError::UnsupportedLocalsFormat(other.to_string())),
	}
}

/// Convert a `toml::Value` into a `serde_json::Value`. Integers stay
/// integral; floats that JSON cannot represent degrade to null.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
	match value {
		toml::Value::String(string) => serde_json::Value::String(string),
		toml::Value::Integer(integer) => serde_json::Value::Number(integer.into()),
		toml::Value::Float(float) => {
			serde_json::Number::from_f64(float)
				.map_or(serde_json::Value::Null, serde_json::Value::Number)
		}
		toml::Value::Boolean(boolean) => serde_json::Value::Bool(boolean),
		toml::Value::Datetime(datetime) => serde_json::Value::String(datetime.to_string()),
		toml::Value::Array(array) => {
			serde_json::Value::Array(array.into_iter().map(toml_to_json).collect())
		}
		toml::Value::Table(table) => {
			serde_json::Value::Object(
				table
					.into_iter()
					.map(|(key, value)| (key, toml_to_json(value)))
					.collect(),
			)
		}
	}
}

/// Convert a KDL document into a `serde_json::Value` keyed by node name.
fn kdl_to_json(document: &kdl::KdlDocument) -> serde_json::Value {
	let mut map = serde_json::Map::new();
	for node in document.nodes() {
		map.insert(node.name().to_string(), kdl_node_to_json(node));
	}
	serde_json::Value::Object(map)
}

/// Convert a single KDL node: children become a nested object, one unnamed
/// entry becomes a scalar, all-named entries become an object, anything
/// else becomes an array.
fn kdl_node_to_json(node: &kdl::KdlNode) -> serde_json::Value {
	if let Some(children) = node.children() {
		return kdl_to_json(children);
	}

	let entries = node.entries();
	match entries {
		[] => serde_json::Value::Null,
		[single] if single.name().is_none() => kdl_entry_to_json(single.value()),
		_ if entries.iter().all(|entry| entry.name().is_some()) => {
			serde_json::Value::Object(
				entries
					.iter()
					.filter_map(|entry| {
						entry
							.name()
							.map(|name| (name.to_string(), kdl_entry_to_json(entry.value())))
					})
					.collect(),
			)
		}
		_ => {
			serde_json::Value::Array(
				entries
					.iter()
					.map(|entry| kdl_entry_to_json(entry.value()))
					.collect(),
			)
		}
	}
}

fn kdl_entry_to_json(value: &kdl::KdlValue) -> serde_json::Value {
	match value {
		kdl::KdlValue::String(string) => serde_json::Value::String(string.clone()),
		kdl::KdlValue::Integer(integer) => {
			i64::try_from(*integer).map_or_else(
				|_| serde_json::Value::String(integer.to_string()),
				|narrowed| serde_json::Value::Number(narrowed.into()),
			)
		}
		kdl::KdlValue::Float(float) => {
			serde_json::Number::from_f64(*float)
				.map_or(serde_json::Value::Null, serde_json::Value::Number)
		}
		kdl::KdlValue::Bool(boolean) => serde_json::Value::Bool(*boolean),
		kdl::KdlValue::Null => serde_json::Value::Null,
	}
}
