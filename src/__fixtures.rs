use tempfile::TempDir;

use crate::EngineExtension;
use crate::FileSink;
use crate::PipelineFile;
use crate::RenderPipeError;
use crate::RenderPipeResult;
use crate::StageOptions;
use crate::file::DataMap;

/// Create a temporary template directory populated with the given files.
pub(crate) fn project(files: &[(&str, &str)]) -> RenderPipeResult<TempDir> {
	let dir = tempfile::tempdir()?;
	for (name, content) in files {
		let path = dir.path().join(name);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, content)?;
	}

	Ok(dir)
}

/// Options rooted at a temporary template directory.
pub(crate) fn src_options(dir: &TempDir) -> StageOptions {
	StageOptions {
		src: Some(dir.path().to_path_buf()),
		..Default::default()
	}
}

/// Build a per-file data map from literal entries.
pub(crate) fn data(entries: &[(&str, serde_json::Value)]) -> DataMap {
	entries
		.iter()
		.map(|(key, value)| ((*key).to_string(), value.clone()))
		.collect()
}

/// Sink recording both pushed files and emitted error events.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
	pub(crate) files: Vec<PipelineFile>,
	pub(crate) errors: Vec<String>,
}

impl FileSink for RecordingSink {
	fn push(&mut self, file: PipelineFile) {
		self.files.push(file);
	}

	fn error(&mut self, error: &RenderPipeError) {
		self.errors.push(error.to_string());
	}
}

/// An uppercasing filter.
pub(crate) fn uppercase(
	value: minijinja::Value,
	_args: Vec<minijinja::Value>,
) -> Result<minijinja::Value, minijinja::Error> {
	Ok(minijinja::Value::from(
		value.as_str().unwrap_or_default().to_uppercase(),
	))
}

/// A lowercasing filter, used to observe merge precedence against
/// [`uppercase`].
pub(crate) fn lowercase(
	value: minijinja::Value,
	_args: Vec<minijinja::Value>,
) -> Result<minijinja::Value, minijinja::Error> {
	Ok(minijinja::Value::from(
		value.as_str().unwrap_or_default().to_lowercase(),
	))
}

/// Extension that registers a fixed version stamp under its own name.
pub(crate) struct StampExtension;

impl EngineExtension for StampExtension {
	fn register(&self, name: &str, env: &mut minijinja::Environment<'static>) {
		env.add_global(name.to_string(), minijinja::Value::from("7.7.7"));
	}
}
