use std::borrow::Cow;
use std::path::Path;
use std::path::PathBuf;

/// Per-file data attached by earlier pipeline stages or loaded from locals
/// files. Keys are template variable names.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Contents of a [`PipelineFile`].
///
/// Upstream pipeline stages may hand files through without reading them
/// (`Null`), with fully buffered bytes (`Buffer`), or as an open byte stream
/// (`Stream`). The render stage only operates on buffered contents: null
/// files pass through untouched and streamed files are rejected.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum FileContents {
	/// No contents were read for this file.
	#[default]
	Null,
	/// Fully buffered file contents.
	Buffer(Vec<u8>),
	/// Marker for contents delivered as a byte stream.
	Stream,
}

/// An in-memory file object traveling through a build pipeline.
///
/// The file is ephemeral and owned by the pipeline: the stage consumes it,
/// replaces its contents with the rendered output, adjusts the path
/// extension, and pushes it downstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineFile {
	/// Filesystem path of the file. In path-render mode this is also the
	/// template name resolved against the configured source root.
	pub path: PathBuf,
	/// File contents, if any.
	pub contents: FileContents,
	/// Data merged into the render context for this file only.
	pub data: Option<DataMap>,
}

impl PipelineFile {
	/// Create a file with buffered contents.
	pub fn buffer(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
		Self {
			path: path.into(),
			contents: FileContents::Buffer(contents.into()),
			data: None,
		}
	}

	/// Create a file with no contents.
	pub fn null(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			contents: FileContents::Null,
			data: None,
		}
	}

	/// Create a file whose contents are an unread byte stream.
	pub fn stream(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			contents: FileContents::Stream,
			data: None,
		}
	}

	/// Attach per-file data.
	#[must_use]
	pub fn with_data(mut self, data: DataMap) -> Self {
		self.data = Some(data);
		self
	}

	/// Returns `true` when the file carries no contents.
	pub fn is_null(&self) -> bool {
		matches!(self.contents, FileContents::Null)
	}

	/// Returns `true` when the file contents are a byte stream.
	pub fn is_stream(&self) -> bool {
		matches!(self.contents, FileContents::Stream)
	}

	/// Buffered contents decoded as text. Invalid UTF-8 sequences are
	/// replaced rather than rejected, matching how build pipelines treat
	/// template sources as text. Null and stream contents decode to the
	/// empty string.
	pub fn contents_text(&self) -> Cow<'_, str> {
		match &self.contents {
			FileContents::Buffer(bytes) => String::from_utf8_lossy(bytes),
			FileContents::Null | FileContents::Stream => Cow::Borrowed(""),
		}
	}
}

/// Replace the final extension of `path` with `extension`.
///
/// A leading dot in `extension` is optional: `.html` and `html` behave the
/// same. A path without an extension gains one. An empty `extension` removes
/// the existing one.
pub fn replace_extension(path: &Path, extension: &str) -> PathBuf {
	path.with_extension(extension.trim_start_matches('.'))
}
