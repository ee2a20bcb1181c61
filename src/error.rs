use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RenderPipeError {
	#[error(transparent)]
	#[diagnostic(code(renderpipe::io_error))]
	Io(#[from] std::io::Error),

	#[error("invalid stage configuration: {0}")]
	#[diagnostic(code(renderpipe::config))]
	Config(String),

	#[error("streaming contents are not supported: `{path}`")]
	#[diagnostic(
		code(renderpipe::unsupported_input),
		help("buffer the file contents before handing the file to the render stage")
	)]
	UnsupportedInput { path: String },

	#[error("failed to render template `{path}`: {reason}")]
	#[diagnostic(code(renderpipe::render))]
	Render { path: String, reason: String },

	#[error("failed to load locals file `{path}`: {reason}")]
	#[diagnostic(code(renderpipe::locals))]
	LocalsLoad { path: String, reason: String },

	#[error("unsupported locals file format: `{0}`")]
	#[diagnostic(
		code(renderpipe::unsupported_format),
		help("supported formats: json, toml, yaml, yml, kdl, ini")
	)]
	UnsupportedLocalsFormat(String),
}

pub type RenderPipeResult<T> = Result<T, RenderPipeError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
