use snafu::Snafu;

/// A Dockerfile conversion error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
  #[snafu(display(
    "could not read Dockerfile: {}", source
  ))]
  ReadError {
    source: std::io::Error
  },

  #[snafu(display(
    "could not parse mappings document: {}", source
  ))]
  MappingsParseError {
    source: serde_yaml::Error
  },

  #[snafu(display(
    "invalid image mapping key '{}': a wildcard is only supported as the trailing character",
    pattern
  ))]
  InvalidMappingPattern {
    pattern: String
  },

  #[snafu(display(
    "rewrite hook failed: {}", message
  ))]
  RewriteHookError {
    message: String
  }
}

/// A Dockerfile conversion Result.
pub type Result<T, E = Error> = std::result::Result<T, E>;
