//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `kindle.toml` configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A target depends on a target that is not declared.
    #[error("target '{target}' depends on unknown target '{dependency}'")]
    UnknownDependency {
        /// The declaring target.
        target: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// Two targets list the same source root, or one root lies inside another.
    #[error("targets '{first}' and '{second}' both own the sources under '{path}'")]
    OverlappingSources {
        /// The first target.
        first: String,
        /// The second target.
        second: String,
        /// The root shared by both.
        path: String,
    },

    /// A required field is missing from the configuration.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}
