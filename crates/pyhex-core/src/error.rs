//! Error handling for the pyhex code generation library.
//!
//! This module defines the main error type `Error` used throughout the library,
//! along with a convenient `Result` type alias. Configuration problems get their
//! own [`ConfigurationError`] hierarchy so that the CLI can print the offending
//! file, the location and a suggestion for fixing it.
//!
//! # Examples
//!
//! ```
//! use pyhex_core::error::{Error, Result};
//!
//! fn might_fail() -> Result<()> {
//!     Err(Error::generation("nothing to generate"))
//! }
//!
//! assert!(might_fail().is_err());
//! ```

// Internal imports (std, crate)
use std::fmt;
use std::path::PathBuf;

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for pyhex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pyhex operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Template error
    #[error("Template error: {0}")]
    Template(String),

    /// Template engine error
    #[error("Template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Configuration loading or schema error
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Cross-reference validation failed; carries every issue found
    #[error("{}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// `@pyhex` marker error
    #[error("Preservation error: {0}")]
    Preserve(String),

    /// Generation error
    #[error("Generation error: {0}")]
    Generation(String),
}

impl Error {
    /// Create a new template error
    pub fn template<S: Into<String>>(msg: S) -> Self {
        Self::Template(msg.into())
    }

    /// Create a new preservation error
    pub fn preserve<S: Into<String>>(msg: S) -> Self {
        Self::Preserve(msg.into())
    }

    /// Create a new generation error
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        Self::Generation(msg.into())
    }

    /// Suggestion attached to the error, if any
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration(err) => err.suggestion(),
            _ => None,
        }
    }
}

/// Errors raised while reading and interpreting configuration files.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The file could not be found or read
    #[error("{}: {message}", .path.display())]
    File {
        path: PathBuf,
        message: String,
        suggestion: Option<String>,
    },

    /// The file was read but its content is malformed or has wrong types
    #[error("{}{}: {message}", .path.display(), format_location(.location))]
    Validation {
        path: PathBuf,
        location: Option<Location>,
        message: String,
        suggestion: Option<String>,
    },

    /// The content does not follow the expected schema (e.g. unknown keys)
    #[error("{}{}: {message}", .path.display(), format_location(.location))]
    Schema {
        path: PathBuf,
        location: Option<Location>,
        message: String,
        suggestion: Option<String>,
    },
}

impl ConfigurationError {
    /// Create a file error without a suggestion
    pub fn file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::File {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attach a suggestion, replacing any existing one
    pub fn with_suggestion(mut self, hint: impl Into<String>) -> Self {
        let hint = Some(hint.into());
        match &mut self {
            Self::File { suggestion, .. }
            | Self::Validation { suggestion, .. }
            | Self::Schema { suggestion, .. } => *suggestion = hint,
        }
        self
    }

    /// Suggestion for fixing the problem, if one is known
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::File { suggestion, .. }
            | Self::Validation { suggestion, .. }
            | Self::Schema { suggestion, .. } => suggestion.as_deref(),
        }
    }

    /// Path of the offending file
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::File { path, .. } | Self::Validation { path, .. } | Self::Schema { path, .. } => {
                path
            }
        }
    }
}

/// 1-based line/column position inside a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

fn format_location(location: &Option<Location>) -> String {
    location.map(|l| format!(":{l}")).unwrap_or_default()
}

/// Severity of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// A single problem found while cross-checking a merged configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted path of the offending node (e.g. `entities.Product.mixins[0]`)
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            suggestion: None,
            severity: Severity::Error,
        }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(path, message)
        }
    }

    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(hint) = &self.suggestion {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    let lines: Vec<String> = issues.iter().map(|i| format!("  - {i}")).collect();
    format!(
        "Configuration validation failed with {} issue(s):\n{}",
        issues.len(),
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ConfigurationError::Schema {
            path: PathBuf::from("app/domain/product/domain.yaml"),
            location: Some(Location { line: 4, column: 7 }),
            message: "unknown field `nmae`".to_string(),
            suggestion: None,
        }
        .with_suggestion("did you mean `name`?");

        assert_eq!(
            err.to_string(),
            "app/domain/product/domain.yaml:4:7: unknown field `nmae`"
        );
        assert_eq!(err.suggestion(), Some("did you mean `name`?"));

        let err: Error = err.into();
        assert_eq!(err.suggestion(), Some("did you mean `name`?"));
    }

    #[test]
    fn test_validation_error_lists_every_issue() {
        let err = Error::Validation(vec![
            ValidationIssue::error("entities.Product.mixins[0]", "unknown mixin `Stamp`")
                .with_suggestion(Some("did you mean `Stamped`?".to_string())),
            ValidationIssue::error("business_rules.rules[1].entity", "unknown entity `Prod`"),
        ]);
        let text = err.to_string();
        assert!(text.contains("2 issue(s)"));
        assert!(text.contains("unknown mixin `Stamp` (did you mean `Stamped`?)"));
        assert!(text.contains("business_rules.rules[1].entity"));
    }
}
