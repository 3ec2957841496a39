//! Template set selection.
//!
//! # Examples
//!
//! ```
//! use pyhex_core::templates::TemplateKind;
//! use std::str::FromStr;
//!
//! let template = TemplateKind::from_str("fastapi-sqlmodel").unwrap();
//! assert_eq!(template, TemplateKind::FastapiSqlmodel);
//! assert_eq!(template.to_string(), "fastapi_sqlmodel");
//! assert_eq!(TemplateKind::default(), TemplateKind::FastapiSqlmodel);
//! ```

// Internal imports (std, crate)
use std::fmt;
use std::str::FromStr;

// External imports (alphabetized)
use serde::{Deserialize, Serialize};

/// Supported template sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Built-in FastAPI + SQLModel templates
    #[default]
    FastapiSqlmodel,
    /// Templates from a custom directory only
    Custom,
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "fastapi_sqlmodel" => Ok(TemplateKind::FastapiSqlmodel),
            "custom" => Ok(TemplateKind::Custom),
            _ => Err(format!("Unknown template kind: {}", s)),
        }
    }
}

impl TemplateKind {
    /// Returns the template identifier as a string slice
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastapiSqlmodel => "fastapi_sqlmodel",
            Self::Custom => "custom",
        }
    }

    /// Whether the embedded templates are loaded before any custom directory
    pub fn uses_builtin(&self) -> bool {
        matches!(self, Self::FastapiSqlmodel)
    }

    pub fn all() -> impl Iterator<Item = Self> {
        [Self::FastapiSqlmodel, Self::Custom].into_iter()
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(
            "FastAPI_SQLModel".parse::<TemplateKind>().unwrap(),
            TemplateKind::FastapiSqlmodel
        );
        assert_eq!("custom".parse::<TemplateKind>().unwrap(), TemplateKind::Custom);
        assert!("rust_axum".parse::<TemplateKind>().is_err());
        assert!("".parse::<TemplateKind>().is_err());
    }

    #[test]
    fn test_round_trip_through_names() {
        for kind in TemplateKind::all() {
            assert_eq!(kind.as_str().parse::<TemplateKind>().unwrap(), kind);
            let yaml = serde_yaml::to_string(&kind).unwrap();
            assert_eq!(yaml.trim(), kind.as_str());
        }
        assert!(TemplateKind::FastapiSqlmodel.uses_builtin());
        assert!(!TemplateKind::Custom.uses_builtin());
    }
}
