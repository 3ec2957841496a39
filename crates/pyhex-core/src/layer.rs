//! Configuration layers of a domain directory, in merge order

// Internal imports (std, crate)
use std::fmt;
use std::str::FromStr;

// External imports (alphabetized)
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One YAML file of a co-located domain directory.
///
/// The declaration order is the merge order: later layers override earlier
/// ones.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    Domain,
    Entities,
    Usecase,
    BusinessRules,
    Repository,
    Interface,
}

impl Layer {
    /// Every layer in merge order
    pub const ALL: [Layer; 6] = [
        Layer::Domain,
        Layer::Entities,
        Layer::Usecase,
        Layer::BusinessRules,
        Layer::Repository,
        Layer::Interface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Entities => "entities",
            Self::Usecase => "usecase",
            Self::BusinessRules => "business_rules",
            Self::Repository => "repository",
            Self::Interface => "interface",
        }
    }

    /// File name inside the domain directory
    pub fn file_name(&self) -> String {
        format!("{}.yaml", self.as_str())
    }

    /// Node of the merged tree this layer's document is merged into.
    ///
    /// `entities.yaml` is normalized to `{entities: [...]}` and therefore
    /// merges into the domain node.
    pub fn section(&self) -> &'static str {
        match self {
            Self::Domain | Self::Entities => "domain",
            Self::Usecase => "usecase",
            Self::BusinessRules => "business_rules",
            Self::Repository => "repository",
            Self::Interface => "interface",
        }
    }

    /// Only `domain.yaml` must exist
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Domain)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        let normalized = normalized.trim_end_matches(".yaml");
        Self::ALL
            .into_iter()
            .find(|l| l.as_str() == normalized)
            .ok_or_else(|| format!("unknown layer: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_order_and_names() {
        let mut sorted = Layer::ALL;
        sorted.sort();
        assert_eq!(sorted, Layer::ALL);
        assert_eq!(Layer::BusinessRules.file_name(), "business_rules.yaml");
        assert_eq!(Layer::Entities.section(), "domain");
        assert!(Layer::Domain.is_required());
        assert!(!Layer::Interface.is_required());
    }

    #[test]
    fn test_layer_from_str() {
        assert_eq!("business-rules".parse::<Layer>().unwrap(), Layer::BusinessRules);
        assert_eq!("usecase.yaml".parse::<Layer>().unwrap(), Layer::Usecase);
        assert!("service".parse::<Layer>().is_err());
    }
}
