//! Typed configuration models.
//!
//! Every YAML layer of a domain is described here. The models reject unknown
//! keys so typos surface as schema errors instead of being silently ignored.

pub mod domain;
pub mod entity;
pub mod field;
pub mod layers;
pub mod validate;

pub use domain::{DomainConfig, EndpointConfig, HttpMethod, Operation};
pub use entity::{EntityConfig, MixinConfig, RelationshipConfig, RelationshipKind};
pub use field::{FieldArgs, FieldConfig, FieldType, FieldValue};
pub use layers::{
    BusinessRule, BusinessRulesConfig, EntitiesLayer, InterfaceConfig, Overrides,
    RepositoryConfig, RepositoryMethod, ReturnKind, UseCaseConfig, UseCaseMethod,
};

use serde::{Deserialize, Serialize};

/// All layers of one domain after merging, ready for validation and rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergedConfig {
    pub domain: DomainConfig,

    #[serde(default)]
    pub usecase: UseCaseConfig,

    #[serde(default)]
    pub business_rules: BusinessRulesConfig,

    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub interface: InterfaceConfig,
}

impl MergedConfig {
    /// Use-case class name (`<Domain>Service` unless configured)
    pub fn service_name(&self) -> String {
        self.usecase
            .name
            .clone()
            .unwrap_or_else(|| format!("{}Service", self.domain.pascal_name()))
    }

    /// Router prefix (`/<domain plural>` unless configured)
    pub fn router_prefix(&self) -> String {
        self.interface
            .prefix
            .clone()
            .unwrap_or_else(|| format!("/{}", self.domain.plural_name()))
    }

    /// Domain endpoints followed by interface endpoints
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.domain
            .endpoints
            .iter()
            .chain(self.interface.endpoints.iter())
    }

    pub fn rule(&self, name: &str) -> Option<&BusinessRule> {
        self.business_rules.rules.iter().find(|r| r.name == name)
    }
}
