//! Optional configuration layers stacked on top of `domain.yaml`.
//!
//! Each layer file may carry an `overrides` map. It is not part of the layer
//! itself: the merger lifts it out and deep-merges it into the whole merged
//! tree with the precedence of the layer that declared it.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::domain::{EndpointConfig, Operation};
use super::entity::EntityConfig;
use crate::error::Severity;

/// Tree fragment merged at the root of the merged configuration
pub type Overrides = JsonMap<String, JsonValue>;

fn default_true() -> bool {
    true
}

fn default_limit() -> u32 {
    100
}

fn default_max_limit() -> u32 {
    1000
}

/// `entities.yaml` written as a map rather than a bare list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntitiesLayer {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    #[serde(default, skip_serializing)]
    pub overrides: Option<Overrides>,
}

/// Application service layer (`usecase.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseCaseConfig {
    /// Service class name; defaults to `<Domain>Service`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Emit create/get/list/update/delete methods for every table entity
    #[serde(default = "default_true")]
    pub generate_crud: bool,

    /// Extra constructor dependencies (class names)
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub methods: Vec<UseCaseMethod>,

    #[serde(default, skip_serializing)]
    pub overrides: Option<Overrides>,
}

impl Default for UseCaseConfig {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            generate_crud: true,
            dependencies: Vec::new(),
            methods: Vec::new(),
            overrides: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseCaseMethod {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// CRUD operation this method implements; `custom` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,

    /// Names of business rules checked before the method runs
    #[serde(default)]
    pub business_rules: Vec<String>,

    #[serde(default = "default_true")]
    pub transactional: bool,
}

/// Business rules layer (`business_rules.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessRulesConfig {
    #[serde(default)]
    pub rules: Vec<BusinessRule>,

    #[serde(default, skip_serializing)]
    pub overrides: Option<Overrides>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BusinessRule {
    pub name: String,

    pub entity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Python expression evaluated against the entity's attributes
    pub condition: String,

    pub message: String,

    #[serde(default)]
    pub severity: Severity,

    /// Operations the rule is enforced on; create and update when empty
    #[serde(default)]
    pub applies_to: Vec<Operation>,
}

impl BusinessRule {
    /// Whether the rule is enforced for `operation`
    pub fn applies(&self, operation: Operation) -> bool {
        if self.applies_to.is_empty() {
            matches!(operation, Operation::Create | Operation::Update)
        } else {
            self.applies_to.contains(&operation)
        }
    }
}

/// Persistence layer (`repository.yaml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryConfig {
    /// Import path of a custom base class (`app.core.repository.BaseRepository`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_class: Option<String>,

    /// Mark rows deleted instead of removing them; requires a `deleted_at` field
    #[serde(default)]
    pub soft_delete: bool,

    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default = "default_max_limit")]
    pub max_limit: u32,

    #[serde(default)]
    pub methods: Vec<RepositoryMethod>,

    #[serde(default, skip_serializing)]
    pub overrides: Option<Overrides>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_class: None,
            soft_delete: false,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            methods: Vec::new(),
            overrides: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    One,
    #[default]
    Many,
}

/// Query method generated on a repository (`find_by_sku`, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepositoryMethod {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    /// Fields compared for equality with the method's arguments
    #[serde(default)]
    pub filter_by: Vec<String>,

    #[serde(default)]
    pub returns: ReturnKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// HTTP interface layer (`interface.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    /// Router prefix; defaults to `/<domain plural>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Import path of the dependency guarding `auth_required` endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_dependency: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    #[serde(default, skip_serializing)]
    pub overrides: Option<Overrides>,
}
