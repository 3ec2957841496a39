//! Domain-level configuration (`domain.yaml`) and endpoint declarations

// Internal imports (std, crate)
use std::fmt;

use super::entity::{EntityConfig, MixinConfig};
use super::field::FieldConfig;
use crate::utils::{pluralize, to_snake_case, to_upper_camel_case};

// External imports (alphabetized)
use serde::{Deserialize, Serialize};

/// CRUD operation an endpoint or use-case method performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    List,
    Update,
    Delete,
    Custom,
}

impl Operation {
    pub const CRUD: [Operation; 5] = [
        Operation::Create,
        Operation::Read,
        Operation::List,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::List => "list",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Custom => "custom",
        }
    }

    pub fn default_method(&self) -> HttpMethod {
        match self {
            Self::Create | Self::Custom => HttpMethod::Post,
            Self::Read | Self::List => HttpMethod::Get,
            Self::Update => HttpMethod::Patch,
            Self::Delete => HttpMethod::Delete,
        }
    }

    pub fn default_status(&self) -> u16 {
        match self {
            Self::Create => 201,
            Self::Delete => 204,
            _ => 200,
        }
    }

    /// Whether the route addresses a single row by primary key
    pub fn targets_item(&self) -> bool {
        matches!(self, Self::Read | Self::Update | Self::Delete)
    }

    /// Name of the generated use-case method for this operation on `entity`
    pub fn method_name(&self, entity: &EntityConfig) -> Option<String> {
        let snake = entity.snake_name();
        match self {
            Self::Create => Some(format!("create_{snake}")),
            Self::Read => Some(format!("get_{snake}")),
            Self::List => Some(format!("list_{}", pluralize(&snake))),
            Self::Update => Some(format!("update_{snake}")),
            Self::Delete => Some(format!("delete_{snake}")),
            Self::Custom => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "POST", alias = "post")]
    Post,
    #[serde(rename = "PUT", alias = "put")]
    Put,
    #[serde(rename = "PATCH", alias = "patch")]
    Patch,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
}

impl HttpMethod {
    /// FastAPI router decorator name (`get`, `post`, ...)
    pub fn decorator(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decorator().to_uppercase())
    }
}

/// A route exposed by the interface layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub operation: Operation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,

    /// Route path relative to the router prefix; must start with `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Entity the endpoint works on; defaults to the first table entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Use-case method to call; required for `custom` endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usecase_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default)]
    pub auth_required: bool,
}

impl EndpointConfig {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            method: None,
            path: None,
            entity: None,
            summary: None,
            usecase_method: None,
            status_code: None,
            auth_required: false,
        }
    }
}

/// Root of a domain's configuration (`domain.yaml`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Python package of the generated modules; derived from the directory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    #[serde(default)]
    pub mixins: Vec<MixinConfig>,

    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl DomainConfig {
    pub fn snake_name(&self) -> String {
        to_snake_case(&self.name)
    }

    pub fn pascal_name(&self) -> String {
        to_upper_camel_case(&self.name)
    }

    /// Explicit plural, or the plural of the snake_case name
    pub fn plural_name(&self) -> String {
        self.plural
            .as_deref()
            .map(to_snake_case)
            .unwrap_or_else(|| pluralize(&self.snake_name()))
    }

    pub fn entity(&self, name: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn mixin(&self, name: &str) -> Option<&MixinConfig> {
        self.mixins.iter().find(|m| m.name == name)
    }

    /// Entities backed by a database table
    pub fn table_entities(&self) -> impl Iterator<Item = &EntityConfig> {
        self.entities.iter().filter(|e| e.table)
    }

    /// Fields of `entity` with mixins expanded and an implicit primary key.
    ///
    /// Mixin fields come first, in mixin order; an entity field with the same
    /// name as a mixin field replaces it in place. Unknown mixins are ignored
    /// here and reported by validation.
    pub fn effective_fields(&self, entity: &EntityConfig) -> Vec<FieldConfig> {
        let mut fields: Vec<FieldConfig> = Vec::new();
        for mixin in entity.mixins.iter().filter_map(|m| self.mixin(m)) {
            for field in &mixin.fields {
                if !fields.iter().any(|f| f.name == field.name) {
                    fields.push(field.clone());
                }
            }
        }
        for field in &entity.fields {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(existing) => *existing = field.clone(),
                None => fields.push(field.clone()),
            }
        }
        if entity.table && !fields.iter().any(|f| f.primary_key) {
            fields.insert(0, FieldConfig::implicit_id());
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldType;

    const DOMAIN: &str = r#"
name: Product
mixins:
  - name: Timestamped
    fields:
      - name: created_at
        type: datetime
        default_factory: datetime.utcnow
      - name: updated_at
        type: datetime
        required: false
entities:
  - name: Product
    mixins: [Timestamped]
    fields:
      - name: name
        type: str
      - name: updated_at
        type: datetime
        required: true
endpoints:
  - operation: list
    method: get
"#;

    #[test]
    fn test_effective_fields_expand_mixins() {
        let domain: DomainConfig = serde_yaml::from_str(DOMAIN).unwrap();
        let product = domain.entity("Product").unwrap();
        let fields = domain.effective_fields(product);
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "created_at", "updated_at", "name"]);

        // entity field replaces the mixin field of the same name
        let updated = fields.iter().find(|f| f.name == "updated_at").unwrap();
        assert!(updated.required);
        assert_eq!(fields[0].field_type, FieldType::Int);
        assert!(fields[0].primary_key);
    }

    #[test]
    fn test_domain_names_and_endpoint_defaults() {
        let domain: DomainConfig = serde_yaml::from_str(DOMAIN).unwrap();
        assert_eq!(domain.snake_name(), "product");
        assert_eq!(domain.plural_name(), "products");
        assert_eq!(domain.endpoints[0].method, Some(HttpMethod::Get));

        let product = domain.entity("Product").unwrap();
        assert_eq!(
            Operation::List.method_name(product).as_deref(),
            Some("list_products")
        );
        assert_eq!(Operation::Read.method_name(product).as_deref(), Some("get_product"));
        assert_eq!(Operation::Update.default_method(), HttpMethod::Patch);
        assert_eq!(Operation::Create.default_status(), 201);
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
