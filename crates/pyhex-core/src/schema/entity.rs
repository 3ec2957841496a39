//! Entity, mixin and relationship configuration

use serde::{Deserialize, Serialize};

use super::field::FieldConfig;
use crate::utils::{pluralize, to_snake_case, to_upper_camel_case};

fn default_true() -> bool {
    true
}

/// Reusable group of fields merged into entities that list it in `mixins`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MixinConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

/// Cardinality of a relationship, seen from the declaring entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    OneToMany,
    ManyToOne,
    OneToOne,
    ManyToMany,
}

impl RelationshipKind {
    /// Whether the attribute holds a collection
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }

    /// Whether the declaring table carries the foreign key column
    pub fn owns_foreign_key(&self) -> bool {
        matches!(self, Self::ManyToOne | Self::OneToOne)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToMany => "one_to_many",
            Self::ManyToOne => "many_to_one",
            Self::OneToOne => "one_to_one",
            Self::ManyToMany => "many_to_many",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipConfig {
    /// Attribute name on the declaring entity
    pub name: String,

    /// Target entity, either `Entity` or `other_domain.Entity`
    pub target: String,

    pub kind: RelationshipKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_populates: Option<String>,

    /// Name of an existing field holding the foreign key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    /// Association table class, required for `many_to_many`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_model: Option<String>,

    #[serde(default)]
    pub cascade_delete: bool,
}

impl RelationshipConfig {
    /// `(domain, entity)` of a qualified target, `(None, entity)` otherwise
    pub fn target_parts(&self) -> (Option<&str>, &str) {
        match self.target.rsplit_once('.') {
            Some((domain, entity)) => (Some(domain), entity),
            None => (None, self.target.as_str()),
        }
    }

    /// Whether the target lives in another domain
    pub fn is_external(&self) -> bool {
        self.target.contains('.')
    }

    /// Name of the implied foreign key column for owning relationships
    pub fn foreign_key_field(&self) -> String {
        self.foreign_key
            .clone()
            .unwrap_or_else(|| format!("{}_id", to_snake_case(&self.name)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// `false` generates a plain SQLModel (no table), e.g. for value objects
    #[serde(default = "default_true")]
    pub table: bool,

    #[serde(default)]
    pub mixins: Vec<String>,

    #[serde(default)]
    pub fields: Vec<FieldConfig>,

    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}

impl EntityConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: None,
            description: None,
            table: true,
            mixins: Vec::new(),
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Python class name
    pub fn class_name(&self) -> String {
        to_upper_camel_case(&self.name)
    }

    pub fn snake_name(&self) -> String {
        to_snake_case(&self.name)
    }

    /// Explicit table name, or the snake_case plural of the entity name
    pub fn table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| pluralize(&self.snake_name()))
    }

    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipConfig> {
        self.relationships.iter().find(|r| r.name == name)
    }
}

/// Default table name for an entity referenced only by name (e.g. across domains)
pub fn default_table_name(entity: &str) -> String {
    pluralize(&to_snake_case(entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names() {
        let mut entity = EntityConfig::new("OrderItem");
        assert_eq!(entity.class_name(), "OrderItem");
        assert_eq!(entity.snake_name(), "order_item");
        assert_eq!(entity.table_name(), "order_items");

        entity.table_name = Some("line_items".to_string());
        assert_eq!(entity.table_name(), "line_items");
    }

    #[test]
    fn test_relationship_target_parts() {
        let rel: RelationshipConfig = serde_yaml::from_str(
            "name: owner\ntarget: user.User\nkind: many_to_one\n",
        )
        .unwrap();
        assert_eq!(rel.target_parts(), (Some("user"), "User"));
        assert!(rel.is_external());
        assert_eq!(rel.foreign_key_field(), "owner_id");
        assert!(rel.kind.owns_foreign_key());
        assert!(!rel.kind.is_collection());
    }

    #[test]
    fn test_entity_rejects_unknown_keys() {
        let err = serde_yaml::from_str::<EntityConfig>("name: Product\nfeilds: []\n").unwrap_err();
        assert!(err.to_string().contains("unknown field `feilds`"));
    }
}
