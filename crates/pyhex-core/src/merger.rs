//! Hierarchical merge of a domain's configuration layers.
//!
//! Layers are merged in [`Layer::ALL`] order, later layers winning:
//!
//! - maps merge recursively and overlay scalars replace base scalars;
//! - lists extend, except that a map item whose `name` matches an existing
//!   item is merged into that item in place;
//! - `_replace: [key, ...]` in a map replaces the named keys wholesale;
//! - `null` deletes a key.
//!
//! Map insertion order is preserved throughout, so merging the same inputs
//! always yields the same output.

// Internal imports (std, crate)
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{ConfigurationError, Result, ValidationIssue};
use crate::loader::{ConfigLoader, LayerSet, REPLACE_DIRECTIVE};
use crate::schema::validate::ensure_valid;
use crate::schema::MergedConfig;

// External imports (alphabetized)
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Key identifying list items that merge instead of appending
pub const IDENTITY_KEY: &str = "name";

/// Key of the per-layer map merged at the root of the tree
pub const OVERRIDES_KEY: &str = "overrides";

/// Merge `overlay` into `base` in place
pub fn deep_merge(base: &mut JsonValue, overlay: JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(mut overlay_map)) => {
            let replace = take_replace_directive(&mut overlay_map);
            for (key, value) in overlay_map {
                if value.is_null() {
                    base_map.shift_remove(&key);
                } else if replace.contains(&key) {
                    base_map.insert(key, strip_directives(value));
                } else {
                    match base_map.get_mut(&key) {
                        Some(existing) => deep_merge(existing, value),
                        None => {
                            base_map.insert(key, strip_directives(value));
                        }
                    }
                }
            }
        }
        (JsonValue::Array(base_items), JsonValue::Array(overlay_items)) => {
            for item in overlay_items {
                let existing = identity(&item).and_then(|name| {
                    base_items
                        .iter_mut()
                        .find(|candidate| identity(candidate) == Some(name))
                });
                match existing {
                    Some(existing) => deep_merge(existing, item),
                    None => base_items.push(strip_directives(item)),
                }
            }
        }
        (base, overlay) => *base = strip_directives(overlay),
    }
}

/// Remove merge directives (`_replace` keys and `null` entries) from a subtree
pub fn strip_directives(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .filter(|(k, v)| k != REPLACE_DIRECTIVE && !v.is_null())
                .map(|(k, v)| (k, strip_directives(v)))
                .collect(),
        ),
        JsonValue::Array(items) => {
            JsonValue::Array(items.into_iter().map(strip_directives).collect())
        }
        other => other,
    }
}

fn take_replace_directive(map: &mut JsonMap<String, JsonValue>) -> Vec<String> {
    match map.shift_remove(REPLACE_DIRECTIVE) {
        Some(JsonValue::Array(keys)) => keys
            .into_iter()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        Some(JsonValue::String(key)) => vec![key],
        _ => Vec::new(),
    }
}

fn identity(value: &JsonValue) -> Option<&str> {
    value.get(IDENTITY_KEY).and_then(JsonValue::as_str)
}

/// A merged and validated domain
#[derive(Debug, Clone)]
pub struct MergedDomain {
    pub config: MergedConfig,
    /// Non-fatal validation findings
    pub warnings: Vec<ValidationIssue>,
    /// Domain directory the layers were read from
    pub dir: PathBuf,
    /// Layer files that contributed, in merge order
    pub sources: Vec<PathBuf>,
}

/// Merges a [`LayerSet`] into a validated [`MergedConfig`]
#[derive(Debug, Clone, Default)]
pub struct ConfigMerger {
    external_entities: BTreeSet<String>,
}

impl ConfigMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Qualified names (`domain.Entity`) of entities in sibling domains,
    /// used to check cross-domain relationship targets
    pub fn with_external_entities(mut self, entities: BTreeSet<String>) -> Self {
        self.external_entities = entities;
        self
    }

    /// Merge the layers into one untyped tree
    pub fn merge_values(&self, set: &LayerSet) -> JsonValue {
        let mut tree = JsonValue::Object(JsonMap::new());
        for doc in &set.documents {
            let mut content = doc.value.clone();
            let overrides = content
                .as_object_mut()
                .and_then(|map| map.shift_remove(OVERRIDES_KEY));

            let mut placed = JsonMap::new();
            placed.insert(doc.layer.section().to_string(), content);
            deep_merge(&mut tree, JsonValue::Object(placed));

            if let Some(overrides) = overrides {
                log::debug!("Applying overrides from {}", doc.path.display());
                deep_merge(&mut tree, overrides);
            }
        }
        tree
    }

    /// Merge, deserialize and validate the layers
    pub fn merge(&self, set: &LayerSet) -> Result<MergedDomain> {
        let tree = self.merge_values(set);
        let config: MergedConfig =
            serde_json::from_value(tree).map_err(|e| ConfigurationError::Schema {
                path: set.dir.clone(),
                location: None,
                message: format!("merged configuration is invalid: {e}"),
                suggestion: Some("check the `overrides` maps of the layer files".to_string()),
            })?;

        let warnings = ensure_valid(&config, &self.external_entities)?;
        for warning in &warnings {
            log::warn!("{}: {}", set.dir.display(), warning);
        }

        Ok(MergedDomain {
            config,
            warnings,
            dir: set.dir.clone(),
            sources: set.paths().map(Path::to_path_buf).collect(),
        })
    }

    /// Load every layer of `dir` and merge it
    pub async fn load(&self, dir: &Path) -> Result<MergedDomain> {
        let set = ConfigLoader::load_domain_dir(dir).await?;
        self.merge(&set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::layer::Layer;
    use serde_json::json;
    use tempfile::tempdir;

    fn layer_set(layers: &[(Layer, &str)]) -> LayerSet {
        let documents = layers
            .iter()
            .map(|(layer, content)| {
                ConfigLoader::parse_layer(*layer, Path::new(&layer.file_name()), content).unwrap()
            })
            .collect();
        LayerSet {
            dir: PathBuf::from("app/domain/product"),
            documents,
        }
    }

    #[test]
    fn test_scalars_override_and_maps_merge() {
        let mut base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        deep_merge(&mut base, json!({"a": 2, "nested": {"y": 3, "z": 4}}));
        assert_eq!(base, json!({"a": 2, "nested": {"x": 1, "y": 3, "z": 4}}));
    }

    #[test]
    fn test_lists_extend_and_named_items_merge() {
        let mut base = json!({"fields": [
            {"name": "title", "type": "str"},
            {"name": "price", "type": "float"}
        ]});
        deep_merge(
            &mut base,
            json!({"fields": [
                {"name": "price", "ge": 0},
                {"name": "sku", "type": "str"}
            ]}),
        );
        assert_eq!(
            base,
            json!({"fields": [
                {"name": "title", "type": "str"},
                {"name": "price", "type": "float", "ge": 0},
                {"name": "sku", "type": "str"}
            ]})
        );

        let mut tags = json!(["a"]);
        deep_merge(&mut tags, json!(["a", "b"]));
        assert_eq!(tags, json!(["a", "a", "b"]));
    }

    #[test]
    fn test_replace_directive_and_null_deletion() {
        let mut base = json!({"tags": ["a", "b"], "description": "old", "keep": true});
        deep_merge(
            &mut base,
            json!({"_replace": ["tags"], "tags": ["c"], "description": null}),
        );
        assert_eq!(base, json!({"tags": ["c"], "keep": true}));

        // directives nested in new subtrees are stripped as well
        let mut base = json!({});
        deep_merge(&mut base, json!({"section": {"_replace": ["x"], "x": 1, "y": null}}));
        assert_eq!(base, json!({"section": {"x": 1}}));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let overlay = json!({"b": {"z": 1, "a": 2}, "a": [1, 2]});
        let mut first = json!({"c": 0});
        let mut second = json!({"c": 0});
        deep_merge(&mut first, overlay.clone());
        deep_merge(&mut second, overlay);
        let first = serde_json::to_string(&first).unwrap();
        assert_eq!(first, serde_json::to_string(&second).unwrap());
        assert_eq!(first, r#"{"c":0,"b":{"z":1,"a":2},"a":[1,2]}"#);
    }

    #[test]
    fn test_layers_merge_in_order_with_overrides() {
        let set = layer_set(&[
            (
                Layer::Domain,
                "name: Product\ndescription: Catalog\nentities:\n  - name: Product\n    fields:\n      - { name: title, type: str }\n",
            ),
            (
                Layer::Entities,
                "- name: Product\n  fields:\n    - { name: price, type: float }\n- name: Tag\n",
            ),
            (
                Layer::Usecase,
                "name: CatalogService\noverrides:\n  domain:\n    description: Product catalog\n",
            ),
            (
                Layer::Interface,
                "prefix: /catalog\noverrides:\n  usecase:\n    name: ShopService\n",
            ),
        ]);

        let merged = ConfigMerger::new().merge(&set).unwrap();
        let config = &merged.config;
        let names: Vec<&str> = config.domain.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Product", "Tag"]);
        let product = config.domain.entity("Product").unwrap();
        let fields: Vec<&str> = product.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["title", "price"]);

        assert_eq!(config.domain.description.as_deref(), Some("Product catalog"));
        // interface overrides beat the use-case layer's own value
        assert_eq!(config.service_name(), "ShopService");
        assert_eq!(config.router_prefix(), "/catalog");
        assert_eq!(merged.sources.len(), 4);
    }

    #[test]
    fn test_invalid_override_is_a_schema_error() {
        let set = layer_set(&[
            (Layer::Domain, "name: Product\n"),
            (Layer::Repository, "overrides:\n  domain:\n    colour: blue\n"),
        ]);
        let err = ConfigMerger::new().merge(&set).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::Schema { .. })
        ));
    }

    #[test]
    fn test_merge_reports_validation_issues() {
        let set = layer_set(&[
            (
                Layer::Domain,
                "name: Product\nentities:\n  - name: Product\n",
            ),
            (
                Layer::BusinessRules,
                "rules:\n  - { name: r, entity: Prodct, condition: 'True', message: m }\n",
            ),
        ]);
        let err = ConfigMerger::new().merge(&set).unwrap_err();
        match err {
            Error::Validation(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].path, "business_rules.rules.r.entity");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_from_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("domain.yaml"),
            "name: Note\nentities:\n  - name: Note\n    fields: [{ name: body, type: text }]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("repository.yaml"), "default_limit: 20\n").unwrap();

        let merged = ConfigMerger::new().load(dir.path()).await.unwrap();
        assert_eq!(merged.config.repository.default_limit, 20);
        assert_eq!(merged.dir, dir.path());
        assert!(merged.warnings.is_empty());
    }
}
