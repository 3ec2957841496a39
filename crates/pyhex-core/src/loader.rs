//! Loading of co-located domain directories.
//!
//! Every layer file is parsed on its own and checked against its typed model
//! before any merging happens, so problems are reported against the file the
//! user actually wrote, with line and column when the YAML parser knows them.
//! The result is a [`LayerSet`] of untyped JSON documents that the
//! [`merger`](crate::merger) combines.

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

use crate::error::{ConfigurationError, Location, Result};
use crate::layer::Layer;
use crate::schema::{
    BusinessRulesConfig, DomainConfig, EntitiesLayer, EntityConfig, InterfaceConfig,
    RepositoryConfig, UseCaseConfig,
};
use crate::utils::did_you_mean;

// External imports (alphabetized)
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::fs;

/// Key of the list-replacement directive understood by the merger
pub const REPLACE_DIRECTIVE: &str = "_replace";

static LOCATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+at line \d+ column \d+$").unwrap());
static UNKNOWN_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"unknown (field|variant) `([^`]*)`(?:, expected (.*)|, there are no (?:fields|variants))?")
        .unwrap()
});
static MISSING_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"missing field `([^`]*)`").unwrap());
static INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"invalid (?:type|value|length): .*?, expected (.*)$").unwrap());
static BACKTICKED: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());

/// One parsed layer file
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDocument {
    pub layer: Layer,
    pub path: PathBuf,
    /// Layer content; `entities.yaml` is normalized to `{entities: [...]}`
    pub value: JsonValue,
}

/// Every layer file found in one domain directory, in merge order
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSet {
    pub dir: PathBuf,
    pub documents: Vec<LayerDocument>,
}

impl LayerSet {
    pub fn get(&self, layer: Layer) -> Option<&LayerDocument> {
        self.documents.iter().find(|d| d.layer == layer)
    }

    /// Layers present, in merge order
    pub fn layers(&self) -> Vec<Layer> {
        self.documents.iter().map(|d| d.layer).collect()
    }

    /// Paths of the files that contributed to this set
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.documents.iter().map(|d| d.path.as_path())
    }
}

/// Reads layer files and translates parser errors into [`ConfigurationError`]s
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load every layer present in `dir`; `domain.yaml` is required.
    pub async fn load_domain_dir(dir: &Path) -> Result<LayerSet> {
        log::debug!("Loading domain directory: {}", dir.display());
        let mut documents = Vec::new();
        for layer in Layer::ALL {
            if let Some(doc) = Self::load_layer(dir, layer).await? {
                documents.push(doc);
            }
        }
        Ok(LayerSet {
            dir: dir.to_path_buf(),
            documents,
        })
    }

    /// Load one layer file, `None` when an optional layer is absent
    pub async fn load_layer(dir: &Path, layer: Layer) -> Result<Option<LayerDocument>> {
        let path = dir.join(layer.file_name());
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if layer.is_required() {
                    return Err(ConfigurationError::file(&path, "domain configuration not found")
                        .with_suggestion(format!(
                            "create {} with at least `name: <Domain>`",
                            layer.file_name()
                        ))
                        .into());
                }
                return Ok(None);
            }
            Err(e) => {
                return Err(ConfigurationError::file(&path, format!("cannot read file: {e}")).into())
            }
        };
        log::debug!("Parsing layer {} from {}", layer, path.display());
        Self::parse_layer(layer, &path, &content).map(Some)
    }

    /// Parse and type-check the content of one layer file
    pub fn parse_layer(layer: Layer, path: &Path, content: &str) -> Result<LayerDocument> {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| translate_yaml_error(path, &e))?;

        if yaml.is_null() {
            if layer.is_required() {
                return Err(ConfigurationError::file(path, "file is empty")
                    .with_suggestion("add at least `name: <Domain>`")
                    .into());
            }
            return Ok(LayerDocument {
                layer,
                path: path.to_path_buf(),
                value: JsonValue::Object(Default::default()),
            });
        }

        match layer {
            Layer::Domain => check_typed::<DomainConfig>(path, content, &yaml)?,
            Layer::Entities if yaml.is_sequence() => {
                check_typed::<Vec<EntityConfig>>(path, content, &yaml)?
            }
            Layer::Entities => check_typed::<EntitiesLayer>(path, content, &yaml)?,
            Layer::Usecase => check_typed::<UseCaseConfig>(path, content, &yaml)?,
            Layer::BusinessRules => check_typed::<BusinessRulesConfig>(path, content, &yaml)?,
            Layer::Repository => check_typed::<RepositoryConfig>(path, content, &yaml)?,
            Layer::Interface => check_typed::<InterfaceConfig>(path, content, &yaml)?,
        }

        let mut value = serde_json::to_value(&yaml).map_err(|e| ConfigurationError::Validation {
            path: path.to_path_buf(),
            location: None,
            message: format!("unsupported YAML value: {e}"),
            suggestion: Some("mapping keys must be strings".to_string()),
        })?;
        if layer == Layer::Entities && value.is_array() {
            value = serde_json::json!({ "entities": value });
        }

        Ok(LayerDocument {
            layer,
            path: path.to_path_buf(),
            value,
        })
    }

    /// Domain directories (those holding a `domain.yaml`) under `domains_dir`, sorted
    pub async fn discover_domains(domains_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(domains_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigurationError::file(domains_dir, "domains directory not found")
                    .with_suggestion(
                        "run `pyhex init` or check `domains_dir` in pyhex.yaml",
                    )
                    .into());
            }
            Err(e) => return Err(e.into()),
        };

        let mut domains = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir()
                && fs::try_exists(path.join(Layer::Domain.file_name())).await?
            {
                domains.push(path);
            }
        }
        domains.sort();
        log::debug!(
            "Discovered {} domain(s) in {}",
            domains.len(),
            domains_dir.display()
        );
        Ok(domains)
    }
}

/// Deserialize the layer into its typed model purely to surface errors.
///
/// Parsing straight from the source keeps line and column information. Merge
/// directives (`_replace`, `null` deletions) are not part of the models, so
/// documents carrying them are checked with the directives stripped.
fn check_typed<T: DeserializeOwned>(
    path: &Path,
    content: &str,
    yaml: &serde_yaml::Value,
) -> std::result::Result<(), ConfigurationError> {
    let checked = if has_directives(yaml) {
        serde_yaml::from_value::<T>(without_directives(yaml)).map(|_| ())
    } else {
        serde_yaml::from_str::<T>(content).map(|_| ())
    };
    checked.map_err(|e| translate_yaml_error(path, &e))
}

fn has_directives(value: &serde_yaml::Value) -> bool {
    match value {
        serde_yaml::Value::Mapping(map) => map.iter().any(|(k, v)| {
            k.as_str() == Some(REPLACE_DIRECTIVE) || v.is_null() || has_directives(v)
        }),
        serde_yaml::Value::Sequence(items) => items.iter().any(has_directives),
        _ => false,
    }
}

fn without_directives(value: &serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Mapping(map) => serde_yaml::Value::Mapping(
            map.iter()
                .filter(|(k, v)| k.as_str() != Some(REPLACE_DIRECTIVE) && !v.is_null())
                .map(|(k, v)| (k.clone(), without_directives(v)))
                .collect(),
        ),
        serde_yaml::Value::Sequence(items) => {
            serde_yaml::Value::Sequence(items.iter().map(without_directives).collect())
        }
        other => other.clone(),
    }
}

/// Translate a serde_yaml error into a structured configuration error
pub fn translate_yaml_error(path: &Path, err: &serde_yaml::Error) -> ConfigurationError {
    let location = err.location().map(|l| Location {
        line: l.line(),
        column: l.column(),
    });
    let text = err.to_string();
    let message = LOCATION_SUFFIX.replace(&text, "").into_owned();
    let path = path.to_path_buf();

    if let Some(caps) = UNKNOWN_KEY.captures(&message) {
        let kind = &caps[1];
        let input = &caps[2];
        let expected: Vec<&str> = caps
            .get(3)
            .map(|m| {
                BACKTICKED
                    .captures_iter(m.as_str())
                    .filter_map(|c| c.get(1).map(|g| g.as_str()))
                    .collect()
            })
            .unwrap_or_default();
        let suggestion = did_you_mean(input, expected.iter().copied()).or_else(|| {
            (!expected.is_empty()).then(|| {
                let noun = if kind == "field" { "keys" } else { "values" };
                format!("valid {noun}: {}", expected.join(", "))
            })
        });
        return ConfigurationError::Schema {
            path,
            location,
            message,
            suggestion,
        };
    }

    let suggestion = if let Some(caps) = MISSING_FIELD.captures(&message) {
        format!("add `{}:` to this mapping", &caps[1])
    } else if let Some(caps) = INVALID.captures(&message) {
        format!("expected {}", &caps[1])
    } else {
        "check the indentation and quote values containing `:` or `#`".to_string()
    };
    ConfigurationError::Validation {
        path,
        location,
        message,
        suggestion: Some(suggestion),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    fn parse_err(layer: Layer, content: &str) -> ConfigurationError {
        match ConfigLoader::parse_layer(layer, Path::new("domain.yaml"), content) {
            Err(Error::Configuration(e)) => e,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_key_is_schema_error_with_suggestion() {
        let err = parse_err(Layer::Domain, "name: Product\nplurl: products\n");
        match &err {
            ConfigurationError::Schema {
                message, location, ..
            } => {
                assert!(message.contains("unknown field `plurl`"), "{message}");
                assert!(!message.contains(" at line "));
                assert_eq!(location.map(|l| l.line), Some(2));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
        assert_eq!(err.suggestion(), Some("did you mean `plural`?"));
    }

    #[test]
    fn test_unknown_variant_suggests_closest() {
        let err = parse_err(
            Layer::Domain,
            "name: Product\nentities:\n  - name: Product\n    fields:\n      - name: title\n        type: flaot\n",
        );
        assert!(matches!(err, ConfigurationError::Schema { .. }));
        assert_eq!(err.suggestion(), Some("did you mean `float`?"));
    }

    #[test]
    fn test_missing_and_mistyped_fields_are_validation_errors() {
        let err = parse_err(Layer::Domain, "description: no name\n");
        assert!(matches!(err, ConfigurationError::Validation { .. }));
        assert_eq!(err.suggestion(), Some("add `name:` to this mapping"));

        let err = parse_err(Layer::Repository, "soft_delete: maybe\n");
        assert!(matches!(err, ConfigurationError::Validation { .. }));
        assert!(err.suggestion().unwrap().starts_with("expected"));

        let err = parse_err(Layer::Domain, "name: [unclosed\n");
        assert!(matches!(err, ConfigurationError::Validation { .. }));
    }

    #[test]
    fn test_empty_files() {
        let err = parse_err(Layer::Domain, "# nothing here\n");
        assert!(matches!(err, ConfigurationError::File { .. }));

        let doc =
            ConfigLoader::parse_layer(Layer::Usecase, Path::new("usecase.yaml"), "").unwrap();
        assert_eq!(doc.value, serde_json::json!({}));
    }

    #[test]
    fn test_entities_list_is_normalized() {
        let doc = ConfigLoader::parse_layer(
            Layer::Entities,
            Path::new("entities.yaml"),
            "- name: Tag\n  fields:\n    - { name: label, type: str }\n",
        )
        .unwrap();
        assert_eq!(doc.value["entities"][0]["name"], "Tag");
    }

    #[test]
    fn test_directives_pass_the_typed_check() {
        let doc = ConfigLoader::parse_layer(
            Layer::Interface,
            Path::new("interface.yaml"),
            "_replace: [endpoints]\ntags: null\nendpoints:\n  - operation: list\n",
        )
        .unwrap();
        assert_eq!(doc.value["_replace"][0], "endpoints");
        assert!(doc.value["tags"].is_null());
    }

    #[tokio::test]
    async fn test_load_domain_dir_and_discover() {
        let root = tempdir().unwrap();
        let product = root.path().join("product");
        std::fs::create_dir_all(&product).unwrap();
        std::fs::write(product.join("domain.yaml"), "name: Product\n").unwrap();
        std::fs::write(product.join("usecase.yaml"), "generate_crud: false\n").unwrap();
        std::fs::create_dir_all(root.path().join("notes")).unwrap();
        std::fs::create_dir_all(root.path().join("billing")).unwrap();
        std::fs::write(root.path().join("billing/domain.yaml"), "name: Billing\n").unwrap();

        let set = ConfigLoader::load_domain_dir(&product).await.unwrap();
        assert_eq!(set.layers(), vec![Layer::Domain, Layer::Usecase]);
        assert_eq!(set.get(Layer::Usecase).unwrap().value["generate_crud"], false);

        let domains = ConfigLoader::discover_domains(root.path()).await.unwrap();
        assert_eq!(domains, vec![root.path().join("billing"), product.clone()]);

        let missing = ConfigLoader::load_domain_dir(&root.path().join("notes")).await;
        assert!(matches!(
            missing,
            Err(Error::Configuration(ConfigurationError::File { .. }))
        ));
        let missing = ConfigLoader::discover_domains(&root.path().join("nope")).await;
        assert!(missing.unwrap_err().suggestion().unwrap().contains("pyhex init"));
    }
}
