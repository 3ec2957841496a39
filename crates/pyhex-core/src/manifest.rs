//! Manifest file format for pyhex templates.
//!
//! This module defines the structure of the `manifest.yaml` file that describes
//! which Python modules a template set renders for a domain and where they go.

// Internal imports (std, crate)
use std::path::Path;

use crate::layer::Layer;

// External imports (alphabetized)
use serde::{Deserialize, Deserializer, Serialize};
use serde_value::Value as SerdeValue;
use tokio::fs;

/// Placeholder replaced by the snake_case entity name in destinations
pub const ENTITY_PLACEHOLDER: &str = "{entity}";
/// Placeholder replaced by the snake_case domain name in destinations
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// The root manifest structure for a template set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateManifest {
    /// The name of the template set
    pub name: String,

    /// A short description of what the template set generates
    #[serde(default)]
    pub description: String,

    /// The version of the template set (should follow semantic versioning)
    #[serde(default = "default_version")]
    pub version: String,

    /// Files rendered once per domain, relative to the domain directory
    pub files: Vec<TemplateFile>,

    /// Files rendered once per project, relative to the project root
    #[serde(default)]
    pub project_files: Vec<TemplateFile>,

    /// Optional hooks that run before/after generation
    #[serde(default)]
    pub hooks: TemplateHooks,
}

/// Describes a single file to be generated from a template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateFile {
    /// Name of the template, relative to the template directory
    pub source: String,

    /// Destination path for the generated file; may contain `{entity}` and `{domain}`
    pub destination: String,

    /// Configuration layer this file belongs to, used by `--only`
    #[serde(default)]
    pub layer: Layer,

    /// Render once per item of this collection (only `entity` is supported)
    #[serde(default)]
    pub for_each: Option<ForEach>,

    /// Additional context to pass to the template
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Collections a manifest file can be expanded over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForEach {
    Entity,
}

/// Hooks that run at specific points during code generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateHooks {
    /// Commands to run before code generation
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub pre_generate: Vec<String>,

    /// Commands to run after code generation
    #[serde(default, deserialize_with = "deserialize_commands")]
    pub post_generate: Vec<String>,
}

fn default_version() -> String {
    String::from("0.1.0")
}

impl TemplateFile {
    /// Destination with the placeholders substituted
    pub fn destination_for(&self, domain: &str, entity: Option<&str>) -> String {
        let destination = self.destination.replace(DOMAIN_PLACEHOLDER, domain);
        match entity {
            Some(entity) => destination.replace(ENTITY_PLACEHOLDER, entity),
            None => destination,
        }
    }
}

impl TemplateManifest {
    /// Manifest of the built-in FastAPI + SQLModel templates
    pub fn builtin() -> Result<Self, crate::Error> {
        Self::parse(crate::templates::BUILTIN_MANIFEST, "<built-in manifest.yaml>")
    }

    /// Parse manifest YAML, naming `origin` in errors
    pub fn parse(content: &str, origin: &str) -> Result<Self, crate::Error> {
        let manifest: Self = serde_yaml::from_str(content).map_err(|e| {
            crate::Error::Template(format!("Invalid YAML in template manifest at {origin}: {e}"))
        })?;

        for file in &manifest.files {
            if file.destination.contains(ENTITY_PLACEHOLDER) && file.for_each.is_none() {
                return Err(crate::Error::Template(format!(
                    "Template manifest at {origin}: destination `{}` uses {ENTITY_PLACEHOLDER} without `for_each: entity`",
                    file.destination
                )));
            }
        }
        Ok(manifest)
    }

    /// Load a template manifest from a directory.
    ///
    /// Looks for a `manifest.yaml` file in the specified directory and parses it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist, can't be read, or contains invalid YAML.
    pub async fn load_from_dir(template_dir: &Path) -> Result<Self, crate::Error> {
        let manifest_path = template_dir.join("manifest.yaml");
        log::debug!("Reading template manifest from {}", manifest_path.display());

        let content = fs::read_to_string(&manifest_path).await.map_err(|e| {
            crate::Error::Template(format!(
                "Failed to read template manifest at {}: {}",
                manifest_path.display(),
                e
            ))
        })?;

        Self::parse(&content, &manifest_path.display().to_string())
    }

    /// Domain files whose layer is in `only` (all of them when `only` is empty)
    pub fn files_for<'a>(&'a self, only: &'a [Layer]) -> impl Iterator<Item = &'a TemplateFile> {
        self.files
            .iter()
            .filter(move |file| only.is_empty() || only.contains(&file.layer))
    }
}

/// Helper function to deserialize either a single command or a list of commands
fn deserialize_commands<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // Try to deserialize as a single string or a vector of strings
    let value = SerdeValue::deserialize(deserializer)?;

    match value {
        SerdeValue::String(s) => Ok(vec![s]),
        SerdeValue::Seq(seq) => seq
            .into_iter()
            .map(|item| match item {
                SerdeValue::String(s) => Ok(s),
                _ => Err(serde::de::Error::custom(
                    "Expected string or array of strings",
                )),
            })
            .collect(),
        _ => Err(serde::de::Error::custom(
            "Expected string or array of strings",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builtin_manifest_covers_every_layer() {
        let manifest = TemplateManifest::builtin().unwrap();
        assert_eq!(manifest.name, "fastapi_sqlmodel");
        for layer in [
            Layer::Domain,
            Layer::Entities,
            Layer::Usecase,
            Layer::BusinessRules,
            Layer::Repository,
            Layer::Interface,
        ] {
            assert!(
                manifest.files.iter().any(|f| f.layer == layer),
                "no file for layer {layer}"
            );
        }
        assert!(manifest
            .project_files
            .iter()
            .any(|f| f.destination == "app/routers.py"));
    }

    #[test]
    fn test_files_for_filters_by_layer() {
        let manifest = TemplateManifest::builtin().unwrap();
        let only = [Layer::Repository];
        let files: Vec<_> = manifest.files_for(&only).collect();
        assert!(!files.is_empty());
        assert!(files.iter().all(|f| f.layer == Layer::Repository));
        assert_eq!(manifest.files_for(&[]).count(), manifest.files.len());
    }

    #[test]
    fn test_hooks_accept_single_command_or_list() {
        let manifest = TemplateManifest::parse(
            r#"
name: custom
files:
  - source: model.py.tera
    destination: "models/{entity}.py"
    for_each: entity
    layer: entities
hooks:
  post_generate: ruff format .
"#,
            "test",
        )
        .unwrap();
        assert_eq!(manifest.hooks.post_generate, vec!["ruff format ."]);
        assert!(manifest.hooks.pre_generate.is_empty());
        assert_eq!(manifest.files[0].for_each, Some(ForEach::Entity));
        assert_eq!(
            manifest.files[0].destination_for("shop", Some("order_item")),
            "models/order_item.py"
        );

        let manifest = TemplateManifest::parse(
            "name: custom\nfiles: []\nhooks:\n  post_generate: [\"a\", \"b\"]\n",
            "test",
        )
        .unwrap();
        assert_eq!(manifest.hooks.post_generate, vec!["a", "b"]);

        let err = TemplateManifest::parse(
            "name: custom\nfiles: []\nhooks:\n  post_generate: 3\n",
            "test",
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_entity_placeholder_requires_for_each() {
        let result = TemplateManifest::parse(
            "name: custom\nfiles:\n  - source: a.tera\n    destination: \"{entity}.py\"\n",
            "test",
        );
        assert!(matches!(result, Err(crate::Error::Template(msg)) if msg.contains("for_each")));
    }

    #[tokio::test]
    async fn test_load_from_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("manifest.yaml"),
            "name: mine\nfiles:\n  - source: x.tera\n    destination: \"{domain}_x.py\"\n",
        )
        .unwrap();
        let manifest = TemplateManifest::load_from_dir(dir.path()).await.unwrap();
        assert_eq!(manifest.files[0].layer, Layer::Domain);
        assert_eq!(manifest.files[0].destination_for("shop", None), "shop_x.py");

        let missing = TemplateManifest::load_from_dir(&dir.path().join("nope")).await;
        assert!(missing.is_err());
    }
}
