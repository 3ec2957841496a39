//! Template system for code generation

// Internal imports (std, crate)
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::task;

use crate::{
    error::{Error, Result},
    manifest::{TemplateFile, TemplateManifest},
};

use super::{builtin_source, filters, TemplateDir, TemplateKind, BUILTIN_TEMPLATES};

// External imports (alphabetized)
use serde_json::{Map, Value as JsonValue};
use tera::{Context, Tera};

/// Upper bound for a single generation hook
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(120);

const TEMPLATE_EXTENSION: &str = "tera";

/// Manages loading and rendering of code generation templates.
///
/// Templates are layered: the built-in set first, then a custom template
/// directory, then co-located `*.tera` files of a domain directory. A later
/// source replaces an earlier template with the same name.
#[derive(Debug, Clone)]
pub struct TemplateManager {
    /// Cached Tera template engine instance
    tera: Arc<Tera>,
    /// Custom template directory, if one was found
    template_dir: Option<TemplateDir>,
    /// The template manifest
    manifest: Arc<TemplateManifest>,
    kind: TemplateKind,
    /// Templates replaced by co-located overrides, with their file paths
    overrides: Vec<(String, PathBuf)>,
}

impl TemplateManager {
    /// Create a new TemplateManager for the given template kind and directory
    ///
    /// # Arguments
    /// * `template_kind` - The kind of template to use
    /// * `template_dir` - Optional path to a custom template directory. If None, the standard locations are searched.
    ///
    /// # Returns
    /// A new `TemplateManager` instance or an error if the templates cannot be found or parsed.
    pub async fn new(template_kind: TemplateKind, template_dir: Option<PathBuf>) -> Result<Self> {
        let template_dir = TemplateDir::discover(template_kind, template_dir.as_deref())?;

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        filters::register(&mut tera);

        if template_kind.uses_builtin() {
            tera.add_raw_templates(BUILTIN_TEMPLATES.iter().copied())
                .map_err(|e| Error::template(format!("Failed to parse built-in templates: {e}")))?;
        }

        let manifest = match &template_dir {
            Some(dir) => {
                let files = Self::discover_template_files(dir.template_path()).await?;
                log::debug!(
                    "Loading {} template(s) from {}",
                    files.len(),
                    dir.display()
                );
                let named = files
                    .iter()
                    .map(|path| (path.clone(), Some(template_name(dir.template_path(), path))))
                    .collect::<Vec<_>>();
                tera.add_template_files(named).map_err(|e| {
                    Error::template(format!(
                        "Failed to parse templates in {}: {}",
                        dir.display(),
                        error_chain(&e)
                    ))
                })?;

                if dir.template_path().join("manifest.yaml").is_file() {
                    TemplateManifest::load_from_dir(dir.template_path()).await?
                } else if template_kind.uses_builtin() {
                    TemplateManifest::builtin()?
                } else {
                    return Err(Error::template(format!(
                        "Custom template directory {} has no manifest.yaml",
                        dir.display()
                    )));
                }
            }
            None => TemplateManifest::builtin()?,
        };

        Ok(TemplateManager {
            tera: Arc::new(tera),
            template_dir,
            manifest: Arc::new(manifest),
            kind: template_kind,
            overrides: Vec::new(),
        })
    }

    /// A copy of this manager with the co-located `*.tera` files of `dir`
    /// layered on top. Only files directly inside `dir` are considered.
    pub async fn with_overrides(&self, dir: &Path) -> Result<Self> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some(TEMPLATE_EXTENSION)
            {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Ok(self.clone());
        }
        files.sort();

        let mut tera = (*self.tera).clone();
        let mut overrides = Vec::with_capacity(files.len());
        for path in files {
            let name = template_name(dir, &path);
            if !self.has_template(&name) {
                log::warn!(
                    "{}: no template named `{name}` to override; it is loaded but unused unless referenced",
                    path.display()
                );
            }
            log::debug!("Template override: {} -> {}", path.display(), name);
            overrides.push((name, path));
        }
        tera.add_template_files(
            overrides
                .iter()
                .map(|(name, path)| (path.clone(), Some(name.clone())))
                .collect::<Vec<(PathBuf, Option<String>)>>(),
        )
        .map_err(|e| {
            Error::template(format!(
                "Failed to parse template overrides in {}: {}",
                dir.display(),
                error_chain(&e)
            ))
        })?;

        Ok(TemplateManager {
            tera: Arc::new(tera),
            template_dir: self.template_dir.clone(),
            manifest: Arc::clone(&self.manifest),
            kind: self.kind,
            overrides,
        })
    }

    /// Get the template kind this template manager is configured for
    pub fn template_kind(&self) -> TemplateKind {
        self.kind
    }

    /// Get the custom template directory, if any
    pub fn template_dir(&self) -> Option<&TemplateDir> {
        self.template_dir.as_ref()
    }

    /// Get a reference to the template manifest
    pub fn manifest(&self) -> &TemplateManifest {
        &self.manifest
    }

    /// Names of templates replaced by co-located overrides
    pub fn overridden(&self) -> impl Iterator<Item = &str> {
        self.overrides.iter().map(|(name, _)| name.as_str())
    }

    /// Discovers all template files in the given directory and its subdirectories.
    ///
    /// This function uses `spawn_blocking` to avoid blocking the async runtime
    /// during filesystem operations.
    pub async fn discover_template_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let dir_buf = dir.to_path_buf();

        task::spawn_blocking(move || {
            let mut templates = Vec::new();

            fn walk_dir(dir: &Path, templates: &mut Vec<PathBuf>) -> std::io::Result<()> {
                for entry in std::fs::read_dir(dir)? {
                    let entry = entry?;
                    let path = entry.path();

                    if path.is_dir() {
                        walk_dir(&path, templates)?;
                    } else if path.extension().and_then(|s| s.to_str()) == Some(TEMPLATE_EXTENSION)
                    {
                        templates.push(path);
                    }
                }
                Ok(())
            }

            walk_dir(&dir_buf, &mut templates)?;
            templates.sort();
            Ok(templates)
        })
        .await
        .map_err(|e| io::Error::other(format!("Failed to join blocking task: {}", e)))?
    }

    /// Check if a template exists
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template(name).is_ok()
    }

    /// List manifest files whose template is available, as `(source, destination)`
    pub fn list_templates(&self) -> Vec<(String, String)> {
        self.manifest
            .files
            .iter()
            .chain(self.manifest.project_files.iter())
            .filter(|f| self.has_template(&f.source))
            .map(|f| (f.source.clone(), f.destination.clone()))
            .collect()
    }

    /// Render a template with a JSON object context
    pub fn render(&self, template_name: &str, context: &JsonValue) -> Result<String> {
        let context_map = context
            .as_object()
            .ok_or_else(|| Error::template("Context must be a JSON object".to_string()))?;

        log::debug!("Rendering template: {}", template_name);
        self.tera.get_template(template_name).map_err(|e| {
            Error::template(format!("Template not found: {} - {}", template_name, e))
        })?;

        let tera_context = Context::from_serialize(context)?;
        match self.tera.render(template_name, &tera_context) {
            Ok(content) => Ok(content),
            Err(e) => {
                log::error!("Template rendering failed for '{}': {}", template_name, e);
                log::error!(
                    "Available context keys: {:?}",
                    context_map.keys().collect::<Vec<_>>()
                );
                Err(Error::template(format!(
                    "Failed to render template '{}' ({}): {}",
                    template_name,
                    self.origin(template_name),
                    error_chain(&e)
                )))
            }
        }
    }

    /// Render one manifest file, with its own context merged over `base_context`
    pub fn render_file(&self, file: &TemplateFile, base_context: &JsonValue) -> Result<String> {
        let context = self.create_file_context(base_context, file)?;
        if let Some(map) = context.as_object() {
            Self::validate_context(&file.source, map, &["pyhex_version"])?;
        }
        self.render(&file.source, &context)
    }

    /// Where a template was loaded from, for error messages
    fn origin(&self, template_name: &str) -> String {
        if let Some((_, path)) = self.overrides.iter().find(|(n, _)| n == template_name) {
            return path.display().to_string();
        }
        if let Some(dir) = &self.template_dir {
            let path = dir.template_path().join(template_name);
            if path.is_file() {
                return path.display().to_string();
            }
        }
        match builtin_source(template_name) {
            Some(_) => format!("built-in {template_name}"),
            None => template_name.to_string(),
        }
    }

    /// Validates that all required context variables are present
    fn validate_context(
        template: &str,
        context: &Map<String, JsonValue>,
        required_vars: &[&str],
    ) -> crate::Result<()> {
        let missing: Vec<&str> = required_vars
            .iter()
            .filter(|var| !context.contains_key(**var))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(crate::Error::template(format!(
                "Missing required context variables for template '{}': {}",
                template,
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Execute pre-generation hooks from the manifest
    pub async fn execute_pre_generation_hooks(&self, output_path: &Path) -> crate::Result<()> {
        run_hooks("pre-generation", &self.manifest.hooks.pre_generate, output_path).await
    }

    /// Execute post-generation hooks from the manifest
    pub async fn execute_post_generation_hooks(&self, output_path: &Path) -> crate::Result<()> {
        run_hooks("post-generation", &self.manifest.hooks.post_generate, output_path).await
    }

    /// Merge base context with file context, giving precedence to file context keys
    pub fn create_file_context(
        &self,
        base_context: &JsonValue,
        file: &TemplateFile,
    ) -> crate::Result<JsonValue> {
        let mut context = if let JsonValue::Object(file_ctx) = &file.context {
            file_ctx.clone()
        } else {
            Map::new()
        };
        if let JsonValue::Object(base_map) = base_context {
            for (k, v) in base_map {
                if !context.contains_key(k) {
                    context.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(JsonValue::Object(context))
    }
}

async fn run_hooks(stage: &str, commands: &[String], dir: &Path) -> crate::Result<()> {
    use tokio::process::Command as AsyncCommand;

    for command in commands {
        log::info!("Running {} hook: {}", stage, command);
        let child = AsyncCommand::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(HOOK_TIMEOUT, child)
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "{} hook '{}' timed out after {}s",
                        stage,
                        command,
                        HOOK_TIMEOUT.as_secs()
                    ),
                )
            })?
            .map_err(|e| {
                io::Error::other(format!(
                    "Failed to execute {} hook '{}': {}",
                    stage, command, e
                ))
            })?;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{} hook '{}' failed with status {}\n{}{}",
                stage,
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr),
                String::from_utf8_lossy(&output.stdout)
            ))
            .into());
        }
    }
    Ok(())
}

/// Template name of `path` relative to `root`, with `/` separators
fn template_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Tera errors keep the useful part (line, variable) in their sources
fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::TemplateHooks;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_validate_context() {
        let mut context = Map::new();
        context.insert("foo".to_string(), json!("bar"));
        context.insert("baz".to_string(), json!(123));

        assert!(TemplateManager::validate_context("test_template", &context, &[]).is_ok());
        assert!(
            TemplateManager::validate_context("test_template", &context, &["foo", "baz"]).is_ok()
        );

        let result =
            TemplateManager::validate_context("test_template", &context, &["foo", "missing"]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Missing required context variables"));
        assert!(err.contains("missing"));
    }

    #[tokio::test]
    async fn test_builtin_templates_load() -> Result<()> {
        let temp_dir = tempdir()?;
        // An empty explicit directory keeps the lookup away from the environment
        let manager =
            TemplateManager::new(TemplateKind::FastapiSqlmodel, Some(temp_dir.path().into()))
                .await?;
        assert_eq!(manager.template_kind(), TemplateKind::FastapiSqlmodel);
        for file in &manager.manifest().files {
            assert!(manager.has_template(&file.source), "{}", file.source);
        }
        assert!(manager.has_template("project/main.py.tera"));
        assert_eq!(manager.list_templates().len(), manager.manifest().files.len() + 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_templates_and_overrides() -> Result<()> {
        let temp_dir = tempdir()?;
        let template_dir = temp_dir.path().join("custom");
        tokio::fs::create_dir_all(template_dir.join("nested")).await?;
        tokio::fs::write(template_dir.join("hello.tera"), "Hello {{ name | pascal_case }}!").await?;
        tokio::fs::write(template_dir.join("nested/part.tera"), "part").await?;
        tokio::fs::write(
            template_dir.join("manifest.yaml"),
            "name: custom\nfiles:\n  - source: hello.tera\n    destination: hello.txt\n",
        )
        .await?;

        let manager =
            TemplateManager::new(TemplateKind::Custom, Some(temp_dir.path().into())).await?;
        assert!(manager.has_template("hello.tera"));
        assert!(manager.has_template("nested/part.tera"));
        assert!(!manager.has_template("entities.py.tera"));
        assert_eq!(
            manager.render("hello.tera", &json!({"name": "order_item"}))?,
            "Hello OrderItem!"
        );

        let domain_dir = temp_dir.path().join("domain");
        tokio::fs::create_dir_all(&domain_dir).await?;
        tokio::fs::write(domain_dir.join("hello.tera"), "Hi {{ name }}").await?;
        tokio::fs::write(domain_dir.join("notes.txt"), "ignored").await?;
        let local = manager.with_overrides(&domain_dir).await?;
        assert_eq!(local.render("hello.tera", &json!({"name": "x"}))?, "Hi x");
        assert_eq!(local.overridden().collect::<Vec<_>>(), vec!["hello.tera"]);
        // The original manager is untouched
        assert_eq!(manager.render("hello.tera", &json!({"name": "x"}))?, "Hello X!");
        Ok(())
    }

    #[tokio::test]
    async fn test_custom_kind_requires_manifest() {
        let temp_dir = tempdir().unwrap();
        tokio::fs::write(temp_dir.path().join("a.tera"), "a").await.unwrap();
        let result = TemplateManager::new(TemplateKind::Custom, Some(temp_dir.path().into())).await;
        assert!(matches!(result, Err(Error::Template(msg)) if msg.contains("manifest.yaml")));
    }

    #[tokio::test]
    async fn test_render_errors_name_the_template() -> Result<()> {
        let temp_dir = tempdir()?;
        let domain_dir = temp_dir.path().join("domain");
        tokio::fs::create_dir_all(&domain_dir).await?;
        tokio::fs::write(domain_dir.join("entities.py.tera"), "{{ missing.value }}").await?;

        let manager =
            TemplateManager::new(TemplateKind::FastapiSqlmodel, Some(temp_dir.path().into()))
                .await?
                .with_overrides(&domain_dir)
                .await?;
        let err = manager
            .render("entities.py.tera", &json!({"pyhex_version": "0"}))
            .unwrap_err()
            .to_string();
        assert!(err.contains("entities.py.tera"));
        assert!(err.contains("missing.value"));

        assert!(manager.render("nope.tera", &json!({})).is_err());
        assert!(manager.render("entities.py.tera", &json!([1])).is_err());
        Ok(())
    }

    #[test]
    fn test_create_file_context_prefers_file_keys() {
        let manager = TemplateManager {
            tera: Arc::new(Tera::default()),
            template_dir: None,
            manifest: Arc::new(TemplateManifest {
                name: "t".into(),
                description: String::new(),
                version: "0.1.0".into(),
                files: vec![],
                project_files: vec![],
                hooks: TemplateHooks::default(),
            }),
            kind: TemplateKind::Custom,
            overrides: Vec::new(),
        };
        let file = TemplateFile {
            source: "a.tera".into(),
            destination: "a.py".into(),
            context: json!({"mode": "file"}),
            ..TemplateFile::default()
        };
        let merged = manager
            .create_file_context(&json!({"mode": "base", "other": 1}), &file)
            .unwrap();
        assert_eq!(merged, json!({"mode": "file", "other": 1}));
    }

    #[tokio::test]
    async fn test_post_generation_hooks() -> Result<()> {
        let temp_dir = tempdir()?;
        let mut manifest = TemplateManifest::builtin()?;
        manifest.hooks = TemplateHooks {
            pre_generate: vec![],
            post_generate: vec!["echo done > hook.txt".to_string()],
        };
        let manager = TemplateManager {
            tera: Arc::new(Tera::default()),
            template_dir: None,
            manifest: Arc::new(manifest.clone()),
            kind: TemplateKind::FastapiSqlmodel,
            overrides: Vec::new(),
        };
        manager.execute_post_generation_hooks(temp_dir.path()).await?;
        let written = tokio::fs::read_to_string(temp_dir.path().join("hook.txt")).await?;
        assert_eq!(written.trim(), "done");

        manifest.hooks.post_generate = vec!["echo oops >&2; exit 3".to_string()];
        let failing = TemplateManager {
            manifest: Arc::new(manifest),
            ..manager
        };
        let err = failing
            .execute_post_generation_hooks(temp_dir.path())
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("oops"));
        Ok(())
    }
}
