//! Code generation for domains and projects.
//!
//! [`DomainGenerator`] renders the manifest files of one domain directory;
//! [`Generator`] discovers every domain of a project, renders the selected
//! ones and the project-level files (`app/routers.py`) that aggregate them.
//! Existing files go through [`write_generated`], which applies the write
//! policy and carries `@pyhex` regions over.

// Internal imports (std, crate)
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::builders::DomainContext;
use crate::config::Config;
use crate::error::{ConfigurationError, Error, Result, ValidationIssue};
use crate::layer::Layer;
use crate::loader::ConfigLoader;
use crate::manifest::{ForEach, TemplateFile};
use crate::merger::ConfigMerger;
use crate::preserve::{is_generated, is_kept, splice};
use crate::schema::MergedConfig;
use crate::templates::TemplateManager;
use crate::utils::{did_you_mean, to_snake_case};
use crate::validation::{validate_output, OutputIssue};

// External imports (alphabetized)
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tokio::fs;

/// Options of one generation run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Overwrite files that lack the generated header
    pub force: bool,
    /// Compute the report without touching the filesystem
    pub dry_run: bool,
    /// Render only the files of these layers; empty means all
    pub only: Vec<Layer>,
    /// Check syntax and imports of the written files
    pub validate_output: bool,
    /// Interpreter used by the output check
    pub python: String,
    /// Run the manifest's pre- and post-generation hooks
    pub run_hooks: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            force: false,
            dry_run: false,
            only: Vec::new(),
            validate_output: false,
            python: "python3".to_string(),
            run_hooks: true,
        }
    }
}

/// What happened to one output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// Content changed (or would change, in a dry run)
    Written,
    /// Rendered content equals the file on disk
    Unchanged,
    /// Existing file is not generated by pyhex and `force` is off
    Skipped,
    /// File carries the keep marker
    Kept,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::Kept => "kept",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub action: FileAction,
    /// Regions whose hand-written body was carried over
    pub preserved: Vec<String>,
    /// Regions moved to the orphaned block
    pub orphaned: Vec<String>,
}

impl FileOutcome {
    fn new(path: &Path, action: FileAction) -> Self {
        Self {
            path: path.to_path_buf(),
            action,
            preserved: Vec::new(),
            orphaned: Vec::new(),
        }
    }
}

/// Result of generating one or more domains
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub files: Vec<FileOutcome>,
    /// Non-fatal configuration findings
    pub warnings: Vec<ValidationIssue>,
    /// Problems found in the generated code
    pub output_issues: Vec<OutputIssue>,
}

impl GenerationReport {
    pub fn count(&self, action: FileAction) -> usize {
        self.files.iter().filter(|f| f.action == action).count()
    }

    pub fn merge(&mut self, other: GenerationReport) {
        self.files.extend(other.files);
        self.warnings.extend(other.warnings);
        self.output_issues.extend(other.output_issues);
    }

    /// Files that exist on disk with their rendered content
    pub fn current_files(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter(|f| matches!(f.action, FileAction::Written | FileAction::Unchanged))
            .map(|f| f.path.clone())
            .collect()
    }

    /// One-line summary, e.g. `7 written, 1 unchanged, 0 skipped, 0 kept`
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} written, {} unchanged, {} skipped, {} kept",
            self.count(FileAction::Written),
            self.count(FileAction::Unchanged),
            self.count(FileAction::Skipped),
            self.count(FileAction::Kept)
        );
        if !self.output_issues.is_empty() {
            summary.push_str(&format!(", {} output issue(s)", self.output_issues.len()));
        }
        summary
    }
}

/// Write `rendered` to `path` following the write policy.
///
/// Keep-marked files are never touched. Files without the generated header
/// are skipped unless `force` is set. Otherwise the regions of the existing
/// file are spliced into `rendered` before comparing and writing.
pub async fn write_generated(
    path: &Path,
    rendered: &str,
    options: &GenerateOptions,
) -> Result<FileOutcome> {
    let existing = match fs::read_to_string(path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    let (content, preserved, orphaned) = match existing.as_deref() {
        None => (rendered.to_string(), Vec::new(), Vec::new()),
        Some(old) if is_kept(old) => {
            log::info!("Keeping {} (marked @pyhex:keep)", path.display());
            return Ok(FileOutcome::new(path, FileAction::Kept));
        }
        Some(old) if !is_generated(old) => {
            if !options.force {
                log::warn!(
                    "Skipping {}: not generated by pyhex (use --force to overwrite)",
                    path.display()
                );
                return Ok(FileOutcome::new(path, FileAction::Skipped));
            }
            (rendered.to_string(), Vec::new(), Vec::new())
        }
        Some(old) => {
            let spliced = splice(rendered, old).map_err(|e| match e {
                Error::Preserve(message) => {
                    Error::preserve(format!("{}: {message}", path.display()))
                }
                other => other,
            })?;
            (spliced.content, spliced.preserved, spliced.orphaned)
        }
    };

    for name in &orphaned {
        log::warn!(
            "{}: region `{name}` no longer exists in the template; kept in the orphaned block",
            path.display()
        );
    }

    if existing.as_deref() == Some(content.as_str()) {
        log::debug!("Unchanged {}", path.display());
        return Ok(FileOutcome {
            preserved,
            orphaned,
            ..FileOutcome::new(path, FileAction::Unchanged)
        });
    }

    if options.dry_run {
        log::info!("Would write {}", path.display());
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, &content).await?;
        log::debug!("Wrote {}", path.display());
    }

    Ok(FileOutcome {
        preserved,
        orphaned,
        ..FileOutcome::new(path, FileAction::Written)
    })
}

/// Dotted Python package of a domain directory: `domain.package` when set,
/// otherwise the directory path relative to the project root
pub fn package_for(configured: Option<&str>, dir: &Path, project_root: &Path) -> Result<String> {
    if let Some(package) = configured {
        return Ok(package.to_string());
    }
    let relative = dir.strip_prefix(project_root).map_err(|_| {
        Error::Configuration(
            ConfigurationError::file(
                dir,
                format!(
                    "domain directory is outside the project root {}",
                    project_root.display()
                ),
            )
            .with_suggestion("set `package` in domain.yaml"),
        )
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return Err(Error::generation(format!(
            "{} is the project root, not a domain directory",
            dir.display()
        )));
    }
    Ok(parts.join("."))
}

async fn canonical_dir(dir: &Path) -> Result<PathBuf> {
    fs::canonicalize(dir).await.map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ConfigurationError::file(dir, "directory not found").into()
        } else {
            Error::from(e)
        }
    })
}

/// Generates the modules of one domain directory
#[derive(Debug, Clone)]
pub struct DomainGenerator {
    templates: TemplateManager,
    project_root: PathBuf,
    external_entities: BTreeSet<String>,
}

impl DomainGenerator {
    pub fn new(templates: TemplateManager, project_root: impl Into<PathBuf>) -> Self {
        Self {
            templates,
            project_root: project_root.into(),
            external_entities: BTreeSet::new(),
        }
    }

    /// Qualified names (`domain.Entity`) of the entities of sibling domains
    pub fn with_external_entities(mut self, entities: BTreeSet<String>) -> Self {
        self.external_entities = entities;
        self
    }

    /// Load, merge and validate the layers of `dir`, render its manifest
    /// files and write them next to the configuration
    pub async fn generate_domain(
        &self,
        dir: &Path,
        options: &GenerateOptions,
    ) -> Result<GenerationReport> {
        let dir = canonical_dir(dir).await?;
        let root = canonical_dir(&self.project_root).await?;
        log::info!("Generating domain in {}", dir.display());

        let merged = ConfigMerger::new()
            .with_external_entities(self.external_entities.clone())
            .load(&dir)
            .await?;
        let config = &merged.config;
        let package = package_for(config.domain.package.as_deref(), &dir, &root)?;
        let context = DomainContext::build(self.templates.template_kind(), config, &package)?;

        let templates = self.templates.with_overrides(&dir).await?;
        for name in templates.overridden() {
            log::info!("Using co-located template {name}");
        }

        if options.run_hooks && !options.dry_run {
            templates.execute_pre_generation_hooks(&dir).await?;
        }

        let mut report = GenerationReport {
            warnings: merged.warnings.clone(),
            ..GenerationReport::default()
        };
        let domain = config.domain.snake_name();
        for file in templates.manifest().files_for(&options.only) {
            for (destination, rendered) in render_manifest_file(&templates, file, &context, &domain)? {
                let outcome = write_generated(&dir.join(destination), &rendered, options).await?;
                report.files.push(outcome);
            }
        }

        if options.run_hooks && !options.dry_run {
            templates.execute_post_generation_hooks(&dir).await?;
        }

        if options.validate_output && !options.dry_run {
            report.output_issues =
                validate_output(&report.current_files(), &root, &options.python).await?;
        }

        log::info!("{}: {}", config.domain.name, report.summary());
        Ok(report)
    }
}

/// Render one manifest entry, expanding `for_each` entries per entity
fn render_manifest_file(
    templates: &TemplateManager,
    file: &TemplateFile,
    context: &JsonValue,
    domain: &str,
) -> Result<Vec<(String, String)>> {
    match file.for_each {
        None => Ok(vec![(
            file.destination_for(domain, None),
            templates.render_file(file, context)?,
        )]),
        Some(ForEach::Entity) => {
            let entities = context
                .get("entities")
                .and_then(JsonValue::as_array)
                .cloned()
                .unwrap_or_default();
            let mut rendered = Vec::with_capacity(entities.len());
            for entity in entities {
                let snake = entity
                    .get("snake")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                let mut entity_context = context.clone();
                if let Some(map) = entity_context.as_object_mut() {
                    map.insert("entity".to_string(), entity);
                }
                rendered.push((
                    file.destination_for(domain, Some(&snake)),
                    templates.render_file(file, &entity_context)?,
                ));
            }
            Ok(rendered)
        }
    }
}

/// What the first pass over a project learns about one domain
#[derive(Debug, Clone, Serialize)]
pub struct DomainSummary {
    pub dir: PathBuf,
    pub name: String,
    pub snake: String,
    pub package: String,
    pub entities: Vec<String>,
}

impl DomainSummary {
    /// Summarize the unvalidated merge of a domain's layers
    async fn read(dir: &Path, root: &Path) -> Result<Self> {
        let set = ConfigLoader::load_domain_dir(dir).await?;
        let tree = ConfigMerger::new().merge_values(&set);
        let domain = &tree["domain"];
        let name = domain["name"].as_str().unwrap_or_default().to_string();
        let entities = domain["entities"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|e| e["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            dir: dir.to_path_buf(),
            snake: to_snake_case(&name),
            package: package_for(domain["package"].as_str(), dir, root)?,
            name,
            entities,
        })
    }

    fn matches(&self, requested: &str) -> bool {
        self.name == requested
            || self.snake == to_snake_case(requested)
            || self.dir.file_name().and_then(|n| n.to_str()) == Some(requested)
    }
}

/// Generates the domains of a project and the files aggregating them
#[derive(Debug, Clone)]
pub struct Generator {
    project_root: PathBuf,
    config: Config,
    templates: TemplateManager,
}

impl Generator {
    pub fn new(project_root: impl Into<PathBuf>, config: Config, templates: TemplateManager) -> Self {
        Self {
            project_root: project_root.into(),
            config,
            templates,
        }
    }

    /// Create a generator with the templates named by `config`.
    ///
    /// `template_dir` takes precedence over `config.template_dir`, which is
    /// resolved against the project root.
    pub async fn from_config(
        project_root: impl Into<PathBuf>,
        config: Config,
        template_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let project_root = project_root.into();
        let template_dir = template_dir.or_else(|| {
            config
                .template_dir
                .as_ref()
                .map(|dir| project_root.join(dir))
        });
        let templates = TemplateManager::new(config.template_kind, template_dir).await?;
        Ok(Self::new(project_root, config, templates))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn templates(&self) -> &TemplateManager {
        &self.templates
    }

    /// Every domain directory of the project with what it declares
    pub async fn domains(&self) -> Result<Vec<DomainSummary>> {
        let root = canonical_dir(&self.project_root).await?;
        let dirs = ConfigLoader::discover_domains(&self.config.domains_path(&root)).await?;
        let mut domains = Vec::with_capacity(dirs.len());
        for dir in dirs {
            domains.push(DomainSummary::read(&dir, &root).await?);
        }
        Ok(domains)
    }

    /// Generate every domain of the project
    pub async fn generate_all(&self, options: &GenerateOptions) -> Result<GenerationReport> {
        self.generate(&[], options).await
    }

    /// Generate the named domains (all of them when `requested` is empty)
    /// and the project files
    pub async fn generate(
        &self,
        requested: &[String],
        options: &GenerateOptions,
    ) -> Result<GenerationReport> {
        let root = canonical_dir(&self.project_root).await?;
        let domains = self.domains().await?;
        if domains.is_empty() {
            log::warn!(
                "No domains found in {}",
                self.config.domains_path(&root).display()
            );
        }

        let mut selected = Vec::new();
        for name in requested {
            let domain = domains.iter().find(|d| d.matches(name)).ok_or_else(|| {
                let mut error = ConfigurationError::file(
                    self.config.domains_path(&root),
                    format!("unknown domain `{name}`"),
                );
                if let Some(hint) = did_you_mean(name, domains.iter().map(|d| d.snake.as_str())) {
                    error = error.with_suggestion(hint);
                }
                Error::from(error)
            })?;
            selected.push(domain);
        }
        if requested.is_empty() {
            selected.extend(domains.iter());
        }

        let external: BTreeSet<String> = domains
            .iter()
            .flat_map(|d| d.entities.iter().map(move |e| format!("{}.{e}", d.snake)))
            .collect();

        let mut report = GenerationReport::default();
        for domain in selected {
            let generator = DomainGenerator::new(self.templates.clone(), root.clone())
                .with_external_entities(external.clone());
            report.merge(generator.generate_domain(&domain.dir, options).await?);
        }

        if options.only.is_empty() || options.only.contains(&Layer::Interface) {
            report.merge(self.generate_project_files(&root, &domains, options).await?);
        }

        log::info!("{}", report.summary());
        Ok(report)
    }

    /// Render the manifest's project files (the router aggregate)
    async fn generate_project_files(
        &self,
        root: &Path,
        domains: &[DomainSummary],
        options: &GenerateOptions,
    ) -> Result<GenerationReport> {
        let context = json!({
            "pyhex_version": env!("CARGO_PKG_VERSION"),
            "project_name": self.config.project_name,
            "package": self.config.app_package(),
            "domains": domains
                .iter()
                .map(|d| json!({ "name": d.name, "snake": d.snake, "package": d.package }))
                .collect::<Vec<_>>(),
        });

        let mut report = GenerationReport::default();
        for file in &self.templates.manifest().project_files {
            if !self.templates.has_template(&file.source) {
                log::debug!("No template {} for project file, skipping", file.source);
                continue;
            }
            let rendered = self.templates.render_file(file, &context)?;
            let path = root.join(file.destination_for("", None));
            report.files.push(write_generated(&path, &rendered, options).await?);
        }

        if options.validate_output && !options.dry_run {
            report.output_issues =
                validate_output(&report.current_files(), root, &options.python).await?;
        }
        Ok(report)
    }

    /// Merge and validate one domain without rendering anything
    pub async fn check_domain(&self, dir: &Path) -> Result<MergedConfig> {
        let external = self
            .domains()
            .await?
            .iter()
            .flat_map(|d| d.entities.iter().map(move |e| format!("{}.{e}", d.snake)))
            .collect();
        let merged = ConfigMerger::new()
            .with_external_entities(external)
            .load(dir)
            .await?;
        Ok(merged.config)
    }
}
