//! Project scaffolding (`pyhex init`).
//!
//! Lays out a FastAPI application with an empty domains package, writes
//! `pyproject.toml` and `pyhex.yaml`, optionally adds the example `product`
//! domain and generates it, and finally runs `uv sync`.

// Internal imports (std, crate)
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, CONFIG_FILE};
use crate::error::{ConfigurationError, Error, Result};
use crate::generate::{write_generated, FileAction, GenerateOptions, GenerationReport, Generator};
use crate::templates::{TemplateManager, EXAMPLE_DOMAIN};
use crate::utils::to_snake_case;

// External imports (alphabetized)
use serde::Serialize;
use serde_json::json;
use tokio::fs;
use tokio::process::Command;

/// Upper bound for `uv sync`
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

const RUNTIME_DEPENDENCIES: &[&str] = &[
    "fastapi>=0.110",
    "pydantic-settings>=2.2",
    "sqlmodel>=0.0.16",
    "uvicorn[standard]>=0.29",
];
const DEV_DEPENDENCIES: &[&str] = &["httpx>=0.27", "pytest>=8.0"];

/// Options of `pyhex init`
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub python_version: String,
    /// Add and generate the example `product` domain
    pub example: bool,
    /// Run `uv sync` once the files are written
    pub install: bool,
    /// Initialize a directory that is not empty
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            python_version: "3.11".to_string(),
            example: false,
            install: true,
            force: false,
        }
    }
}

/// What `pyhex init` did
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    pub root: PathBuf,
    /// Scaffolding files written
    pub files: Vec<PathBuf>,
    /// Result of generating the initial domains
    pub generation: GenerationReport,
    /// Whether `uv sync` ran successfully
    pub installed: bool,
}

#[derive(Debug, Serialize)]
struct PyProject {
    project: ProjectTable,
    #[serde(rename = "dependency-groups")]
    dependency_groups: BTreeMap<String, Vec<String>>,
    tool: ToolTable,
}

#[derive(Debug, Serialize)]
struct ProjectTable {
    name: String,
    version: String,
    description: String,
    #[serde(rename = "requires-python")]
    requires_python: String,
    dependencies: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolTable {
    pytest: PytestTable,
}

#[derive(Debug, Serialize)]
struct PytestTable {
    ini_options: PytestOptions,
}

#[derive(Debug, Serialize)]
struct PytestOptions {
    testpaths: Vec<String>,
    pythonpath: Vec<String>,
}

/// Render `pyproject.toml` for a new project
pub fn pyproject_toml(project_name: &str, python_version: &str) -> Result<String> {
    let pyproject = PyProject {
        project: ProjectTable {
            name: project_name.to_lowercase().replace('_', "-"),
            version: "0.1.0".to_string(),
            description: format!("{project_name} API"),
            requires_python: format!(">={python_version}"),
            dependencies: RUNTIME_DEPENDENCIES.iter().map(|d| d.to_string()).collect(),
        },
        dependency_groups: BTreeMap::from([(
            "dev".to_string(),
            DEV_DEPENDENCIES.iter().map(|d| d.to_string()).collect(),
        )]),
        tool: ToolTable {
            pytest: PytestTable {
                ini_options: PytestOptions {
                    testpaths: vec!["tests".to_string()],
                    pythonpath: vec![".".to_string()],
                },
            },
        },
    };
    Ok(toml::to_string_pretty(&pyproject)?)
}

/// Creates a new pyhex project
#[derive(Debug, Clone)]
pub struct ProjectInitializer {
    name: String,
    root: PathBuf,
    templates: TemplateManager,
    options: InitOptions,
}

impl ProjectInitializer {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        templates: TemplateManager,
        options: InitOptions,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            templates,
            options,
        }
    }

    pub async fn run(&self) -> Result<InitReport> {
        if self.name.trim().is_empty() {
            return Err(Error::generation("project name must not be empty"));
        }
        self.check_target().await?;
        fs::create_dir_all(&self.root).await?;
        let root = fs::canonicalize(&self.root).await?;
        log::info!("Initializing project `{}` in {}", self.name, root.display());

        let mut config = Config::new(&self.name);
        config.python_version = self.options.python_version.clone();
        let write = GenerateOptions {
            force: self.options.force,
            run_hooks: false,
            ..GenerateOptions::default()
        };

        let mut report = InitReport {
            root: root.clone(),
            ..InitReport::default()
        };
        for (relative, content) in self.scaffold(&config)? {
            let outcome = write_generated(&root.join(&relative), &content, &write).await?;
            if outcome.action == FileAction::Written {
                report.files.push(outcome.path);
            }
        }

        if self.options.example {
            let dir = config.domains_path(&root).join("product");
            fs::create_dir_all(&dir).await?;
            for (file, content) in EXAMPLE_DOMAIN {
                fs::write(dir.join(file), content).await?;
                report.files.push(dir.join(file));
            }
        }

        // Renders app/routers.py, plus the example domain when present
        let generator = Generator::new(root.clone(), config.clone(), self.templates.clone());
        report.generation = generator.generate_all(&write).await?;

        if self.options.install {
            report.installed = install(&root).await;
        }
        Ok(report)
    }

    /// The target must be missing or empty unless `force` is set
    async fn check_target(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if entries.next_entry().await?.is_some() && !self.options.force {
            return Err(ConfigurationError::file(&self.root, "directory is not empty")
                .with_suggestion("choose another path or pass --force")
                .into());
        }
        Ok(())
    }

    /// Relative paths and contents of the scaffolding files
    fn scaffold(&self, config: &Config) -> Result<Vec<(PathBuf, String)>> {
        let app = PathBuf::from(&config.app_dir);
        let package = config.app_package();
        let context = json!({
            "pyhex_version": env!("CARGO_PKG_VERSION"),
            "project_name": self.name,
            "package": package,
            "database_url": format!("sqlite:///./{}.db", to_snake_case(&self.name)),
        });
        let render = |name: &str| self.templates.render(name, &context);

        Ok(vec![
            (
                PathBuf::from("pyproject.toml"),
                pyproject_toml(&self.name, &config.python_version)?,
            ),
            (PathBuf::from(CONFIG_FILE), serde_yaml::to_string(config)?),
            (
                app.join("__init__.py"),
                format!("\"\"\"{} application.\"\"\"\n", self.name),
            ),
            (app.join("main.py"), render("project/main.py.tera")?),
            (app.join("core/__init__.py"), String::new()),
            (app.join("core/config.py"), render("project/config.py.tera")?),
            (app.join("core/database.py"), render("project/database.py.tera")?),
            (
                app.join("domain/__init__.py"),
                "\"\"\"Domains generated by pyhex, one package per domain.\"\"\"\n".to_string(),
            ),
            (PathBuf::from("tests/__init__.py"), String::new()),
            (PathBuf::from("tests/conftest.py"), render("project/conftest.py.tera")?),
        ])
    }
}

/// Run `uv sync` in `root`; failures are logged, not returned
async fn install(root: &Path) -> bool {
    log::info!("Installing dependencies with `uv sync`");
    let run = Command::new("uv")
        .arg("sync")
        .current_dir(root)
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(INSTALL_TIMEOUT, run).await {
        Ok(Ok(output)) if output.status.success() => true,
        Ok(Ok(output)) => {
            log::warn!(
                "`uv sync` failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("`uv` not found; install it and run `uv sync` in {}", root.display());
            false
        }
        Ok(Err(e)) => {
            log::warn!("could not run `uv sync`: {e}");
            false
        }
        Err(_) => {
            log::warn!("`uv sync` did not finish within {}s", INSTALL_TIMEOUT.as_secs());
            false
        }
    }
}
