//! Project configuration (`pyhex.yaml`).
//!
//! The file sits at the project root and is written by `pyhex init`. Every
//! key has a default, so an empty file is a valid configuration.
//!
//! # Examples
//!
//! ```no_run
//! use pyhex_core::config::Config;
//!
//! # async fn demo() -> pyhex_core::Result<()> {
//! // Create a new config programmatically
//! let mut config = Config::new("shop");
//! config.python_version = "3.12".to_string();
//! config.save("pyhex.yaml").await?;
//!
//! // Or find and load the one of an existing project
//! if let Some((root, config)) = Config::discover(".").await? {
//!     println!("{} at {}", config.project_name, root.display());
//! }
//! # Ok(())
//! # }
//! ```

// Internal imports (std, crate)
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;
use crate::templates::TemplateKind;

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use tokio::fs;

/// File name of the project configuration
pub const CONFIG_FILE: &str = "pyhex.yaml";

/// Configuration of a pyhex project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name
    pub project_name: String,

    /// Python package of the application, relative to the project root
    pub app_dir: String,

    /// Directory holding one sub-directory per domain
    pub domains_dir: String,

    /// Template set to render
    pub template_kind: TemplateKind,

    /// Optional path to a custom template directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<String>,

    /// Check syntax and imports of generated files
    pub validate_output: bool,

    /// Interpreter used for output validation
    pub python: String,

    /// Python version written to `pyproject.toml`
    pub python_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            app_dir: "app".to_string(),
            domains_dir: "app/domain".to_string(),
            template_kind: TemplateKind::default(),
            template_dir: None,
            validate_output: true,
            python: "python3".to_string(),
            python_version: "3.11".to_string(),
        }
    }
}

impl Config {
    /// Create a new Config with default values
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            ConfigurationError::file(path, format!("cannot read project configuration: {e}"))
        })?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(&content)
            .map_err(|e| crate::loader::translate_yaml_error(path, &e))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Walk up from `start` to the first directory holding `pyhex.yaml`.
    ///
    /// Returns the project root with its configuration, or `None` when no
    /// ancestor has one.
    pub async fn discover<P: AsRef<Path>>(start: P) -> crate::Result<Option<(PathBuf, Self)>> {
        let start = fs::canonicalize(start.as_ref()).await?;
        for dir in start.ancestors() {
            let candidate = dir.join(CONFIG_FILE);
            if fs::try_exists(&candidate).await? {
                log::debug!("Using project configuration {}", candidate.display());
                let config = Self::from_file(&candidate).await?;
                return Ok(Some((dir.to_path_buf(), config)));
            }
        }
        Ok(None)
    }

    /// Absolute domains directory of the project at `root`
    pub fn domains_path(&self, root: &Path) -> PathBuf {
        root.join(&self.domains_dir)
    }

    /// Absolute application package directory of the project at `root`
    pub fn app_path(&self, root: &Path) -> PathBuf {
        root.join(&self.app_dir)
    }

    /// Dotted Python package of the application (`app`)
    pub fn app_package(&self) -> String {
        self.app_dir.trim_matches('/').replace('/', ".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_config_roundtrip() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join(CONFIG_FILE);

        let mut config = Config::new("shop");
        config.template_dir = Some("templates".to_string());
        config.save(&file_path).await?;

        let loaded = Config::from_file(&file_path).await?;
        assert_eq!(loaded, config);
        assert_eq!(loaded.app_dir, "app");
        assert_eq!(loaded.domains_dir, "app/domain");
        assert_eq!(loaded.template_kind, TemplateKind::FastapiSqlmodel);
        assert!(loaded.validate_output);
        assert_eq!(loaded.python, "python3");
        assert_eq!(loaded.python_version, "3.11");

        Ok(())
    }

    #[tokio::test]
    async fn test_partial_and_empty_files_use_defaults() -> crate::Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join(CONFIG_FILE);

        fs::write(&file_path, "project_name: shop\nvalidate_output: false\n").await?;
        let loaded = Config::from_file(&file_path).await?;
        assert_eq!(loaded.project_name, "shop");
        assert!(!loaded.validate_output);
        assert_eq!(loaded.domains_dir, "app/domain");

        fs::write(&file_path, "").await?;
        assert_eq!(Config::from_file(&file_path).await?, Config::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_discover_walks_up() -> crate::Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("app/domain/product");
        fs::create_dir_all(&nested).await?;
        assert!(Config::discover(&nested).await?.is_none());

        Config::new("shop").save(dir.path().join(CONFIG_FILE)).await?;
        let (root, config) = Config::discover(&nested).await?.unwrap();
        assert_eq!(root, fs::canonicalize(dir.path()).await?);
        assert_eq!(config.project_name, "shop");
        assert_eq!(config.app_package(), "app");
        Ok(())
    }
}
