//! Resolution of custom template directories

use std::io;
use std::path::{Path, PathBuf};

use super::TemplateKind;

/// Environment variable naming a template root directory
pub const TEMPLATE_DIR_ENV: &str = "PYHEX_TEMPLATE_DIR";

/// A resolved directory of custom templates
#[derive(Debug, Clone)]
pub struct TemplateDir {
    /// Root directory containing one sub-directory per template kind
    root_dir: PathBuf,
    /// Directory the templates are read from
    template_path: PathBuf,
    kind: TemplateKind,
}

impl TemplateDir {
    pub fn new(root_dir: PathBuf, template_path: PathBuf, kind: TemplateKind) -> Self {
        Self {
            root_dir,
            template_path,
            kind,
        }
    }

    /// Returns a displayable version of the template path
    pub fn display(&self) -> std::path::Display<'_> {
        self.template_path.display()
    }

    /// Resolve the custom template directory for `kind`.
    ///
    /// An explicit directory must exist. It is used as is, or its `<kind>`
    /// sub-directory when one exists. Without an explicit directory the
    /// standard locations are searched; `Ok(None)` means none of them exist,
    /// which is fine for the built-in kind.
    pub fn discover(kind: TemplateKind, custom_dir: Option<&Path>) -> io::Result<Option<Self>> {
        let root_dir = match custom_dir {
            Some(dir) => {
                if !dir.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("Template directory not found: {}", dir.display()),
                    ));
                }
                dir.to_path_buf()
            }
            None => match Self::find_template_base_dir() {
                Some(dir) => dir,
                None if kind.uses_builtin() => return Ok(None),
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!(
                            "Could not find a template directory for `{kind}`; set {TEMPLATE_DIR_ENV} or pass --template-dir"
                        ),
                    ))
                }
            },
        };

        let nested = root_dir.join(kind.as_str());
        let template_path = if nested.is_dir() { nested } else { root_dir.clone() };
        log::debug!("Using template directory: {}", template_path.display());
        Ok(Some(Self::new(root_dir, template_path, kind)))
    }

    /// Find the base template directory by checking standard locations
    fn find_template_base_dir() -> Option<PathBuf> {
        // 1. Check environment variable
        if let Ok(dir) = std::env::var(TEMPLATE_DIR_ENV) {
            let path = PathBuf::from(dir);
            if path.is_dir() {
                return Some(path);
            }
        }

        // 2. Check current directory
        let templates_dir = PathBuf::from(".").join("templates");
        if templates_dir.is_dir() {
            return Some(templates_dir);
        }

        // 3. Check in the user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            let templates_dir = home_dir.join(".pyhex").join("templates");
            if templates_dir.is_dir() {
                return Some(templates_dir);
            }
        }

        None
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Directory the templates are read from
    pub fn template_path(&self) -> &Path {
        &self.template_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_directory() {
        let temp_dir = tempdir().unwrap();

        let dir = TemplateDir::discover(TemplateKind::Custom, Some(temp_dir.path()))
            .unwrap()
            .unwrap();
        assert_eq!(dir.template_path(), temp_dir.path());

        let nested = temp_dir.path().join("custom");
        fs::create_dir_all(&nested).unwrap();
        let dir = TemplateDir::discover(TemplateKind::Custom, Some(temp_dir.path()))
            .unwrap()
            .unwrap();
        assert_eq!(dir.template_path(), nested.as_path());
        assert_eq!(dir.root_dir(), temp_dir.path());

        let result = TemplateDir::discover(TemplateKind::Custom, Some(Path::new("/nonexistent")));
        assert!(result.is_err());
    }
}
