//! Context builders turning a merged configuration into template context.
pub mod sqlmodel;

// Internal imports (std, crate)
use std::collections::{BTreeMap, BTreeSet};

use crate::schema::MergedConfig;
use crate::templates::TemplateKind;

// External imports (alphabetized)
use serde_json::Value as JsonValue;

/// Trait for converting a merged domain configuration into a template context.
pub trait ContextBuilder {
    /// `package` is the dotted Python package of the domain (`app.domain.product`)
    fn build(&self, config: &MergedConfig, package: &str) -> crate::Result<JsonValue>;
}

pub struct DomainContext;

impl DomainContext {
    /// Build the context for `config` with the builder matching `template`
    pub fn build(
        template: TemplateKind,
        config: &MergedConfig,
        package: &str,
    ) -> crate::Result<JsonValue> {
        Self::get_builder(template).build(config, package)
    }

    pub fn get_builder(template: TemplateKind) -> Box<dyn ContextBuilder> {
        match template {
            // custom template sets render the same context
            TemplateKind::FastapiSqlmodel | TemplateKind::Custom => {
                Box::new(sqlmodel::SqlModelContextBuilder)
            }
        }
    }
}

/// Split a dotted import path (`app.core.auth.get_user`) into module and name
pub fn split_import_path(path: &str) -> Option<(&str, &str)> {
    path.rsplit_once('.')
        .filter(|(module, name)| !module.is_empty() && !name.is_empty())
}

/// Collects `from module import name` statements, sorted and de-duplicated
#[derive(Debug, Clone, Default)]
pub struct ImportSet {
    modules: BTreeMap<String, BTreeSet<String>>,
}

impl ImportSet {
    pub fn add(&mut self, module: impl Into<String>, name: impl Into<String>) {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(name.into());
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// One `from x import a, b` line per module
    pub fn lines(&self) -> Vec<String> {
        self.modules
            .iter()
            .map(|(module, names)| {
                let names: Vec<&str> = names.iter().map(String::as_str).collect();
                format!("from {module} import {}", names.join(", "))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_set_groups_by_module() {
        let mut imports = ImportSet::default();
        imports.add("datetime", "datetime");
        imports.add("uuid", "UUID");
        imports.add("datetime", "date");
        imports.add("datetime", "datetime");
        assert_eq!(
            imports.lines(),
            vec!["from datetime import date, datetime", "from uuid import UUID"]
        );
    }

    #[test]
    fn test_split_import_path() {
        assert_eq!(
            split_import_path("app.core.auth.get_user"),
            Some(("app.core.auth", "get_user"))
        );
        assert_eq!(split_import_path("Mailer"), None);
        assert_eq!(split_import_path(".x"), None);
    }
}
