//! Template management: built-in templates, custom directories and filters.

pub mod dir;
pub mod filters;
pub mod kind;
pub mod manager;

pub use dir::{TemplateDir, TEMPLATE_DIR_ENV};
pub use kind::TemplateKind;
pub use manager::TemplateManager;

/// Manifest of the built-in template set
pub const BUILTIN_MANIFEST: &str = include_str!("../../templates/fastapi_sqlmodel/manifest.yaml");

/// Templates compiled into the binary, as `(name, source)`
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "__init__.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/__init__.py.tera"),
    ),
    (
        "entities.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/entities.py.tera"),
    ),
    (
        "schemas.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/schemas.py.tera"),
    ),
    (
        "rules.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/rules.py.tera"),
    ),
    (
        "repository.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/repository.py.tera"),
    ),
    (
        "usecase.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/usecase.py.tera"),
    ),
    (
        "interface.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/interface.py.tera"),
    ),
    (
        "routers.py.tera",
        include_str!("../../templates/fastapi_sqlmodel/routers.py.tera"),
    ),
    (
        "project/main.py.tera",
        include_str!("../../templates/project/main.py.tera"),
    ),
    (
        "project/config.py.tera",
        include_str!("../../templates/project/config.py.tera"),
    ),
    (
        "project/database.py.tera",
        include_str!("../../templates/project/database.py.tera"),
    ),
    (
        "project/conftest.py.tera",
        include_str!("../../templates/project/conftest.py.tera"),
    ),
    (
        "docs/domain.md.tera",
        include_str!("../../templates/docs/domain.md.tera"),
    ),
    (
        "docs/index.md.tera",
        include_str!("../../templates/docs/index.md.tera"),
    ),
];

/// Configuration guide printed by `pyhex docs`
pub const USAGE_GUIDE: &str = include_str!("../../templates/docs/USAGE.md");

/// Layer files of the example `product` domain written by `pyhex init --example`
pub const EXAMPLE_DOMAIN: &[(&str, &str)] = &[
    (
        "domain.yaml",
        include_str!("../../templates/project/example/domain.yaml"),
    ),
    (
        "usecase.yaml",
        include_str!("../../templates/project/example/usecase.yaml"),
    ),
    (
        "business_rules.yaml",
        include_str!("../../templates/project/example/business_rules.yaml"),
    ),
    (
        "repository.yaml",
        include_str!("../../templates/project/example/repository.yaml"),
    ),
    (
        "interface.yaml",
        include_str!("../../templates/project/example/interface.yaml"),
    ),
];

/// Source of a built-in template
pub fn builtin_source(name: &str) -> Option<&'static str> {
    BUILTIN_TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, source)| *source)
}
