//! pyhex core library
//!
//! Scaffolds FastAPI + SQLModel CRUD applications from YAML. Every domain
//! directory holds its configuration layers, optional template overrides and
//! the Python modules generated from them. The pipeline is
//! [`loader`] → [`merger`] → [`builders`] → [`templates`] → [`preserve`],
//! driven by [`generate`].

pub mod builders;
pub mod config;
pub mod docs;
pub mod error;
pub mod generate;
pub mod init;
pub mod layer;
pub mod loader;
pub mod manifest;
pub mod merger;
pub mod preserve;
pub mod schema;
pub mod templates;
pub mod utils;
pub mod validation;

pub use crate::{
    config::Config,
    error::{ConfigurationError, Error, Result, ValidationIssue},
    generate::{DomainGenerator, FileAction, GenerateOptions, GenerationReport, Generator},
    init::{InitOptions, ProjectInitializer},
    layer::Layer,
    merger::{ConfigMerger, MergedDomain},
    schema::MergedConfig,
    templates::{TemplateDir, TemplateKind, TemplateManager},
};

/// Version written into the header of generated files
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
