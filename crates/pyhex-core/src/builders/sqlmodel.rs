//! FastAPI + SQLModel context builder.
//!
//! Everything the templates need is derived here so that templates stay free
//! of naming rules: class and module names, Python annotations, rendered
//! `Field(...)`/`Relationship(...)` calls, CRUD schema field sets, default
//! endpoints and the imports of every generated module.

// Internal imports (std, crate)
use std::collections::HashSet;

use super::{split_import_path, ContextBuilder, ImportSet};
use crate::error::{Error, Result, Severity};
use crate::schema::entity::default_table_name;
use crate::schema::field::python_string;
use crate::schema::{
    EndpointConfig, EntityConfig, FieldArgs, FieldConfig, FieldType, FieldValue, HttpMethod,
    MergedConfig, Operation, RelationshipConfig, ReturnKind, UseCaseMethod,
};
use crate::utils::{pluralize, to_snake_case};

// External imports (alphabetized)
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;

static PATH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)(?::[^}]*)?\}").unwrap());
static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

const CASCADE_DELETE: &str = r#"{"cascade": "all, delete-orphan"}"#;

/// Complete context of one domain
#[derive(Debug, Clone, Serialize)]
pub struct TemplateContext {
    pub pyhex_version: &'static str,
    pub domain: DomainInfo,
    pub entities: Vec<EntityContext>,
    pub rules: Vec<RuleContext>,
    pub usecase: UseCaseContext,
    pub repository: RepositoryContext,
    pub interface: InterfaceContext,
    pub imports: ImportsContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainInfo {
    pub name: String,
    pub snake: String,
    pub pascal: String,
    pub plural: String,
    pub description: Option<String>,
    pub package: String,
}

/// Name and Python type of a primary key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyContext {
    pub name: String,
    pub python_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityContext {
    pub name: String,
    pub snake: String,
    pub plural: String,
    pub table_name: String,
    pub table: bool,
    /// Used as `link_model` by another entity; emitted before the others
    pub link_model: bool,
    pub description: Option<String>,
    pub pk: Option<KeyContext>,
    pub fields: Vec<FieldContext>,
    pub relationships: Vec<RelationshipContext>,
    pub create_schema: String,
    pub update_schema: String,
    pub read_schema: String,
    pub create_fields: Vec<SchemaFieldContext>,
    pub update_fields: Vec<SchemaFieldContext>,
    pub read_fields: Vec<SchemaFieldContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldContext {
    pub name: String,
    pub python_type: String,
    pub annotation: String,
    /// Rendered `Field(...)` call of the table model
    pub field_call: String,
    pub description: Option<String>,
    pub primary_key: bool,
    pub optional: bool,
    /// Foreign key column implied by a relationship
    pub implied: bool,
}

/// Attribute of a create/update/read schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaFieldContext {
    pub name: String,
    pub annotation: String,
    /// Right-hand side of the attribute, absent for required attributes
    pub default: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipContext {
    pub name: String,
    pub target: String,
    pub kind: String,
    pub annotation: String,
    /// Rendered `Relationship(...)` call
    pub call: String,
    pub external: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleContext {
    pub name: String,
    pub fn_name: String,
    pub entity: String,
    pub entity_var: String,
    pub field: Option<String>,
    pub condition: String,
    pub message: String,
    pub message_literal: String,
    pub severity: String,
    pub applies_to: Vec<String>,
    /// Entity attributes referenced by the condition
    pub bindings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UseCaseContext {
    pub class_name: String,
    pub description: Option<String>,
    pub dependencies: Vec<ParamContext>,
    pub repositories: Vec<RepositoryRef>,
    pub methods: Vec<MethodContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamContext {
    pub name: String,
    pub annotation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryRef {
    pub attr: String,
    pub class_name: String,
    pub entity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodContext {
    pub name: String,
    pub operation: String,
    pub custom: bool,
    pub entity: Option<String>,
    pub entity_var: Option<String>,
    pub repository: Option<String>,
    pub create_schema: Option<String>,
    pub update_schema: Option<String>,
    pub pk: Option<KeyContext>,
    /// Rule functions checked by the method
    pub rules: Vec<String>,
    pub description: Option<String>,
    pub transactional: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryContext {
    pub base_class: Option<String>,
    pub soft_delete: bool,
    pub default_limit: u32,
    pub max_limit: u32,
    pub classes: Vec<RepositoryClassContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryClassContext {
    pub class_name: String,
    pub entity: String,
    pub entity_var: String,
    pub pk: KeyContext,
    pub methods: Vec<RepositoryMethodContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryMethodContext {
    pub name: String,
    pub description: Option<String>,
    pub params: Vec<ParamContext>,
    pub returns_one: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterfaceContext {
    pub prefix: String,
    pub tags: Vec<String>,
    pub service_class: String,
    pub auth_dependency: Option<String>,
    pub endpoints: Vec<EndpointContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointContext {
    pub handler: String,
    pub operation: String,
    /// Router decorator (`get`, `post`, ...)
    pub method: String,
    pub http_method: String,
    pub path: String,
    pub summary: String,
    pub status_code: u16,
    pub entity: Option<String>,
    pub usecase_method: String,
    pub response_model: Option<String>,
    pub request_schema: Option<String>,
    pub path_params: Vec<ParamContext>,
    pub has_body: bool,
    pub auth_required: bool,
}

/// `from x import y` lines per generated module
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportsContext {
    pub types: Vec<String>,
    pub entities: Vec<String>,
    /// Entities of sibling domains, imported under `TYPE_CHECKING`
    pub type_checking: Vec<String>,
    pub repository: Vec<String>,
    pub usecase: Vec<String>,
    pub interface: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SqlModelContextBuilder;

impl ContextBuilder for SqlModelContextBuilder {
    fn build(&self, config: &MergedConfig, package: &str) -> Result<JsonValue> {
        let context = build_context(config, package)?;
        Ok(serde_json::to_value(context)?)
    }
}

/// Build the typed context of one domain
pub fn build_context(config: &MergedConfig, package: &str) -> Result<TemplateContext> {
    let domain = &config.domain;
    let link_models: HashSet<&str> = domain
        .entities
        .iter()
        .flat_map(|e| e.relationships.iter())
        .filter_map(|r| r.link_model.as_deref())
        .collect();

    let mut type_imports = ImportSet::default();
    let mut key_imports = ImportSet::default();
    let mut json_column = false;
    let mut type_checking = ImportSet::default();
    let sibling_root = package.rsplit_once('.').map(|(root, _)| root);

    let mut entities = Vec::new();
    for entity in &domain.entities {
        let fields = entity_fields(config, entity);
        for field in &fields {
            if let Some((module, name)) = field.field_type.import() {
                type_imports.add(module, name);
            }
            json_column |= field.field_type == FieldType::Json;
            match field.default_factory.as_deref() {
                Some("uuid4") => type_imports.add("uuid", "uuid4"),
                Some(f) if f.starts_with("datetime.") => type_imports.add("datetime", "datetime"),
                _ => {}
            }
        }
        for rel in entity.relationships.iter().filter(|r| r.is_external()) {
            if let (Some(other), target) = rel.target_parts() {
                let module = match sibling_root {
                    Some(root) => format!("{root}.{}.entities", to_snake_case(other)),
                    None => format!("{}.entities", to_snake_case(other)),
                };
                type_checking.add(module, target);
            }
        }

        let context = entity_context(entity, &fields, link_models.contains(entity.name.as_str()))?;
        if entity.table {
            if let Some(pk) = fields.iter().find(|f| f.primary_key) {
                if let Some((module, name)) = pk.field_type.import() {
                    key_imports.add(module, name);
                }
            }
        }
        entities.push(context);
    }

    // Link models are declared before the entities referring to them
    entities.sort_by_key(|e| !e.link_model);

    let mut entity_imports = type_imports.clone();
    if json_column {
        entity_imports.add("sqlalchemy", "Column");
        entity_imports.add("sqlalchemy", "JSON");
    }

    let rules = config
        .business_rules
        .rules
        .iter()
        .map(|rule| rule_context(config, rule))
        .collect();

    let mut usecase_imports = key_imports.clone();
    let usecase = usecase_context(config, &mut usecase_imports)?;

    let mut repository_imports = key_imports.clone();
    let repository = repository_context(config, &mut repository_imports);

    let mut interface_imports = key_imports.clone();
    let interface = interface_context(config, &mut interface_imports)?;

    Ok(TemplateContext {
        pyhex_version: env!("CARGO_PKG_VERSION"),
        domain: DomainInfo {
            name: domain.name.clone(),
            snake: domain.snake_name(),
            pascal: domain.pascal_name(),
            plural: domain.plural_name(),
            description: domain.description.clone(),
            package: package.to_string(),
        },
        entities,
        rules,
        usecase,
        repository,
        interface,
        imports: ImportsContext {
            types: type_imports.lines(),
            entities: entity_imports.lines(),
            type_checking: type_checking.lines(),
            repository: repository_imports.lines(),
            usecase: usecase_imports.lines(),
            interface: interface_imports.lines(),
        },
    })
}

/// Effective fields plus foreign key columns implied by owning relationships
fn entity_fields(config: &MergedConfig, entity: &EntityConfig) -> Vec<FieldConfig> {
    let mut fields = config.domain.effective_fields(entity);
    if !entity.table {
        return fields;
    }
    for rel in &entity.relationships {
        if !rel.kind.owns_foreign_key() || rel.foreign_key.is_some() {
            continue;
        }
        let name = rel.foreign_key_field();
        if fields.iter().any(|f| f.name == name) {
            continue;
        }
        let (table, key) = target_key(config, rel);
        let mut field = FieldConfig::new(name, key.field_type);
        field.required = false;
        field.index = true;
        field.foreign_key = Some(format!("{table}.{}", key.name));
        fields.push(field);
    }
    fields
}

struct TargetKey {
    name: String,
    field_type: FieldType,
}

/// Table and primary key referenced by a relationship
fn target_key(config: &MergedConfig, rel: &RelationshipConfig) -> (String, TargetKey) {
    let (_, target) = rel.target_parts();
    if !rel.is_external() {
        if let Some(entity) = config.domain.entity(target) {
            let key = config
                .domain
                .effective_fields(entity)
                .into_iter()
                .find(|f| f.primary_key)
                .map(|f| TargetKey {
                    name: f.name,
                    field_type: f.field_type,
                });
            let key = key.unwrap_or(TargetKey {
                name: "id".to_string(),
                field_type: FieldType::Int,
            });
            return (entity.table_name(), key);
        }
    }
    (
        default_table_name(target),
        TargetKey {
            name: "id".to_string(),
            field_type: FieldType::Int,
        },
    )
}

fn entity_context(
    entity: &EntityConfig,
    fields: &[FieldConfig],
    link_model: bool,
) -> Result<EntityContext> {
    let implied: HashSet<String> = entity
        .relationships
        .iter()
        .filter(|r| r.kind.owns_foreign_key() && r.foreign_key.is_none())
        .map(RelationshipConfig::foreign_key_field)
        .collect();

    let mut field_contexts = Vec::with_capacity(fields.len());
    for field in fields {
        let args = field
            .field_args()
            .map_err(|e| Error::generation(format!("{}.{}: {e}", entity.name, field.name)))?;
        field_contexts.push(FieldContext {
            name: field.name.clone(),
            python_type: field.field_type.python_type().to_string(),
            annotation: field.annotation(),
            field_call: args.render(),
            description: field.description.clone(),
            primary_key: field.primary_key,
            optional: field.is_optional(),
            implied: implied.contains(&field.name) && !entity.fields.iter().any(|f| f.name == field.name),
        });
    }

    let relationships = entity.relationships.iter().map(relationship_context).collect();
    let class = entity.class_name();
    let (create_fields, update_fields, read_fields) = if entity.table {
        (
            fields.iter().filter_map(create_field).collect(),
            fields.iter().filter_map(update_field).collect(),
            fields.iter().filter_map(read_field).collect(),
        )
    } else {
        (Vec::new(), Vec::new(), Vec::new())
    };

    Ok(EntityContext {
        snake: entity.snake_name(),
        plural: pluralize(&entity.snake_name()),
        table_name: entity.table_name(),
        table: entity.table,
        link_model,
        description: entity.description.clone(),
        pk: fields.iter().find(|f| f.primary_key).map(key_context),
        fields: field_contexts,
        relationships,
        create_schema: format!("{class}Create"),
        update_schema: format!("{class}Update"),
        read_schema: format!("{class}Read"),
        create_fields,
        update_fields,
        read_fields,
        name: class,
    })
}

fn key_context(field: &FieldConfig) -> KeyContext {
    KeyContext {
        name: field.name.clone(),
        python_type: field.field_type.python_type().to_string(),
    }
}

fn relationship_context(rel: &RelationshipConfig) -> RelationshipContext {
    let (_, target) = rel.target_parts();
    let annotation = if rel.kind.is_collection() {
        format!("list[\"{target}\"]")
    } else {
        format!("Optional[\"{target}\"]")
    };

    let mut args = FieldArgs::default();
    if let Some(back) = &rel.back_populates {
        args.set("back_populates", FieldValue::Str(back.clone()));
    }
    if let Some(link) = &rel.link_model {
        args.set("link_model", FieldValue::Expr(link.clone()));
    }
    if rel.cascade_delete {
        args.set(
            "sa_relationship_kwargs",
            FieldValue::Expr(CASCADE_DELETE.to_string()),
        );
    }

    RelationshipContext {
        name: rel.name.clone(),
        target: target.to_string(),
        kind: rel.kind.as_str().to_string(),
        annotation,
        call: format!("Relationship({})", args.render_arguments()),
        external: rel.is_external(),
    }
}

/// Validation constraints shared by the table model and the schemas
fn constraint_args(field: &FieldConfig) -> FieldArgs {
    let mut args = FieldArgs::default();
    if let Some(max) = field.max_length {
        args.set("max_length", FieldValue::Int(i64::from(max)));
    }
    if let Some(min) = field.min_length {
        args.set("min_length", FieldValue::Int(i64::from(min)));
    }
    if let Some(ge) = field.ge {
        args.set("ge", FieldValue::number(ge));
    }
    if let Some(le) = field.le {
        args.set("le", FieldValue::number(le));
    }
    if let Some(desc) = &field.description {
        args.set("description", FieldValue::Str(desc.clone()));
    }
    args
}

/// Attribute of the create schema; generated keys and excluded fields are skipped
fn create_field(field: &FieldConfig) -> Option<SchemaFieldContext> {
    if field.exclude_from_create || field.has_generated_key() {
        return None;
    }
    let mut args = FieldArgs::default();
    if let Some(default) = &field.default {
        args.set("default", FieldValue::from_json(default));
    } else if let Some(factory) = &field.default_factory {
        args.set("default_factory", FieldValue::Expr(factory.clone()));
    } else if field.is_optional() {
        args.set("default", FieldValue::None);
    }
    let constraints = constraint_args(field);

    let default = if constraints.is_empty() {
        match args.get("default") {
            Some(value) => Some(value.to_python()),
            None if args.is_empty() => None,
            None => Some(args.render()),
        }
    } else {
        args.merge(constraints);
        Some(args.render())
    };

    Some(SchemaFieldContext {
        name: field.name.clone(),
        annotation: field.annotation(),
        default,
    })
}

/// Attribute of the update schema; everything is optional
fn update_field(field: &FieldConfig) -> Option<SchemaFieldContext> {
    if field.exclude_from_update || field.primary_key {
        return None;
    }
    let constraints = constraint_args(field);
    let default = if constraints.is_empty() {
        "None".to_string()
    } else {
        let mut args = FieldArgs::default();
        args.set("default", FieldValue::None);
        args.merge(constraints);
        args.render()
    };
    Some(SchemaFieldContext {
        name: field.name.clone(),
        annotation: format!("Optional[{}]", field.field_type.python_type()),
        default: Some(default),
    })
}

/// Attribute of the read schema; the primary key is always present
fn read_field(field: &FieldConfig) -> Option<SchemaFieldContext> {
    if field.exclude_from_read {
        return None;
    }
    if field.primary_key {
        return Some(SchemaFieldContext {
            name: field.name.clone(),
            annotation: field.field_type.python_type().to_string(),
            default: None,
        });
    }
    Some(SchemaFieldContext {
        name: field.name.clone(),
        annotation: field.annotation(),
        default: field.is_optional().then(|| "None".to_string()),
    })
}

fn rule_fn_name(rule: &str) -> String {
    format!("check_{}", to_snake_case(rule))
}

fn rule_context(config: &MergedConfig, rule: &crate::schema::BusinessRule) -> RuleContext {
    let field_names: Vec<String> = config
        .domain
        .entity(&rule.entity)
        .map(|e| {
            entity_fields(config, e)
                .into_iter()
                .map(|f| f.name)
                .collect()
        })
        .unwrap_or_default();

    let mut bindings: Vec<String> = Vec::new();
    for ident in IDENTIFIER.find_iter(&rule.condition) {
        let ident = ident.as_str();
        if field_names.iter().any(|f| f == ident) && !bindings.iter().any(|b| b == ident) {
            bindings.push(ident.to_string());
        }
    }

    let mut applies_to: Vec<String> = Operation::CRUD
        .iter()
        .filter(|op| rule.applies(**op))
        .map(|op| op.as_str().to_string())
        .collect();
    if rule.applies_to.contains(&Operation::Custom) {
        applies_to.push(Operation::Custom.as_str().to_string());
    }

    RuleContext {
        name: rule.name.clone(),
        fn_name: rule_fn_name(&rule.name),
        entity: rule.entity.clone(),
        entity_var: to_snake_case(&rule.entity),
        field: rule.field.clone(),
        condition: rule.condition.trim().to_string(),
        message: rule.message.clone(),
        message_literal: python_string(&rule.message),
        severity: match rule.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
        .to_string(),
        applies_to,
        bindings,
    }
}

fn repository_attr(entity: &EntityConfig) -> String {
    format!("{}_repository", entity.snake_name())
}

/// Rule functions enforced for `operation` on `entity`
fn crud_rules(config: &MergedConfig, entity: &EntityConfig, operation: Operation) -> Vec<String> {
    config
        .business_rules
        .rules
        .iter()
        .filter(|r| r.entity == entity.name && r.applies(operation))
        .map(|r| rule_fn_name(&r.name))
        .collect()
}

fn crud_method(config: &MergedConfig, entity: &EntityConfig, operation: Operation) -> MethodContext {
    let class = entity.class_name();
    let pk = config
        .domain
        .effective_fields(entity)
        .iter()
        .find(|f| f.primary_key)
        .map(key_context);
    MethodContext {
        name: operation.method_name(entity).unwrap_or_default(),
        operation: operation.as_str().to_string(),
        custom: false,
        entity: Some(class.clone()),
        entity_var: Some(entity.snake_name()),
        repository: Some(repository_attr(entity)),
        create_schema: Some(format!("{class}Create")),
        update_schema: Some(format!("{class}Update")),
        pk,
        rules: crud_rules(config, entity, operation),
        description: None,
        transactional: operation != Operation::Read && operation != Operation::List,
    }
}

fn explicit_method(config: &MergedConfig, method: &UseCaseMethod) -> Result<MethodContext> {
    let operation = method.operation.unwrap_or(Operation::Custom);
    let entity = match &method.entity {
        Some(name) => Some(config.domain.entity(name).ok_or_else(|| {
            Error::generation(format!("use-case method `{}`: unknown entity `{name}`", method.name))
        })?),
        None if operation != Operation::Custom => config.domain.table_entities().next(),
        None => None,
    };

    let mut context = match (operation, entity) {
        (Operation::Custom, entity) => MethodContext {
            name: method.name.clone(),
            operation: operation.as_str().to_string(),
            custom: true,
            entity: entity.map(EntityConfig::class_name),
            entity_var: entity.map(EntityConfig::snake_name),
            repository: entity.filter(|e| e.table).map(repository_attr),
            create_schema: None,
            update_schema: None,
            pk: None,
            rules: Vec::new(),
            description: None,
            transactional: method.transactional,
        },
        (_, Some(entity)) => crud_method(config, entity, operation),
        (_, None) => {
            return Err(Error::generation(format!(
                "use-case method `{}` needs an entity",
                method.name
            )))
        }
    };
    context.name = method.name.clone();
    context.description = method.description.clone();
    context.transactional = method.transactional;
    for rule in &method.business_rules {
        let fn_name = rule_fn_name(rule);
        if !context.rules.contains(&fn_name) {
            context.rules.push(fn_name);
        }
    }
    Ok(context)
}

fn usecase_context(config: &MergedConfig, imports: &mut ImportSet) -> Result<UseCaseContext> {
    let mut methods: Vec<MethodContext> = Vec::new();
    if config.usecase.generate_crud {
        for entity in config.domain.table_entities() {
            for operation in Operation::CRUD {
                methods.push(crud_method(config, entity, operation));
            }
        }
    }
    for method in &config.usecase.methods {
        let context = explicit_method(config, method)?;
        match methods.iter_mut().find(|m| m.name == context.name) {
            Some(slot) => *slot = context,
            None => methods.push(context),
        }
    }

    let dependencies = config
        .usecase
        .dependencies
        .iter()
        .map(|dep| {
            let class = match split_import_path(dep) {
                Some((module, name)) => {
                    imports.add(module, name);
                    name
                }
                None => dep.as_str(),
            };
            ParamContext {
                name: to_snake_case(class),
                annotation: class.to_string(),
            }
        })
        .collect();

    let repositories = config
        .domain
        .table_entities()
        .map(|e| RepositoryRef {
            attr: repository_attr(e),
            class_name: format!("{}Repository", e.class_name()),
            entity: e.class_name(),
        })
        .collect();

    Ok(UseCaseContext {
        class_name: config.service_name(),
        description: config.usecase.description.clone(),
        dependencies,
        repositories,
        methods,
    })
}

fn repository_context(config: &MergedConfig, imports: &mut ImportSet) -> RepositoryContext {
    let repo = &config.repository;
    let base_class = repo.base_class.as_deref().map(|base| match split_import_path(base) {
        Some((module, name)) => {
            imports.add(module, name);
            name.to_string()
        }
        None => base.to_string(),
    });
    let default_entity = config.domain.table_entities().next().map(|e| e.name.clone());

    let classes = config
        .domain
        .table_entities()
        .map(|entity| {
            let fields = config.domain.effective_fields(entity);
            let pk = fields
                .iter()
                .find(|f| f.primary_key)
                .map(key_context)
                .unwrap_or(KeyContext {
                    name: "id".to_string(),
                    python_type: "int".to_string(),
                });
            let methods = repo
                .methods
                .iter()
                .filter(|m| m.entity.as_ref().or(default_entity.as_ref()) == Some(&entity.name))
                .map(|m| RepositoryMethodContext {
                    name: m.name.clone(),
                    description: m.description.clone(),
                    params: m
                        .filter_by
                        .iter()
                        .map(|name| ParamContext {
                            name: name.clone(),
                            annotation: fields
                                .iter()
                                .find(|f| &f.name == name)
                                .map(|f| f.field_type.python_type())
                                .unwrap_or("str")
                                .to_string(),
                        })
                        .collect(),
                    returns_one: m.returns == ReturnKind::One,
                })
                .collect();
            RepositoryClassContext {
                class_name: format!("{}Repository", entity.class_name()),
                entity: entity.class_name(),
                entity_var: entity.snake_name(),
                pk,
                methods,
            }
        })
        .collect();

    RepositoryContext {
        base_class,
        soft_delete: repo.soft_delete,
        default_limit: repo.default_limit,
        max_limit: repo.max_limit,
        classes,
    }
}

/// CRUD endpoints for every table entity, used when none are configured
pub fn default_endpoints(config: &MergedConfig) -> Vec<EndpointConfig> {
    config
        .domain
        .table_entities()
        .flat_map(|entity| {
            Operation::CRUD.into_iter().map(move |op| EndpointConfig {
                entity: Some(entity.name.clone()),
                ..EndpointConfig::new(op)
            })
        })
        .collect()
}

/// Route relative to the router prefix.
///
/// Entities named like the domain live at the router root, other entities
/// under their plural.
pub fn default_path(
    config: &MergedConfig,
    entity: Option<&EntityConfig>,
    operation: Operation,
    method: &str,
) -> String {
    let segment = match entity {
        Some(e) if e.snake_name() != config.domain.snake_name() => {
            format!("/{}", pluralize(&e.snake_name()))
        }
        _ => String::new(),
    };
    match (operation, entity) {
        (Operation::Create | Operation::List, _) if segment.is_empty() => "/".to_string(),
        (Operation::Create | Operation::List, _) => segment,
        (Operation::Read | Operation::Update | Operation::Delete, Some(e)) => {
            format!("{segment}/{{{}_id}}", e.snake_name())
        }
        _ => format!("{segment}/{}", method.replace('_', "-")),
    }
}

fn humanize(name: &str) -> String {
    let words = to_snake_case(name).replace('_', " ");
    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn default_summary(entity: Option<&EntityConfig>, operation: Operation, method: &str) -> String {
    let Some(entity) = entity else {
        return humanize(method);
    };
    let noun = to_snake_case(&entity.name).replace('_', " ");
    match operation {
        Operation::Create => format!("Create {noun}"),
        Operation::Read => format!("Get {noun}"),
        Operation::List => format!("List {}", pluralize(&noun)),
        Operation::Update => format!("Update {noun}"),
        Operation::Delete => format!("Delete {noun}"),
        Operation::Custom => humanize(method),
    }
}

fn endpoint_context(
    config: &MergedConfig,
    endpoint: &EndpointConfig,
    handlers: &mut HashSet<String>,
) -> Result<EndpointContext> {
    let operation = endpoint.operation;
    let entity = match &endpoint.entity {
        Some(name) => Some(
            config
                .domain
                .entity(name)
                .ok_or_else(|| Error::generation(format!("endpoint: unknown entity `{name}`")))?,
        ),
        None => config.domain.table_entities().next(),
    };
    if operation != Operation::Custom && entity.is_none() {
        return Err(Error::generation(format!(
            "{operation} endpoint has no entity to work on"
        )));
    }

    let usecase_method = match (&endpoint.usecase_method, entity) {
        (Some(method), _) => method.clone(),
        (None, Some(entity)) if operation != Operation::Custom => {
            operation.method_name(entity).unwrap_or_default()
        }
        _ => {
            return Err(Error::generation(
                "custom endpoints must name a usecase_method",
            ))
        }
    };

    let http: HttpMethod = endpoint.method.unwrap_or_else(|| operation.default_method());
    let path = endpoint
        .path
        .clone()
        .unwrap_or_else(|| default_path(config, entity, operation, &usecase_method));

    let pk_type = entity
        .and_then(|e| {
            config
                .domain
                .effective_fields(e)
                .into_iter()
                .find(|f| f.primary_key)
        })
        .map(|f| f.field_type.python_type())
        .unwrap_or("int");
    let path_params: Vec<ParamContext> = PATH_PARAM
        .captures_iter(&path)
        .enumerate()
        .map(|(i, caps)| ParamContext {
            name: caps[1].to_string(),
            annotation: if i == 0 && operation.targets_item() {
                pk_type.to_string()
            } else {
                "str".to_string()
            },
        })
        .collect();
    if operation.targets_item() && path_params.is_empty() {
        return Err(Error::generation(format!(
            "`{path}`: {operation} endpoints need a path parameter for the primary key"
        )));
    }

    let mut handler = usecase_method.clone();
    let mut n = 2;
    while !handlers.insert(handler.clone()) {
        handler = format!("{usecase_method}_{n}");
        n += 1;
    }

    let class = entity.map(EntityConfig::class_name);
    let (response_model, request_schema) = match (&class, operation) {
        (Some(c), Operation::Create) => (Some(format!("{c}Read")), Some(format!("{c}Create"))),
        (Some(c), Operation::Update) => (Some(format!("{c}Read")), Some(format!("{c}Update"))),
        (Some(c), Operation::Read) => (Some(format!("{c}Read")), None),
        (Some(c), Operation::List) => (Some(format!("list[{c}Read]")), None),
        _ => (None, None),
    };

    Ok(EndpointContext {
        handler,
        operation: operation.as_str().to_string(),
        method: http.decorator().to_string(),
        http_method: http.to_string(),
        summary: endpoint
            .summary
            .clone()
            .unwrap_or_else(|| default_summary(entity, operation, &usecase_method)),
        path,
        status_code: endpoint
            .status_code
            .unwrap_or_else(|| operation.default_status()),
        entity: class,
        usecase_method,
        response_model,
        request_schema,
        path_params,
        has_body: operation == Operation::Custom
            && matches!(http, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch),
        auth_required: endpoint.auth_required,
    })
}

fn interface_context(config: &MergedConfig, imports: &mut ImportSet) -> Result<InterfaceContext> {
    let configured: Vec<EndpointConfig> = config.endpoints().cloned().collect();
    let endpoints = if configured.is_empty() {
        default_endpoints(config)
    } else {
        configured
    };

    let mut handlers = HashSet::new();
    let endpoints = endpoints
        .iter()
        .map(|e| endpoint_context(config, e, &mut handlers))
        .collect::<Result<Vec<_>>>()?;

    let auth_dependency = config
        .interface
        .auth_dependency
        .as_deref()
        .map(|dep| match split_import_path(dep) {
            Some((module, name)) => {
                imports.add(module, name);
                name.to_string()
            }
            None => dep.to_string(),
        });

    let tags = if config.interface.tags.is_empty() {
        vec![config.domain.plural_name()]
    } else {
        config.interface.tags.clone()
    };

    Ok(InterfaceContext {
        prefix: config.router_prefix(),
        tags,
        service_class: config.service_name(),
        auth_dependency,
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
domain:
  name: Product
  entities:
    - name: Category
      fields:
        - { name: title, type: str, max_length: 80 }
      relationships:
        - { name: products, target: Product, kind: one_to_many, back_populates: category, cascade_delete: true }
    - name: Product
      fields:
        - { name: name, type: str, index: true }
        - { name: price, type: float, ge: 0 }
        - { name: attributes, type: json, required: false }
        - name: sku
          type: str
          sqlmodel_field: 'Field(unique=True, description="Stock keeping unit")'
      relationships:
        - { name: category, target: Category, kind: many_to_one, back_populates: products }
        - { name: owner, target: user.User, kind: many_to_one }
business_rules:
  rules:
    - { name: price_positive, entity: Product, field: price, condition: "price > 0 and name", message: Price must be positive }
usecase:
  methods:
    - { name: create_product, entity: Product, operation: create, business_rules: [price_positive], description: Create with checks }
    - { name: discount, entity: Product }
"#;

    fn context() -> TemplateContext {
        let config: MergedConfig = serde_yaml::from_str(CONFIG).unwrap();
        build_context(&config, "app.domain.product").unwrap()
    }

    fn entity<'a>(ctx: &'a TemplateContext, name: &str) -> &'a EntityContext {
        ctx.entities.iter().find(|e| e.name == name).unwrap()
    }

    #[test]
    fn test_field_calls_and_implied_foreign_keys() {
        let ctx = context();
        let product = entity(&ctx, "Product");
        let calls: Vec<(&str, &str, &str)> = product
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.annotation.as_str(), f.field_call.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("id", "Optional[int]", "Field(default=None, primary_key=True)"),
                ("name", "str", "Field(index=True)"),
                ("price", "float", "Field(ge=0)"),
                (
                    "attributes",
                    "Optional[dict]",
                    "Field(default=None, sa_column=Column(JSON))"
                ),
                (
                    "sku",
                    "str",
                    r#"Field(unique=True, description="Stock keeping unit")"#
                ),
                (
                    "category_id",
                    "Optional[int]",
                    r#"Field(default=None, index=True, foreign_key="categories.id")"#
                ),
                (
                    "owner_id",
                    "Optional[int]",
                    r#"Field(default=None, index=True, foreign_key="users.id")"#
                ),
            ]
        );
        assert!(product.fields.iter().find(|f| f.name == "category_id").unwrap().implied);
        assert_eq!(product.pk, Some(KeyContext { name: "id".into(), python_type: "int".into() }));
    }

    #[test]
    fn test_relationships_and_imports() {
        let ctx = context();
        let category = entity(&ctx, "Category");
        assert_eq!(category.relationships[0].annotation, r#"list["Product"]"#);
        assert_eq!(
            category.relationships[0].call,
            r#"Relationship(back_populates="category", sa_relationship_kwargs={"cascade": "all, delete-orphan"})"#
        );
        let product = entity(&ctx, "Product");
        assert_eq!(product.relationships[1].annotation, r#"Optional["User"]"#);
        assert!(product.relationships[1].external);

        assert_eq!(
            ctx.imports.type_checking,
            vec!["from app.domain.user.entities import User"]
        );
        assert_eq!(ctx.imports.entities, vec!["from sqlalchemy import Column, JSON"]);
        assert!(ctx.imports.types.is_empty());
    }

    #[test]
    fn test_schema_field_sets() {
        let ctx = context();
        let product = entity(&ctx, "Product");
        let create: Vec<&str> = product.create_fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            create,
            vec!["name", "price", "attributes", "sku", "category_id", "owner_id"]
        );
        let price = &product.create_fields[1];
        assert_eq!(price.annotation, "float");
        assert_eq!(price.default.as_deref(), Some("Field(ge=0)"));
        assert_eq!(product.create_fields[0].default, None);
        assert_eq!(product.create_fields[2].default.as_deref(), Some("None"));

        assert!(product.update_fields.iter().all(|f| f.annotation.starts_with("Optional[")));
        assert!(!product.update_fields.iter().any(|f| f.name == "id"));
        assert_eq!(
            product.read_fields[0],
            SchemaFieldContext {
                name: "id".into(),
                annotation: "int".into(),
                default: None
            }
        );
    }

    #[test]
    fn test_default_endpoints_and_paths() {
        let ctx = context();
        let endpoints = &ctx.interface.endpoints;
        assert_eq!(endpoints.len(), 10);
        let summary: Vec<(&str, &str, &str)> = endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.handler.as_str()))
            .collect();
        assert_eq!(summary[0], ("post", "/categories", "create_category"));
        assert_eq!(summary[1], ("get", "/categories/{category_id}", "get_category"));
        assert_eq!(summary[5], ("post", "/", "create_product"));
        assert_eq!(summary[7], ("get", "/", "list_products"));
        assert_eq!(summary[9], ("delete", "/{product_id}", "delete_product"));

        let read = &endpoints[6];
        assert_eq!(read.response_model.as_deref(), Some("ProductRead"));
        assert_eq!(
            read.path_params,
            vec![ParamContext { name: "product_id".into(), annotation: "int".into() }]
        );
        assert_eq!(endpoints[7].response_model.as_deref(), Some("list[ProductRead]"));
        assert_eq!(endpoints[9].status_code, 204);
        assert_eq!(endpoints[5].summary, "Create product");
        assert_eq!(ctx.interface.prefix, "/products");
        assert_eq!(ctx.interface.tags, vec!["products"]);
    }

    #[test]
    fn test_usecase_methods_and_rules() {
        let ctx = context();
        let names: Vec<&str> = ctx.usecase.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names.len(), 11);
        assert_eq!(names[5], "create_product");
        assert_eq!(names[10], "discount");

        let create = &ctx.usecase.methods[5];
        assert_eq!(create.description.as_deref(), Some("Create with checks"));
        assert_eq!(create.rules, vec!["check_price_positive"]);
        let update = ctx.usecase.methods.iter().find(|m| m.name == "update_product").unwrap();
        assert_eq!(update.rules, vec!["check_price_positive"]);
        let delete = ctx.usecase.methods.iter().find(|m| m.name == "delete_product").unwrap();
        assert!(delete.rules.is_empty());

        let discount = &ctx.usecase.methods[10];
        assert!(discount.custom);
        assert_eq!(discount.repository.as_deref(), Some("product_repository"));

        let rule = &ctx.rules[0];
        assert_eq!(rule.bindings, vec!["price", "name"]);
        assert_eq!(rule.applies_to, vec!["create", "update"]);
        assert_eq!(rule.message_literal, r#""Price must be positive""#);
        assert_eq!(ctx.usecase.class_name, "ProductService");
        assert_eq!(ctx.usecase.repositories.len(), 2);
    }

    #[test]
    fn test_custom_endpoint_and_handler_names() {
        let mut config: MergedConfig = serde_yaml::from_str(CONFIG).unwrap();
        config.interface.auth_dependency = Some("app.core.auth.current_user".to_string());
        config.interface.endpoints = serde_yaml::from_str(
            r#"
- { operation: custom, usecase_method: discount, entity: Product, auth_required: true }
- { operation: read, entity: Product }
- { operation: read, entity: Product, path: "/by-id/{product_id}" }
"#,
        )
        .unwrap();
        let ctx = build_context(&config, "app.domain.product").unwrap();
        let endpoints = &ctx.interface.endpoints;
        assert_eq!(endpoints[0].path, "/discount");
        assert_eq!(endpoints[0].method, "post");
        assert!(endpoints[0].has_body);
        assert_eq!(endpoints[0].summary, "Discount");
        assert_eq!(endpoints[1].handler, "get_product");
        assert_eq!(endpoints[2].handler, "get_product_2");
        assert_eq!(ctx.interface.auth_dependency.as_deref(), Some("current_user"));
        assert_eq!(ctx.imports.interface, vec!["from app.core.auth import current_user"]);

        config.interface.endpoints[2].path = Some("/by-id".to_string());
        assert!(build_context(&config, "app.domain.product").is_err());
    }
}
