//! Cross-reference validation of a merged configuration.
//!
//! Validation never stops at the first problem: every issue is collected with
//! a dotted path to the offending node so that a single run reports all of
//! them. Warnings are returned alongside and do not fail generation.

// Internal imports (std, crate)
use std::collections::{BTreeSet, HashSet};

use super::domain::Operation;
use super::entity::{EntityConfig, RelationshipKind};
use super::field::FieldConfig;
use super::MergedConfig;
use crate::error::{Error, Result, Severity, ValidationIssue};
use crate::utils::{did_you_mean, is_python_identifier};

/// Validate `config`, failing with every error found.
///
/// `external_entities` holds qualified names (`domain.Entity`) of entities in
/// other domains of the same project. When it is empty, qualified
/// relationship targets are accepted without checking.
///
/// Returns the warnings when there are no errors.
pub fn ensure_valid(
    config: &MergedConfig,
    external_entities: &BTreeSet<String>,
) -> Result<Vec<ValidationIssue>> {
    let issues = validate(config, external_entities);
    if issues.iter().any(|i| i.severity == Severity::Error) {
        return Err(Error::Validation(issues));
    }
    Ok(issues)
}

/// Collect every validation issue of `config`
pub fn validate(
    config: &MergedConfig,
    external_entities: &BTreeSet<String>,
) -> Vec<ValidationIssue> {
    let mut validator = Validator {
        config,
        external: external_entities,
        issues: Vec::new(),
    };
    validator.check_domain();
    validator.check_mixins();
    validator.check_entities();
    validator.check_rules();
    validator.check_usecase();
    validator.check_endpoints();
    validator.check_repository();
    validator.issues
}

struct Validator<'a> {
    config: &'a MergedConfig,
    external: &'a BTreeSet<String>,
    issues: Vec<ValidationIssue>,
}

impl<'a> Validator<'a> {
    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::error(path, message));
    }

    fn error_with(&mut self, path: impl Into<String>, message: impl Into<String>, hint: Option<String>) {
        self.issues
            .push(ValidationIssue::error(path, message).with_suggestion(hint));
    }

    fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue::warning(path, message));
    }

    fn entity_names(&self) -> Vec<&'a str> {
        self.config
            .domain
            .entities
            .iter()
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Resolve an entity reference, recording an error when it is unknown
    fn resolve_entity(&mut self, path: &str, name: &str) -> Option<&'a EntityConfig> {
        let config = self.config;
        match config.domain.entity(name) {
            Some(entity) => Some(entity),
            None => {
                let hint = did_you_mean(name, self.entity_names());
                self.error_with(path, format!("unknown entity `{name}`"), hint);
                None
            }
        }
    }

    fn check_duplicates<'n>(&mut self, path: &str, kind: &str, names: impl IntoIterator<Item = &'n str>) {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                self.error(format!("{path}.{name}"), format!("duplicate {kind} `{name}`"));
            }
        }
    }

    fn check_identifier(&mut self, path: &str, kind: &str, name: &str) {
        if !is_python_identifier(name) {
            self.error(
                path,
                format!("{kind} `{name}` is not a valid Python identifier"),
            );
        }
    }

    fn check_domain(&mut self) {
        let domain = &self.config.domain;
        if domain.name.trim().is_empty() || domain.snake_name().is_empty() {
            self.error("domain.name", "domain name must not be empty");
        }
        if domain.entities.is_empty() {
            self.error("domain.entities", "a domain needs at least one entity");
        }
    }

    fn check_mixins(&mut self) {
        let mixins = &self.config.domain.mixins;
        self.check_duplicates("domain.mixins", "mixin", mixins.iter().map(|m| m.name.as_str()));
        for mixin in mixins {
            let path = format!("domain.mixins.{}", mixin.name);
            self.check_fields(&path, &mixin.fields);
        }
    }

    fn check_fields(&mut self, path: &str, fields: &[FieldConfig]) {
        self.check_duplicates(
            &format!("{path}.fields"),
            "field",
            fields.iter().map(|f| f.name.as_str()),
        );
        for field in fields {
            let field_path = format!("{path}.fields.{}", field.name);
            self.check_identifier(&field_path, "field name", &field.name);
            if (field.max_length.is_some() || field.min_length.is_some())
                && !field.field_type.is_textual()
            {
                self.error(
                    &field_path,
                    format!("max_length/min_length do not apply to `{}` fields", field.field_type),
                );
            }
            if (field.ge.is_some() || field.le.is_some()) && !field.field_type.is_numeric() {
                self.error(
                    &field_path,
                    format!("ge/le do not apply to `{}` fields", field.field_type),
                );
            }
            if field.default.is_some() && field.default_factory.is_some() {
                self.error(&field_path, "default and default_factory are mutually exclusive");
            }
            if let Err(e) = field.field_args() {
                self.error_with(
                    format!("{field_path}.sqlmodel_field"),
                    format!("cannot parse Field() call: {e}"),
                    Some("write it as `Field(key=value, ...)`".to_string()),
                );
            }
        }
    }

    fn check_entities(&mut self) {
        let config = self.config;
        let domain = &config.domain;
        self.check_duplicates(
            "domain.entities",
            "entity",
            domain.entities.iter().map(|e| e.name.as_str()),
        );
        let mixin_names: Vec<&str> = domain.mixins.iter().map(|m| m.name.as_str()).collect();

        for entity in &domain.entities {
            let path = format!("domain.entities.{}", entity.name);
            if entity.class_name().is_empty() {
                self.error(&path, "entity name must contain letters");
            }

            // Mixin references and fields contributed by more than one mixin
            let mut mixin_fields: HashSet<&str> = HashSet::new();
            for (i, mixin_name) in entity.mixins.iter().enumerate() {
                match domain.mixin(mixin_name) {
                    Some(mixin) => {
                        for field in &mixin.fields {
                            if !mixin_fields.insert(field.name.as_str())
                                && entity.field(&field.name).is_none()
                            {
                                self.error(
                                    format!("{path}.mixins[{i}]"),
                                    format!(
                                        "field `{}` is provided by more than one mixin",
                                        field.name
                                    ),
                                );
                            }
                        }
                    }
                    None => {
                        let hint = did_you_mean(mixin_name, mixin_names.iter().copied());
                        self.error_with(
                            format!("{path}.mixins[{i}]"),
                            format!("unknown mixin `{mixin_name}`"),
                            hint,
                        );
                    }
                }
            }

            self.check_fields(&path, &entity.fields);

            let fields = domain.effective_fields(entity);
            let primary_keys = fields.iter().filter(|f| f.primary_key).count();
            if entity.table && primary_keys > 1 {
                self.error(
                    format!("{path}.fields"),
                    format!("{primary_keys} primary keys declared; composite keys are not supported"),
                );
            }

            self.check_relationships(entity, &fields);
        }
    }

    fn check_relationships(&mut self, entity: &EntityConfig, fields: &[FieldConfig]) {
        let config = self.config;
        let path = format!("domain.entities.{}.relationships", entity.name);
        self.check_duplicates(
            &path,
            "relationship",
            entity.relationships.iter().map(|r| r.name.as_str()),
        );

        for rel in &entity.relationships {
            let rel_path = format!("{path}.{}", rel.name);
            self.check_identifier(&rel_path, "relationship name", &rel.name);
            if fields.iter().any(|f| f.name == rel.name) {
                self.error(
                    &rel_path,
                    format!("relationship `{}` clashes with a field of the same name", rel.name),
                );
            }

            if rel.kind == RelationshipKind::ManyToMany && rel.link_model.is_none() {
                self.error_with(
                    &rel_path,
                    "many_to_many relationships need a link_model",
                    Some("add `link_model: <AssociationEntity>`".to_string()),
                );
            }

            if let Some(fk) = &rel.foreign_key {
                if !rel.kind.owns_foreign_key() {
                    self.error(
                        format!("{rel_path}.foreign_key"),
                        format!("{} relationships do not own a foreign key", rel.kind.as_str()),
                    );
                } else if !fields.iter().any(|f| &f.name == fk) {
                    let hint = did_you_mean(fk, fields.iter().map(|f| f.name.as_str()));
                    self.error_with(
                        format!("{rel_path}.foreign_key"),
                        format!("foreign key field `{fk}` does not exist on `{}`", entity.name),
                        hint,
                    );
                }
            }

            if rel.is_external() {
                if !self.external.is_empty() && !self.external.contains(&rel.target) {
                    let hint = did_you_mean(&rel.target, self.external.iter().map(String::as_str));
                    self.error_with(
                        format!("{rel_path}.target"),
                        format!("unknown entity `{}` in another domain", rel.target),
                        hint,
                    );
                }
                continue;
            }

            let Some(target) = self.resolve_entity(&format!("{rel_path}.target"), &rel.target)
            else {
                continue;
            };
            if !target.table {
                self.error(
                    format!("{rel_path}.target"),
                    format!("`{}` is not a table entity", target.name),
                );
            }
            if let Some(back) = &rel.back_populates {
                if target.relationship(back).is_none() {
                    self.warning(
                        format!("{rel_path}.back_populates"),
                        format!("`{}` has no relationship named `{back}`", target.name),
                    );
                }
            }
            if let Some(link) = &rel.link_model {
                if config.domain.entity(link).is_none() {
                    let hint = did_you_mean(link, self.entity_names());
                    self.error_with(
                        format!("{rel_path}.link_model"),
                        format!("unknown link model `{link}`"),
                        hint,
                    );
                }
            }
        }
    }

    fn check_rules(&mut self) {
        let config = self.config;
        let rules = &config.business_rules.rules;
        self.check_duplicates(
            "business_rules.rules",
            "business rule",
            rules.iter().map(|r| r.name.as_str()),
        );
        for rule in rules {
            let path = format!("business_rules.rules.{}", rule.name);
            self.check_identifier(&path, "rule name", &rule.name);
            if rule.condition.trim().is_empty() {
                self.error(format!("{path}.condition"), "condition must not be empty");
            }
            let Some(entity) = self.resolve_entity(&format!("{path}.entity"), &rule.entity) else {
                continue;
            };
            if let Some(field) = &rule.field {
                let fields = config.domain.effective_fields(entity);
                if !fields.iter().any(|f| &f.name == field) {
                    let hint = did_you_mean(field, fields.iter().map(|f| f.name.as_str()));
                    self.error_with(
                        format!("{path}.field"),
                        format!("`{}` has no field `{field}`", entity.name),
                        hint,
                    );
                }
            }
        }
    }

    /// Names of every method the generated service will have
    fn usecase_method_names(&self) -> Vec<String> {
        let config = self.config;
        let mut names: Vec<String> = Vec::new();
        if config.usecase.generate_crud {
            for entity in config.domain.table_entities() {
                names.extend(Operation::CRUD.iter().filter_map(|op| op.method_name(entity)));
            }
        }
        names.extend(config.usecase.methods.iter().map(|m| m.name.clone()));
        names
    }

    fn check_usecase(&mut self) {
        let config = self.config;
        let methods = &config.usecase.methods;
        self.check_duplicates(
            "usecase.methods",
            "use-case method",
            methods.iter().map(|m| m.name.as_str()),
        );
        let rule_names: Vec<&str> = config
            .business_rules
            .rules
            .iter()
            .map(|r| r.name.as_str())
            .collect();

        for method in methods {
            let path = format!("usecase.methods.{}", method.name);
            self.check_identifier(&path, "method name", &method.name);
            if let Some(entity) = &method.entity {
                self.resolve_entity(&format!("{path}.entity"), entity);
            } else if method.operation.is_some_and(|op| op != Operation::Custom)
                && config.domain.table_entities().next().is_none()
            {
                self.error(
                    format!("{path}.entity"),
                    "no entity given and the domain has no table entity to default to",
                );
            }
            for (i, rule) in method.business_rules.iter().enumerate() {
                if config.rule(rule).is_none() {
                    let hint = did_you_mean(rule, rule_names.iter().copied());
                    self.error_with(
                        format!("{path}.business_rules[{i}]"),
                        format!("unknown business rule `{rule}`"),
                        hint,
                    );
                }
            }
        }
    }

    fn check_endpoints(&mut self) {
        let config = self.config;
        let method_names = self.usecase_method_names();
        let has_table_entity = config.domain.table_entities().next().is_some();

        let sections = [
            ("domain.endpoints", &config.domain.endpoints),
            ("interface.endpoints", &config.interface.endpoints),
        ];
        for (section, endpoints) in sections {
            for (i, endpoint) in endpoints.iter().enumerate() {
                let path = format!("{section}[{i}]");
                if let Some(p) = &endpoint.path {
                    if !p.starts_with('/') {
                        self.error_with(
                            format!("{path}.path"),
                            format!("path `{p}` must start with `/`"),
                            Some(format!("use `/{p}`")),
                        );
                    }
                }
                if endpoint.auth_required && config.interface.auth_dependency.is_none() {
                    self.error_with(
                        format!("{path}.auth_required"),
                        "auth_required needs an auth_dependency",
                        Some("set `auth_dependency: app.core.auth.<dependency>` in interface.yaml".to_string()),
                    );
                }
                match &endpoint.entity {
                    Some(entity) => {
                        self.resolve_entity(&format!("{path}.entity"), entity);
                    }
                    None if endpoint.operation != Operation::Custom && !has_table_entity => {
                        self.error(
                            format!("{path}.entity"),
                            "no entity given and the domain has no table entity to default to",
                        );
                    }
                    None => {}
                }
                match &endpoint.usecase_method {
                    Some(method) if !method_names.iter().any(|m| m == method) => {
                        let hint = did_you_mean(method, method_names.iter().map(String::as_str));
                        self.error_with(
                            format!("{path}.usecase_method"),
                            format!("unknown use-case method `{method}`"),
                            hint,
                        );
                    }
                    None if endpoint.operation == Operation::Custom => {
                        self.error(
                            format!("{path}.usecase_method"),
                            "custom endpoints must name a usecase_method",
                        );
                    }
                    None if !config.usecase.generate_crud => {
                        self.error_with(
                            format!("{path}.usecase_method"),
                            "CRUD methods are disabled, so the endpoint must name a usecase_method",
                            Some("set `generate_crud: true` in usecase.yaml".to_string()),
                        );
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_repository(&mut self) {
        let config = self.config;
        let repo = &config.repository;
        if repo.default_limit > repo.max_limit {
            self.error(
                "repository.default_limit",
                format!(
                    "default_limit ({}) exceeds max_limit ({})",
                    repo.default_limit, repo.max_limit
                ),
            );
        }
        if repo.soft_delete {
            for entity in config.domain.table_entities() {
                let fields = config.domain.effective_fields(entity);
                if !fields.iter().any(|f| f.name == "deleted_at") {
                    self.error_with(
                        format!("domain.entities.{}", entity.name),
                        "soft_delete requires a `deleted_at` field",
                        Some("add `deleted_at: datetime, required: false` or a mixin providing it".to_string()),
                    );
                }
            }
        }

        self.check_duplicates(
            "repository.methods",
            "repository method",
            repo.methods.iter().map(|m| m.name.as_str()),
        );
        for method in &repo.methods {
            let path = format!("repository.methods.{}", method.name);
            self.check_identifier(&path, "method name", &method.name);
            let entity = match &method.entity {
                Some(name) => self.resolve_entity(&format!("{path}.entity"), name),
                None => {
                    let first = config.domain.table_entities().next();
                    if first.is_none() {
                        self.error(
                            format!("{path}.entity"),
                            "no entity given and the domain has no table entity to default to",
                        );
                    }
                    first
                }
            };
            let Some(entity) = entity else {
                continue;
            };
            // Foreign key columns implied by owning relationships are filterable too
            let mut columns: Vec<String> = config
                .domain
                .effective_fields(entity)
                .into_iter()
                .map(|f| f.name)
                .collect();
            columns.extend(
                entity
                    .relationships
                    .iter()
                    .filter(|r| r.kind.owns_foreign_key() && r.foreign_key.is_none())
                    .map(|r| r.foreign_key_field()),
            );
            for (i, filter) in method.filter_by.iter().enumerate() {
                if !columns.contains(filter) {
                    let hint = did_you_mean(filter, columns.iter().map(String::as_str));
                    self.error_with(
                        format!("{path}.filter_by[{i}]"),
                        format!("`{}` has no field `{filter}`", entity.name),
                        hint,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(yaml: &str) -> MergedConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn paths(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    const VALID: &str = r#"
domain:
  name: Product
  mixins:
    - name: Timestamped
      fields:
        - { name: created_at, type: datetime, default_factory: datetime.utcnow }
  entities:
    - name: Category
      fields:
        - { name: title, type: str, max_length: 80 }
      relationships:
        - { name: products, target: Product, kind: one_to_many, back_populates: category }
    - name: Product
      mixins: [Timestamped]
      fields:
        - { name: name, type: str }
        - { name: price, type: float, ge: 0 }
      relationships:
        - { name: category, target: Category, kind: many_to_one, back_populates: products }
business_rules:
  rules:
    - { name: price_positive, entity: Product, field: price, condition: "price > 0", message: must be positive }
usecase:
  methods:
    - { name: discount, entity: Product, operation: custom, business_rules: [price_positive] }
repository:
  methods:
    - { name: find_by_name, entity: Product, filter_by: [name], returns: one }
interface:
  endpoints:
    - { operation: custom, path: /discount, usecase_method: discount, entity: Product }
"#;

    #[test]
    fn test_valid_config_has_no_issues() {
        let config = merged(VALID);
        let issues = validate(&config, &BTreeSet::new());
        assert!(issues.is_empty(), "unexpected issues: {issues:?}");
        assert!(ensure_valid(&config, &BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_collects_every_broken_reference() {
        let config = merged(
            r#"
domain:
  name: Product
  mixins:
    - name: Timestamped
      fields: [{ name: created_at, type: datetime }]
  entities:
    - name: Product
      mixins: [Timestampd]
      fields:
        - { name: name, type: int, max_length: 3 }
      relationships:
        - { name: tags, target: Tag, kind: many_to_many }
business_rules:
  rules:
    - { name: r1, entity: Prodcut, condition: "x", message: m }
    - { name: r2, entity: Product, field: nmae, condition: "x", message: m }
usecase:
  methods:
    - { name: m1, business_rules: [r3] }
repository:
  methods:
    - { name: find, filter_by: [sku] }
interface:
  endpoints:
    - { operation: read, path: "no-slash" }
    - { operation: custom }
"#,
        );
        let issues = validate(&config, &BTreeSet::new());
        let paths = paths(&issues);
        for expected in [
            "domain.entities.Product.mixins[0]",
            "domain.entities.Product.fields.name",
            "domain.entities.Product.relationships.tags",
            "domain.entities.Product.relationships.tags.target",
            "business_rules.rules.r1.entity",
            "business_rules.rules.r2.field",
            "usecase.methods.m1.business_rules[0]",
            "repository.methods.find.filter_by[0]",
            "interface.endpoints[0].path",
            "interface.endpoints[1].usecase_method",
        ] {
            assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
        }

        let mixin = issues
            .iter()
            .find(|i| i.path == "domain.entities.Product.mixins[0]")
            .unwrap();
        assert_eq!(mixin.suggestion.as_deref(), Some("did you mean `Timestamped`?"));

        let err = ensure_valid(&config, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.len() == issues.len()));
    }

    #[test]
    fn test_back_populates_mismatch_is_a_warning() {
        let config = merged(
            r#"
domain:
  name: Shop
  entities:
    - name: Category
    - name: Product
      relationships:
        - { name: category, target: Category, kind: many_to_one, back_populates: items }
"#,
        );
        let warnings = ensure_valid(&config, &BTreeSet::new()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert_eq!(
            warnings[0].path,
            "domain.entities.Product.relationships.category.back_populates"
        );
    }

    #[test]
    fn test_external_targets_checked_when_known() {
        let config = merged(
            r#"
domain:
  name: Order
  entities:
    - name: Order
      relationships:
        - { name: customer, target: user.Usr, kind: many_to_one }
"#,
        );
        assert!(validate(&config, &BTreeSet::new()).is_empty());

        let known: BTreeSet<String> = ["user.User".to_string()].into_iter().collect();
        let issues = validate(&config, &known);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].suggestion.as_deref(), Some("did you mean `user.User`?"));
    }

    #[test]
    fn test_soft_delete_requires_deleted_at() {
        let config = merged(
            r#"
domain:
  name: Note
  entities:
    - name: Note
      fields: [{ name: body, type: text }]
repository:
  soft_delete: true
"#,
        );
        let issues = validate(&config, &BTreeSet::new());
        assert_eq!(paths(&issues), vec!["domain.entities.Note"]);
    }
}
