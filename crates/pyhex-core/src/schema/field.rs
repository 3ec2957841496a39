//! Field configuration and the `Field(key=value, ...)` mini-grammar.
//!
//! A field can be described with structured YAML keys (`primary_key`,
//! `max_length`, ...) and/or a raw SQLModel call in `sqlmodel_field`:
//!
//! ```yaml
//! - name: title
//!   type: str
//!   max_length: 120
//!   sqlmodel_field: 'Field(index=True, description="Title, shown in lists")'
//! ```
//!
//! The raw string is parsed with [`parse_field_call`] and its keyword
//! arguments override the structured ones key by key.
//!
//! # Examples
//!
//! ```
//! use pyhex_core::schema::field::{parse_field_call, FieldValue};
//!
//! let args = parse_field_call(r#"Field(default=None, max_length=255, description="a, b")"#).unwrap();
//! assert_eq!(args.get("default"), Some(&FieldValue::None));
//! assert_eq!(args.get("max_length"), Some(&FieldValue::Int(255)));
//! assert_eq!(args.get("description"), Some(&FieldValue::Str("a, b".to_string())));
//! assert_eq!(args.render(), r#"Field(default=None, max_length=255, description="a, b")"#);
//! ```

// Internal imports (std, crate)
use std::fmt;
use std::str::FromStr;

use crate::utils::is_python_identifier;

// External imports (alphabetized)
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Column types understood by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "string")]
    Str,
    Text,
    #[serde(alias = "integer")]
    Int,
    Float,
    #[serde(alias = "boolean")]
    Bool,
    Datetime,
    Date,
    Uuid,
    Decimal,
    Json,
}

impl FieldType {
    /// Python annotation for the type (without optionality)
    pub fn python_type(&self) -> &'static str {
        match self {
            Self::Str | Self::Text => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Uuid => "UUID",
            Self::Decimal => "Decimal",
            Self::Json => "dict",
        }
    }

    /// `(module, name)` to import for the annotation, if it is not a builtin
    pub fn import(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Datetime => Some(("datetime", "datetime")),
            Self::Date => Some(("datetime", "date")),
            Self::Uuid => Some(("uuid", "UUID")),
            Self::Decimal => Some(("decimal", "Decimal")),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Text => "text",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Uuid => "uuid",
            Self::Decimal => "decimal",
            Self::Json => "json",
        }
    }

    /// Whether `max_length`/`min_length` make sense for this type
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Str | Self::Text)
    }

    /// Whether `ge`/`le` make sense for this type
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::Decimal)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// A column/attribute of an entity or mixin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Required fields have no default and a non-optional annotation
    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,

    /// Python callable used as `default_factory` (e.g. `datetime.utcnow`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_factory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub index: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ge: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub le: Option<f64>,

    /// `table.column` this field references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    /// Raw `Field(...)` call overriding the structured keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlmodel_field: Option<String>,

    #[serde(default)]
    pub exclude_from_create: bool,

    #[serde(default)]
    pub exclude_from_update: bool,

    #[serde(default)]
    pub exclude_from_read: bool,
}

impl FieldConfig {
    /// Minimal field of the given type
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
            default_factory: None,
            description: None,
            primary_key: false,
            index: false,
            unique: false,
            nullable: None,
            max_length: None,
            min_length: None,
            ge: None,
            le: None,
            foreign_key: None,
            sqlmodel_field: None,
            exclude_from_create: false,
            exclude_from_update: false,
            exclude_from_read: false,
        }
    }

    /// Implicit `id: int` primary key added to table entities without one
    pub fn implicit_id() -> Self {
        Self {
            primary_key: true,
            exclude_from_create: true,
            exclude_from_update: true,
            ..Self::new("id", FieldType::Int)
        }
    }

    /// Whether the attribute may hold `None`
    pub fn is_optional(&self) -> bool {
        !self.required || self.nullable == Some(true) || self.has_generated_key()
    }

    /// Integer primary keys without an explicit default are generated by the database
    pub fn has_generated_key(&self) -> bool {
        self.primary_key
            && self.field_type == FieldType::Int
            && self.default.is_none()
            && self.default_factory.is_none()
    }

    /// Python annotation including optionality
    pub fn annotation(&self) -> String {
        let base = self.field_type.python_type();
        if self.is_optional() {
            format!("Optional[{base}]")
        } else {
            base.to_string()
        }
    }

    /// Keyword arguments of the SQLModel `Field(...)` call for this field.
    ///
    /// Structured keys form the base; keyword arguments parsed from
    /// `sqlmodel_field` override them.
    pub fn field_args(&self) -> Result<FieldArgs, FieldParseError> {
        let mut args = FieldArgs::default();

        if let Some(default) = &self.default {
            args.set("default", FieldValue::from_json(default));
        } else if let Some(factory) = &self.default_factory {
            args.set("default_factory", FieldValue::Expr(factory.clone()));
        } else if self.is_optional() {
            args.set("default", FieldValue::None);
        }
        if self.primary_key {
            args.set("primary_key", FieldValue::Bool(true));
        }
        if self.index {
            args.set("index", FieldValue::Bool(true));
        }
        if self.unique {
            args.set("unique", FieldValue::Bool(true));
        }
        if let Some(nullable) = self.nullable {
            args.set("nullable", FieldValue::Bool(nullable));
        }
        if let Some(fk) = &self.foreign_key {
            args.set("foreign_key", FieldValue::Str(fk.clone()));
        }
        if let Some(max) = self.max_length {
            args.set("max_length", FieldValue::Int(i64::from(max)));
        }
        if let Some(min) = self.min_length {
            args.set("min_length", FieldValue::Int(i64::from(min)));
        }
        if let Some(ge) = self.ge {
            args.set("ge", FieldValue::number(ge));
        }
        if let Some(le) = self.le {
            args.set("le", FieldValue::number(le));
        }
        if self.field_type == FieldType::Json {
            args.set("sa_column", FieldValue::Expr("Column(JSON)".to_string()));
        }
        if let Some(desc) = &self.description {
            args.set("description", FieldValue::Str(desc.clone()));
        }

        if let Some(raw) = &self.sqlmodel_field {
            args.merge(parse_field_call(raw)?);
        }
        Ok(args)
    }
}

/// A coerced keyword-argument value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Anything else, kept verbatim (`datetime.utcnow`, `Column(JSON)`, ...)
    Expr(String),
}

impl FieldValue {
    /// Integral floats become ints so `ge: 0` renders as `ge=0`
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < 1e15 {
            Self::Int(n as i64)
        } else {
            Self::Float(n)
        }
    }

    /// Convert a YAML/JSON default into a Python value
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::None,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::Str(s.clone()),
            other => Self::Expr(python_literal(other)),
        }
    }

    /// Python source form of the value
    pub fn to_python(&self) -> String {
        match self {
            Self::None => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => {
                let s = f.to_string();
                if s.contains(['.', 'e', 'E']) {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            Self::Str(s) => python_string(s),
            Self::Expr(e) => e.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_python())
    }
}

/// Double-quoted Python string literal
pub fn python_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Python literal for an arbitrary JSON value (lists and dicts included)
pub fn python_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Array(items) => {
            let items: Vec<String> = items.iter().map(python_literal).collect();
            format!("[{}]", items.join(", "))
        }
        JsonValue::Object(map) => {
            let items: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", python_string(k), python_literal(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        scalar => FieldValue::from_json(scalar).to_python(),
    }
}

/// Errors produced by the `Field(...)` parser
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldParseError {
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unbalanced bracket `{0}` at offset {1}")]
    UnbalancedBracket(char, usize),

    #[error("missing closing `)` in `{0}`")]
    UnclosedCall(String),

    #[error("empty argument in `{0}`")]
    EmptyArgument(String),

    #[error("invalid keyword `{0}`")]
    InvalidKey(String),

    #[error("positional argument `{0}` follows keyword arguments")]
    PositionalAfterKeyword(String),

    #[error("keyword `{0}` has no value")]
    EmptyValue(String),
}

/// Parsed arguments of a `Field(...)` call, in source order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldArgs {
    positional: Vec<String>,
    keywords: Vec<(String, FieldValue)>,
}

impl FieldArgs {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.keywords.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Set a keyword; an existing key keeps its position
    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.keywords.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.keywords.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let idx = self.keywords.iter().position(|(k, _)| k == key)?;
        Some(self.keywords.remove(idx).1)
    }

    /// Overlay `other` on top of `self`; `other` wins on conflicts
    pub fn merge(&mut self, other: FieldArgs) {
        if !other.positional.is_empty() {
            // A positional argument is the default
            self.remove("default");
            self.remove("default_factory");
            self.positional = other.positional;
        }
        for (k, v) in other.keywords {
            // `default` and `default_factory` are mutually exclusive in SQLModel
            match k.as_str() {
                "default" => {
                    self.remove("default_factory");
                }
                "default_factory" => {
                    self.remove("default");
                }
                _ => {}
            }
            self.set(k, v);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(|(k, _)| k.as_str())
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Canonical `Field(...)` source
    pub fn render(&self) -> String {
        format!("Field({})", self.render_arguments())
    }

    /// Comma separated argument list without the call wrapper
    pub fn render_arguments(&self) -> String {
        self.positional
            .iter()
            .cloned()
            .chain(
                self.keywords
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.to_python())),
            )
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for FieldArgs {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_field_call(s)
    }
}

/// Parse `Field(k=v, ...)`, `sqlmodel.Field(...)` or a bare `k=v, ...` list.
pub fn parse_field_call(src: &str) -> Result<FieldArgs, FieldParseError> {
    let src = src.trim();
    let inner = match call_arguments(src) {
        Some(inner) => inner,
        None if looks_like_call(src) => {
            return Err(FieldParseError::UnclosedCall(src.to_string()));
        }
        None => src,
    };

    let mut args = FieldArgs::default();
    for segment in split_top_level(inner)? {
        match split_keyword(&segment) {
            Some((key, value)) => {
                if !is_python_identifier(key) {
                    return Err(FieldParseError::InvalidKey(key.to_string()));
                }
                if value.is_empty() {
                    return Err(FieldParseError::EmptyValue(key.to_string()));
                }
                args.set(key, coerce(value));
            }
            None => {
                if !args.keywords.is_empty() {
                    return Err(FieldParseError::PositionalAfterKeyword(segment));
                }
                args.positional.push(segment);
            }
        }
    }
    Ok(args)
}

/// `Field(`, `sqlmodel.Field(` and friends
fn looks_like_call(src: &str) -> bool {
    let Some(open) = src.find('(') else {
        return false;
    };
    let callee = src[..open].trim();
    callee.split('.').all(is_python_identifier) && callee.rsplit('.').next() == Some("Field")
}

/// Text between the outer parentheses when `src` is a complete `Field(...)` call
fn call_arguments(src: &str) -> Option<&str> {
    if !looks_like_call(src) || !src.ends_with(')') {
        return None;
    }
    let open = src.find('(')?;
    Some(&src[open + 1..src.len() - 1])
}

/// Split on commas that are outside quotes and brackets
fn split_top_level(src: &str) -> Result<Vec<String>, FieldParseError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut quote: Option<(char, usize)> = None;
    let mut escaped = false;

    for (offset, c) in src.char_indices() {
        if let Some((q, _)) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some((c, offset));
                current.push(c);
            }
            '(' | '[' | '{' => {
                stack.push((c, offset));
                current.push(c);
            }
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => current.push(c),
                    _ => return Err(FieldParseError::UnbalancedBracket(c, offset)),
                }
            }
            ',' if stack.is_empty() => {
                let segment = current.trim().to_string();
                if segment.is_empty() {
                    return Err(FieldParseError::EmptyArgument(src.to_string()));
                }
                segments.push(segment);
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if let Some((_, start)) = quote {
        return Err(FieldParseError::UnterminatedString(start));
    }
    if let Some((open, offset)) = stack.pop() {
        return Err(FieldParseError::UnbalancedBracket(open, offset));
    }

    // A trailing comma is allowed, as in Python
    let last = current.trim();
    if !last.is_empty() {
        segments.push(last.to_string());
    }
    Ok(segments)
}

/// Split `key=value` on the first top-level `=` that is not a comparison
fn split_keyword(segment: &str) -> Option<(&str, &str)> {
    let bytes = segment.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' => quote = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            b'=' if depth == 0 => {
                let prev = i.checked_sub(1).map(|p| bytes[p]);
                let next = bytes.get(i + 1).copied();
                if next == Some(b'=') || matches!(prev, Some(b'=' | b'<' | b'>' | b'!')) {
                    continue;
                }
                return Some((segment[..i].trim(), segment[i + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

/// Coerce a raw argument value into a [`FieldValue`]
fn coerce(raw: &str) -> FieldValue {
    match raw {
        "True" => return FieldValue::Bool(true),
        "False" => return FieldValue::Bool(false),
        "None" => return FieldValue::None,
        _ => {}
    }

    if let Some(s) = unquote(raw) {
        return FieldValue::Str(s);
    }

    let Some(numeric) = strip_digit_separators(raw) else {
        return FieldValue::Expr(raw.to_string());
    };
    let starts_numeric = numeric
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if starts_numeric {
        let digits = numeric.trim_start_matches(['-', '+']);
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            // Integers beyond i64 stay verbatim rather than becoming floats
            return match numeric.parse::<i64>() {
                Ok(i) => FieldValue::Int(i),
                Err(_) => FieldValue::Expr(raw.to_string()),
            };
        }
        if let Ok(f) = numeric.parse::<f64>() {
            if f.is_finite() {
                return FieldValue::Float(f);
            }
        }
    }

    FieldValue::Expr(raw.to_string())
}

/// Drop `_` separators, which Python only allows between two digits
fn strip_digit_separators(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'_' {
            continue;
        }
        let between_digits = i > 0
            && bytes[i - 1].is_ascii_digit()
            && bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
        if !between_digits {
            return None;
        }
    }
    Some(raw.replace('_', ""))
}

/// Body of a single- or double-quoted literal with escapes resolved
fn unquote(raw: &str) -> Option<String> {
    let mut chars = raw.chars();
    let q = chars.next().filter(|c| *c == '"' || *c == '\'')?;
    if raw.len() < 2 || !raw.ends_with(q) {
        return None;
    }
    let body = &raw[1..raw.len() - 1];

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == q {
            // An unescaped quote inside means this is not a single literal (`"a" + "b"`)
            return None;
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    Some(out)
}
