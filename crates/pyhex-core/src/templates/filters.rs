//! Tera filters available to every template

// Internal imports (std, crate)
use std::collections::HashMap;

use crate::schema::field::python_literal;
use crate::utils::{pluralize, to_lower_camel_case, to_snake_case, to_upper_camel_case};

// External imports (alphabetized)
use tera::{Tera, Value};

fn expect_str<'a>(filter: &str, value: &'a Value) -> tera::Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("`{filter}` filter expects a string, got {value}")))
}

pub fn snake_case(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(to_snake_case(expect_str("snake_case", value)?)))
}

pub fn pascal_case(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(to_upper_camel_case(expect_str("pascal_case", value)?)))
}

pub fn camel_case(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(to_lower_camel_case(expect_str("camel_case", value)?)))
}

pub fn plural(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(pluralize(expect_str("plural", value)?)))
}

/// Python literal of any value (`None`, `True`, `"text"`, `[1, 2]`)
pub fn py_repr(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(python_literal(value)))
}

/// Text safe inside a `"""` docstring
pub fn docstring_text(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\");
    // Quotes right before the closing `"""` would end the docstring early
    let body = escaped.trim_end_matches('"');
    let trailing = escaped.len() - body.len();
    format!(
        "{}{}",
        body.replace("\"\"\"", "\\\"\\\"\\\""),
        "\\\"".repeat(trailing)
    )
}

pub fn py_docstring(value: &Value, _: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(Value::String(docstring_text(expect_str("py_docstring", value)?)))
}

/// Register every filter on `tera`
pub fn register(tera: &mut Tera) {
    tera.register_filter("snake_case", snake_case);
    tera.register_filter("pascal_case", pascal_case);
    tera.register_filter("camel_case", camel_case);
    tera.register_filter("plural", plural);
    tera.register_filter("py_repr", py_repr);
    tera.register_filter("py_docstring", py_docstring);
}
