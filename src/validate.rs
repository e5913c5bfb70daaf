//! Checks tool arguments against the JSON schema a tool declares.
//!
//! Only the subset of JSON Schema that the tool parameter types generate is
//! understood: `required`, `properties`, `type`, `enum`, `minimum`/`maximum`,
//! `$ref` into `$defs`/`definitions`, `allOf`/`anyOf`/`oneOf` and `nullable`.
//! Every violation is collected rather than stopping at the first one.
//! Fields the schema does not declare are ignored.

use serde_json::{Map, Value};

use crate::error::FieldViolation;

pub fn validate_arguments(schema: &Map<String, Value>, args: &Map<String, Value>) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if matches!(args.get(field), None | Some(Value::Null)) {
                violations.push(FieldViolation::new(field, "Required"));
            }
        }
    }

    let mut fields: Vec<&String> = args.keys().collect();
    fields.sort();
    for field in fields {
        let value = &args[field];
        // Undeclared fields are ignored and dropped on deserialize.
        if let Some(property) = properties.get(field) {
            check_value(schema, property, value, field, &mut violations);
        }
    }

    violations
}

fn check_value(
    root: &Map<String, Value>,
    schema: &Value,
    value: &Value,
    path: &str,
    violations: &mut Vec<FieldViolation>,
) {
    let schema = resolve_ref(root, schema);
    let Some(schema) = schema.as_object() else {
        return;
    };

    for combinator in ["anyOf", "oneOf"] {
        if let Some(branches) = schema.get(combinator).and_then(Value::as_array) {
            let mut failures = Vec::with_capacity(branches.len());
            for branch in branches {
                let mut branch_violations = Vec::new();
                check_value(root, branch, value, path, &mut branch_violations);
                if branch_violations.is_empty() {
                    return;
                }
                failures.push((is_null_schema(root, branch), branch_violations));
            }
            // The non-null branch carries the useful message.
            let report = failures
                .iter()
                .position(|(is_null, _)| !is_null)
                .unwrap_or(0);
            if let Some((_, branch_violations)) = failures.into_iter().nth(report) {
                violations.extend(branch_violations);
            }
            return;
        }
    }

    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        for part in parts {
            check_value(root, part, value, path, violations);
        }
    }

    if value.is_null() && allows_null(schema) {
        return;
    }

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            violations.push(FieldViolation::new(
                path,
                format!("Expected {}, received {}", describe_type(expected), json_type(value)),
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options = allowed
                .iter()
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(", ");
            violations.push(FieldViolation::new(
                path,
                format!("Invalid enum value. Expected one of: {options}"),
            ));
            return;
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if number < min {
                violations.push(FieldViolation::new(
                    path,
                    format!("Number must be greater than or equal to {}", format_bound(min)),
                ));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if number > max {
                violations.push(FieldViolation::new(
                    path,
                    format!("Number must be less than or equal to {}", format_bound(max)),
                ));
            }
        }
    }
}

fn resolve_ref<'a>(root: &'a Map<String, Value>, schema: &'a Value) -> &'a Value {
    let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
        return schema;
    };
    let target = ["#/$defs/", "#/definitions/"].iter().find_map(|prefix| {
        let name = reference.strip_prefix(prefix)?;
        let section = prefix.trim_start_matches("#/").trim_end_matches('/');
        root.get(section)?.get(name)
    });
    target.unwrap_or(schema)
}

fn is_null_schema(root: &Map<String, Value>, schema: &Value) -> bool {
    resolve_ref(root, schema).get("type").and_then(Value::as_str) == Some("null")
}

fn allows_null(schema: &Map<String, Value>) -> bool {
    if schema.get("nullable").and_then(Value::as_bool) == Some(true) {
        return true;
    }
    match schema.get("type") {
        Some(Value::String(t)) => t == "null",
        Some(Value::Array(types)) => types.iter().any(|t| t == "null"),
        _ => false,
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(t) => t.clone(),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}
