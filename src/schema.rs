//! Response schemas for every stage, plus a local validator.
//!
//! The schemas are written in the OpenAPI subset the generation API accepts
//! (`type`, `nullable`, `pattern`, `minimum`, `maximum`, `properties`,
//! `required`, `items`, `enum`). The service is asked to enforce them, and
//! [`validate`] re-checks every response before a stage is accepted.

use crate::output::StageKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

const CODE_PATTERN: &str = "^[A-Za-z0-9_]{1,20}$";
const ITEM_PATTERN: &str = "^[A-Za-z0-9 ]{1,50}$";
const UNIT_PATTERN: &str = "^[A-Za-z0-9 ]{1,20}$";
const FREE_TEXT_PATTERN: &str = "^.{1,500}$";
const SCOPE_PATTERN: &str = "^[A-Za-z0-9 ]{1,100}$";
const LABEL_PATTERN: &str = "^[A-Za-z ]{1,50}$";
const FISCAL_YEAR_END_PATTERN: &str = "^(0[1-9]|1[0-2])/(0[1-9]|[12][0-9]|3[01])/(19|20)[0-9]{2}$";

/// Response schema for the given stage.
pub fn for_stage(stage: StageKind) -> Value {
    match stage {
        StageKind::Identify => array_of(identify_properties(), &["code", "item"]),
        StageKind::Extract => array_of(
            extract_properties(),
            &["code", "item", "value", "unit", "page_number", "snippet"],
        ),
        StageKind::Classify => array_of(
            classify_properties(),
            &[
                "code",
                "item",
                "value",
                "unit",
                "page_number",
                "snippet",
                "year",
                "scope",
                "flag",
                "flag_reasoning",
                "consumption_type",
            ],
        ),
        StageKind::SingleShot => single_shot_schema(),
    }
}

fn array_of(properties: Map<String, Value>, required: &[&str]) -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": properties,
            "required": required,
        }
    })
}

/// Page numbers must fit the record's `u32`.
fn page_number_schema() -> Value {
    json!({"type": "integer", "nullable": true, "minimum": 0, "maximum": u32::MAX})
}

fn identify_properties() -> Map<String, Value> {
    let mut p = Map::new();
    p.insert("code".into(), json!({"type": "string", "pattern": CODE_PATTERN}));
    p.insert("item".into(), json!({"type": "string", "pattern": ITEM_PATTERN}));
    p
}

fn extract_properties() -> Map<String, Value> {
    let mut p = identify_properties();
    p.insert("value".into(), json!({"type": "number", "nullable": true}));
    p.insert(
        "unit".into(),
        json!({"type": "string", "pattern": UNIT_PATTERN, "nullable": true}),
    );
    p.insert("page_number".into(), page_number_schema());
    p.insert(
        "snippet".into(),
        json!({"type": "string", "pattern": FREE_TEXT_PATTERN, "nullable": true}),
    );
    p
}

fn classify_properties() -> Map<String, Value> {
    let mut p = extract_properties();
    p.insert(
        "year".into(),
        json!({"type": "integer", "minimum": 1900, "maximum": 2100}),
    );
    p.insert("scope".into(), json!({"type": "string", "pattern": SCOPE_PATTERN}));
    p.insert("flag".into(), json!({"type": "string", "pattern": LABEL_PATTERN}));
    p.insert(
        "flag_reasoning".into(),
        json!({"type": "string", "pattern": FREE_TEXT_PATTERN}),
    );
    p.insert(
        "consumption_type".into(),
        json!({"type": "string", "pattern": LABEL_PATTERN}),
    );
    p
}

fn single_shot_schema() -> Value {
    let mut metric = Map::new();
    metric.insert("code".into(), json!({"type": "string", "pattern": CODE_PATTERN}));
    metric.insert("item".into(), json!({"type": "string", "pattern": ITEM_PATTERN}));
    metric.insert("scope".into(), json!({"type": "string", "pattern": SCOPE_PATTERN}));
    metric.insert("flag".into(), json!({"type": "string", "pattern": LABEL_PATTERN}));
    metric.insert("value".into(), json!({"type": "number", "nullable": true}));
    metric.insert(
        "unit".into(),
        json!({"type": "string", "pattern": UNIT_PATTERN, "nullable": true}),
    );
    metric.insert("page_number".into(), page_number_schema());
    metric.insert(
        "snippet".into(),
        json!({"type": "string", "pattern": FREE_TEXT_PATTERN, "nullable": true}),
    );
    metric.insert(
        "relevant_information".into(),
        json!({"type": "string", "pattern": FREE_TEXT_PATTERN}),
    );
    metric.insert(
        "flag_reasoning".into(),
        json!({"type": "string", "pattern": FREE_TEXT_PATTERN}),
    );
    metric.insert(
        "consumption_type".into(),
        json!({"type": "string", "pattern": LABEL_PATTERN}),
    );

    json!({
        "type": "object",
        "properties": {
            "year": {"type": "integer", "minimum": 1900, "maximum": 2100},
            "metrics": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": metric,
                    "required": [
                        "code", "item", "scope", "flag", "value", "unit",
                        "page_number", "snippet", "flag_reasoning", "consumption_type"
                    ]
                }
            },
            "metadata": {
                "type": "object",
                "properties": {
                    "data_sources": {"type": "string", "pattern": "^.{1,200}$"},
                    "data_collector": {"type": "string", "pattern": "^.{1,100}$"},
                    "fiscal_year_end": {"type": "string", "pattern": FISCAL_YEAR_END_PATTERN},
                    "geographical_scope": {"type": "string", "pattern": LABEL_PATTERN},
                    "country": {"type": "string", "pattern": LABEL_PATTERN},
                    "organization_name": {"type": "string", "pattern": "^[A-Za-z0-9 ]{1,100}$"}
                },
                "required": [
                    "data_sources", "data_collector", "fiscal_year_end",
                    "geographical_scope", "country", "organization_name"
                ]
            }
        },
        "required": ["year", "metrics", "metadata"]
    })
}

// ── Validation ───────────────────────────────────────────────────────────────

static PATTERNS: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Validate `value` against `schema`.
///
/// Returns every violation found, each prefixed with a JSON path
/// (`$[3].year`). An empty `Ok(())` means the value conforms.
pub fn validate(value: &Value, schema: &Value) -> Result<(), Vec<String>> {
    let mut violations = Vec::new();
    check(value, schema, "$", &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check(value: &Value, schema: &Value, path: &str, out: &mut Vec<String>) {
    if value.is_null() && schema.get("nullable").and_then(Value::as_bool) == Some(true) {
        return;
    }

    if let Some(expected) = schema.get("type") {
        let types: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => vec![],
        };
        if !types.is_empty() && !types.iter().any(|t| type_matches(value, t)) {
            out.push(format!("{path}: expected {}, got {}", types.join(" or "), type_name(value)));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            out.push(format!("{path}: {value} is not one of the allowed values"));
        }
    }

    match value {
        Value::String(s) => {
            if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
                match pattern_matches(pattern, s) {
                    Ok(true) => {}
                    Ok(false) => out.push(format!("{path}: {s:?} does not match {pattern}")),
                    Err(e) => out.push(format!("{path}: invalid pattern {pattern}: {e}")),
                }
            }
        }
        Value::Number(n) => {
            let Some(v) = n.as_f64() else { return };
            if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
                if v < min {
                    out.push(format!("{path}: {v} < minimum {min}"));
                }
            }
            if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
                if v > max {
                    out.push(format!("{path}: {v} > maximum {max}"));
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    check(item, item_schema, &format!("{path}[{i}]"), out);
                }
            }
        }
        Value::Object(map) => {
            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for field in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(field) {
                        out.push(format!("{path}.{field}: required field missing"));
                    }
                }
            }
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, prop_schema) in props {
                    if let Some(v) = map.get(name) {
                        check(v, prop_schema, &format!("{path}.{name}"), out);
                    }
                }
            }
        }
        _ => {}
    }
}

fn type_matches(value: &Value, t: &str) -> bool {
    match t {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value
            .as_f64()
            .map(|v| v.is_finite() && v.fract() == 0.0)
            .unwrap_or(false),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn pattern_matches(pattern: &str, s: &str) -> Result<bool, regex::Error> {
    let mut cache = PATTERNS.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(re) = cache.get(pattern) {
        return Ok(re.is_match(s));
    }
    let re = Regex::new(pattern)?;
    let matched = re.is_match(s);
    cache.insert(pattern.to_string(), re);
    Ok(matched)
}

// ── Wire form ────────────────────────────────────────────────────────────────

/// Rewrite a schema into the form the `generateContent` API expects.
///
/// Type names are upper-cased and every object gains a `propertyOrdering`
/// list so the model emits fields in declaration order.
pub fn to_wire(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let converted = match (k.as_str(), v) {
                    ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                    ("properties", Value::Object(props)) => Value::Object(
                        props.iter().map(|(name, s)| (name.clone(), to_wire(s))).collect(),
                    ),
                    ("items", s) => to_wire(s),
                    (_, other) => other.clone(),
                };
                out.insert(k.clone(), converted);
            }
            if let Some(Value::Object(props)) = map.get("properties") {
                let order: Vec<Value> = props.keys().cloned().map(Value::String).collect();
                out.insert("propertyOrdering".into(), Value::Array(order));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}
