//! Input validation: field registry (unknown fields, types, required) and config rules.

use crate::config::{compile_patterns, FieldType, ResolvedEntity, ValidationRule, ID_FIELD};
use crate::error::StoreError;
use crate::store::Record;
use chrono::DateTime;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

pub struct RequestValidator;

impl RequestValidator {
    /// Build the record to insert: rejects unknown fields, fills defaults and nulls,
    /// enforces required fields, types and rules. Callers may seed store-managed
    /// fields: `id` as a non-empty string, timestamps as RFC 3339 strings.
    pub fn validate_create(
        entity: &ResolvedEntity,
        body: &HashMap<String, Value>,
    ) -> Result<Record, StoreError> {
        check_known_fields(entity, body)?;
        let mut record = Record::new();
        for field in &entity.fields {
            let value = match body.get(&field.name) {
                Some(v) if !v.is_null() => v.clone(),
                _ if field.managed => continue,
                _ => match &field.default {
                    Some(default) => default.clone(),
                    None if field.nullable => Value::Null,
                    None => return Err(StoreError::Validation(format!("{} is required", field.name))),
                },
            };
            if field.managed {
                check_managed(entity, &field.name, &value)?;
            } else {
                check_type(entity, &field.name, field.type_, field.nullable, &value)?;
            }
            record.insert(field.name.clone(), value);
        }
        check_rules(&record, &entity.validation, &entity.patterns, false)?;
        Ok(record)
    }

    /// Merge `patch` into `current`. Only fields present in the patch are checked; `id`
    /// may be repeated unchanged, other managed fields are rejected.
    pub fn validate_patch(
        entity: &ResolvedEntity,
        current: &Record,
        patch: &HashMap<String, Value>,
    ) -> Result<Record, StoreError> {
        check_known_fields(entity, patch)?;
        let mut merged = current.clone();
        let mut changed = Record::new();
        for (name, value) in patch {
            // check_known_fields guarantees the lookup.
            let Some(field) = entity.field(name) else { continue };
            if field.managed {
                if name == ID_FIELD && current.get(ID_FIELD) == Some(value) {
                    continue;
                }
                return Err(StoreError::Validation(format!(
                    "{} is maintained by the store and cannot be changed",
                    name
                )));
            }
            check_type(entity, name, field.type_, field.nullable, value)?;
            changed.insert(name.clone(), value.clone());
        }
        check_rules(&changed, &entity.validation, &entity.patterns, true)?;
        merged.extend(changed);
        Ok(merged)
    }

    /// Validate body against per-field rules. All required fields must be present.
    pub fn validate(
        body: &Record,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), StoreError> {
        check_rules(body, rules, &compile_patterns("body", rules)?, false)
    }

    /// Validate only the fields present in body (for updates). Required is not enforced for missing fields.
    pub fn validate_partial(
        body: &Record,
        rules: &HashMap<String, ValidationRule>,
    ) -> Result<(), StoreError> {
        check_rules(body, rules, &compile_patterns("body", rules)?, true)
    }
}

fn check_rules(
    body: &Record,
    rules: &HashMap<String, ValidationRule>,
    patterns: &HashMap<String, Regex>,
    partial: bool,
) -> Result<(), StoreError> {
    for (col, rule) in rules {
        match body.get(col).filter(|v| !v.is_null()) {
            Some(v) => validate_field(col, v, rule, patterns.get(col))?,
            None if rule.required == Some(true) && (!partial || body.contains_key(col)) => {
                return Err(StoreError::Validation(format!("{} is required", col)));
            }
            None => {}
        }
    }
    Ok(())
}

fn check_known_fields(entity: &ResolvedEntity, body: &HashMap<String, Value>) -> Result<(), StoreError> {
    for name in body.keys() {
        if entity.field(name).is_some() {
            continue;
        }
        if let Some(rel) = entity.relation(name) {
            return Err(StoreError::Schema(format!(
                "{}.{} is a relation; set {} instead",
                entity.name,
                name,
                if rel.our_key == ID_FIELD { "the foreign key on the related records" } else { rel.our_key.as_str() }
            )));
        }
        return Err(StoreError::Schema(format!("unknown field '{}' on {}", name, entity.name)));
    }
    Ok(())
}

fn check_managed(entity: &ResolvedEntity, name: &str, value: &Value) -> Result<(), StoreError> {
    let ok = match (name, value.as_str()) {
        (ID_FIELD, Some(id)) => !id.is_empty(),
        (_, Some(ts)) => DateTime::parse_from_rfc3339(ts).is_ok(),
        (_, None) => false,
    };
    if ok {
        return Ok(());
    }
    let expected = if name == ID_FIELD { "a non-empty string" } else { "an RFC 3339 timestamp" };
    Err(StoreError::Validation(format!(
        "{}.{} must be {}, got {}",
        entity.name, name, expected, value
    )))
}

fn check_type(
    entity: &ResolvedEntity,
    name: &str,
    type_: FieldType,
    nullable: bool,
    value: &Value,
) -> Result<(), StoreError> {
    let ok = match (type_, value) {
        (_, Value::Null) => {
            if nullable {
                return Ok(());
            }
            return Err(StoreError::Validation(format!("{}.{} cannot be null", entity.name, name)));
        }
        (FieldType::Text | FieldType::Id, Value::String(_)) => true,
        (FieldType::Bytes, Value::Array(items)) => items
            .iter()
            .all(|b| b.as_u64().map(|n| n <= u8::MAX as u64).unwrap_or(false)),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        let expected = match type_ {
            FieldType::Text => "a string",
            FieldType::Id => "a string id",
            FieldType::Bytes => "an array of bytes",
        };
        Err(StoreError::Validation(format!(
            "{}.{} must be {}",
            entity.name, name, expected
        )))
    }
}

/// Applies one configured rule to a present, non-null value. Length and pattern
/// rules look at strings, bounds at numbers; other shapes skip those checks.
fn validate_field(
    col: &str,
    v: &Value,
    rule: &ValidationRule,
    pattern: Option<&Regex>,
) -> Result<(), StoreError> {
    if v.is_null() {
        return Ok(());
    }
    let invalid = |msg: String| Err(StoreError::Validation(format!("{} {}", col, msg)));

    if let Some(format) = rule.format.as_deref() {
        if let Some(s) = v.as_str() {
            if !matches_format(s, format) {
                return invalid(format!("must be a valid {}", format));
            }
        }
    }
    if let Some(s) = v.as_str() {
        let chars = s.chars().count();
        match (rule.min_length, rule.max_length) {
            (Some(min), _) if chars < min as usize => {
                return invalid(format!("must be at least {} characters", min))
            }
            (_, Some(max)) if chars > max as usize => {
                return invalid(format!("must be at most {} characters", max))
            }
            _ => {}
        }
        if let Some(re) = pattern {
            if !re.is_match(s) {
                return invalid("does not match required pattern".to_string());
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| same_value(v, a)) {
            let shown: Vec<String> = allowed.iter().take(5).map(Value::to_string).collect();
            return invalid(format!("must be one of: {}", shown.join(", ")));
        }
    }
    if let Some(n) = v.as_f64() {
        match (rule.minimum, rule.maximum) {
            (Some(min), _) if n < min => return invalid(format!("must be at least {}", min)),
            (_, Some(max)) if n > max => return invalid(format!("must be at most {}", max)),
            _ => {}
        }
    }
    Ok(())
}

/// JSON equality, except numbers compare by value (`1` equals `1.0`).
fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Unknown formats accept everything.
fn matches_format(s: &str, format: &str) -> bool {
    match format.to_ascii_lowercase().as_str() {
        "email" => match s.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && !s.chars().any(char::is_whitespace)
                    && domain
                        .split('.')
                        .filter(|part| !part.is_empty())
                        .count()
                        >= 2
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        },
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        _ => true,
    }
}
