//! Request validation from per-(resource, operation) rule tables.
//!
//! One evaluator for every resource: it walks the rule table, collects every violation and
//! returns the normalized payload (trimmed, lower-cased, integer ids coerced) when clean.

use crate::config::{RuleTable, ValidationRule};
use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a payload against `rules`. Unknown keys are violations; a rule with
    /// `required` demands the key be present and non-null.
    pub fn validate(body: &Map<String, Value>, rules: &RuleTable) -> Result<Map<String, Value>, AppError> {
        let mut violations = Vec::new();
        for key in body.keys() {
            if !rules.contains_key(key) {
                violations.push(format!("\"{}\" is not allowed", key));
            }
        }

        let mut out = Map::new();
        for (col, rule) in rules {
            match body.get(col) {
                None => {
                    if rule.required == Some(true) {
                        violations.push(format!("\"{}\" is required", col));
                    }
                }
                Some(Value::Null) => {
                    if rule.required == Some(true) || rule.nullable == Some(false) {
                        violations.push(format!("\"{}\" must not be null", col));
                    } else {
                        out.insert(col.clone(), Value::Null);
                    }
                }
                Some(v) => match validate_field(col, v, rule) {
                    Ok(normalized) => {
                        out.insert(col.clone(), normalized);
                    }
                    Err(mut errs) => violations.append(&mut errs),
                },
            }
        }

        if violations.is_empty() {
            Ok(out)
        } else {
            Err(AppError::Validation(violations))
        }
    }
}

fn is_numeric(rule: &ValidationRule) -> bool {
    rule.minimum.is_some() || rule.maximum.is_some()
}

/// Check one non-null value. Integer-format fields accept numbers and numeric strings,
/// fields with numeric bounds take numbers, everything else takes strings.
fn validate_field(col: &str, v: &Value, rule: &ValidationRule) -> Result<Value, Vec<String>> {
    if rule.format.as_deref().map(|f| f.eq_ignore_ascii_case("integer")) == Some(true) {
        return coerce_integer(col, v, rule).map_err(|e| vec![e]);
    }
    if is_numeric(rule) {
        let Some(n) = v.as_f64() else {
            return Err(vec![format!("\"{}\" must be a number", col)]);
        };
        let mut errs = Vec::new();
        check_bounds(col, n, rule, &mut errs);
        return if errs.is_empty() { Ok(v.clone()) } else { Err(errs) };
    }

    let Some(raw) = v.as_str() else {
        return Err(vec![format!("\"{}\" must be a string", col)]);
    };
    let mut s = if rule.trim { raw.trim().to_string() } else { raw.to_string() };
    if rule.lowercase {
        s = s.to_lowercase();
    }
    if rule.format.as_deref() == Some("uuid") {
        if let Ok(u) = uuid::Uuid::parse_str(&s) {
            s = u.to_string();
        }
    }

    let mut errs = Vec::new();
    if s.is_empty() {
        if rule.required == Some(true) || rule.min_length.unwrap_or(0) > 0 {
            errs.push(format!("\"{}\" is not allowed to be empty", col));
            return Err(errs);
        }
        // Optional empty strings pass through untouched by other checks.
        return Ok(Value::String(s));
    }

    let len = s.chars().count();
    if let Some(min) = rule.min_length {
        if len < min as usize {
            errs.push(format!("\"{}\" length must be at least {} characters long", col, min));
        }
    }
    if let Some(max) = rule.max_length {
        if len > max as usize {
            errs.push(format!(
                "\"{}\" length must be less than or equal to {} characters long",
                col, max
            ));
        }
    }
    if let Some(format) = &rule.format {
        if let Err(e) = validate_format(col, &s, format) {
            errs.push(e);
        }
    }
    if let Some(pattern) = &rule.pattern {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(&s) => {}
            Ok(_) => errs.push(format!("\"{}\" fails to match the required pattern: {}", col, pattern)),
            Err(_) => errs.push(format!("invalid pattern for \"{}\"", col)),
        }
    }
    let normalized = Value::String(s);
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(&normalized, a)) {
            let listed: Vec<String> = allowed
                .iter()
                .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()))
                .collect();
            errs.push(format!("\"{}\" must be one of [{}]", col, listed.join(", ")));
        }
    }

    if errs.is_empty() {
        Ok(normalized)
    } else {
        Err(errs)
    }
}

fn coerce_integer(col: &str, v: &Value, rule: &ValidationRule) -> Result<Value, String> {
    let n = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    let Some(n) = n else {
        return Err(format!("\"{}\" must be an integer", col));
    };
    let mut errs = Vec::new();
    check_bounds(col, n as f64, rule, &mut errs);
    match errs.pop() {
        Some(e) => Err(e),
        None => Ok(Value::Number(n.into())),
    }
}

fn check_bounds(col: &str, n: f64, rule: &ValidationRule, errs: &mut Vec<String>) {
    if let Some(min) = rule.minimum {
        if n < min {
            errs.push(format!("\"{}\" must be greater than or equal to {}", col, min));
        }
    }
    if let Some(max) = rule.maximum {
        if n > max {
            errs.push(format!("\"{}\" must be less than or equal to {}", col, max));
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("static email regex"))
}

fn validate_format(col: &str, s: &str, format: &str) -> Result<(), String> {
    match format.to_lowercase().as_str() {
        "email" => {
            if !email_regex().is_match(s) {
                return Err(format!("\"{}\" must be a valid email", col));
            }
        }
        "uuid" | "guid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(format!("\"{}\" must be a valid GUID", col));
            }
        }
        "alphanum" => {
            if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!("\"{}\" must only contain alpha-numeric characters", col));
            }
        }
        _ => {}
    }
    Ok(())
}
