use crate::evaluated::NodeValue;
use crate::semantic::LiteralValue;
use chrono::NaiveDate;
use serde_json::Value;

/// Parse a `dd/mm/yyyy` date, rejecting impossible days
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let mut parts = text.trim().split('/');
    let day = parts.next()?.parse::<u32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let year = parts.next()?.parse::<i32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Value of a raw JSON scalar that needs no expression parsing
///
/// Strings are expressions and return `None`, as do arrays and objects.
pub fn scalar_value(value: &Value) -> Option<NodeValue> {
    match value {
        Value::Null => Some(NodeValue::NotApplicable),
        Value::Bool(b) => Some(NodeValue::Value(LiteralValue::Boolean(*b))),
        Value::Number(n) => n.as_f64().map(|n| NodeValue::Value(LiteralValue::Number(n))),
        Value::String(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text of a JSON value used where an expression is expected
///
/// Numbers and booleans are rendered in expression syntax so `5` and `"5"`
/// parse identically.
pub fn expression_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("oui".to_string()),
        Value::Bool(false) => Some("non".to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
