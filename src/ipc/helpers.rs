//! Request parameter readers.
//!
//! Nullable fields are read as `Option<Option<T>>`: a missing key leaves the
//! column alone, an explicit `null` clears it.

use super::error::HandlerErr;
use super::types::AppState;
use crate::dates;
use crate::gradebook::Gradebook;
use crate::models::CellType;
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

pub fn gradebook(state: &AppState) -> Result<&Gradebook, HandlerErr> {
    state
        .gradebook
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<Value, HandlerErr> {
    serde_json::to_value(value).map_err(|e| HandlerErr::new("serialize_failed", e.to_string()))
}

pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, HandlerErr> {
    match params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(HandlerErr::bad_params(format!("missing params.{key}"))),
    }
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

fn wrong_type(key: &str, expected: &str) -> HandlerErr {
    HandlerErr::bad_params(format!("params.{key} must be {expected}"))
}

pub fn nullable_string(params: &Value, key: &str) -> Result<Option<Option<String>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(s)) => Ok(Some(Some(s.clone()))),
        Some(_) => Err(wrong_type(key, "a string or null")),
    }
}

pub fn nullable_f64(params: &Value, key: &str) -> Result<Option<Option<f64>>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(v) => v
            .as_f64()
            .map(|f| Some(Some(f)))
            .ok_or_else(|| wrong_type(key, "a number or null")),
    }
}

pub fn optional_f64(params: &Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| wrong_type(key, "a number")),
    }
}

pub fn optional_bool(params: &Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or_else(|| wrong_type(key, "a boolean")),
    }
}

pub fn optional_cell_type(params: &Value, key: &str) -> Result<Option<CellType>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .and_then(CellType::parse)
            .map(Some)
            .ok_or_else(|| wrong_type(key, "\"code\" or \"markdown\"")),
    }
}

pub fn nullable_datetime(
    params: &Value,
    key: &str,
) -> Result<Option<Option<NaiveDateTime>>, HandlerErr> {
    match nullable_string(params, key)? {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(raw)) => dates::parse_utc(&raw)
            .map(|d| Some(Some(d)))
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("params.{key} is not a valid date"))
                    .with_details(serde_json::json!({ "value": raw }))
            }),
    }
}

pub fn string_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(items) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing params.{key}")));
    };
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type(key, "an array of strings"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nullable_fields_distinguish_missing_from_null() {
        let p = json!({ "email": null, "firstName": "Ben", "score": 1.5 });
        assert_eq!(nullable_string(&p, "email").expect("email"), Some(None));
        assert_eq!(nullable_string(&p, "lastName").expect("last"), None);
        assert_eq!(
            nullable_string(&p, "firstName").expect("first"),
            Some(Some("Ben".to_string()))
        );
        assert_eq!(nullable_f64(&p, "score").expect("score"), Some(Some(1.5)));
        assert!(nullable_f64(&p, "firstName").is_err());
    }

    #[test]
    fn dates_and_cell_types_are_validated() {
        let p = json!({ "duedate": "2020-01-01 12:00:00", "bad": "soon", "cellType": "raw" });
        assert!(matches!(nullable_datetime(&p, "duedate"), Ok(Some(Some(_)))));
        let e = nullable_datetime(&p, "bad").expect_err("bad date");
        assert_eq!(e.code, "bad_params");
        assert!(optional_cell_type(&p, "cellType").is_err());
        assert_eq!(optional_cell_type(&p, "missing").expect("missing"), None);
    }
}
