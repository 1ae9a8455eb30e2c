//! Write-time coercion rules for typed setting values (`SPEC_FULL.md` §4.1).

use serde_json::Value;
use sf_domain::error::{Error, Result};
use sf_domain::model::SettingType;

/// One entry of a `path_map` setting.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PathMapping {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub slash_mode: SlashMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlashMode {
    #[default]
    Auto,
    Unix,
    Win,
    Unchanged,
}

/// Coerce a raw write-time value against a setting's declared `type`,
/// returning the canonical stored representation or a specific `INVALID_*`
/// validation error.
pub fn coerce(kind: SettingType, raw: &Value, options: &[Value]) -> Result<Value> {
    match kind {
        SettingType::String => Ok(Value::String(match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        SettingType::Number => coerce_number(raw),
        SettingType::Boolean => coerce_boolean(raw),
        SettingType::Select => coerce_select(raw, options),
        SettingType::Json => coerce_json(raw),
        SettingType::PathMap => coerce_path_map(raw),
    }
}

fn coerce_number(raw: &Value) -> Result<Value> {
    let n = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() => Ok(serde_json::json!(n)),
        _ => Err(Error::Validation("INVALID_NUMBER".into())),
    }
}

fn coerce_boolean(raw: &Value) -> Result<Value> {
    let b = match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    };
    b.map(Value::Bool)
        .ok_or_else(|| Error::Validation("INVALID_BOOLEAN".into()))
}

fn coerce_select(raw: &Value, options: &[Value]) -> Result<Value> {
    if options.iter().any(|o| o == raw) {
        Ok(raw.clone())
    } else {
        Err(Error::Validation("INVALID_OPTION".into()))
    }
}

fn coerce_json(raw: &Value) -> Result<Value> {
    match raw {
        Value::String(s) => {
            serde_json::from_str(s).map_err(|_| Error::Validation("INVALID_JSON".into()))
        }
        other => Ok(other.clone()),
    }
}

fn coerce_path_map(raw: &Value) -> Result<Value> {
    let list = raw
        .as_array()
        .ok_or_else(|| Error::Validation("INVALID_JSON".into()))?;
    let mut mappings = Vec::with_capacity(list.len());
    for item in list {
        let mapping: PathMapping =
            serde_json::from_value(item.clone()).map_err(|_| Error::Validation("INVALID_JSON".into()))?;
        mappings.push(mapping);
    }
    serde_json::to_value(mappings).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_accepts_numeric_string() {
        assert_eq!(coerce(SettingType::Number, &json!("3.5"), &[]).unwrap(), json!(3.5));
    }

    #[test]
    fn number_rejects_garbage() {
        assert!(coerce(SettingType::Number, &json!("abc"), &[]).is_err());
    }

    #[test]
    fn boolean_accepts_numeric_and_string_forms() {
        assert_eq!(coerce(SettingType::Boolean, &json!(1), &[]).unwrap(), json!(true));
        assert_eq!(coerce(SettingType::Boolean, &json!("FALSE"), &[]).unwrap(), json!(false));
    }

    #[test]
    fn boolean_rejects_out_of_range_number() {
        assert!(coerce(SettingType::Boolean, &json!(2), &[]).is_err());
    }

    #[test]
    fn select_requires_membership_in_options() {
        let opts = vec![json!("a"), json!("b")];
        assert!(coerce(SettingType::Select, &json!("a"), &opts).is_ok());
        assert!(coerce(SettingType::Select, &json!("c"), &opts).is_err());
    }

    #[test]
    fn json_parses_from_string_or_passes_through_structured() {
        assert_eq!(
            coerce(SettingType::Json, &json!("{\"a\":1}"), &[]).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(coerce(SettingType::Json, &json!({"a": 1}), &[]).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn json_rejects_unparseable_string() {
        assert!(coerce(SettingType::Json, &json!("not json"), &[]).is_err());
    }

    #[test]
    fn path_map_parses_list_of_mappings() {
        let raw = json!([{"source": "/a", "target": "/b", "slash_mode": "unix"}]);
        let coerced = coerce(SettingType::PathMap, &raw, &[]).unwrap();
        assert_eq!(coerced[0]["slash_mode"], json!("unix"));
    }

    #[test]
    fn path_map_rejects_non_array() {
        assert!(coerce(SettingType::PathMap, &json!("nope"), &[]).is_err());
    }
}
