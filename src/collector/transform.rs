use super::value::Value;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Raw datetimes are exposed in this format
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Declarative transform as written in a factory document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum TransformSpec {
    #[default]
    Identity,
    Map {
        table: BTreeMap<String, Value>,
        #[serde(default)]
        fallback: Option<Value>,
    },
    Scale {
        factor: f64,
        #[serde(default)]
        offset: f64,
    },
    Round {
        decimals: u32,
    },
    NotNull,
    FormatDatetime {
        format: String,
    },
    Chain {
        steps: Vec<TransformSpec>,
    },
}

type CustomFn = Arc<dyn Fn(Option<Value>) -> Option<Value> + Send + Sync>;

/// Pure function from a raw sampled value to the published value.
///
/// `None` on either side stands for a missing value; the variable then falls
/// back to its declared default.
#[derive(Clone, Default)]
pub enum Transform {
    #[default]
    Identity,
    Map {
        table: BTreeMap<String, Value>,
        fallback: Option<Value>,
    },
    Scale {
        factor: f64,
        offset: f64,
    },
    Round {
        decimals: u32,
    },
    NotNull,
    FormatDatetime {
        format: String,
    },
    Chain(Vec<Transform>),
    Custom(CustomFn),
}

impl Transform {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Option<Value>) -> Option<Value> + Send + Sync + 'static,
    {
        Transform::Custom(Arc::new(f))
    }

    pub fn apply(&self, raw: Option<Value>) -> Option<Value> {
        match self {
            Transform::Identity => raw,
            Transform::Map { table, fallback } => raw
                .and_then(|v| table.get(&v.map_key()).cloned())
                .or_else(|| fallback.clone()),
            Transform::Scale { factor, offset } => {
                raw?.as_f64().map(|x| Value::Float(x * factor + offset))
            }
            Transform::Round { decimals } => {
                let x = raw?.as_f64()?;
                let scale = 10f64.powi(*decimals as i32);
                Some(Value::Float((x * scale).round() / scale))
            }
            Transform::NotNull => Some(Value::Bool(raw.is_some())),
            Transform::FormatDatetime { format } => {
                let raw = raw?;
                let datetime = NaiveDateTime::parse_from_str(raw.as_str()?, DATETIME_FORMAT).ok()?;
                Some(Value::Str(datetime.format(format).to_string()))
            }
            Transform::Chain(steps) => steps.iter().fold(raw, |acc, t| t.apply(acc)),
            Transform::Custom(f) => f(raw),
        }
    }
}

impl From<TransformSpec> for Transform {
    fn from(spec: TransformSpec) -> Self {
        match spec {
            TransformSpec::Identity => Transform::Identity,
            TransformSpec::Map { table, fallback } => Transform::Map { table, fallback },
            TransformSpec::Scale { factor, offset } => Transform::Scale { factor, offset },
            TransformSpec::Round { decimals } => Transform::Round { decimals },
            TransformSpec::NotNull => Transform::NotNull,
            TransformSpec::FormatDatetime { format } => Transform::FormatDatetime { format },
            TransformSpec::Chain { steps } => {
                Transform::Chain(steps.into_iter().map(Transform::from).collect())
            }
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => f.write_str("Identity"),
            Transform::Map { table, fallback } => f
                .debug_struct("Map")
                .field("table", table)
                .field("fallback", fallback)
                .finish(),
            Transform::Scale { factor, offset } => f
                .debug_struct("Scale")
                .field("factor", factor)
                .field("offset", offset)
                .finish(),
            Transform::Round { decimals } => {
                f.debug_struct("Round").field("decimals", decimals).finish()
            }
            Transform::NotNull => f.write_str("NotNull"),
            Transform::FormatDatetime { format } => {
                f.debug_struct("FormatDatetime").field("format", format).finish()
            }
            Transform::Chain(steps) => f.debug_tuple("Chain").field(steps).finish(),
            Transform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_map_with_fallback() {
        let spec: TransformSpec = serde_json::from_value(json!({
            "kind": "map",
            "table": {"off": 0, "on": 1, "production": 2, "error": 3},
            "fallback": 0
        }))
        .unwrap();
        let t = Transform::from(spec);
        assert_eq!(t.apply(Some("production".into())), Some(Value::Int(2)));
        assert_eq!(t.apply(Some("unknown".into())), Some(Value::Int(0)));
        assert_eq!(t.apply(None), Some(Value::Int(0)));
    }

    #[test]
    fn test_numeric_transforms() {
        let scale = Transform::Scale { factor: 2.0, offset: 1.0 };
        assert_eq!(scale.apply(Some(Value::Int(3))), Some(Value::Float(7.0)));
        assert_eq!(scale.apply(None), None);

        let round = Transform::Round { decimals: 2 };
        assert_eq!(round.apply(Some(Value::Float(1.23456))), Some(Value::Float(1.23)));
    }

    #[test]
    fn test_format_datetime() {
        let t = Transform::FormatDatetime {
            format: "%Y-%m-%d %H:%M:%S".into(),
        };
        assert_eq!(
            t.apply(Some("2024-01-01T07:30:00".into())),
            Some(Value::Str("2024-01-01 07:30:00".into()))
        );
        assert_eq!(t.apply(Some(Value::Int(1))), None);
    }

    #[test]
    fn test_chain_and_custom() {
        let t = Transform::Chain(vec![
            Transform::Scale { factor: 100.0, offset: 0.0 },
            Transform::custom(|v| v.and_then(|v| v.as_f64()).map(|x| Value::Int(x as i64))),
        ]);
        assert_eq!(t.apply(Some(Value::Float(0.5))), Some(Value::Int(50)));
        assert_eq!(Transform::NotNull.apply(None), Some(Value::Bool(false)));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let parsed: Result<TransformSpec, _> = serde_json::from_value(json!({"kind": "lambda"}));
        assert!(parsed.is_err());
    }
}
