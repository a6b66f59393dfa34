use super::registry::Accessor;
use super::transform::{Transform, TransformSpec};
use super::value::{DeclaredType, Value};
use crate::core::errors::ConfigError;
use crate::factory::world::World;
use serde::Deserialize;

/// Published variable: where its raw value comes from and how it is typed
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: String,
    /// Dotted path, e.g. `m1.state` or `factory.datetime`
    pub source: String,
    pub transform: Transform,
    pub dtype: DeclaredType,
    pub default: Value,
}

impl Variable {
    pub fn new(id: impl Into<String>, source: impl Into<String>, dtype: DeclaredType) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            transform: Transform::Identity,
            dtype,
            default: dtype.zero(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Raw value through the transform, coerced to the declared type
    pub fn publish(&self, raw: Option<Value>) -> Value {
        self.transform
            .apply(raw)
            .and_then(|v| self.dtype.coerce(v))
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Variable as written in a factory document
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableDef {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(alias = "path")]
    pub source: String,
    #[serde(default, alias = "value_map", alias = "value-map")]
    pub transform: TransformSpec,
    pub dtype: DeclaredType,
    #[serde(default)]
    pub default: Option<Value>,
}

impl TryFrom<VariableDef> for Variable {
    type Error = ConfigError;

    fn try_from(def: VariableDef) -> Result<Self, Self::Error> {
        let mut variable = Variable::new(def.id, def.source, def.dtype)
            .with_transform(Transform::from(def.transform));
        if let Some(default) = def.default {
            variable.default = def.dtype.coerce(default).ok_or_else(|| {
                ConfigError::invalid(
                    format!("variable {}.default", variable.id),
                    format!("not convertible to {:?}", def.dtype),
                )
            })?;
        }
        Ok(variable)
    }
}

/// Variable bound to its accessor
#[derive(Clone)]
pub(crate) struct BoundVariable {
    pub(crate) variable: Variable,
    accessor: Accessor,
}

impl BoundVariable {
    pub(crate) fn bind(variable: Variable, world: &World) -> Result<Self, ConfigError> {
        let accessor = super::registry::resolve(world, &variable.source).map_err(|reason| {
            ConfigError::PathResolution {
                variable: variable.id.clone(),
                path: variable.source.clone(),
                reason,
            }
        })?;
        Ok(Self { variable, accessor })
    }

    pub(crate) fn evaluate(&self, world: &World) -> Value {
        self.variable.publish((self.accessor)(world))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_value_falls_back_to_default() {
        let v = Variable::new("Machine.Program", "m1.program", DeclaredType::String)
            .with_default("none");
        assert_eq!(v.publish(None), Value::Str("none".into()));
        assert_eq!(v.publish(Some("p1".into())), Value::Str("p1".into()));
    }

    #[test]
    fn test_uncoercible_result_uses_default() {
        let v = Variable::new("Level", "c1.level", DeclaredType::Int64).with_default(-1i64);
        assert_eq!(v.publish(Some("full".into())), Value::Int(-1));
        assert_eq!(v.publish(Some(Value::Float(12.4))), Value::Int(12));
    }

    #[test]
    fn test_definition_from_document() {
        let def: VariableDef = serde_json::from_value(json!({
            "id": "Machine.State",
            "source": "m1.state",
            "transform": {"kind": "map", "table": {"off": 0, "on": 1}},
            "dtype": "Int64",
            "default": 0
        }))
        .unwrap();
        let v = Variable::try_from(def).unwrap();
        assert_eq!(v.publish(Some("on".into())), Value::Int(1));
        assert_eq!(v.publish(Some("error".into())), Value::Int(0));
    }

    #[test]
    fn test_bad_default_rejected() {
        let def: VariableDef = serde_json::from_value(json!({
            "id": "x",
            "source": "m1.thermal",
            "dtype": "Double",
            "default": "hot"
        }))
        .unwrap();
        assert!(Variable::try_from(def).is_err());
    }
}
