//! Standard transformers for SQLite value types.

use std::sync::Arc;

use relq_core::{QueryError, TransformerRegistry, ValueTransformer};
use rusqlite::types::Value;

type CoreResult<T> = std::result::Result<T, QueryError>;

/// Passes text through unchanged.
pub struct TextTransformer;

impl ValueTransformer<Value> for TextTransformer {
    fn string_to_value(&self, raw: &str) -> CoreResult<Value> {
        Ok(Value::Text(raw.to_string()))
    }

    fn value_to_string(&self, value: &Value) -> CoreResult<String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(QueryError::Transform(format!(
                "expected a text value, got {other:?}"
            ))),
        }
    }
}

pub struct IntegerTransformer;

impl ValueTransformer<Value> for IntegerTransformer {
    fn string_to_value(&self, raw: &str) -> CoreResult<Value> {
        raw.parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| QueryError::Transform(format!("'{raw}' is not an integer: {e}")))
    }

    fn value_to_string(&self, value: &Value) -> CoreResult<String> {
        match value {
            Value::Integer(i) => Ok(i.to_string()),
            other => Err(QueryError::Transform(format!(
                "expected an integer value, got {other:?}"
            ))),
        }
    }
}

pub struct RealTransformer;

impl ValueTransformer<Value> for RealTransformer {
    fn string_to_value(&self, raw: &str) -> CoreResult<Value> {
        raw.parse::<f64>()
            .map(Value::Real)
            .map_err(|e| QueryError::Transform(format!("'{raw}' is not a number: {e}")))
    }

    fn value_to_string(&self, value: &Value) -> CoreResult<String> {
        match value {
            Value::Real(r) => Ok(r.to_string()),
            other => Err(QueryError::Transform(format!(
                "expected a real value, got {other:?}"
            ))),
        }
    }
}

/// Booleans are stored as 0/1 integers, SQLite style.
pub struct BooleanTransformer;

impl ValueTransformer<Value> for BooleanTransformer {
    fn string_to_value(&self, raw: &str) -> CoreResult<Value> {
        match raw {
            "true" | "1" => Ok(Value::Integer(1)),
            "false" | "0" => Ok(Value::Integer(0)),
            other => Err(QueryError::Transform(format!(
                "'{other}' is not a boolean"
            ))),
        }
    }

    fn value_to_string(&self, value: &Value) -> CoreResult<String> {
        match value {
            Value::Integer(0) => Ok("false".to_string()),
            Value::Integer(_) => Ok("true".to_string()),
            other => Err(QueryError::Transform(format!(
                "expected a boolean value, got {other:?}"
            ))),
        }
    }
}

/// Registry with the four standard value types: `text`, `integer`, `real`
/// and `boolean`.
pub fn standard_transformers() -> Arc<TransformerRegistry<Value>> {
    let mut registry = TransformerRegistry::new();
    registry.register("text", Arc::new(TextTransformer));
    registry.register("integer", Arc::new(IntegerTransformer));
    registry.register("real", Arc::new(RealTransformer));
    registry.register("boolean", Arc::new(BooleanTransformer));
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_round_trip() {
        let t = IntegerTransformer;
        assert_eq!(t.string_to_value("42").unwrap(), Value::Integer(42));
        assert_eq!(t.value_to_string(&Value::Integer(42)).unwrap(), "42");
        assert!(t.string_to_value("forty-two").is_err());
    }

    #[test]
    fn test_boolean_accepts_both_spellings() {
        let t = BooleanTransformer;
        assert_eq!(t.string_to_value("true").unwrap(), Value::Integer(1));
        assert_eq!(t.string_to_value("0").unwrap(), Value::Integer(0));
        assert!(t.string_to_value("yes").is_err());
    }

    #[test]
    fn test_standard_registry_covers_all_types() {
        let registry = standard_transformers();
        for key in ["text", "integer", "real", "boolean"] {
            assert!(registry.contains(key), "missing transformer for {key}");
        }
        assert!(registry.get("uuid").is_err());
    }
}
