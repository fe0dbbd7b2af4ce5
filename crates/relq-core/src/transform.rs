//! Per-value-type transformers.
//!
//! The engine never interprets values itself; whenever a textual literal must
//! become a typed value (expression replay, text-based search) it goes
//! through the transformer registered for the field's value type. The
//! registry is populated once by the initializer and read-only afterwards, so
//! one registry can safely serve any number of independently built trees.

use std::{collections::HashMap, sync::Arc};

use crate::error::{QueryError, Result};

/// Converts between textual literals and typed values.
pub trait ValueTransformer<V>: Send + Sync {
    fn string_to_value(&self, raw: &str) -> Result<V>;

    fn value_to_string(&self, value: &V) -> Result<String>;
}

/// Registry of transformers, keyed by exact value-type name.
pub struct TransformerRegistry<V> {
    map: HashMap<String, Arc<dyn ValueTransformer<V>>>,
}

impl<V> TransformerRegistry<V> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        type_key: impl Into<String>,
        transformer: Arc<dyn ValueTransformer<V>>,
    ) {
        self.map.insert(type_key.into(), transformer);
    }

    /// A missing transformer is a fatal lookup error at the point a textual
    /// literal needs conversion.
    pub fn get(&self, type_key: &str) -> Result<Arc<dyn ValueTransformer<V>>> {
        self.map
            .get(type_key)
            .cloned()
            .ok_or_else(|| QueryError::MissingTransformer(type_key.to_string()))
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.map.contains_key(type_key)
    }
}

impl<V> Default for TransformerRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for TransformerRegistry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.map.keys().collect();
        keys.sort();
        f.debug_struct("TransformerRegistry")
            .field("types", &keys)
            .finish()
    }
}
