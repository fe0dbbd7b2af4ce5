//! JSON-defined schemas as tree initializers.
//!
//! A schema maps class names to table, field, searcher and join definitions.
//! One schema can seed any number of independent parameter trees, rooted at
//! any of its classes.

use std::{collections::HashMap, sync::Arc};

use relq_core::{
    FieldConfig, JoinConfig, JoinKind, NodeBuilder, ParameterContext, QueryError, RelationKind,
    TransformerRegistry, TreeInitializer,
};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::{
    backend::SqlBackend,
    error::Result,
    transform::standard_transformers,
};

fn default_join_kind() -> JoinKind {
    JoinKind::Inner
}

fn default_relation() -> RelationKind {
    RelationKind::Eq
}

/// One join declaration of a class definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinDef {
    pub origin_field: String,
    pub target_class: String,
    pub target_field: String,
    /// Inherit joins flatten the target's fields into the declaring class.
    #[serde(default)]
    pub inherit: bool,
    #[serde(default = "default_join_kind")]
    pub kind: JoinKind,
    #[serde(default = "default_relation")]
    pub relation: RelationKind,
    #[serde(default)]
    pub extra_condition: Option<String>,
}

/// One class of the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassDef {
    pub table: String,
    /// Alias stem for generated table aliases; derived from the table name
    /// when absent.
    #[serde(default)]
    pub alias: Option<String>,
    pub fields: Vec<FieldConfig>,
    /// Field names that get searchers. Fields not listed stay structural.
    #[serde(default)]
    pub searchers: Vec<String>,
    #[serde(default)]
    pub joins: Vec<JoinDef>,
}

/// A complete schema, ready to initialize parameter trees.
pub struct Schema {
    classes: HashMap<String, ClassDef>,
    transformers: Arc<TransformerRegistry<Value>>,
}

impl Schema {
    pub fn new(classes: HashMap<String, ClassDef>) -> Self {
        Self {
            classes,
            transformers: standard_transformers(),
        }
    }

    /// Parses a `{ "ClassName": { ... } }` JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    /// Replaces the standard transformer registry.
    pub fn with_transformers(mut self, transformers: Arc<TransformerRegistry<Value>>) -> Self {
        self.transformers = transformers;
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Builds a parameter tree rooted at `root_class`.
    pub fn context(&self, root_class: &str) -> Result<ParameterContext<SqlBackend>> {
        Ok(ParameterContext::init(SqlBackend, self, root_class)?)
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.classes.keys().collect();
        names.sort();
        f.debug_struct("Schema").field("classes", &names).finish()
    }
}

impl TreeInitializer<SqlBackend> for Schema {
    fn populate(
        &self,
        builder: &mut NodeBuilder<'_, '_, SqlBackend, Self>,
        class: &str,
    ) -> std::result::Result<(), QueryError> {
        let def = self
            .classes
            .get(class)
            .ok_or_else(|| QueryError::UnknownClass(class.to_string()))?;
        builder.set_table(&def.table, def.alias.clone().unwrap_or_default());
        for field in &def.fields {
            builder.register_field(field.clone())?;
        }
        for searcher in &def.searchers {
            builder.register_searcher(searcher)?;
        }
        for join in &def.joins {
            let mut config = JoinConfig::new(
                join.origin_field.clone(),
                join.target_class.clone(),
                join.target_field.clone(),
            )
            .with_kind(join.kind)
            .with_relation(join.relation);
            if let Some(extra) = &join.extra_condition {
                config = config.with_extra_condition(extra.clone());
            }
            if join.inherit {
                builder.register_inherit_join(config)?;
            } else {
                builder.register_default_join(config)?;
            }
        }
        Ok(())
    }

    fn transformers(&self) -> Arc<TransformerRegistry<Value>> {
        self.transformers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_schema_parses_with_defaults() {
        let schema = Schema::from_json(
            r#"{
                "Item": {
                    "table": "items",
                    "fields": [
                        { "name": "id", "column": "id", "value_type": "integer" }
                    ],
                    "searchers": ["id"]
                }
            }"#,
        )
        .unwrap();
        let def = schema.class("Item").unwrap();
        assert_eq!(def.table, "items");
        assert!(def.joins.is_empty());
        assert!(schema.context("Item").is_ok());
    }

    #[test]
    fn test_join_defaults_are_inner_eq() {
        let def: JoinDef = serde_json::from_str(
            r#"{
                "origin_field": "customer",
                "target_class": "Customer",
                "target_field": "id"
            }"#,
        )
        .unwrap();
        assert_eq!(def.kind, JoinKind::Inner);
        assert_eq!(def.relation, RelationKind::Eq);
        assert!(!def.inherit);
        assert!(def.extra_condition.is_none());
    }

    #[test]
    fn test_unknown_root_class_fails() {
        let schema = Schema::new(HashMap::new());
        assert!(schema.context("Nope").is_err());
    }
}
