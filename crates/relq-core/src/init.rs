//! Declarative tree population.
//!
//! A [`TreeInitializer`] describes classes; the context drives it through a
//! [`NodeBuilder`] for the root and, recursively, every structural join the
//! initializer registers. Registration order matters: a join's origin field
//! must exist before the join that rides on it.

use std::sync::Arc;

use tracing::trace;

use crate::{
    backend::QueryBackend,
    context::ParameterContext,
    error::{QueryError, Result},
    field::FieldConfig,
    ids::{FieldId, ParamId, SearcherId},
    join::{JoinKind, JoinWorker, RelationKind},
    param::ParamKind,
    transform::TransformerRegistry,
};

/// Describes one structural join between a field of the node under
/// construction and a field of another class.
#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub origin_field: String,
    pub target_class: String,
    pub target_field: String,
    pub kind: JoinKind,
    pub relation: RelationKind,
    pub extra_condition: Option<String>,
}

impl JoinConfig {
    pub fn new(
        origin_field: impl Into<String>,
        target_class: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            origin_field: origin_field.into(),
            target_class: target_class.into(),
            target_field: target_field.into(),
            kind: JoinKind::Inner,
            relation: RelationKind::Eq,
            extra_condition: None,
        }
    }

    pub fn with_kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_relation(mut self, relation: RelationKind) -> Self {
        self.relation = relation;
        self
    }

    /// Attaches extra-condition text, compiled and replayed when the edge
    /// materializes.
    pub fn with_extra_condition(mut self, text: impl Into<String>) -> Self {
        self.extra_condition = Some(text.into());
        self
    }
}

/// Source of class descriptions. One initializer builds a whole tree; the
/// same class may be populated several times at different tree positions.
pub trait TreeInitializer<B: QueryBackend> {
    /// Registers table, fields, searchers and joins for `class` on the
    /// builder. Unknown classes should fail with
    /// [`QueryError::UnknownClass`].
    fn populate(&self, builder: &mut NodeBuilder<'_, '_, B, Self>, class: &str) -> Result<()>
    where
        Self: Sized;

    /// Shared transformer registry for every field this tree registers.
    fn transformers(&self) -> Arc<TransformerRegistry<B::Value>>;
}

/// Registration surface handed to [`TreeInitializer::populate`], scoped to
/// one parameter node.
pub struct NodeBuilder<'c, 'i, B: QueryBackend, I: TreeInitializer<B>> {
    pub(crate) ctx: &'c mut ParameterContext<B>,
    pub(crate) param: ParamId,
    pub(crate) initializer: &'i I,
}

impl<B: QueryBackend, I: TreeInitializer<B>> NodeBuilder<'_, '_, B, I> {
    /// The node being populated.
    pub fn param(&self) -> ParamId {
        self.param
    }

    pub fn class_name(&self) -> &str {
        self.ctx.param(self.param).class_name()
    }

    /// Sets the mapped table and the alias stem used when the tree assigns
    /// unique table aliases. Defaults derive from the class name.
    pub fn set_table(&mut self, table: impl Into<String>, alias_base: impl Into<String>) {
        let p = &mut self.ctx.params[self.param.index()];
        p.table_name = table.into();
        p.alias_base = alias_base.into();
    }

    /// Registers a field on this node. Names must be unique per node.
    pub fn register_field(&mut self, config: FieldConfig) -> Result<FieldId> {
        self.ctx.add_field(self.param, config)
    }

    /// Registers a searcher over one of this node's own fields.
    pub fn register_searcher(&mut self, field_name: &str) -> Result<SearcherId> {
        self.ctx.add_searcher(self.param, field_name)
    }

    /// Registers a default join: the target class becomes a child node with
    /// its own canonical path segment, populated recursively.
    pub fn register_default_join(&mut self, config: JoinConfig) -> Result<ParamId> {
        self.register_join(config, ParamKind::DefaultJoin)
    }

    /// Registers an inherit join: the child is path-transparent and its own
    /// fields and searchers are flattened into this node's owned set.
    pub fn register_inherit_join(&mut self, config: JoinConfig) -> Result<ParamId> {
        self.register_join(config, ParamKind::InheritJoin)
    }

    fn register_join(&mut self, config: JoinConfig, kind: ParamKind) -> Result<ParamId> {
        // Reject the cycle before any node exists for it.
        if self
            .ctx
            .building_stack
            .iter()
            .any(|c| c == &config.target_class)
        {
            return Err(QueryError::CyclicJoin(config.target_class));
        }
        let origin_field = self
            .ctx
            .find_own_field(self.param, &config.origin_field)
            .filter(|f| !self.ctx.fields[f.index()].join_origin)
            .ok_or_else(|| QueryError::MissingField {
                class: self.ctx.param(self.param).class_name().to_string(),
                field: config.origin_field.clone(),
            })?;

        let child_path = match kind {
            // Inherit joins are transparent: the child shares this node's path.
            ParamKind::InheritJoin => self.ctx.param(self.param).path().map(str::to_string),
            _ => self.ctx.param(self.param).path().map(|prefix| {
                if prefix.is_empty() {
                    config.origin_field.clone()
                } else {
                    format!("{prefix}.{}", config.origin_field)
                }
            }),
        };
        let child = self.ctx.new_param(
            config.target_class.clone(),
            kind,
            child_path.clone(),
            Some(self.param),
        );
        self.ctx
            .populate_node(self.initializer, child, &config.target_class)?;

        let target_field = self
            .ctx
            .find_own_field(child, &config.target_field)
            .ok_or_else(|| QueryError::MissingField {
                class: config.target_class.clone(),
                field: config.target_field.clone(),
            })?;

        let join = self.ctx.add_join(JoinWorker {
            origin_param: self.param,
            origin_field,
            target_param: child,
            target_field,
            kind: config.kind,
            relation: config.relation,
            reversed: false,
            extra_condition: config.extra_condition,
            materialized: false,
        });
        self.ctx.params[child.index()].using_join = Some(join);
        self.ctx.fields[origin_field.index()].join_origin = true;

        match kind {
            ParamKind::DefaultJoin => {
                self.ctx.params[self.param.index()]
                    .default_joins
                    .push((origin_field, child));
                if let Some(path) = child_path {
                    self.ctx.register_param_path(path, child);
                }
            }
            ParamKind::InheritJoin => {
                self.ctx.params[self.param.index()]
                    .inherit_joins
                    .push((origin_field, child));
                self.ctx.flatten_inherited(child);
            }
            ParamKind::Root | ParamKind::DynamicJoin => {}
        }
        trace!(
            origin = config.origin_field.as_str(),
            target_class = self.ctx.param(child).class_name(),
            kind = kind.label(),
            "registered join"
        );
        Ok(child)
    }
}
