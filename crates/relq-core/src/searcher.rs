//! Per-column search handles.
//!
//! A [`Searcher`] is a short-lived mutable view pairing the shared context
//! with one searcher id. Every operation funnels into the context, so a
//! handle can be dropped and re-obtained at any time without losing state.
//! Operations return `&mut Self` for chaining:
//!
//! ```ignore
//! ctx.searcher("status")?.eq(open)?.and()?;
//! ctx.searcher("customer.name")?.like(pattern)?;
//! ```

use std::sync::Arc;

use crate::{
    backend::{CompareOp, Connective, QueryBackend},
    context::ParameterContext,
    error::Result,
    ids::{FieldId, ParamId, SearcherId},
    transform::ValueTransformer,
};

/// Arena record backing one searcher.
#[derive(Debug, Clone)]
pub struct SearcherNode {
    pub(crate) field: FieldId,
    pub(crate) owner: ParamId,
    pub(crate) path: Option<String>,
}

impl SearcherNode {
    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn owner(&self) -> ParamId {
        self.owner
    }

    /// Canonical path, absent for searchers on inherit-joined or dynamically
    /// joined nodes.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

/// Chainable handle over one searcher of a parameter tree.
pub struct Searcher<'a, B: QueryBackend> {
    pub(crate) ctx: &'a mut ParameterContext<B>,
    pub(crate) id: SearcherId,
}

impl<B: QueryBackend> std::fmt::Debug for Searcher<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searcher")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<B: QueryBackend> Searcher<'_, B> {
    pub fn id(&self) -> SearcherId {
        self.id
    }

    pub fn field_name(&self) -> &str {
        let field = self.ctx.searcher_node(self.id).field;
        self.ctx.field(field).name()
    }

    pub fn path(&self) -> Option<&str> {
        self.ctx.searcher_node(self.id).path()
    }

    /// The rendered column reference, following join-origin indirection.
    pub fn aliased_column(&self) -> String {
        let field = self.ctx.searcher_node(self.id).field;
        self.ctx.aliased_column(self.ctx.actual_field(field))
    }

    /// The transformer registered for this field's value type.
    pub fn transformer(&self) -> Result<Arc<dyn ValueTransformer<B::Value>>> {
        let field = self.ctx.searcher_node(self.id).field;
        self.ctx
            .transformers
            .get(self.ctx.field(field).value_type())
    }

    // ---- literal comparisons ----

    pub fn eq(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::Eq, vec![value.into()])
    }

    pub fn not_eq(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::NotEq, vec![value.into()])
    }

    pub fn less_than(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::LessThan, vec![value.into()])
    }

    pub fn not_less_than(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::NotLessThan, vec![value.into()])
    }

    pub fn greater_than(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::GreaterThan, vec![value.into()])
    }

    pub fn not_greater_than(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::NotGreaterThan, vec![value.into()])
    }

    pub fn like(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::Like, vec![value.into()])
    }

    pub fn not_like(&mut self, value: impl Into<B::Value>) -> Result<&mut Self> {
        self.value_op(CompareOp::NotLike, vec![value.into()])
    }

    pub fn between(
        &mut self,
        low: impl Into<B::Value>,
        high: impl Into<B::Value>,
    ) -> Result<&mut Self> {
        self.value_op(CompareOp::Between, vec![low.into(), high.into()])
    }

    pub fn in_values<T: Into<B::Value>>(
        &mut self,
        values: impl IntoIterator<Item = T>,
    ) -> Result<&mut Self> {
        self.value_op(CompareOp::In, values.into_iter().map(Into::into).collect())
    }

    pub fn not_in_values<T: Into<B::Value>>(
        &mut self,
        values: impl IntoIterator<Item = T>,
    ) -> Result<&mut Self> {
        self.value_op(
            CompareOp::NotIn,
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn is_null(&mut self) -> Result<&mut Self> {
        self.value_op(CompareOp::IsNull, Vec::new())
    }

    pub fn is_not_null(&mut self) -> Result<&mut Self> {
        self.value_op(CompareOp::IsNotNull, Vec::new())
    }

    fn value_op(&mut self, op: CompareOp, values: Vec<B::Value>) -> Result<&mut Self> {
        self.ctx.apply_value_op(self.id, op, values)?;
        Ok(self)
    }

    // ---- field-to-field comparisons ----

    pub fn eq_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::Eq, other)
    }

    pub fn not_eq_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::NotEq, other)
    }

    pub fn less_than_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::LessThan, other)
    }

    pub fn not_less_than_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::NotLessThan, other)
    }

    pub fn greater_than_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::GreaterThan, other)
    }

    pub fn not_greater_than_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::NotGreaterThan, other)
    }

    pub fn like_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::Like, other)
    }

    pub fn not_like_searcher(&mut self, other: SearcherId) -> Result<&mut Self> {
        self.searcher_op(CompareOp::NotLike, other)
    }

    fn searcher_op(&mut self, op: CompareOp, other: SearcherId) -> Result<&mut Self> {
        self.ctx.apply_searcher_op(self.id, op, other)?;
        Ok(self)
    }

    // ---- subqueries ----

    /// Membership in the result of a finished child query.
    pub fn in_child_query(&mut self, output: B::Output) -> Result<&mut Self> {
        self.ctx.apply_child_query(self.id, CompareOp::In, output)?;
        Ok(self)
    }

    pub fn not_in_child_query(&mut self, output: B::Output) -> Result<&mut Self> {
        self.ctx
            .apply_child_query(self.id, CompareOp::NotIn, output)?;
        Ok(self)
    }

    // ---- textual search ----

    /// Applies an operation with literal text arguments. The text runs
    /// through the field's transformer before binding; list-valued methods
    /// split the text on commas.
    pub fn search_text(&mut self, op: CompareOp, raw: &str) -> Result<&mut Self> {
        self.ctx.apply_text_op(self.id, op, raw)?;
        Ok(self)
    }

    // ---- connectives & delimiters ----

    pub fn and(&mut self) -> Result<&mut Self> {
        self.ctx.apply_connective(self.id, Connective::And)?;
        Ok(self)
    }

    pub fn or(&mut self) -> Result<&mut Self> {
        self.ctx.apply_connective(self.id, Connective::Or)?;
        Ok(self)
    }

    /// Opens a delimiter group.
    pub fn ds(&mut self) -> Result<&mut Self> {
        self.ctx.delimiter_start(self.id)?;
        Ok(self)
    }

    /// Closes a delimiter group.
    pub fn de(&mut self) -> Result<&mut Self> {
        self.ctx.delimiter_end(self.id)?;
        Ok(self)
    }

    // ---- marks ----

    /// Toggles this field as an output column. Enabling materializes the
    /// owning join; disabling attempts rollback.
    pub fn set_output(&mut self, on: bool) -> Result<&mut Self> {
        self.ctx.set_output(self.id, on)?;
        Ok(self)
    }

    pub fn mark_order_by(&mut self, priority: u32, ascending: bool) -> Result<&mut Self> {
        self.ctx.mark_order_by(self.id, priority, ascending)?;
        Ok(self)
    }

    pub fn mark_group_by(&mut self, priority: u32) -> Result<&mut Self> {
        self.ctx.mark_group_by(self.id, priority)?;
        Ok(self)
    }

    /// Retracts every fragment this searcher contributed and attempts to roll
    /// the owning join back.
    pub fn cancel_search(&mut self) -> &mut Self {
        self.ctx.cancel_search(self.id);
        self
    }
}
