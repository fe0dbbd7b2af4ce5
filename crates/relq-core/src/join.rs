//! Join edges between parameters.
//!
//! A [`JoinWorker`] is created once per structural or dynamic join and lives
//! as long as its owning parameter. Its materialization is lazy: the edge
//! contributes a fragment only after something below it is actually used, and
//! the fragment is retracted again when the last dependent mark is cleared.
//! The state machine itself lives in [`crate::context::ParameterContext`];
//! this module is the edge record and its vocabulary.

use serde::{Deserialize, Serialize};

use crate::ids::{FieldId, ParamId};

/// Structural join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

/// Relational operator between the two key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Eq,
    NotEq,
    In,
    NotIn,
}

/// Directed edge describing how a target parameter hangs off its origin.
#[derive(Debug, Clone)]
pub struct JoinWorker {
    pub(crate) origin_param: ParamId,
    pub(crate) origin_field: FieldId,
    pub(crate) target_param: ParamId,
    pub(crate) target_field: FieldId,
    pub(crate) kind: JoinKind,
    pub(crate) relation: RelationKind,
    pub(crate) reversed: bool,
    pub(crate) extra_condition: Option<String>,
    pub(crate) materialized: bool,
}

impl JoinWorker {
    pub fn origin_param(&self) -> ParamId {
        self.origin_param
    }

    pub fn origin_field(&self) -> FieldId {
        self.origin_field
    }

    pub fn target_param(&self) -> ParamId {
        self.target_param
    }

    pub fn target_field(&self) -> FieldId {
        self.target_field
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    pub fn relation(&self) -> RelationKind {
        self.relation
    }

    pub fn extra_condition(&self) -> Option<&str> {
        self.extra_condition.as_deref()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// Whether the key relation renders target-side first.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Flips the rendered operand order of the key relation. The joined-in
    /// table and all tree bookkeeping stay exactly as registered, so origin
    /// maps and field markers never go stale.
    pub(crate) fn reverse(&mut self) {
        self.reversed = !self.reversed;
    }

    pub(crate) fn offset_ids(&mut self, param_offset: u32, field_offset: u32) {
        self.origin_param = self.origin_param.offset(param_offset);
        self.origin_field = self.origin_field.offset(field_offset);
        self.target_param = self.target_param.offset(param_offset);
        self.target_field = self.target_field.offset(field_offset);
    }
}
