//! The backend-renderer seam.
//!
//! The engine decides *which* joins and conditions take part in the compiled
//! output; a [`QueryBackend`] decides what each of them looks like. Fragments
//! are opaque to the engine: it only collects them in order, keyed, and
//! removable by origin.

use crate::join::{JoinKind, RelationKind};

/// The thirteen comparison operations a searcher exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    In,
    NotIn,
    Between,
    LessThan,
    NotLessThan,
    GreaterThan,
    NotGreaterThan,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    /// The method name used by the search-expression mini-language.
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::NotEq => "notEq",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Between => "between",
            Self::LessThan => "lessThan",
            Self::NotLessThan => "notLessThan",
            Self::GreaterThan => "greaterThan",
            Self::NotGreaterThan => "notGreaterThan",
            Self::Like => "like",
            Self::NotLike => "notLike",
            Self::IsNull => "isNull",
            Self::IsNotNull => "isNotNull",
        }
    }

    /// Reverse lookup for the mini-language compiler.
    pub fn from_method_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "notEq" => Some(Self::NotEq),
            "in" => Some(Self::In),
            "notIn" => Some(Self::NotIn),
            "between" => Some(Self::Between),
            "lessThan" => Some(Self::LessThan),
            "notLessThan" => Some(Self::NotLessThan),
            "greaterThan" => Some(Self::GreaterThan),
            "notGreaterThan" => Some(Self::NotGreaterThan),
            "like" => Some(Self::Like),
            "notLike" => Some(Self::NotLike),
            "isNull" => Some(Self::IsNull),
            "isNotNull" => Some(Self::IsNotNull),
            _ => None,
        }
    }

    /// Operations whose textual arguments are comma-separated lists.
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::Between)
    }

    /// Operations that take no argument at all.
    pub fn is_nullary(self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// AND/OR connective between two search conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

/// The right-hand side of a comparison, as handed to the backend.
#[derive(Debug)]
pub enum Operand<'a, B: QueryBackend> {
    /// Bound literal values (one for scalar ops, two for between, n for in).
    Values(Vec<B::Value>),
    /// A rendered column reference, for field-to-field comparisons.
    Column(&'a str),
    /// Another tree's compiled output, for child-query membership tests.
    Query(&'a B::Output),
    /// No right-hand side (null tests).
    None,
}

/// Everything a backend needs to render one join edge.
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec<'a> {
    pub kind: JoinKind,
    pub relation: RelationKind,
    /// Render the key relation target-side first.
    pub reversed: bool,
    pub origin_table: &'a str,
    pub origin_alias: &'a str,
    pub origin_column: &'a str,
    pub target_table: &'a str,
    pub target_alias: &'a str,
    pub target_column: &'a str,
}

/// Renders engine decisions into content fragments.
///
/// `Value` is the bound-value domain, `Fragment` the unit the search context
/// collects, and `Output` a compiled query (used as a child-query operand).
pub trait QueryBackend: Sized {
    type Value: Clone + std::fmt::Debug;
    type Fragment: Clone + std::fmt::Debug;
    type Output;

    /// Renders one comparison against an already-aliased column reference.
    fn on_search(&self, op: CompareOp, column: &str, operand: Operand<'_, Self>) -> Self::Fragment;

    fn on_and(&self) -> Self::Fragment;

    fn on_or(&self) -> Self::Fragment;

    fn on_delimiter_start(&self) -> Self::Fragment;

    fn on_delimiter_end(&self) -> Self::Fragment;

    /// Renders one join edge. `extra` is the merged extra-condition fragment
    /// compiled from the edge's condition text, when it has one.
    fn on_join(&self, spec: &JoinSpec<'_>, extra: Option<Self::Fragment>) -> Self::Fragment;

    /// Folds the fragments replayed into a scratch context into the single
    /// extra-condition fragment passed to [`QueryBackend::on_join`].
    fn merge_condition(&self, parts: Vec<Self::Fragment>) -> Self::Fragment;
}
