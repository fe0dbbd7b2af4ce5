//! Error types for relq-core.
//!
//! Every failure is a synchronous invalid-usage signal; there is no retry
//! semantics anywhere in the engine.

use miette::Diagnostic;
use thiserror::Error;

/// Engine error type covering lifecycle, identity, structural, sequencing,
/// lookup and expression failures.
#[derive(Error, Diagnostic, Debug)]
pub enum QueryError {
    #[error("join on '{0}' is already materialized")]
    #[diagnostic(
        code(relq::lifecycle),
        help("Roll the join back before changing its type")
    )]
    JoinMaterialized(String),

    #[error("duplicate field name: {0}")]
    #[diagnostic(
        code(relq::identity),
        help("Field names must be unique within one parameter")
    )]
    DuplicateField(String),

    #[error("class {class} has no field named '{field}'")]
    #[diagnostic(code(relq::identity))]
    MissingField { class: String, field: String },

    #[error("field '{0}' does not belong to this parameter")]
    #[diagnostic(code(relq::identity))]
    FieldNotOwned(String),

    #[error("unresolved path: {0}")]
    #[diagnostic(
        code(relq::identity),
        help("Paths are dot-joined origin-field names, relative to the starting node")
    )]
    UnknownPath(String),

    #[error("unknown class: {0}")]
    #[diagnostic(code(relq::identity))]
    UnknownClass(String),

    #[error("parameter has no searcher to anchor a connective")]
    #[diagnostic(code(relq::identity))]
    NoAnchor,

    #[error("cyclic join chain: class {0} is already under construction")]
    #[diagnostic(
        code(relq::structural),
        help("A default or inherit join may not revisit a class on the current chain")
    )]
    CyclicJoin(String),

    #[error("join type cannot change on a {0} parameter")]
    #[diagnostic(code(relq::structural))]
    JoinTypeImmutable(&'static str),

    #[error("operation requires a dynamic join")]
    #[diagnostic(code(relq::structural))]
    NotDynamicJoin,

    #[error("dynamic join target must be an initialized root tree")]
    #[diagnostic(code(relq::structural))]
    JoinTargetNotRoot,

    #[error("dynamic join target already carries recorded conditions")]
    #[diagnostic(
        code(relq::structural),
        help("Reset the tree before absorbing it, or join the trees first and search after")
    )]
    JoinTargetDirty,

    #[error("two search conditions in a row without a connective")]
    #[diagnostic(
        code(relq::sequencing),
        help("Call and()/or() between conditions, or enable auto chaining")
    )]
    MissingConnective,

    #[error("unbalanced delimiter: {0}")]
    #[diagnostic(code(relq::sequencing))]
    UnbalancedDelimiter(String),

    #[error("no value transformer registered for type '{0}'")]
    #[diagnostic(
        code(relq::lookup),
        help("Register a transformer for this value type with the initializer")
    )]
    MissingTransformer(String),

    #[error("value conversion failed: {0}")]
    #[diagnostic(code(relq::lookup))]
    Transform(String),

    #[error("unknown search method: {0}")]
    #[diagnostic(code(relq::expression))]
    UnknownMethod(String),

    #[error("search method '{method}' expects {expected} argument(s), got {got}")]
    #[diagnostic(code(relq::expression))]
    BadArity {
        method: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Result type alias for relq-core operations.
pub type Result<T> = std::result::Result<T, QueryError>;
