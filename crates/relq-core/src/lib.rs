//! Backend-agnostic relational query engine.
//!
//! A schema is mirrored as a *parameter tree*: one node per mapped table
//! occurrence, linked by join edges that follow the schema's relations.
//! Callers address columns by dot-path, obtain a [`Searcher`] handle, and
//! chain comparisons on it; the tree materializes exactly the joins the
//! recorded conditions need, lazily, and rolls them back when the last
//! dependent condition is cancelled. Rendering is delegated to a
//! [`QueryBackend`], so the engine never commits to a concrete query
//! language.
//!
//! ```ignore
//! let mut ctx = ParameterContext::init(backend, &schema, "Order")?;
//! ctx.searcher("status")?.eq(open)?.and()?;
//! ctx.searcher("customer.name")?.like(pattern)?.set_output(true)?;
//! ```

pub mod backend;
pub mod context;
pub mod error;
pub mod expr;
pub mod field;
pub mod ids;
pub mod init;
pub mod join;
pub mod param;
pub mod search_context;
pub mod searcher;
pub mod transform;

pub use backend::{CompareOp, Connective, JoinSpec, Operand, QueryBackend};
pub use context::{OutputColumn, Pagination, ParameterContext};
pub use error::{QueryError, Result};
pub use field::{Field, FieldConfig, GroupMark, SortMark};
pub use ids::{FieldId, JoinId, ParamId, SearcherId};
pub use init::{JoinConfig, NodeBuilder, TreeInitializer};
pub use join::{JoinKind, JoinWorker, RelationKind};
pub use param::{ParamKind, Parameter};
pub use search_context::{ContentEntry, EntryKey, EntryOrigin, FragmentRole, SearchContext};
pub use searcher::{Searcher, SearcherNode};
pub use transform::{TransformerRegistry, ValueTransformer};
