//! SQLite product layer over the relq engine.
//!
//! Pairs the backend-agnostic parameter tree from `relq-core` with a
//! parameterized-SQL renderer, a JSON schema loader, standard value
//! transformers and rusqlite execution helpers.
//!
//! ```ignore
//! let schema = Schema::from_json(include_str!("schema.json"))?;
//! let mut ctx = schema.context("Order")?;
//! ctx.searcher("status")?.eq(Value::from("open"))?;
//! ctx.searcher("customer.name")?.and()?.like(Value::from("%smith%"))?;
//! let query = build_select(&ctx)?;
//! let orders: Vec<Order> = fetch(&conn, &query)?;
//! ```

pub mod backend;
pub mod error;
pub mod exec;
pub mod schema;
pub mod select;
pub mod transform;

pub use backend::{SqlBackend, SqlFragment, SqlQuery};
pub use error::{Result, SqlError};
pub use exec::{fetch, fetch_one, scalar, FromRow};
pub use schema::{ClassDef, JoinDef, Schema};
pub use select::{build_count, build_select};
pub use transform::standard_transformers;

pub use relq_core as engine;
