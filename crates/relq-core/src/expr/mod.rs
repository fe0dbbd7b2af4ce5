//! The search-expression mini-language.
//!
//! Join edges may carry an extra-condition text such as
//! `"{$TO.status}:eq(active) AND ({$FROM.region}:in(eu,us))"`. The compiler
//! scans it into structured operation records; the join worker replays those
//! records against real searchers when the edge materializes.

mod compiler;

pub use compiler::{compile, ExprOp, Side, SideSymbols, ORIGIN_SYMBOL, TARGET_SYMBOL};
