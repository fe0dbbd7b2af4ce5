//! Clause scanner for the search-expression mini-language.
//!
//! Grammar, informally:
//!
//! ```text
//! clause := (AND|OR)? '('* '{' side? field-path '}' ':' method args? ')'*
//! method := name | name ')' | name '(' raw-args ')'
//! ```
//!
//! Clauses are found left-to-right by pattern scan; text that does not match
//! the clause shape is skipped, not an error. A zero-arg method written with
//! a glued close paren (`isNull)`) consumes that paren as part of the method
//! token; only parens beyond it count toward the delimiter-close tally.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    backend::{CompareOp, Connective},
    error::{QueryError, Result},
};

/// Default origin-side path prefix.
pub const ORIGIN_SYMBOL: &str = "$FROM.";
/// Default target-side path prefix.
pub const TARGET_SYMBOL: &str = "$TO.";

/// Which side of the join a field path resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Origin,
    Target,
}

/// The side-symbol pair stripped from field paths.
#[derive(Debug, Clone, Copy)]
pub struct SideSymbols<'a> {
    pub origin: &'a str,
    pub target: &'a str,
}

impl Default for SideSymbols<'_> {
    fn default() -> Self {
        Self {
            origin: ORIGIN_SYMBOL,
            target: TARGET_SYMBOL,
        }
    }
}

/// One compiled clause, ready for replay against a real searcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprOp {
    pub connective: Connective,
    pub side: Option<Side>,
    pub field_path: String,
    pub op: CompareOp,
    /// Raw argument text; split on commas only for list-valued methods, at
    /// replay time.
    pub raw_args: Option<String>,
    pub opens: u32,
    pub closes: u32,
}

static CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?: \b (AND|OR) \s+ )?          # optional connective, AND is the default
        (\(*) \s*                       # delimiter opens
        \{ \s* ([^}]+?) \s* \}          # field path, optionally side-prefixed
        \s* : \s*
        ([A-Za-z][A-Za-z0-9]*)          # method name
        (?: \( ([^()]*) \) | \) )?      # (args), or one glued close paren
        (\)*)                           # delimiter closes
        ",
    )
    .expect("clause pattern is valid")
});

/// Compiles expression text into replayable operation records.
///
/// Unknown method names fail here, at compile time.
pub fn compile(text: &str, symbols: &SideSymbols<'_>) -> Result<Vec<ExprOp>> {
    let mut ops = Vec::new();
    for caps in CLAUSE_RE.captures_iter(text) {
        let connective = match caps.get(1).map(|m| m.as_str()) {
            Some("OR") => Connective::Or,
            _ => Connective::And,
        };
        let opens = caps.get(2).map_or(0, |m| m.as_str().len()) as u32;
        let closes = caps.get(6).map_or(0, |m| m.as_str().len()) as u32;

        let raw_path = caps.get(3).map_or("", |m| m.as_str());
        let (side, field_path) = strip_side(raw_path, symbols);

        let method = caps.get(4).map_or("", |m| m.as_str());
        let op = CompareOp::from_method_name(method)
            .ok_or_else(|| QueryError::UnknownMethod(method.to_string()))?;
        let raw_args = caps.get(5).map(|m| m.as_str().to_string());

        ops.push(ExprOp {
            connective,
            side,
            field_path,
            op,
            raw_args,
            opens,
            closes,
        });
    }
    Ok(ops)
}

fn strip_side(raw: &str, symbols: &SideSymbols<'_>) -> (Option<Side>, String) {
    if let Some(rest) = raw.strip_prefix(symbols.origin) {
        (Some(Side::Origin), rest.to_string())
    } else if let Some(rest) = raw.strip_prefix(symbols.target) {
        (Some(Side::Target), rest.to_string())
    } else {
        (None, raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_default(text: &str) -> Vec<ExprOp> {
        compile(text, &SideSymbols::default()).unwrap()
    }

    #[test]
    fn test_single_clause() {
        let ops = compile_default("{$TO.orderNumber}:eq(1000)");
        assert_eq!(ops.len(), 1);
        let op = &ops[0];
        assert_eq!(op.connective, Connective::And);
        assert_eq!(op.side, Some(Side::Target));
        assert_eq!(op.field_path, "orderNumber");
        assert_eq!(op.op, CompareOp::Eq);
        assert_eq!(op.raw_args.as_deref(), Some("1000"));
        assert_eq!((op.opens, op.closes), (0, 0));
    }

    #[test]
    fn test_or_prefix_and_origin_side() {
        let ops = compile_default("{$TO.a}:eq(1) OR {$FROM.b}:notEq(2)");
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[1].connective, Connective::Or);
        assert_eq!(ops[1].side, Some(Side::Origin));
        // notEq dispatches to its own operation, not to eq.
        assert_eq!(ops[1].op, CompareOp::NotEq);
    }

    #[test]
    fn test_delimiter_counts() {
        let ops = compile_default("(({$TO.a}:eq(1) AND {$TO.b}:lessThan(5)))");
        assert_eq!((ops[0].opens, ops[0].closes), (2, 0));
        assert_eq!((ops[1].opens, ops[1].closes), (0, 2));
    }

    #[test]
    fn test_glued_close_paren_is_part_of_method() {
        // One paren is swallowed by the method token; only the rest count.
        let ops = compile_default("({$TO.deleted}:isNull))");
        assert_eq!(ops[0].op, CompareOp::IsNull);
        assert_eq!(ops[0].raw_args, None);
        assert_eq!((ops[0].opens, ops[0].closes), (1, 1));
    }

    #[test]
    fn test_bare_method_name() {
        let ops = compile_default("{$FROM.deleted}:isNotNull");
        assert_eq!(ops[0].op, CompareOp::IsNotNull);
        assert_eq!(ops[0].raw_args, None);
    }

    #[test]
    fn test_list_args_stay_raw() {
        let ops = compile_default("{$TO.status}:in(open, closed)");
        assert_eq!(ops[0].op, CompareOp::In);
        assert_eq!(ops[0].raw_args.as_deref(), Some("open, closed"));
    }

    #[test]
    fn test_no_side_symbol() {
        let ops = compile_default("{status}:eq(active)");
        assert_eq!(ops[0].side, None);
        assert_eq!(ops[0].field_path, "status");
    }

    #[test]
    fn test_dotted_path() {
        let ops = compile_default("{$TO.customer.name}:like(smith)");
        assert_eq!(ops[0].field_path, "customer.name");
    }

    #[test]
    fn test_unknown_method_fails() {
        let err = compile("{$TO.a}:frobnicate(1)", &SideSymbols::default()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownMethod(m) if m == "frobnicate"));
    }

    #[test]
    fn test_non_matching_text_is_ignored() {
        let ops = compile_default("just some prose, no clauses");
        assert!(ops.is_empty());
    }

    #[test]
    fn test_custom_side_symbols() {
        let symbols = SideSymbols {
            origin: "<<.",
            target: ">>.",
        };
        let ops = compile("{>>.x}:eq(1)", &symbols).unwrap();
        assert_eq!(ops[0].side, Some(Side::Target));
        assert_eq!(ops[0].field_path, "x");
    }
}
