//! SQLite rendering backend.
//!
//! Fragments carry a SQL string with `?` placeholders plus the values bound
//! to them, so concatenation at build time keeps text and binds in lockstep.

use relq_core::{CompareOp, JoinKind, JoinSpec, Operand, QueryBackend, RelationKind};
use rusqlite::types::Value;

/// One SQL fragment with its bound values.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl SqlFragment {
    fn text(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }
}

/// A fully assembled SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub binds: Vec<Value>,
}

/// Renders engine decisions as parameterized SQLite text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlBackend;

fn comparator(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::NotEq => "!=",
        CompareOp::LessThan => "<",
        CompareOp::NotLessThan => ">=",
        CompareOp::GreaterThan => ">",
        CompareOp::NotGreaterThan => "<=",
        CompareOp::Like => "LIKE",
        CompareOp::NotLike => "NOT LIKE",
        CompareOp::In => "IN",
        CompareOp::NotIn => "NOT IN",
        CompareOp::Between => "BETWEEN",
        CompareOp::IsNull => "IS NULL",
        CompareOp::IsNotNull => "IS NOT NULL",
    }
}

fn join_keyword(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER JOIN",
        JoinKind::Left => "LEFT JOIN",
        JoinKind::Right => "RIGHT JOIN",
    }
}

fn relation_operator(relation: RelationKind) -> &'static str {
    match relation {
        RelationKind::Eq => "=",
        RelationKind::NotEq => "!=",
        RelationKind::In => "IN",
        RelationKind::NotIn => "NOT IN",
    }
}

impl QueryBackend for SqlBackend {
    type Value = Value;
    type Fragment = SqlFragment;
    type Output = SqlQuery;

    fn on_search(&self, op: CompareOp, column: &str, operand: Operand<'_, Self>) -> SqlFragment {
        match operand {
            Operand::Values(values) => match op {
                CompareOp::In | CompareOp::NotIn => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    SqlFragment {
                        sql: format!("{column} {} ({placeholders})", comparator(op)),
                        binds: values,
                    }
                }
                CompareOp::Between => SqlFragment {
                    sql: format!("{column} BETWEEN ? AND ?"),
                    binds: values,
                },
                CompareOp::IsNull | CompareOp::IsNotNull => {
                    SqlFragment::text(format!("{column} {}", comparator(op)))
                }
                _ => SqlFragment {
                    sql: format!("{column} {} ?", comparator(op)),
                    binds: values,
                },
            },
            Operand::Column(other) => {
                SqlFragment::text(format!("{column} {} {other}", comparator(op)))
            }
            Operand::Query(query) => SqlFragment {
                sql: format!("{column} {} ({})", comparator(op), query.sql),
                binds: query.binds.clone(),
            },
            Operand::None => SqlFragment::text(format!("{column} {}", comparator(op))),
        }
    }

    fn on_and(&self) -> SqlFragment {
        SqlFragment::text("AND")
    }

    fn on_or(&self) -> SqlFragment {
        SqlFragment::text("OR")
    }

    fn on_delimiter_start(&self) -> SqlFragment {
        SqlFragment::text("(")
    }

    fn on_delimiter_end(&self) -> SqlFragment {
        SqlFragment::text(")")
    }

    fn on_join(&self, spec: &JoinSpec<'_>, extra: Option<SqlFragment>) -> SqlFragment {
        let origin = format!("{}.{}", spec.origin_alias, spec.origin_column);
        let target = format!("{}.{}", spec.target_alias, spec.target_column);
        let (left, right) = if spec.reversed {
            (target, origin)
        } else {
            (origin, target)
        };
        let mut sql = format!(
            "{} {} {} ON {left} {} {right}",
            join_keyword(spec.kind),
            spec.target_table,
            spec.target_alias,
            relation_operator(spec.relation),
        );
        let mut binds = Vec::new();
        if let Some(extra) = extra {
            sql.push_str(&format!(" AND ({})", extra.sql));
            binds.extend(extra.binds);
        }
        SqlFragment { sql, binds }
    }

    fn merge_condition(&self, parts: Vec<SqlFragment>) -> SqlFragment {
        let mut binds = Vec::new();
        let sql = parts
            .iter()
            .map(|p| p.sql.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        for part in parts {
            binds.extend(part.binds);
        }
        SqlFragment { sql, binds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_comparison_binds_one_value() {
        let frag = SqlBackend.on_search(
            CompareOp::Eq,
            "o1.status",
            Operand::Values(vec![Value::Text("open".into())]),
        );
        assert_eq!(frag.sql, "o1.status = ?");
        assert_eq!(frag.binds.len(), 1);
    }

    #[test]
    fn test_in_renders_one_placeholder_per_value() {
        let frag = SqlBackend.on_search(
            CompareOp::NotIn,
            "o1.id",
            Operand::Values(vec![Value::Integer(1), Value::Integer(2)]),
        );
        assert_eq!(frag.sql, "o1.id NOT IN (?, ?)");
        assert_eq!(frag.binds.len(), 2);
    }

    #[test]
    fn test_between_binds_two_values() {
        let frag = SqlBackend.on_search(
            CompareOp::Between,
            "o1.total",
            Operand::Values(vec![Value::Integer(10), Value::Integer(20)]),
        );
        assert_eq!(frag.sql, "o1.total BETWEEN ? AND ?");
        assert_eq!(frag.binds.len(), 2);
    }

    #[test]
    fn test_null_test_has_no_binds() {
        let frag = SqlBackend.on_search(CompareOp::IsNull, "o1.deleted_at", Operand::None);
        assert_eq!(frag.sql, "o1.deleted_at IS NULL");
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_column_comparison_has_no_binds() {
        let frag = SqlBackend.on_search(
            CompareOp::GreaterThan,
            "o1.updated_at",
            Operand::Column("o1.created_at"),
        );
        assert_eq!(frag.sql, "o1.updated_at > o1.created_at");
        assert!(frag.binds.is_empty());
    }

    #[test]
    fn test_child_query_inlines_sql_and_copies_binds() {
        let child = SqlQuery {
            sql: "SELECT c1.id FROM customers c1 WHERE c1.region = ?".to_string(),
            binds: vec![Value::Text("eu".into())],
        };
        let frag = SqlBackend.on_search(CompareOp::In, "o1.customer_id", Operand::Query(&child));
        assert_eq!(
            frag.sql,
            "o1.customer_id IN (SELECT c1.id FROM customers c1 WHERE c1.region = ?)"
        );
        assert_eq!(frag.binds, child.binds);
    }

    #[test]
    fn test_join_with_extra_condition_carries_binds() {
        let spec = JoinSpec {
            kind: JoinKind::Left,
            relation: RelationKind::Eq,
            reversed: false,
            origin_table: "orders",
            origin_alias: "o1",
            origin_column: "customer_id",
            target_table: "customers",
            target_alias: "c2",
            target_column: "id",
        };
        let extra = SqlFragment {
            sql: "c2.region = ?".to_string(),
            binds: vec![Value::Text("eu".into())],
        };
        let frag = SqlBackend.on_join(&spec, Some(extra));
        assert_eq!(
            frag.sql,
            "LEFT JOIN customers c2 ON o1.customer_id = c2.id AND (c2.region = ?)"
        );
        assert_eq!(frag.binds.len(), 1);
    }

    #[test]
    fn test_reversed_join_swaps_operand_order() {
        let spec = JoinSpec {
            kind: JoinKind::Inner,
            relation: RelationKind::In,
            reversed: true,
            origin_table: "orders",
            origin_alias: "o1",
            origin_column: "customer_id",
            target_table: "customers",
            target_alias: "c2",
            target_column: "id",
        };
        let frag = SqlBackend.on_join(&spec, None);
        assert_eq!(frag.sql, "INNER JOIN customers c2 ON c2.id IN o1.customer_id");
    }

    #[test]
    fn test_merge_condition_concatenates_in_order() {
        let merged = SqlBackend.merge_condition(vec![
            SqlFragment {
                sql: "c2.region = ?".to_string(),
                binds: vec![Value::Text("eu".into())],
            },
            SqlFragment::text("AND"),
            SqlFragment {
                sql: "c2.active = ?".to_string(),
                binds: vec![Value::Integer(1)],
            },
        ]);
        assert_eq!(merged.sql, "c2.region = ? AND c2.active = ?");
        assert_eq!(merged.binds.len(), 2);
    }
}
