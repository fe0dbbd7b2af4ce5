//! SELECT assembly from a parameter tree's byproducts.

use relq_core::{EntryKey, ParameterContext};

use crate::{
    backend::{SqlBackend, SqlQuery},
    error::{Result, SqlError},
};

/// Assembles the tree's recorded state into one SELECT statement.
///
/// Column list comes from output marks (falling back to `*`), joins and
/// conditions from the main search context in recorded order, grouping and
/// ordering from their priority marks, and LIMIT/OFFSET from the page
/// selection. Fails when delimiter groups are still open.
pub fn build_select(ctx: &ParameterContext<SqlBackend>) -> Result<SqlQuery> {
    if ctx.delimiter_depth() != 0 {
        return Err(SqlError::OpenDelimiters(ctx.delimiter_depth()));
    }
    let mut binds = Vec::new();

    let outputs = ctx.output_columns();
    let select = if outputs.is_empty() {
        "*".to_string()
    } else {
        outputs
            .iter()
            .map(|c| match &c.alias {
                Some(alias) => format!("{} AS {alias}", c.expr),
                None => c.expr.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    };

    let root = ctx.param(ctx.root());
    let mut sql = format!(
        "SELECT {select} FROM {} {}",
        root.table_name(),
        root.table_alias()
    );

    for fragment in ctx.main_context().fragments(EntryKey::Join) {
        sql.push_str(&format!(" {}", fragment.sql));
        binds.extend(fragment.binds.iter().cloned());
    }

    let mut wheres = Vec::new();
    for fragment in ctx.main_context().fragments(EntryKey::Where) {
        wheres.push(fragment.sql.clone());
        binds.extend(fragment.binds.iter().cloned());
    }
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" "));
    }

    let groups = ctx.group_columns();
    if !groups.is_empty() {
        sql.push_str(" GROUP BY ");
        let cols: Vec<_> = groups.iter().map(|(col, _)| col.clone()).collect();
        sql.push_str(&cols.join(", "));
    }

    let sorts = ctx.sort_columns();
    if !sorts.is_empty() {
        sql.push_str(" ORDER BY ");
        let cols: Vec<_> = sorts
            .iter()
            .map(|(col, mark)| {
                format!("{col} {}", if mark.ascending { "ASC" } else { "DESC" })
            })
            .collect();
        sql.push_str(&cols.join(", "));
    }

    if let Some(page) = ctx.pagination() {
        sql.push_str(&format!(" LIMIT {}", page.page_size));
        let offset = page.page.saturating_sub(1) * page.page_size;
        if offset > 0 {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }

    Ok(SqlQuery { sql, binds })
}

/// Like [`build_select`], but counts matching rows and ignores output,
/// grouping, ordering and page marks.
pub fn build_count(ctx: &ParameterContext<SqlBackend>) -> Result<SqlQuery> {
    if ctx.delimiter_depth() != 0 {
        return Err(SqlError::OpenDelimiters(ctx.delimiter_depth()));
    }
    let mut binds = Vec::new();
    let root = ctx.param(ctx.root());
    let mut sql = format!(
        "SELECT COUNT(*) FROM {} {}",
        root.table_name(),
        root.table_alias()
    );
    for fragment in ctx.main_context().fragments(EntryKey::Join) {
        sql.push_str(&format!(" {}", fragment.sql));
        binds.extend(fragment.binds.iter().cloned());
    }
    let mut wheres = Vec::new();
    for fragment in ctx.main_context().fragments(EntryKey::Where) {
        wheres.push(fragment.sql.clone());
        binds.extend(fragment.binds.iter().cloned());
    }
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" "));
    }
    Ok(SqlQuery { sql, binds })
}
