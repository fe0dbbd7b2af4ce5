//! Statement execution against a rusqlite connection.

use rusqlite::{Connection, Row, ToSql};
use tracing::trace;

use crate::{backend::SqlQuery, error::Result};

/// Converts a database row into a Rust type.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Runs an assembled query and maps every row.
pub fn fetch<E: FromRow>(conn: &Connection, query: &SqlQuery) -> Result<Vec<E>> {
    trace!(sql = query.sql.as_str(), binds = query.binds.len(), "executing query");
    let mut stmt = conn.prepare(&query.sql)?;
    let params: Vec<&dyn ToSql> = query.binds.iter().map(|v| v as &dyn ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), E::from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<E>>>()?)
}

/// Runs an assembled query and returns the first mapped row, if any.
pub fn fetch_one<E: FromRow>(conn: &Connection, query: &SqlQuery) -> Result<Option<E>> {
    let mut rows = fetch(conn, query)?;
    Ok(if rows.is_empty() {
        None
    } else {
        Some(rows.remove(0))
    })
}

/// Runs a single-column aggregate query, e.g. one built by
/// [`crate::select::build_count`].
pub fn scalar(conn: &Connection, query: &SqlQuery) -> Result<u64> {
    let mut stmt = conn.prepare(&query.sql)?;
    let params: Vec<&dyn ToSql> = query.binds.iter().map(|v| v as &dyn ToSql).collect();
    Ok(stmt.query_row(params.as_slice(), |row| row.get(0))?)
}
