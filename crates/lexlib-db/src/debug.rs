//! Ad hoc result dumps for debugging.

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::DbError;
use crate::template::Query;
use crate::value::Arg;

const PADDING: usize = 4;

/// Runs `query` on `conn` and returns the result as a text table: column
/// names on the first line, one line per row, every column right-aligned.
///
/// Meant for poking at a database from tests and one-off tools, not for
/// anything a user sees.
///
/// # Errors
///
/// Returns `DbError` if the query fails to render or run.
pub fn debug_dump(conn: &Connection, query: &Query, args: &[Arg]) -> Result<String, DbError> {
    let statement = query.bind(conn).render(args)?;
    let mut stmt = conn.prepare(&statement.sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(statement.params.values()))?;

    let mut cells: Vec<Vec<String>> = Vec::new();
    while let Some(row) = rows.next()? {
        let mut line = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            line.push(display(row.get_ref(i)?));
        }
        cells.push(line);
    }

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let widest = cells
                .iter()
                .map(|line| line[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            widest + PADDING
        })
        .collect();

    let mut out = String::new();
    for line in std::iter::once(&columns).chain(cells.iter()) {
        for (cell, &width) in line.iter().zip(&widths) {
            out.push_str(&format!("{cell:>width$}"));
        }
        out.push('\n');
    }
    Ok(out)
}

fn display(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(text) => String::from_utf8_lossy(text).into_owned(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}
