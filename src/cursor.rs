//! Forward-only cursor over a statement's result, plus the declarative
//! statement builders used by the connection-level `insert`/`update`/`select`
//! helpers.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::driver::{QueryOutput, RowStream};
use crate::error::SqlBridgeError;
use crate::row::Row;
use crate::types::SqlValue;

/// Lazy, single-pass iterator over result rows. Not restartable.
pub struct Cursor {
    columns: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
    rows_affected: u64,
    stream: Box<dyn RowStream>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("columns", &self.columns)
            .field("rows_affected", &self.rows_affected)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    pub(crate) fn new(output: QueryOutput) -> Self {
        let column_index = Row::build_index(&output.columns);
        Self {
            columns: output.columns,
            column_index,
            rows_affected: output.rows_affected,
            stream: output.rows,
        }
    }

    /// Column names of the result, empty for DML.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows affected, for DML statements.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Advance to the next row.
    ///
    /// # Errors
    /// Propagates backend failures surfaced mid-stream.
    pub async fn next_row(&mut self) -> Result<Option<Row>, SqlBridgeError> {
        let Some(values) = self.stream.next_values().await? else {
            return Ok(None);
        };
        Ok(Some(Row::with_index(
            self.columns.clone(),
            self.column_index.clone(),
            values,
        )))
    }

    /// Drain the remaining rows.
    ///
    /// # Errors
    /// Propagates backend failures surfaced mid-stream.
    pub async fn fetch_all(&mut self) -> Result<Vec<Row>, SqlBridgeError> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The next row, or an execution error if the result is exhausted.
    ///
    /// # Errors
    /// Returns [`SqlBridgeError::Execution`] when no row remains.
    pub async fn fetch_one(&mut self) -> Result<Row, SqlBridgeError> {
        self.next_row()
            .await?
            .ok_or_else(|| SqlBridgeError::Execution("query returned no rows".into()))
    }
}

/// Build an INSERT template with deterministically sorted columns.
///
/// All fields use explicit positional indices so the statement is stable for
/// a given column set: `INSERT INTO {0:i} ({1:i}, ...) VALUES ({N}, ...)`.
pub(crate) fn build_insert(
    table: &str,
    data: &BTreeMap<String, SqlValue>,
    returning: Option<&str>,
) -> (String, Vec<SqlValue>) {
    let n = data.len();
    let mut params: Vec<SqlValue> = Vec::with_capacity(2 * n + 2);
    params.push(SqlValue::Text(table.to_string()));

    let mut template = String::from("INSERT INTO {0:i} (");
    for (i, name) in data.keys().enumerate() {
        if i > 0 {
            template.push_str(", ");
        }
        let _ = write!(template, "{{{}:i}}", i + 1);
        params.push(SqlValue::Text(name.clone()));
    }
    template.push_str(") VALUES (");
    for (i, value) in data.values().enumerate() {
        if i > 0 {
            template.push_str(", ");
        }
        let _ = write!(template, "{{{}}}", n + 1 + i);
        params.push(value.clone());
    }
    template.push(')');

    if let Some(column) = returning {
        let _ = write!(template, " RETURNING {{{}:i}}", 2 * n + 1);
        params.push(SqlValue::Text(column.to_string()));
    }

    (template, params)
}

/// Build an UPDATE template: sorted SET pairs, then the caller's WHERE text.
/// WHERE params ride after the SET params; `{}` fields inside the WHERE text
/// continue numbering past the builder's own fields.
pub(crate) fn build_update(
    table: &str,
    data: &BTreeMap<String, SqlValue>,
    where_clause: &str,
    where_params: &[SqlValue],
) -> (String, Vec<SqlValue>) {
    let mut params: Vec<SqlValue> = Vec::with_capacity(2 * data.len() + where_params.len() + 1);
    params.push(SqlValue::Text(table.to_string()));

    let mut template = String::from("UPDATE {0:i} SET ");
    let mut index = 1;
    for (i, (name, value)) in data.iter().enumerate() {
        if i > 0 {
            template.push_str(", ");
        }
        let _ = write!(template, "{{{index}:i}} = {{{}}}", index + 1);
        params.push(SqlValue::Text(name.clone()));
        params.push(value.clone());
        index += 2;
    }
    let _ = write!(template, " WHERE {where_clause}");
    params.extend(where_params.iter().cloned());

    (template, params)
}

/// Build a SELECT template. Column expressions pass through raw (callers may
/// select `*` or computed expressions); only the table name is quoted.
pub(crate) fn build_select(
    table: &str,
    columns: &[&str],
    where_clause: Option<&str>,
    where_params: &[SqlValue],
) -> (String, Vec<SqlValue>) {
    let mut params: Vec<SqlValue> = Vec::with_capacity(where_params.len() + 1);
    let mut template = String::from("SELECT ");
    template.push_str(&columns.join(", "));
    template.push_str(" FROM {0:i}");
    params.push(SqlValue::Text(table.to_string()));

    if let Some(clause) = where_clause {
        let _ = write!(template, " WHERE {clause}");
    }
    params.extend(where_params.iter().cloned());

    (template, params)
}
