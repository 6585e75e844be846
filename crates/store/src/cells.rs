// Cell IO and bounded query execution.

use rusqlite::params;
use rusqlite::types::ValueRef;
use serde::Serialize;
use serde_json::{json, Map, Value};

use gridagent_core::ident::quote_ident;
use gridagent_core::{EngineError, SheetId};

use crate::columns::ColumnMeta;
use crate::filters::FilterStore;
use crate::schema::{HARD_ROW_LIMIT, PREVIEW_ROW_LIMIT};
use crate::sql_err;
use crate::store::SheetStore;

/// Result of a bounded read query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    /// At most `PREVIEW_ROW_LIMIT` rows, each an object keyed by column.
    pub rows: Vec<Value>,
    /// Matching rows counted up to `HARD_ROW_LIMIT`.
    pub row_count: usize,
    /// True when rows beyond the preview (or beyond the hard cap) exist.
    pub truncated: bool,
}

/// Result of a mutation statement.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MutationResult {
    pub changes: usize,
    #[serde(rename = "lastInsertRowid")]
    pub last_insert_rowid: i64,
}

/// A sheet's visible rows after filters, in row_number order.
#[derive(Debug, Clone, Serialize)]
pub struct VisibleRows {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Value>,
}

impl SheetStore {
    /// Write one cell. `row` is 1-based. A non-empty value upserts the
    /// row; an empty value clears the cell, and a row left entirely
    /// blank is deleted outright (its row_number is not reused).
    pub fn set_cell(
        &self,
        sheet_id: SheetId,
        row: i64,
        col: usize,
        value: &str,
    ) -> Result<(), EngineError> {
        if row < 1 {
            return Err(EngineError::validation("row must be a positive integer"));
        }
        self.ensure_column_count(sheet_id, col + 1)?;
        let meta = self.column_at(sheet_id, col)?;
        let table = sheet_id.table_name();
        let col_sql = quote_ident(&meta.sql_name);

        if !value.is_empty() {
            self.rw
                .execute(
                    &format!(
                        "INSERT INTO \"{table}\" (row_number, {col_sql}) VALUES (?1, ?2) \
                         ON CONFLICT(row_number) DO UPDATE SET {col_sql} = excluded.{col_sql}"
                    ),
                    params![row, value],
                )
                .map_err(sql_err)?;
            return Ok(());
        }

        let cleared = self
            .rw
            .execute(
                &format!("UPDATE \"{table}\" SET {col_sql} = NULL WHERE row_number = ?1"),
                params![row],
            )
            .map_err(sql_err)?;
        if cleared == 0 {
            return Ok(());
        }

        // Delete the row if no column holds a non-blank value anymore
        let blank_check: Vec<String> = self
            .columns(sheet_id)?
            .iter()
            .map(|c| {
                let q = quote_ident(&c.sql_name);
                format!("({q} IS NULL OR {q} = '')")
            })
            .collect();
        if blank_check.is_empty() {
            return Ok(());
        }
        self.rw
            .execute(
                &format!(
                    "DELETE FROM \"{table}\" WHERE row_number = ?1 AND {}",
                    blank_check.join(" AND ")
                ),
                params![row],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    /// Project all columns plus row_number, applying the sheet's active
    /// filter conditions, ordered by row_number.
    pub fn load_visible_rows(
        &self,
        sheet_id: SheetId,
        filters: &dyn FilterStore,
    ) -> Result<VisibleRows, EngineError> {
        self.ensure_table(sheet_id)?;
        let columns = self.columns(sheet_id)?;
        let mut select = String::from("SELECT row_number");
        for c in &columns {
            select.push_str(", ");
            select.push_str(&quote_ident(&c.sql_name));
        }
        select.push_str(&format!(" FROM \"{}\"", sheet_id.table_name()));
        let conditions = filters.conditions(sheet_id);
        if !conditions.is_empty() {
            let clauses: Vec<String> = conditions.iter().map(|c| format!("({c})")).collect();
            select.push_str(" WHERE ");
            select.push_str(&clauses.join(" AND "));
        }
        select.push_str(" ORDER BY row_number");

        let result = self.read_rows(&self.ro, &select)?;
        Ok(VisibleRows {
            columns,
            rows: result.rows,
        })
    }

    /// Run a validated read statement on the read-only connection,
    /// capped at the preview/hard row limits.
    pub fn query_rows(&self, sql: &str) -> Result<QueryResult, EngineError> {
        self.read_rows(&self.ro, sql)
    }

    /// Run a validated mutation statement on the read-write connection.
    pub fn execute_mutation(&self, sql: &str) -> Result<MutationResult, EngineError> {
        let changes = self.rw.execute(sql, []).map_err(sql_err)?;
        Ok(MutationResult {
            changes,
            last_insert_rowid: self.rw.last_insert_rowid(),
        })
    }

    /// Resolve the row numbers matching a boolean condition against one
    /// sheet (read-only connection, hard cap applies).
    pub fn rows_matching(
        &self,
        sheet_id: SheetId,
        condition: &str,
    ) -> Result<Vec<i64>, EngineError> {
        let sql = format!(
            "SELECT row_number FROM \"{}\" WHERE ({condition}) ORDER BY row_number",
            sheet_id.table_name()
        );
        let result = self.read_rows(&self.ro, &sql)?;
        Ok(result
            .rows
            .iter()
            .filter_map(|r| r.get("row_number").and_then(Value::as_i64))
            .collect())
    }

    /// Validate a filter condition with a bounded trial query before it
    /// is committed to the filter list.
    pub fn check_condition(&self, sheet_id: SheetId, condition: &str) -> Result<(), EngineError> {
        let sql = format!(
            "SELECT 1 FROM \"{}\" WHERE ({condition}) LIMIT 1",
            sheet_id.table_name()
        );
        let mut stmt = self
            .ro
            .prepare(&sql)
            .map_err(|e| EngineError::validation(format!("invalid condition: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| EngineError::validation(format!("invalid condition: {e}")))?;
        rows.next()
            .map_err(|e| EngineError::validation(format!("invalid condition: {e}")))?;
        Ok(())
    }

    fn read_rows(&self, conn: &rusqlite::Connection, sql: &str) -> Result<QueryResult, EngineError> {
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut rows = stmt.query([]).map_err(sql_err)?;

        let mut out: Vec<Value> = Vec::new();
        let mut row_count = 0usize;
        let mut truncated = false;
        while let Some(row) = rows.next().map_err(sql_err)? {
            if row_count >= HARD_ROW_LIMIT {
                truncated = true;
                break;
            }
            row_count += 1;
            if out.len() >= PREVIEW_ROW_LIMIT {
                truncated = true;
                continue;
            }
            let mut obj = Map::new();
            for (i, name) in columns.iter().enumerate() {
                let value = match row.get_ref(i).map_err(sql_err)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => json!(v),
                    ValueRef::Real(v) => json!(v),
                    ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
                    ValueRef::Blob(b) => json!(String::from_utf8_lossy(b)),
                };
                obj.insert(name.clone(), value);
            }
            out.push(Value::Object(obj));
        }

        Ok(QueryResult {
            columns,
            rows: out,
            row_count,
            truncated,
        })
    }
}
