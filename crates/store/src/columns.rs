// Column metadata lifecycle.
//
// The sheet_columns table is the single source of truth for headers and
// column order. Physical schema changes (ALTER issued by the agent)
// are reconciled back into metadata by `sync_columns`; metadata never
// loses data the physical table still holds.

use rusqlite::params;
use serde::{Deserialize, Serialize};

use gridagent_core::ident::{default_header, dedupe_sql_name, quote_ident, sanitize_sql_name};
use gridagent_core::{EngineError, SheetId};

use crate::sql_err;
use crate::store::SheetStore;

/// One tracked column: display header plus sanitized SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub index: usize,
    pub header: String,
    pub sql_name: String,
}

impl SheetStore {
    /// Tracked columns in index order.
    pub fn columns(&self, sheet_id: SheetId) -> Result<Vec<ColumnMeta>, EngineError> {
        let mut stmt = self
            .rw
            .prepare(
                "SELECT column_index, header, sql_name FROM sheet_columns \
                 WHERE sheet_id = ?1 ORDER BY column_index",
            )
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![sheet_id.0], |row| {
                Ok(ColumnMeta {
                    index: row.get::<_, i64>(0)? as usize,
                    header: row.get(1)?,
                    sql_name: row.get(2)?,
                })
            })
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(sql_err)?);
        }
        Ok(out)
    }

    pub fn column_at(&self, sheet_id: SheetId, index: usize) -> Result<ColumnMeta, EngineError> {
        self.columns(sheet_id)?
            .into_iter()
            .find(|c| c.index == index)
            .ok_or_else(|| EngineError::not_found(format!("column {index} does not exist")))
    }

    /// Idempotent growth: add default-named columns until the sheet has
    /// at least `n` of them.
    pub fn ensure_column_count(&self, sheet_id: SheetId, n: usize) -> Result<(), EngineError> {
        self.ensure_table(sheet_id)?;
        let mut existing = self.columns(sheet_id)?;
        while existing.len() < n {
            let index = existing.len();
            let header = default_header(index);
            let taken: Vec<String> = existing.iter().map(|c| c.sql_name.clone()).collect();
            let sql_name = dedupe_sql_name(&sanitize_sql_name(&header), &taken);
            self.rw
                .execute_batch(&format!(
                    "ALTER TABLE \"{}\" ADD COLUMN {} TEXT",
                    sheet_id.table_name(),
                    quote_ident(&sql_name)
                ))
                .map_err(sql_err)?;
            self.rw
                .execute(
                    "INSERT INTO sheet_columns (sheet_id, column_index, header, sql_name) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![sheet_id.0, index as i64, header, sql_name],
                )
                .map_err(sql_err)?;
            existing.push(ColumnMeta { index, header, sql_name });
        }
        Ok(())
    }

    /// Rename a column's header, renaming the physical column in place
    /// so data survives. Renaming to the current identifier skips the
    /// physical ALTER.
    pub fn rename_column(
        &self,
        sheet_id: SheetId,
        index: usize,
        new_header: &str,
    ) -> Result<ColumnMeta, EngineError> {
        let current = self.column_at(sheet_id, index)?;
        let header = if new_header.trim().is_empty() {
            default_header(index)
        } else {
            new_header.trim().to_string()
        };
        let taken: Vec<String> = self
            .columns(sheet_id)?
            .iter()
            .filter(|c| c.index != index)
            .map(|c| c.sql_name.clone())
            .collect();
        let sql_name = dedupe_sql_name(&sanitize_sql_name(&header), &taken);

        if sql_name != current.sql_name {
            self.rw
                .execute_batch(&format!(
                    "ALTER TABLE \"{}\" RENAME COLUMN {} TO {}",
                    sheet_id.table_name(),
                    quote_ident(&current.sql_name),
                    quote_ident(&sql_name)
                ))
                .map_err(sql_err)?;
        }
        self.rw
            .execute(
                "UPDATE sheet_columns SET header = ?1, sql_name = ?2 \
                 WHERE sheet_id = ?3 AND column_index = ?4",
                params![header, sql_name, sheet_id.0, index as i64],
            )
            .map_err(sql_err)?;
        Ok(ColumnMeta { index, header, sql_name })
    }

    /// Drop a column and compact the indices of everything after it.
    /// The metadata rewrite and the physical drop commit together or
    /// not at all. Keeping at least one column is the caller's
    /// responsibility.
    pub fn remove_column(&self, sheet_id: SheetId, index: usize) -> Result<(), EngineError> {
        let col = self.column_at(sheet_id, index)?;
        let tx = self.rw.unchecked_transaction().map_err(sql_err)?;
        tx.execute(
            "DELETE FROM sheet_columns WHERE sheet_id = ?1 AND column_index = ?2",
            params![sheet_id.0, index as i64],
        )
        .map_err(sql_err)?;
        tx.execute(
            "UPDATE sheet_columns SET column_index = column_index - 1 \
             WHERE sheet_id = ?1 AND column_index > ?2",
            params![sheet_id.0, index as i64],
        )
        .map_err(sql_err)?;
        tx.execute_batch(&format!(
            "ALTER TABLE \"{}\" DROP COLUMN {}",
            sheet_id.table_name(),
            quote_ident(&col.sql_name)
        ))
        .map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;
        Ok(())
    }

    /// Reconcile the live schema into metadata after a raw
    /// schema-altering statement. Tracked columns keep their relative
    /// order; untracked physical columns are appended at the end with
    /// their physical name as the header; metadata for vanished columns
    /// is dropped. Indices come out contiguous either way.
    pub fn sync_columns(&self, sheet_id: SheetId) -> Result<Vec<ColumnMeta>, EngineError> {
        let physical = self.physical_columns(sheet_id)?;
        let tracked = self.columns(sheet_id)?;

        let mut next: Vec<(String, String)> = Vec::new(); // (header, sql_name)
        for col in &tracked {
            if physical.iter().any(|p| p == &col.sql_name) {
                next.push((col.header.clone(), col.sql_name.clone()));
            }
        }
        for name in &physical {
            if !next.iter().any(|(_, sql)| sql == name) {
                next.push((name.clone(), name.clone()));
            }
        }

        let tx = self.rw.unchecked_transaction().map_err(sql_err)?;
        tx.execute("DELETE FROM sheet_columns WHERE sheet_id = ?1", params![sheet_id.0])
            .map_err(sql_err)?;
        for (i, (header, sql_name)) in next.iter().enumerate() {
            tx.execute(
                "INSERT INTO sheet_columns (sheet_id, column_index, header, sql_name) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![sheet_id.0, i as i64, header, sql_name],
            )
            .map_err(sql_err)?;
        }
        tx.commit().map_err(sql_err)?;
        self.columns(sheet_id)
    }

    /// Take ownership of a table produced by CREATE TABLE ... AS SELECT.
    /// CTAS output carries no key, so the table is rebuilt around a
    /// real `row_number INTEGER PRIMARY KEY AUTOINCREMENT` (numbering
    /// rows in select order, or keeping a row_number column the SELECT
    /// produced), then the resulting columns are registered. After
    /// adoption the sheet honors the same upsert and no-reuse
    /// guarantees as any other sheet.
    pub fn adopt_table(&self, sheet_id: SheetId) -> Result<Vec<ColumnMeta>, EngineError> {
        let table = sheet_id.table_name();
        if !self.table_exists(&table)? {
            return Err(EngineError::not_found(format!("table {table}")));
        }
        // (name, declared type) pairs; CTAS columns keep their affinity
        let mut stmt = self
            .rw
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
            .map_err(sql_err)?;
        let mut has_row_number = false;
        let mut cols: Vec<(String, String)> = Vec::new();
        for r in rows {
            let (name, decl) = r.map_err(sql_err)?;
            if name == "row_number" {
                has_row_number = true;
            } else {
                cols.push((name, decl));
            }
        }
        drop(stmt);

        let defs: Vec<String> = cols
            .iter()
            .map(|(name, decl)| format!("{} {}", quote_ident(name), decl).trim_end().to_string())
            .collect();
        let names: Vec<String> = cols.iter().map(|(name, _)| quote_ident(name)).collect();
        let name_list = names.join(", ");
        let staging = format!("{table}_ctas");

        let copy = if has_row_number {
            let tail = if name_list.is_empty() {
                String::new()
            } else {
                format!(", {name_list}")
            };
            format!(
                "INSERT INTO \"{table}\" (row_number{tail}) \
                 SELECT row_number{tail} FROM \"{staging}\" ORDER BY row_number"
            )
        } else if name_list.is_empty() {
            format!("INSERT INTO \"{table}\" (row_number) SELECT NULL FROM \"{staging}\"")
        } else {
            format!(
                "INSERT INTO \"{table}\" ({name_list}) \
                 SELECT {name_list} FROM \"{staging}\" ORDER BY rowid"
            )
        };

        let tx = self.rw.unchecked_transaction().map_err(sql_err)?;
        tx.execute_batch(&format!("ALTER TABLE \"{table}\" RENAME TO \"{staging}\""))
            .map_err(sql_err)?;
        tx.execute_batch(&format!(
            "CREATE TABLE \"{table}\" (row_number INTEGER PRIMARY KEY AUTOINCREMENT{}{})",
            if defs.is_empty() { "" } else { ", " },
            defs.join(", ")
        ))
        .map_err(sql_err)?;
        tx.execute_batch(&copy).map_err(sql_err)?;
        tx.execute_batch(&format!("DROP TABLE \"{staging}\"")).map_err(sql_err)?;
        tx.commit().map_err(sql_err)?;

        self.sync_columns(sheet_id)
    }

    /// Physical column names, excluding row_number, in schema order.
    fn physical_columns(&self, sheet_id: SheetId) -> Result<Vec<String>, EngineError> {
        let names = self.raw_physical_columns(&sheet_id.table_name())?;
        Ok(names.into_iter().filter(|n| n != "row_number").collect())
    }

    fn raw_physical_columns(&self, table: &str) -> Result<Vec<String>, EngineError> {
        let mut stmt = self
            .rw
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(sql_err)?);
        }
        Ok(out)
    }
}
