// Workbook store: connections, spreadsheet/sheet lifecycle, resolution.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use gridagent_core::ident::slugify;
use gridagent_core::{EngineError, SheetCatalog, SheetId, SpreadsheetId};

use crate::schema::SCHEMA;
use crate::sql_err;

/// One open workbook file.
///
/// Holds the sole read-write connection plus a read-only connection for
/// agent queries and condition validation, so query traffic can never
/// mutate state even if a sandbox rule were imperfect.
pub struct SheetStore {
    pub(crate) rw: Connection,
    pub(crate) ro: Connection,
}

/// Sheet metadata row.
#[derive(Debug, Clone)]
pub struct SheetInfo {
    pub id: SheetId,
    pub spreadsheet_id: SpreadsheetId,
    pub name: String,
}

impl SheetInfo {
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    pub fn table(&self) -> String {
        self.id.table_name()
    }
}

static MEM_DB_SEQ: AtomicU64 = AtomicU64::new(0);

impl SheetStore {
    /// Open (or create) a workbook file.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let rw = Connection::open(path).map_err(sql_err)?;
        Self::init_rw(&rw)?;
        let ro = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(sql_err)?;
        Ok(Self { rw, ro })
    }

    /// Open a throwaway in-memory workbook (shared-cache, so the
    /// read-only connection sees the same data).
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let n = MEM_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:gridagent_mem_{n}?mode=memory&cache=shared");
        let rw = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(sql_err)?;
        Self::init_rw(&rw)?;
        let ro = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(sql_err)?;
        Ok(Self { rw, ro })
    }

    fn init_rw(conn: &Connection) -> Result<(), EngineError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(sql_err)?;
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(())
    }

    // ── Spreadsheets ────────────────────────────────────────────────

    pub fn create_spreadsheet(&self, name: &str) -> Result<SpreadsheetId, EngineError> {
        let now = Utc::now().to_rfc3339();
        self.rw
            .execute(
                "INSERT INTO spreadsheets (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![name, now],
            )
            .map_err(sql_err)?;
        Ok(SpreadsheetId(self.rw.last_insert_rowid()))
    }

    /// Delete a spreadsheet, its sheets, their physical tables, and the
    /// chat transcript.
    pub fn delete_spreadsheet(&self, id: SpreadsheetId) -> Result<(), EngineError> {
        for sheet in self.list_sheets(id)? {
            self.rw
                .execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", sheet.table()))
                .map_err(sql_err)?;
        }
        let n = self
            .rw
            .execute("DELETE FROM spreadsheets WHERE id = ?1", params![id.0])
            .map_err(sql_err)?;
        if n == 0 {
            return Err(EngineError::not_found(format!("spreadsheet {id}")));
        }
        Ok(())
    }

    /// The lowest-id spreadsheet in the workbook, if any. Single-file
    /// workbooks keep exactly one.
    pub fn first_spreadsheet(&self) -> Result<Option<SpreadsheetId>, EngineError> {
        self.rw
            .query_row("SELECT id FROM spreadsheets ORDER BY id LIMIT 1", [], |row| {
                row.get::<_, i64>(0)
            })
            .optional()
            .map_err(sql_err)
            .map(|id| id.map(SpreadsheetId))
    }

    pub fn spreadsheet_name(&self, id: SpreadsheetId) -> Result<String, EngineError> {
        self.rw
            .query_row(
                "SELECT name FROM spreadsheets WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .map_err(|_| EngineError::not_found(format!("spreadsheet {id}")))
    }

    /// Bump a spreadsheet's updated_at. Called after any sheet mutation.
    pub fn touch(&self, id: SpreadsheetId) -> Result<(), EngineError> {
        self.rw
            .execute(
                "UPDATE spreadsheets SET updated_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id.0],
            )
            .map_err(sql_err)?;
        Ok(())
    }

    // ── Sheets ──────────────────────────────────────────────────────

    /// Create a sheet, ensure its physical table, and optionally
    /// pre-populate columns from a header list.
    pub fn create_sheet(
        &self,
        spreadsheet_id: SpreadsheetId,
        name: &str,
        headers: &[String],
    ) -> Result<SheetInfo, EngineError> {
        let info = self.create_sheet_deferred(spreadsheet_id, name)?;
        self.ensure_table(info.id)?;
        for (i, header) in headers.iter().enumerate() {
            self.ensure_column_count(info.id, i + 1)?;
            self.rename_column(info.id, i, header)?;
        }
        Ok(info)
    }

    /// Insert sheet metadata without creating the physical table.
    /// Used by CREATE TABLE ... AS SELECT, which builds the table itself.
    pub fn create_sheet_deferred(
        &self,
        spreadsheet_id: SpreadsheetId,
        name: &str,
    ) -> Result<SheetInfo, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("sheet name must not be empty"));
        }
        // Name unique within the spreadsheet, case-insensitive
        let clash: Option<i64> = self
            .rw
            .query_row(
                "SELECT id FROM sheets WHERE spreadsheet_id = ?1 AND lower(name) = lower(?2)",
                params![spreadsheet_id.0, name],
                |row| row.get(0),
            )
            .ok();
        if clash.is_some() {
            return Err(EngineError::validation(format!(
                "a sheet named '{name}' already exists"
            )));
        }
        let now = Utc::now().to_rfc3339();
        self.rw
            .execute(
                "INSERT INTO sheets (spreadsheet_id, name, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?3)",
                params![spreadsheet_id.0, name, now],
            )
            .map_err(sql_err)?;
        Ok(SheetInfo {
            id: SheetId(self.rw.last_insert_rowid()),
            spreadsheet_id,
            name: name.to_string(),
        })
    }

    /// Delete a sheet and its physical table. Refuses to remove the
    /// last sheet of a spreadsheet.
    pub fn delete_sheet(&self, id: SheetId) -> Result<(), EngineError> {
        let info = self.sheet_info(id)?;
        let siblings: i64 = self
            .rw
            .query_row(
                "SELECT COUNT(*) FROM sheets WHERE spreadsheet_id = ?1",
                params![info.spreadsheet_id.0],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        if siblings <= 1 {
            return Err(EngineError::validation(
                "cannot delete the last sheet of a spreadsheet",
            ));
        }
        self.rw
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", info.table()))
            .map_err(sql_err)?;
        self.rw
            .execute("DELETE FROM sheets WHERE id = ?1", params![id.0])
            .map_err(sql_err)?;
        Ok(())
    }

    /// Remove a sheet's metadata and table without the last-sheet
    /// guard. Cleanup path for a failed CREATE TABLE ... AS SELECT,
    /// where the metadata row exists but the table may not.
    pub fn discard_sheet(&self, id: SheetId) -> Result<(), EngineError> {
        self.rw
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", id.table_name()))
            .map_err(sql_err)?;
        self.rw
            .execute("DELETE FROM sheets WHERE id = ?1", params![id.0])
            .map_err(sql_err)?;
        Ok(())
    }

    pub fn sheet_info(&self, id: SheetId) -> Result<SheetInfo, EngineError> {
        self.rw
            .query_row(
                "SELECT id, spreadsheet_id, name FROM sheets WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(SheetInfo {
                        id: SheetId(row.get(0)?),
                        spreadsheet_id: SpreadsheetId(row.get(1)?),
                        name: row.get(2)?,
                    })
                },
            )
            .map_err(|_| EngineError::not_found(format!("sheet {id}")))
    }

    pub fn list_sheets(&self, spreadsheet_id: SpreadsheetId) -> Result<Vec<SheetInfo>, EngineError> {
        let mut stmt = self
            .rw
            .prepare("SELECT id, spreadsheet_id, name FROM sheets WHERE spreadsheet_id = ?1 ORDER BY id")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map(params![spreadsheet_id.0], |row| {
                Ok(SheetInfo {
                    id: SheetId(row.get(0)?),
                    spreadsheet_id: SpreadsheetId(row.get(1)?),
                    name: row.get(2)?,
                })
            })
            .map_err(sql_err)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r.map_err(sql_err)?);
        }
        Ok(out)
    }

    /// Resolve `<name|slug|id>` within one spreadsheet: numeric id
    /// first, then case-insensitive name, then slug.
    pub fn resolve_sheet(
        &self,
        spreadsheet_id: SpreadsheetId,
        reference: &str,
    ) -> Result<SheetInfo, EngineError> {
        let reference = reference.trim();
        let sheets = self.list_sheets(spreadsheet_id)?;
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(s) = sheets.iter().find(|s| s.id.0 == id) {
                return Ok(s.clone());
            }
        }
        if let Some(s) = sheets.iter().find(|s| s.name.eq_ignore_ascii_case(reference)) {
            return Ok(s.clone());
        }
        if let Some(s) = sheets.iter().find(|s| s.slug() == reference) {
            return Ok(s.clone());
        }
        Err(EngineError::not_found(format!("sheet '{reference}'")))
    }

    // ── Physical tables ─────────────────────────────────────────────

    /// Idempotent: create the physical table with its `row_number`
    /// primary key if absent. AUTOINCREMENT keeps deleted row numbers
    /// from being reused by later inserts.
    pub fn ensure_table(&self, sheet_id: SheetId) -> Result<(), EngineError> {
        self.rw
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (row_number INTEGER PRIMARY KEY AUTOINCREMENT)",
                sheet_id.table_name()
            ))
            .map_err(sql_err)?;
        Ok(())
    }

    pub(crate) fn table_exists(&self, table: &str) -> Result<bool, EngineError> {
        let n: i64 = self
            .rw
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        Ok(n > 0)
    }

    pub fn row_count(&self, sheet_id: SheetId) -> Result<i64, EngineError> {
        self.ensure_table(sheet_id)?;
        self.rw
            .query_row(
                &format!("SELECT COUNT(*) FROM \"{}\"", sheet_id.table_name()),
                [],
                |row| row.get(0),
            )
            .map_err(sql_err)
    }

    // ── Catalog snapshot for the sandbox ────────────────────────────

    /// Snapshot of sheet names/tables for the SQL sandbox. Resolution
    /// is scoped to one spreadsheet; table recognition spans the whole
    /// file so cross-spreadsheet references are also rejected.
    pub fn catalog(&self, spreadsheet_id: SpreadsheetId) -> Result<StoreCatalog, EngineError> {
        let mut stmt = self
            .rw
            .prepare("SELECT id, spreadsheet_id, name FROM sheets ORDER BY id")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SheetInfo {
                    id: SheetId(row.get(0)?),
                    spreadsheet_id: SpreadsheetId(row.get(1)?),
                    name: row.get(2)?,
                })
            })
            .map_err(sql_err)?;
        let mut sheets = Vec::new();
        for r in rows {
            sheets.push(r.map_err(sql_err)?);
        }
        Ok(StoreCatalog {
            scope: spreadsheet_id,
            sheets,
        })
    }

    /// Textual summary of a spreadsheet's sheets and columns, fed to
    /// the model as context at the start of a turn.
    pub fn sheet_summary(&self, spreadsheet_id: SpreadsheetId) -> Result<String, EngineError> {
        let mut out = String::new();
        for sheet in self.list_sheets(spreadsheet_id)? {
            self.ensure_table(sheet.id)?;
            let rows = self.row_count(sheet.id)?;
            out.push_str(&format!(
                "Sheet \"{}\" — reference it as context.spreadsheet.sheets[\"{}\"] ({} rows)\n",
                sheet.name, sheet.name, rows
            ));
            for col in self.columns(sheet.id)? {
                out.push_str(&format!(
                    "  column {}: \"{}\" (SQL name: {})\n",
                    col.index + 1,
                    col.header,
                    col.sql_name
                ));
            }
        }
        Ok(out)
    }
}

/// Owned catalog snapshot implementing the sandbox resolution trait.
#[derive(Debug, Clone)]
pub struct StoreCatalog {
    scope: SpreadsheetId,
    sheets: Vec<SheetInfo>,
}

impl SheetCatalog for StoreCatalog {
    fn resolve_table(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        let scoped: Vec<&SheetInfo> = self
            .sheets
            .iter()
            .filter(|s| s.spreadsheet_id == self.scope)
            .collect();
        if let Ok(id) = reference.parse::<i64>() {
            if let Some(s) = scoped.iter().find(|s| s.id.0 == id) {
                return Some(s.table());
            }
        }
        if let Some(s) = scoped.iter().find(|s| s.name.eq_ignore_ascii_case(reference)) {
            return Some(s.table());
        }
        scoped.iter().find(|s| s.slug() == reference).map(|s| s.table())
    }

    fn is_sheet_table(&self, table: &str) -> bool {
        self.sheets.iter().any(|s| s.table() == table)
    }
}
