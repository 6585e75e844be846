// Tool dispatch.
//
// Each handler returns Result<(envelope, record)>; `dispatch` converts
// any error into an {ok:false, error} envelope plus an error record, so
// a failure inside a tool never unwinds into the orchestrator.

use serde_json::{json, Value};

use gridagent_core::a1::parse_range;
use gridagent_core::{EngineError, SpreadsheetId, ToolCallKind, ToolCallRecord};
use gridagent_sandbox::{
    parse_create_table_as, validate_condition, validate_mutation, validate_read,
    validate_select_fragment, validate_temp, MutationKind,
};
use gridagent_store::schema::TEMP_TABLE_PREFIX;
use gridagent_store::{FilterStore, SheetInfo, SheetStore};

const DEFAULT_HIGHLIGHT_COLOR: &str = "#ffeb3b";

/// Executes named tool invocations against one spreadsheet.
pub struct Dispatcher<'a> {
    store: &'a SheetStore,
    filters: &'a dyn FilterStore,
    spreadsheet: SpreadsheetId,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        store: &'a SheetStore,
        filters: &'a dyn FilterStore,
        spreadsheet: SpreadsheetId,
    ) -> Self {
        Self {
            store,
            filters,
            spreadsheet,
        }
    }

    /// Execute one tool call. Always returns an envelope and an audit
    /// record; errors are data.
    pub fn dispatch(&self, name: &str, args: &Value) -> (Value, ToolCallRecord) {
        let kind = tool_kind(name);
        match self.try_dispatch(name, args) {
            Ok(pair) => pair,
            Err(e) => {
                let msg = e.to_string();
                let mut record = ToolCallRecord::error(name, kind, &msg);
                if let Some(sheet) = args.get("sheet").and_then(Value::as_str) {
                    record = record.with_sheet(sheet);
                }
                (json!({"ok": false, "error": msg}), record)
            }
        }
    }

    fn try_dispatch(&self, name: &str, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        match name {
            "executeSheetSql" => self.execute_sheet_sql(args),
            "mutateSheetSql" => self.mutate_sheet_sql(args),
            "deleteRows" => self.delete_rows(args),
            "highlights_add" => self.highlights_add(args),
            "highlights_clear" => self.highlights_clear(),
            "filter_add" => self.filter_add(args),
            "filter_clear" => self.filter_clear(args),
            "filters_get" => self.filters_get(args),
            "createSheet" => self.create_sheet(args),
            "executeTempSql" => self.execute_temp_sql(args),
            other => Err(EngineError::validation(format!("unknown tool '{other}'"))),
        }
    }

    // ── SQL tools ───────────────────────────────────────────────────

    fn execute_sheet_sql(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sheet = self.resolve(args)?;
        let sql = arg_str(args, "sql")?;
        let catalog = self.store.catalog(self.spreadsheet)?;
        let bound = validate_read(sql, &sheet.table(), &catalog)?;
        let result = self.store.query_rows(&bound.sql)?;

        let record = ToolCallRecord::ok("executeSheetSql", ToolCallKind::Read)
            .with_sheet(&sheet.name)
            .with_detail(sql)
            .with_summary(&format!(
                "Returned {} row{}{}",
                result.row_count,
                if result.row_count == 1 { "" } else { "s" },
                if result.truncated { " (truncated)" } else { "" }
            ));
        let envelope = json!({
            "ok": true,
            "columns": result.columns,
            "rows": result.rows,
            "rowCount": result.row_count,
            "truncated": result.truncated,
        });
        Ok((envelope, record))
    }

    fn mutate_sheet_sql(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sql = arg_str(args, "sql")?;
        if parse_create_table_as(sql).is_some() {
            return self.create_table_as(sql);
        }
        let sheet = self.resolve(args)?;
        let catalog = self.store.catalog(self.spreadsheet)?;
        let bound = validate_mutation(sql, &sheet.table(), &catalog)?;
        let result = self.store.execute_mutation(&bound.sql)?;
        if bound.kind == MutationKind::AlterAddColumn {
            // reconcile any newly discovered physical columns
            self.store.sync_columns(sheet.id)?;
        }
        self.store.touch(self.spreadsheet)?;

        let record = ToolCallRecord::ok("mutateSheetSql", ToolCallKind::Mutation)
            .with_sheet(&sheet.name)
            .with_detail(sql)
            .with_summary(&format!(
                "{} row{} changed",
                result.changes,
                if result.changes == 1 { "" } else { "s" }
            ));
        let envelope = json!({
            "ok": true,
            "changes": result.changes,
            "lastInsertRowid": result.last_insert_rowid,
        });
        Ok((envelope, record))
    }

    /// CREATE TABLE context.spreadsheet.sheets["Name"] AS SELECT ...
    fn create_table_as(&self, sql: &str) -> Result<(Value, ToolCallRecord), EngineError> {
        let (name, select) = parse_create_table_as(sql)
            .ok_or_else(|| EngineError::validation("malformed CREATE TABLE ... AS SELECT"))?;
        let catalog = self.store.catalog(self.spreadsheet)?;
        let select = validate_select_fragment(&select, &catalog)?;

        let info = self.store.create_sheet_deferred(self.spreadsheet, &name)?;
        let create = format!("CREATE TABLE \"{}\" AS {select}", info.table());
        if let Err(e) = self.store.execute_mutation(&create) {
            self.store.discard_sheet(info.id)?;
            return Err(e);
        }
        let columns = match self.store.adopt_table(info.id) {
            Ok(cols) => cols,
            Err(e) => {
                self.store.discard_sheet(info.id)?;
                return Err(e);
            }
        };
        self.store.touch(self.spreadsheet)?;

        let headers: Vec<String> = columns.iter().map(|c| c.header.clone()).collect();
        let record = ToolCallRecord::ok("mutateSheetSql", ToolCallKind::Mutation)
            .with_sheet(&info.name)
            .with_detail(sql)
            .with_summary(&format!("Created sheet '{}' with {} columns", info.name, headers.len()));
        let envelope = json!({
            "ok": true,
            "createdSheet": info.name,
            "sheetId": info.id,
            "columns": headers,
        });
        Ok((envelope, record))
    }

    fn delete_rows(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sheet = self.resolve(args)?;
        let row_numbers = args.get("rowNumbers").and_then(Value::as_array);
        let condition = args.get("condition").and_then(Value::as_str);

        let (where_clause, detail) = match (row_numbers, condition) {
            (Some(_), Some(_)) => {
                return Err(EngineError::validation(
                    "rowNumbers and condition are mutually exclusive",
                ))
            }
            (None, None) => {
                return Err(EngineError::validation(
                    "deleteRows requires rowNumbers or condition",
                ))
            }
            (Some(nums), None) => {
                let mut parsed: Vec<i64> = Vec::with_capacity(nums.len());
                for n in nums {
                    let n = n
                        .as_i64()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| EngineError::validation("row numbers must be positive integers"))?;
                    parsed.push(n);
                }
                if parsed.is_empty() {
                    return Err(EngineError::validation("rowNumbers must not be empty"));
                }
                let list = parsed
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                (format!("row_number IN ({list})"), format!("rows [{list}]"))
            }
            (None, Some(cond)) => {
                let catalog = self.store.catalog(self.spreadsheet)?;
                let cond = validate_condition(cond, &sheet.table(), &catalog)?;
                (format!("({cond})"), cond)
            }
        };

        let result = self.store.execute_mutation(&format!(
            "DELETE FROM \"{}\" WHERE {where_clause}",
            sheet.table()
        ))?;
        self.store.touch(self.spreadsheet)?;

        let record = ToolCallRecord::ok("deleteRows", ToolCallKind::Mutation)
            .with_sheet(&sheet.name)
            .with_detail(&detail)
            .with_summary(&format!(
                "Deleted {} row{}",
                result.changes,
                if result.changes == 1 { "" } else { "s" }
            ));
        Ok((json!({"ok": true, "deleted": result.changes}), record))
    }

    fn execute_temp_sql(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sql = arg_str(args, "sql")?;
        let catalog = self.store.catalog(self.spreadsheet)?;
        let bound = validate_temp(sql, TEMP_TABLE_PREFIX, &catalog)?;

        let lower = bound.trim_start().to_lowercase();
        let (envelope, summary, kind) = if lower.starts_with("select") || lower.starts_with("with") {
            let result = self.store.query_rows(&bound)?;
            let summary = format!("Returned {} rows", result.row_count);
            (
                json!({
                    "ok": true,
                    "columns": result.columns,
                    "rows": result.rows,
                    "rowCount": result.row_count,
                    "truncated": result.truncated,
                }),
                summary,
                ToolCallKind::Read,
            )
        } else {
            let result = self.store.execute_mutation(&bound)?;
            let summary = format!("{} rows changed", result.changes);
            (
                json!({"ok": true, "changes": result.changes}),
                summary,
                ToolCallKind::Mutation,
            )
        };

        let record = ToolCallRecord::ok("executeTempSql", kind)
            .with_detail(sql)
            .with_summary(&summary);
        Ok((envelope, record))
    }

    // ── Highlights ──────────────────────────────────────────────────

    fn highlights_add(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sheet = self.resolve(args)?;
        let range = args.get("range").and_then(Value::as_str);
        let condition = args.get("condition").and_then(Value::as_str);
        let color = args
            .get("color")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_HIGHLIGHT_COLOR);
        let message = args.get("message").and_then(Value::as_str);

        let (envelope, detail) = match (range, condition) {
            (Some(_), Some(_)) => {
                return Err(EngineError::validation(
                    "range and condition are mutually exclusive",
                ))
            }
            (None, None) => {
                return Err(EngineError::validation(
                    "highlights_add requires range or condition",
                ))
            }
            (Some(text), None) => {
                let parsed = parse_range(text)
                    .ok_or_else(|| EngineError::validation(format!("invalid A1 range '{text}'")))?;
                (
                    json!({
                        "ok": true,
                        "range": text,
                        "rowNumbers": parsed.row_numbers(),
                        "color": color,
                        "message": message,
                    }),
                    text.to_string(),
                )
            }
            (None, Some(cond)) => {
                let catalog = self.store.catalog(self.spreadsheet)?;
                let cond = validate_condition(cond, &sheet.table(), &catalog)?;
                let rows = self.store.rows_matching(sheet.id, &cond)?;
                (
                    json!({
                        "ok": true,
                        "rowNumbers": rows,
                        "color": color,
                        "message": message,
                    }),
                    cond,
                )
            }
        };

        let record = ToolCallRecord::ok("highlights_add", ToolCallKind::View)
            .with_sheet(&sheet.name)
            .with_detail(&detail)
            .with_summary(&format!(
                "Highlighted {} row{}",
                envelope["rowNumbers"].as_array().map(Vec::len).unwrap_or(0),
                if envelope["rowNumbers"].as_array().map(Vec::len) == Some(1) { "" } else { "s" }
            ));
        Ok((envelope, record))
    }

    /// Stateless by design: the client owns the highlight overlay, this
    /// just signals "drop all".
    fn highlights_clear(&self) -> Result<(Value, ToolCallRecord), EngineError> {
        let record = ToolCallRecord::ok("highlights_clear", ToolCallKind::View)
            .with_summary("Cleared highlights");
        Ok((json!({"ok": true, "cleared": true}), record))
    }

    // ── Filters ─────────────────────────────────────────────────────

    fn filter_add(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sheet = self.resolve(args)?;
        let condition = arg_str(args, "condition")?;
        let catalog = self.store.catalog(self.spreadsheet)?;
        let condition = validate_condition(condition, &sheet.table(), &catalog)?;
        // trial query so a malformed condition never corrupts the list
        self.store.check_condition(sheet.id, &condition)?;
        self.filters.add(sheet.id, &condition);

        let active = self.filters.conditions(sheet.id);
        let record = ToolCallRecord::ok("filter_add", ToolCallKind::View)
            .with_sheet(&sheet.name)
            .with_detail(&condition)
            .with_summary(&format!("{} filter(s) active", active.len()));
        Ok((json!({"ok": true, "filters": active}), record))
    }

    fn filter_clear(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sheet = self.resolve(args)?;
        self.filters.clear(sheet.id);
        let record = ToolCallRecord::ok("filter_clear", ToolCallKind::View)
            .with_sheet(&sheet.name)
            .with_summary("Filters cleared");
        Ok((json!({"ok": true, "filters": []}), record))
    }

    fn filters_get(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let sheet = self.resolve(args)?;
        let active = self.filters.conditions(sheet.id);
        let record = ToolCallRecord::ok("filters_get", ToolCallKind::View)
            .with_sheet(&sheet.name)
            .with_summary(&format!("{} filter(s) active", active.len()));
        Ok((json!({"ok": true, "filters": active}), record))
    }

    // ── Sheets ──────────────────────────────────────────────────────

    fn create_sheet(&self, args: &Value) -> Result<(Value, ToolCallRecord), EngineError> {
        let name = arg_str(args, "name")?;
        let headers: Vec<String> = args
            .get("columns")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let info = self.store.create_sheet(self.spreadsheet, name, &headers)?;
        self.store.touch(self.spreadsheet)?;

        let record = ToolCallRecord::ok("createSheet", ToolCallKind::Mutation)
            .with_sheet(&info.name)
            .with_summary(&format!(
                "Created sheet '{}' with {} column(s)",
                info.name,
                headers.len()
            ));
        let envelope = json!({
            "ok": true,
            "sheetId": info.id,
            "name": info.name,
            "columns": headers,
        });
        Ok((envelope, record))
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn resolve(&self, args: &Value) -> Result<SheetInfo, EngineError> {
        let reference = arg_str(args, "sheet")?;
        self.store.resolve_sheet(self.spreadsheet, reference)
    }
}

fn arg_str<'v>(args: &'v Value, key: &str) -> Result<&'v str, EngineError> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::validation(format!("missing required argument '{key}'")))
}

fn tool_kind(name: &str) -> ToolCallKind {
    match name {
        "executeSheetSql" => ToolCallKind::Read,
        "highlights_add" | "highlights_clear" | "filter_add" | "filter_clear" | "filters_get" => {
            ToolCallKind::View
        }
        _ => ToolCallKind::Mutation,
    }
}
