// End-to-end dispatcher behavior over an in-memory workbook.

use serde_json::{json, Value};

use gridagent_core::{SpreadsheetId, ToolCallKind, ToolCallStatus};
use gridagent_store::{MemoryFilterStore, SheetStore};
use gridagent_tools::Dispatcher;

struct Fixture {
    store: SheetStore,
    filters: MemoryFilterStore,
    spreadsheet: SpreadsheetId,
}

impl Fixture {
    fn new() -> Self {
        let store = SheetStore::open_in_memory().unwrap();
        let spreadsheet = store.create_spreadsheet("Book").unwrap();
        let sheet = store
            .create_sheet(spreadsheet, "Sales", &["product".into(), "revenue".into()])
            .unwrap();
        store.set_cell(sheet.id, 1, 0, "Widget").unwrap();
        store.set_cell(sheet.id, 1, 1, "150").unwrap();
        store.set_cell(sheet.id, 2, 0, "Gadget").unwrap();
        store.set_cell(sheet.id, 2, 1, "90").unwrap();
        Self {
            store,
            filters: MemoryFilterStore::new(),
            spreadsheet,
        }
    }

    fn dispatch(&self, name: &str, args: Value) -> Value {
        let d = Dispatcher::new(&self.store, &self.filters, self.spreadsheet);
        let (envelope, _) = d.dispatch(name, &args);
        envelope
    }
}

#[test]
fn execute_sheet_sql_happy_path() {
    let f = Fixture::new();
    let out = f.dispatch(
        "executeSheetSql",
        json!({
            "sheet": "Sales",
            "sql": r#"SELECT "revenue" FROM context.spreadsheet.sheets["Sales"] WHERE "product" = 'Widget'"#
        }),
    );
    assert_eq!(out["ok"], true);
    assert_eq!(out["rowCount"], 1);
    assert_eq!(out["truncated"], false);
    assert_eq!(out["rows"][0]["revenue"], "150");
}

#[test]
fn execute_sheet_sql_causes_no_side_effect() {
    let f = Fixture::new();
    f.dispatch(
        "executeSheetSql",
        json!({"sheet": "Sales", "sql": "SELECT * FROM context.spreadsheet.sheets[\"Sales\"]"}),
    );
    let out = f.dispatch(
        "executeSheetSql",
        json!({"sheet": "Sales", "sql": "SELECT COUNT(*) AS n FROM context.spreadsheet.sheets[\"Sales\"]"}),
    );
    assert_eq!(out["rows"][0]["n"], 2);
}

#[test]
fn delete_statement_is_rejected_as_mutation() {
    let f = Fixture::new();
    let out = f.dispatch(
        "mutateSheetSql",
        json!({"sheet": "Sales", "sql": "DELETE FROM context.spreadsheet.sheets[\"Sales\"]"}),
    );
    assert_eq!(out["ok"], false);
    assert!(out["error"].as_str().unwrap().contains("not allowed"));
}

#[test]
fn mutate_insert_and_update() {
    let f = Fixture::new();
    let out = f.dispatch(
        "mutateSheetSql",
        json!({
            "sheet": "Sales",
            "sql": r#"INSERT INTO context.spreadsheet.sheets["Sales"] ("product", "revenue") VALUES ('Sprocket', '55')"#
        }),
    );
    assert_eq!(out["ok"], true);
    assert_eq!(out["changes"], 1);
    assert_eq!(out["lastInsertRowid"], 3);

    let out = f.dispatch(
        "mutateSheetSql",
        json!({
            "sheet": "Sales",
            "sql": r#"UPDATE context.spreadsheet.sheets["Sales"] SET "revenue" = '60' WHERE "product" = 'Sprocket'"#
        }),
    );
    assert_eq!(out["changes"], 1);
}

#[test]
fn alter_add_column_syncs_metadata() {
    let f = Fixture::new();
    let out = f.dispatch(
        "mutateSheetSql",
        json!({
            "sheet": "Sales",
            "sql": r#"ALTER TABLE context.spreadsheet.sheets["Sales"] ADD COLUMN margin REAL"#
        }),
    );
    assert_eq!(out["ok"], true);

    let sheet = f.store.resolve_sheet(f.spreadsheet, "Sales").unwrap();
    let cols = f.store.columns(sheet.id).unwrap();
    assert_eq!(cols.len(), 3);
    assert_eq!(cols[2].sql_name, "margin");
}

#[test]
fn create_table_as_select_derives_a_sheet() {
    let f = Fixture::new();
    let out = f.dispatch(
        "mutateSheetSql",
        json!({
            "sheet": "Sales",
            "sql": r#"CREATE TABLE context.spreadsheet.sheets["Top"] AS SELECT "product" FROM context.spreadsheet.sheets["Sales"] WHERE CAST("revenue" AS REAL) > 100"#
        }),
    );
    assert_eq!(out["ok"], true, "{out}");
    assert_eq!(out["createdSheet"], "Top");

    let derived = f.store.resolve_sheet(f.spreadsheet, "Top").unwrap();
    let rows = f
        .store
        .query_rows(&format!("SELECT * FROM \"{}\"", derived.table()))
        .unwrap();
    assert_eq!(rows.row_count, 1);
    assert_eq!(rows.rows[0]["product"], "Widget");
    // row_number back-filled even though the SELECT didn't produce one
    assert!(rows.columns.iter().any(|c| c.as_str() == "row_number"));
}

#[test]
fn create_table_as_duplicate_name_fails_cleanly() {
    let f = Fixture::new();
    let out = f.dispatch(
        "mutateSheetSql",
        json!({
            "sheet": "Sales",
            "sql": r#"CREATE TABLE context.spreadsheet.sheets["Sales"] AS SELECT 1 AS x"#
        }),
    );
    assert_eq!(out["ok"], false);
    assert!(out["error"].as_str().unwrap().contains("already exists"));
}

#[test]
fn delete_rows_by_numbers_and_condition() {
    let f = Fixture::new();
    let out = f.dispatch("deleteRows", json!({"sheet": "Sales", "rowNumbers": [2]}));
    assert_eq!(out["ok"], true);
    assert_eq!(out["deleted"], 1);

    let out = f.dispatch(
        "deleteRows",
        json!({"sheet": "Sales", "condition": "\"product\" = 'Widget'"}),
    );
    assert_eq!(out["deleted"], 1);

    // both forms at once is an argument error
    let out = f.dispatch(
        "deleteRows",
        json!({"sheet": "Sales", "rowNumbers": [1], "condition": "1=1"}),
    );
    assert_eq!(out["ok"], false);
    assert!(out["error"].as_str().unwrap().contains("mutually exclusive"));
}

#[test]
fn delete_rows_condition_cannot_reach_other_sheets() {
    let f = Fixture::new();
    f.dispatch("createSheet", json!({"name": "Other", "columns": ["x"]}));
    let other = f.store.resolve_sheet(f.spreadsheet, "Other").unwrap();
    let out = f.dispatch(
        "deleteRows",
        json!({
            "sheet": "Sales",
            "condition": format!("\"product\" IN (SELECT x FROM {})", other.table())
        }),
    );
    assert_eq!(out["ok"], false);
    assert_eq!(out["error"], "queries may target only one sheet");
}

#[test]
fn highlights_by_condition_resolves_rows() {
    let f = Fixture::new();
    let out = f.dispatch(
        "highlights_add",
        json!({"sheet": "Sales", "condition": "CAST(\"revenue\" AS REAL) > 100"}),
    );
    assert_eq!(out["ok"], true);
    assert_eq!(out["rowNumbers"], json!([1]));
    assert_eq!(out["color"], "#ffeb3b");
}

#[test]
fn highlights_by_range_and_clear() {
    let f = Fixture::new();
    let out = f.dispatch(
        "highlights_add",
        json!({"sheet": "Sales", "range": "A1:B2", "color": "red", "message": "check these"}),
    );
    assert_eq!(out["ok"], true);
    assert_eq!(out["range"], "A1:B2");
    assert_eq!(out["rowNumbers"], json!([1, 2]));
    assert_eq!(out["message"], "check these");

    let out = f.dispatch("highlights_clear", json!({}));
    assert_eq!(out["cleared"], true);

    // neither range nor condition
    let out = f.dispatch("highlights_add", json!({"sheet": "Sales"}));
    assert_eq!(out["ok"], false);
}

#[test]
fn filters_narrow_and_restore() {
    let f = Fixture::new();
    let sheet = f.store.resolve_sheet(f.spreadsheet, "Sales").unwrap();

    let out = f.dispatch(
        "filter_add",
        json!({"sheet": "Sales", "condition": "CAST(\"revenue\" AS REAL) > 50"}),
    );
    assert_eq!(out["ok"], true);
    let out = f.dispatch(
        "filter_add",
        json!({"sheet": "Sales", "condition": "\"product\" = 'Widget'"}),
    );
    assert_eq!(out["filters"].as_array().unwrap().len(), 2);

    let visible = f.store.load_visible_rows(sheet.id, &f.filters).unwrap();
    assert_eq!(visible.rows.len(), 1);
    assert_eq!(visible.rows[0]["product"], "Widget");

    let out = f.dispatch("filter_clear", json!({"sheet": "Sales"}));
    assert_eq!(out["filters"], json!([]));
    assert_eq!(
        f.store.load_visible_rows(sheet.id, &f.filters).unwrap().rows.len(),
        2
    );
}

#[test]
fn malformed_filter_condition_never_corrupts_the_list() {
    let f = Fixture::new();
    let out = f.dispatch(
        "filter_add",
        json!({"sheet": "Sales", "condition": "this is (( not sql"}),
    );
    assert_eq!(out["ok"], false);

    let out = f.dispatch("filters_get", json!({"sheet": "Sales"}));
    assert_eq!(out["filters"], json!([]));
}

#[test]
fn create_sheet_with_columns() {
    let f = Fixture::new();
    let out = f.dispatch(
        "createSheet",
        json!({"name": "Costs", "columns": ["item", "amount"]}),
    );
    assert_eq!(out["ok"], true);

    let sheet = f.store.resolve_sheet(f.spreadsheet, "Costs").unwrap();
    let cols = f.store.columns(sheet.id).unwrap();
    assert_eq!(cols.len(), 2);
    assert_eq!(cols[0].header, "item");
    assert_eq!(cols[1].sql_name, "amount");
}

#[test]
fn temp_sql_stages_and_reads_back() {
    let f = Fixture::new();
    let out = f.dispatch(
        "executeTempSql",
        json!({"sql": r#"CREATE TABLE tmp_stage AS SELECT "product" FROM context.spreadsheet.sheets["Sales"]"#}),
    );
    assert_eq!(out["ok"], true, "{out}");

    let out = f.dispatch(
        "executeTempSql",
        json!({"sql": "SELECT COUNT(*) AS n FROM tmp_stage"}),
    );
    assert_eq!(out["rows"][0]["n"], 2);

    let out = f.dispatch(
        "executeTempSql",
        json!({"sql": "CREATE TABLE plain AS SELECT 1"}),
    );
    assert_eq!(out["ok"], false);
}

#[test]
fn temp_sql_cannot_reach_sheet_rows_through_a_schema_prefix() {
    let f = Fixture::new();
    let sheet = f.store.resolve_sheet(f.spreadsheet, "Sales").unwrap();
    let out = f.dispatch(
        "executeTempSql",
        json!({"sql": format!("DELETE FROM main.{}", sheet.table())}),
    );
    assert_eq!(out["ok"], false);
    assert_eq!(f.store.row_count(sheet.id).unwrap(), 2);

    let out = f.dispatch(
        "executeTempSql",
        json!({"sql": format!("UPDATE main.\"{}\" SET product = 'x'", sheet.table())}),
    );
    assert_eq!(out["ok"], false);
}

#[test]
fn temp_sql_read_is_audited_as_a_read() {
    let f = Fixture::new();
    let d = Dispatcher::new(&f.store, &f.filters, f.spreadsheet);
    let (_, record) = d.dispatch(
        "executeTempSql",
        &json!({"sql": "SELECT 1 AS one"}),
    );
    assert_eq!(record.status, ToolCallStatus::Ok);
    assert_eq!(record.kind, ToolCallKind::Read);

    let (_, record) = d.dispatch(
        "executeTempSql",
        &json!({"sql": "CREATE TABLE tmp_k AS SELECT 1 AS one"}),
    );
    assert_eq!(record.kind, ToolCallKind::Mutation);
}

#[test]
fn unknown_tool_is_a_data_error() {
    let f = Fixture::new();
    let out = f.dispatch("summonDemon", json!({}));
    assert_eq!(out["ok"], false);
    assert!(out["error"].as_str().unwrap().contains("unknown tool"));
}

#[test]
fn records_carry_audit_detail() {
    let f = Fixture::new();
    let d = Dispatcher::new(&f.store, &f.filters, f.spreadsheet);
    let (_, record) = d.dispatch(
        "executeSheetSql",
        &json!({"sheet": "Sales", "sql": "SELECT * FROM context.spreadsheet.sheets[\"Sales\"]"}),
    );
    assert_eq!(record.status, ToolCallStatus::Ok);
    assert_eq!(record.sheet.as_deref(), Some("Sales"));
    assert_eq!(record.summary.as_deref(), Some("Returned 2 rows"));

    let (_, record) = d.dispatch("executeSheetSql", &json!({"sheet": "Nope", "sql": "SELECT 1"}));
    assert_eq!(record.status, ToolCallStatus::Error);
    assert!(record.error.as_deref().unwrap().contains("not found"));
}
