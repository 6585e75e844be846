// Metadata schema. Physical sheet tables are created separately by
// `SheetStore::ensure_table` because their column set is dynamic.

/// Idempotent metadata schema, applied on every open.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS spreadsheets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sheets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    spreadsheet_id INTEGER NOT NULL REFERENCES spreadsheets(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sheet_columns (
    sheet_id INTEGER NOT NULL REFERENCES sheets(id) ON DELETE CASCADE,
    column_index INTEGER NOT NULL,
    header TEXT NOT NULL,
    sql_name TEXT NOT NULL,
    PRIMARY KEY (sheet_id, column_index)
);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    spreadsheet_id INTEGER NOT NULL REFERENCES spreadsheets(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    context_range TEXT,
    tool_calls TEXT,
    created_at TEXT NOT NULL
);
"#;

/// Row-count cap for agent read queries (hard limit).
pub const HARD_ROW_LIMIT: usize = 2000;

/// Rows actually materialized back into the model's context.
pub const PREVIEW_ROW_LIMIT: usize = 100;

/// Prefix required on tables created through `executeTempSql`.
pub const TEMP_TABLE_PREFIX: &str = "tmp_";
