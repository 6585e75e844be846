// gridagent CLI - headless workbook and chat operations

mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use gridagent_chat::{backend_from_settings, keys, Orchestrator, Provider, Settings};
use gridagent_core::{EngineError, SpreadsheetId, ToolCallStatus};
use gridagent_store::{MemoryFilterStore, SheetStore};

use exit_codes::{
    EXIT_AI_DISABLED, EXIT_AI_KEYCHAIN_ERR, EXIT_AI_MISSING_KEY, EXIT_ERROR, EXIT_SUCCESS,
    EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "gridagent")]
#[command(about = "Spreadsheet workbook with an AI agent over constrained SQL")]
#[command(version)]
struct Cli {
    /// Workbook database file
    #[arg(long, global = true, env = "GRIDAGENT_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new workbook with one spreadsheet and one sheet
    Init {
        /// Spreadsheet name
        #[arg(default_value = "Workbook")]
        name: String,

        /// Initial sheet name
        #[arg(long, default_value = "Sheet1")]
        sheet: String,
    },

    /// Sheet management
    Sheet {
        #[command(subcommand)]
        command: SheetCommands,
    },

    /// Write one cell (1-based row, 1-based column)
    Set {
        /// Sheet name, slug, or id
        sheet: String,
        row: i64,
        col: usize,
        value: String,
    },

    /// Print a sheet's rows
    Show {
        /// Sheet name, slug, or id
        sheet: String,

        /// Emit JSON instead of a text table
        #[arg(long)]
        json: bool,
    },

    /// Run a sandboxed read query against one sheet, JSON to stdout
    #[command(after_help = "\
Examples:
  gridagent sql Sales 'SELECT * FROM context.spreadsheet.sheets[\"Sales\"] WHERE \"revenue\" > 100'
  gridagent sql Sales 'SELECT COUNT(*) AS n FROM context.spreadsheet.sheets[\"Sales\"]'")]
    Sql {
        /// Sheet name, slug, or id
        sheet: String,
        /// A single SELECT or WITH statement
        query: String,
    },

    /// Ask the AI agent one question about the workbook
    Chat {
        /// The question; omit with --clear
        message: Option<String>,

        /// A1 range the question refers to
        #[arg(long)]
        range: Option<String>,

        /// Wipe the conversation instead of asking
        #[arg(long)]
        clear: bool,
    },

    /// AI provider configuration
    Ai {
        #[command(subcommand)]
        command: AiCommands,
    },
}

#[derive(Subcommand)]
enum SheetCommands {
    /// Add a sheet with the given column headers
    Add {
        name: String,
        /// Column headers, in order
        columns: Vec<String>,
    },
    /// List sheets with row counts
    List,
}

#[derive(Subcommand)]
enum AiCommands {
    /// Report provider, model, and key status
    Doctor,
    /// Store an API key in the system keychain
    SetKey { provider: String, key: String },
    /// Remove an API key from the system keychain
    DeleteKey { provider: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let db = cli.db.clone();

    let result = match cli.command {
        Commands::Init { name, sheet } => cmd_init(db, &name, &sheet),
        Commands::Sheet { command } => match command {
            SheetCommands::Add { name, columns } => cmd_sheet_add(db, &name, columns),
            SheetCommands::List => cmd_sheet_list(db),
        },
        Commands::Set {
            sheet,
            row,
            col,
            value,
        } => cmd_set(db, &sheet, row, col, &value),
        Commands::Show { sheet, json } => cmd_show(db, &sheet, json),
        Commands::Sql { sheet, query } => cmd_sql(db, &sheet, &query),
        Commands::Chat {
            message,
            range,
            clear,
        } => cmd_chat(db, message.as_deref(), range.as_deref(), clear),
        Commands::Ai { command } => match command {
            AiCommands::Doctor => cmd_ai_doctor(),
            AiCommands::SetKey { provider, key } => cmd_ai_set_key(&provider, &key),
            AiCommands::DeleteKey { provider } => cmd_ai_delete_key(&provider),
        },
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError {
            code,
            message,
            hint,
        }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
struct CliError {
    code: u8,
    message: String,
    hint: Option<String>,
}

impl CliError {
    fn usage(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_USAGE,
            message: msg.into(),
            hint: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            code: EXIT_ERROR,
            message: msg.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<EngineError> for CliError {
    fn from(e: EngineError) -> Self {
        CliError::error(e.to_string())
    }
}

fn db_path(db: Option<PathBuf>) -> PathBuf {
    if let Some(path) = db {
        return path;
    }
    if let Some(path) = Settings::load().database {
        return PathBuf::from(path);
    }
    PathBuf::from("gridagent.db")
}

fn open_store(db: Option<PathBuf>) -> Result<SheetStore, CliError> {
    let path = db_path(db);
    if !path.exists() {
        return Err(
            CliError::usage(format!("workbook not found: {}", path.display()))
                .with_hint("run `gridagent init` first, or pass --db"),
        );
    }
    Ok(SheetStore::open(&path)?)
}

fn workbook(store: &SheetStore) -> Result<SpreadsheetId, CliError> {
    store
        .first_spreadsheet()?
        .ok_or_else(|| CliError::error("workbook has no spreadsheet").with_hint("run `gridagent init`"))
}

// ── Commands ────────────────────────────────────────────────────────

fn cmd_init(db: Option<PathBuf>, name: &str, sheet: &str) -> Result<(), CliError> {
    let path = db_path(db);
    if path.exists() {
        return Err(CliError::usage(format!(
            "workbook already exists: {}",
            path.display()
        )));
    }
    let store = SheetStore::open(&path)?;
    let spreadsheet = store.create_spreadsheet(name)?;
    let info = store.create_sheet(spreadsheet, sheet, &[])?;
    println!(
        "Created {} with spreadsheet \"{}\" and sheet \"{}\"",
        path.display(),
        name,
        info.name
    );
    Ok(())
}

fn cmd_sheet_add(db: Option<PathBuf>, name: &str, columns: Vec<String>) -> Result<(), CliError> {
    let store = open_store(db)?;
    let spreadsheet = workbook(&store)?;
    let info = store.create_sheet(spreadsheet, name, &columns)?;
    println!("Added sheet \"{}\" (id {})", info.name, info.id);
    Ok(())
}

fn cmd_sheet_list(db: Option<PathBuf>) -> Result<(), CliError> {
    let store = open_store(db)?;
    let spreadsheet = workbook(&store)?;
    for sheet in store.list_sheets(spreadsheet)? {
        store.ensure_table(sheet.id)?;
        let rows = store.row_count(sheet.id)?;
        let cols = store.columns(sheet.id)?.len();
        println!(
            "{:>4}  {}  ({} rows, {} columns)",
            sheet.id.0, sheet.name, rows, cols
        );
    }
    Ok(())
}

fn cmd_set(
    db: Option<PathBuf>,
    sheet: &str,
    row: i64,
    col: usize,
    value: &str,
) -> Result<(), CliError> {
    if col == 0 {
        return Err(CliError::usage("columns are numbered from 1"));
    }
    let store = open_store(db)?;
    let spreadsheet = workbook(&store)?;
    let info = store.resolve_sheet(spreadsheet, sheet)?;
    store.set_cell(info.id, row, col - 1, value)?;
    store.touch(spreadsheet)?;
    Ok(())
}

fn cmd_show(db: Option<PathBuf>, sheet: &str, as_json: bool) -> Result<(), CliError> {
    let store = open_store(db)?;
    let spreadsheet = workbook(&store)?;
    let info = store.resolve_sheet(spreadsheet, sheet)?;
    // No filters persist across CLI invocations.
    let filters = MemoryFilterStore::new();
    let visible = store.load_visible_rows(info.id, &filters)?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "sheet": info.name,
                "columns": visible.columns,
                "rows": visible.rows,
            }))
            .map_err(|e| CliError::error(e.to_string()))?
        );
        return Ok(());
    }

    let mut header = String::from("row");
    for c in &visible.columns {
        header.push('\t');
        header.push_str(&c.header);
    }
    println!("{}", header);
    for row in &visible.rows {
        let mut line = row
            .get("row_number")
            .map(|v| v.to_string())
            .unwrap_or_default();
        for c in &visible.columns {
            line.push('\t');
            match row.get(&c.sql_name) {
                Some(serde_json::Value::String(s)) => line.push_str(s),
                Some(serde_json::Value::Null) | None => {}
                Some(other) => line.push_str(&other.to_string()),
            }
        }
        println!("{}", line);
    }
    Ok(())
}

fn cmd_sql(db: Option<PathBuf>, sheet: &str, query: &str) -> Result<(), CliError> {
    let store = open_store(db)?;
    let spreadsheet = workbook(&store)?;
    let info = store.resolve_sheet(spreadsheet, sheet)?;
    let catalog = store.catalog(spreadsheet)?;
    let bound = gridagent_sandbox::validate_read(query, &info.table(), &catalog)?;
    let result = store.query_rows(&bound.sql)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&result).map_err(|e| CliError::error(e.to_string()))?
    );
    Ok(())
}

fn cmd_chat(
    db: Option<PathBuf>,
    message: Option<&str>,
    range: Option<&str>,
    clear: bool,
) -> Result<(), CliError> {
    let store = open_store(db)?;
    let spreadsheet = workbook(&store)?;

    if clear {
        let n = store.clear_conversation(spreadsheet)?;
        println!("Cleared {} message{}", n, if n == 1 { "" } else { "s" });
        return Ok(());
    }

    let message = message.ok_or_else(|| CliError::usage("a message is required (or --clear)"))?;

    let settings = Settings::load();
    if !settings.provider.is_enabled() {
        return Err(CliError {
            code: EXIT_AI_DISABLED,
            message: "AI is disabled".to_string(),
            hint: Some(format!(
                "set provider in {}",
                Settings::config_path().display()
            )),
        });
    }
    if keys::lookup(settings.provider).is_none() {
        return Err(CliError {
            code: EXIT_AI_MISSING_KEY,
            message: format!("no API key for {}", settings.provider.name()),
            hint: Some(format!(
                "set {} or store a key with `gridagent ai set-key {}`",
                keys::env_var(settings.provider),
                settings.provider.name()
            )),
        });
    }
    let backend = backend_from_settings(&settings)?;

    let filters = MemoryFilterStore::new();
    let orchestrator = Orchestrator::new(&store, &filters, spreadsheet, backend.as_ref());
    let outcome = orchestrator.run_turn(message, range)?;

    for record in &outcome.reply.tool_calls {
        let target = record.sheet.as_deref().unwrap_or("-");
        match record.status {
            ToolCallStatus::Ok => {
                let summary = record.summary.as_deref().unwrap_or("ok");
                eprintln!("  [{}] {}: {}", record.name, target, summary);
            }
            ToolCallStatus::Error => {
                let reason = record.error.as_deref().unwrap_or("failed");
                eprintln!("  [{}] {}: error: {}", record.name, target, reason);
            }
        }
    }
    println!("{}", outcome.reply.content);
    Ok(())
}

fn cmd_ai_doctor() -> Result<(), CliError> {
    let settings = Settings::load();
    println!("provider:  {}", settings.provider.name());
    if !settings.provider.is_enabled() {
        println!("status:    disabled");
        return Err(CliError {
            code: EXIT_AI_DISABLED,
            message: String::new(),
            hint: None,
        });
    }
    println!("model:     {}", settings.effective_model());
    match keys::lookup(settings.provider) {
        Some(key) => println!("key:       present ({})", key.source.label()),
        None => {
            println!("key:       missing");
            println!(
                "fix:       set {} or run `gridagent ai set-key {}`",
                keys::env_var(settings.provider),
                settings.provider.name()
            );
            return Err(CliError {
                code: EXIT_AI_MISSING_KEY,
                message: String::new(),
                hint: None,
            });
        }
    }
    println!("status:    ready");
    Ok(())
}

fn parse_provider(name: &str) -> Result<Provider, CliError> {
    Provider::from_name(name).ok_or_else(|| {
        CliError::usage(format!("unknown provider '{name}'"))
            .with_hint("expected 'openai' or 'anthropic'")
    })
}

fn cmd_ai_set_key(provider: &str, key: &str) -> Result<(), CliError> {
    let provider = parse_provider(provider)?;
    keys::store(provider, key).map_err(|e| CliError {
        code: EXIT_AI_KEYCHAIN_ERR,
        message: e.to_string(),
        hint: None,
    })?;
    println!("Stored key for {}", provider.name());
    Ok(())
}

fn cmd_ai_delete_key(provider: &str) -> Result<(), CliError> {
    let provider = parse_provider(provider)?;
    keys::forget(provider).map_err(|e| CliError {
        code: EXIT_AI_KEYCHAIN_ERR,
        message: e.to_string(),
        hint: None,
    })?;
    println!("Deleted key for {}", provider.name());
    Ok(())
}
