// Symbolic sheet reference rewriting.
//
// Agents never see physical table names in prompts; they address sheets
// as context.spreadsheet.sheets["<name|slug|id>"]. Every occurrence is
// rewritten to the quoted physical table before validation.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use gridagent_core::{EngineError, SheetCatalog};

fn sheet_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"context\.spreadsheet\.sheets\[\s*(?:"([^"]*)"|'([^']*)')\s*\]"#)
            .unwrap_or_else(|e| panic!("sheet ref regex: {e}"))
    })
}

fn create_as_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)^\s*create\s+table\s+context\.spreadsheet\.sheets\[\s*(?:"([^"]*)"|'([^']*)')\s*\]\s+as\s+(select\b.*)$"#,
        )
        .unwrap_or_else(|e| panic!("create-as regex: {e}"))
    })
}

/// Rewrite every symbolic sheet reference to its quoted physical table.
/// An unresolvable reference is an error, not a passthrough.
pub fn rewrite_sheet_refs(
    sql: &str,
    catalog: &dyn SheetCatalog,
) -> Result<String, EngineError> {
    let mut missing: Option<String> = None;
    let rewritten = sheet_ref_re().replace_all(sql, |caps: &Captures<'_>| {
        let reference = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        match catalog.resolve_table(reference) {
            Some(table) => format!("\"{table}\""),
            None => {
                if missing.is_none() {
                    missing = Some(reference.to_string());
                }
                String::new()
            }
        }
    });
    if let Some(reference) = missing {
        return Err(EngineError::not_found(format!("sheet '{reference}'")));
    }
    Ok(rewritten.into_owned())
}

/// Recognize the specially handled
/// `CREATE TABLE context.spreadsheet.sheets["Name"] AS SELECT ...`
/// mutation. Returns the new sheet name and the trailing SELECT text.
pub fn parse_create_table_as(sql: &str) -> Option<(String, String)> {
    let caps = create_as_re().captures(sql.trim())?;
    let name = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())?;
    let select = caps.get(3).map(|m| m.as_str().trim().to_string())?;
    Some((name, select))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeCatalog(HashMap<String, String>);

    impl SheetCatalog for FakeCatalog {
        fn resolve_table(&self, reference: &str) -> Option<String> {
            self.0.get(reference).cloned()
        }
        fn is_sheet_table(&self, table: &str) -> bool {
            self.0.values().any(|t| t == table)
        }
    }

    fn catalog() -> FakeCatalog {
        let mut m = HashMap::new();
        m.insert("Sales".to_string(), "sheet_1".to_string());
        m.insert("Costs".to_string(), "sheet_2".to_string());
        FakeCatalog(m)
    }

    #[test]
    fn rewrites_double_and_single_quoted_refs() {
        let out = rewrite_sheet_refs(
            r#"SELECT * FROM context.spreadsheet.sheets["Sales"]"#,
            &catalog(),
        )
        .unwrap();
        assert_eq!(out, "SELECT * FROM \"sheet_1\"");

        let out = rewrite_sheet_refs(
            "SELECT * FROM context.spreadsheet.sheets['Costs']",
            &catalog(),
        )
        .unwrap();
        assert_eq!(out, "SELECT * FROM \"sheet_2\"");
    }

    #[test]
    fn rewrites_multiple_refs_in_one_statement() {
        let out = rewrite_sheet_refs(
            r#"SELECT a.x FROM context.spreadsheet.sheets["Sales"] a
               JOIN context.spreadsheet.sheets["Sales"] b ON a.x = b.x"#,
            &catalog(),
        )
        .unwrap();
        assert!(!out.contains("context.spreadsheet"));
        assert_eq!(out.matches("\"sheet_1\"").count(), 2);
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let err = rewrite_sheet_refs(
            r#"SELECT * FROM context.spreadsheet.sheets["Nope"]"#,
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn parses_create_table_as() {
        let (name, select) = parse_create_table_as(
            r#"CREATE TABLE context.spreadsheet.sheets["Summary"] AS SELECT product, SUM(x) FROM context.spreadsheet.sheets["Sales"] GROUP BY product"#,
        )
        .unwrap();
        assert_eq!(name, "Summary");
        assert!(select.starts_with("SELECT product"));
    }

    #[test]
    fn create_table_as_requires_sheet_target_and_select() {
        assert!(parse_create_table_as("CREATE TABLE plain AS SELECT 1").is_none());
        assert!(parse_create_table_as(
            r#"CREATE TABLE context.spreadsheet.sheets["X"] (a TEXT)"#
        )
        .is_none());
    }
}
