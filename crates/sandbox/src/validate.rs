// Statement validation pipeline.
//
// Key invariants:
// - Exactly one non-empty statement per call; semicolons inside string
//   literals do not count as statement breaks
// - The bound sheet's table must literally appear; any other sheet
//   table anywhere in the raw text is a rejection
// - Keyword blacklists scan scrubbed text only: string literals and
//   comments are blanked out first, so data can not trip them

use std::sync::OnceLock;

use regex::Regex;

use gridagent_core::{EngineError, SheetCatalog};

use crate::rewrite::rewrite_sheet_refs;

/// Write/DDL keywords rejected anywhere in a read statement.
const READ_BLACKLIST: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "replace", "truncate", "attach",
    "detach", "vacuum", "pragma", "reindex", "begin", "commit", "rollback", "savepoint", "release",
];

/// Destructive keywords rejected anywhere in a mutation statement.
const MUTATE_BLACKLIST: &[&str] = &[
    "delete", "drop", "truncate", "replace", "attach", "detach", "vacuum", "pragma", "reindex",
    "begin", "commit", "rollback", "savepoint", "release",
];

/// Session/schema keywords rejected on the temp escape hatch.
const TEMP_BLACKLIST: &[&str] = &[
    "attach", "detach", "vacuum", "pragma", "begin", "commit", "rollback", "savepoint", "release",
];

/// Accepted mutation statement shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    AlterAddColumn,
}

/// A validated, rewritten read statement.
#[derive(Debug, Clone)]
pub struct BoundRead {
    pub sql: String,
}

/// A validated, rewritten mutation statement.
#[derive(Debug, Clone)]
pub struct BoundMutation {
    pub sql: String,
    pub kind: MutationKind,
}

fn sheet_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bsheet_\d+\b").unwrap_or_else(|e| panic!("sheet table regex: {e}"))
    })
}

fn alter_add_column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^alter\s+table\s+.+?\badd\s+(column\s+)?\S")
            .unwrap_or_else(|e| panic!("alter regex: {e}"))
    })
}

fn create_table_target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)\bcreate\s+(?:temp\s+|temporary\s+)?table\s+(?:if\s+not\s+exists\s+)?["']?([A-Za-z0-9_]+)"#,
        )
        .unwrap_or_else(|e| panic!("create target regex: {e}"))
    })
}

fn mutation_target_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Captures both the optional schema qualifier and the table, so
        // `main.sheet_1` cannot slip past a check on the first token.
        Regex::new(
            r#"(?is)^(?:insert\s+(?:or\s+[a-z]+\s+)?into|replace\s+into|update(?:\s+or\s+[a-z]+)?|delete\s+from)\s+(?:["'\[]?([A-Za-z0-9_]+)["'\]]?\s*\.\s*)?["'\[]?([A-Za-z0-9_]+)"#,
        )
        .unwrap_or_else(|e| panic!("mutation target regex: {e}"))
    })
}

/// Validate a read statement and bind it to `table`.
pub fn validate_read(
    sql: &str,
    table: &str,
    catalog: &dyn SheetCatalog,
) -> Result<BoundRead, EngineError> {
    let sql = single_statement(sql)?;
    let sql = rewrite_sheet_refs(&sql, catalog)?;
    let scrubbed = scrub(&sql).to_lowercase();
    let trimmed = scrubbed.trim_start();
    if !trimmed.starts_with("select") && !trimmed.starts_with("with") {
        return Err(EngineError::validation("not a read query"));
    }
    scan_blacklist(&scrubbed, READ_BLACKLIST)?;
    require_bound_table(&sql, table)?;
    reject_foreign_tables(&sql, table, catalog)?;
    Ok(BoundRead { sql })
}

/// Validate a mutation statement (INSERT / UPDATE / ALTER ... ADD COLUMN)
/// and bind it to `table`. Other ALTER forms are rejected.
pub fn validate_mutation(
    sql: &str,
    table: &str,
    catalog: &dyn SheetCatalog,
) -> Result<BoundMutation, EngineError> {
    let sql = single_statement(sql)?;
    let sql = rewrite_sheet_refs(&sql, catalog)?;
    let scrubbed = scrub(&sql).to_lowercase();
    let trimmed = scrubbed.trim_start();

    // Destructive verbs get the destructive rejection, not the shape one
    scan_blacklist(&scrubbed, MUTATE_BLACKLIST)?;

    let kind = if trimmed.starts_with("insert") {
        MutationKind::Insert
    } else if trimmed.starts_with("update") {
        MutationKind::Update
    } else if trimmed.starts_with("alter") {
        if !alter_add_column_re().is_match(trimmed) {
            return Err(EngineError::validation(
                "only ALTER TABLE ... ADD COLUMN is allowed",
            ));
        }
        MutationKind::AlterAddColumn
    } else {
        return Err(EngineError::validation(
            "only INSERT, UPDATE, or ALTER TABLE ... ADD COLUMN statements are allowed",
        ));
    };

    if kind != MutationKind::AlterAddColumn && contains_word(&scrubbed, "create") {
        return Err(EngineError::validation("destructive statements are not allowed"));
    }
    require_bound_table(&sql, table)?;
    reject_foreign_tables(&sql, table, catalog)?;
    Ok(BoundMutation { sql, kind })
}

/// Validate the SELECT body of a CREATE TABLE ... AS SELECT mutation.
/// Unlike a plain read, the body may draw from any sheet in the
/// spreadsheet (that is the point of deriving a new sheet), so only the
/// shape and blacklist checks apply.
pub fn validate_select_fragment(
    select: &str,
    catalog: &dyn SheetCatalog,
) -> Result<String, EngineError> {
    let select = single_statement(select)?;
    let select = rewrite_sheet_refs(&select, catalog)?;
    let scrubbed = scrub(&select).to_lowercase();
    let trimmed = scrubbed.trim_start();
    if !trimmed.starts_with("select") && !trimmed.starts_with("with") {
        return Err(EngineError::validation("not a read query"));
    }
    scan_blacklist(&scrubbed, READ_BLACKLIST)?;
    Ok(select)
}

/// Validate a bare boolean condition (filters, highlights, conditional
/// row deletion). The condition is scanned with the read blacklist and
/// may not smuggle in another sheet's table or a second statement.
pub fn validate_condition(
    condition: &str,
    table: &str,
    catalog: &dyn SheetCatalog,
) -> Result<String, EngineError> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Err(EngineError::validation("condition must not be empty"));
    }
    let condition = rewrite_sheet_refs(condition, catalog)?;
    let scrubbed = scrub(&condition).to_lowercase();
    if scrubbed.contains(';') {
        return Err(EngineError::validation("multiple statements are not allowed"));
    }
    scan_blacklist(&scrubbed, READ_BLACKLIST)?;
    reject_foreign_tables(&condition, table, catalog)?;
    Ok(condition)
}

/// Validate an `executeTempSql` statement: sheet references are
/// rewritten (and readable), but any CREATE TABLE target must carry the
/// given prefix so staged tables never collide with sheet tables, and
/// sheet tables may not be the target of a mutation verb, with or
/// without a schema qualifier.
pub fn validate_temp(
    sql: &str,
    temp_prefix: &str,
    catalog: &dyn SheetCatalog,
) -> Result<String, EngineError> {
    let sql = single_statement(sql)?;
    let sql = rewrite_sheet_refs(&sql, catalog)?;
    let scrubbed = scrub(&sql).to_lowercase();
    scan_blacklist(&scrubbed, TEMP_BLACKLIST)?;

    if let Some(caps) = create_table_target_re().captures(&sql) {
        let target = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        if !target.to_lowercase().starts_with(temp_prefix) {
            return Err(EngineError::validation(format!(
                "temp tables must be prefixed with '{temp_prefix}'"
            )));
        }
    }
    if let Some(caps) = mutation_target_re().captures(sql.trim()) {
        let targets_sheet = caps
            .iter()
            .skip(1)
            .flatten()
            .any(|m| catalog.is_sheet_table(m.as_str()));
        if targets_sheet {
            return Err(EngineError::validation(
                "sheet tables cannot be mutated through executeTempSql",
            ));
        }
    }
    if scrubbed.trim_start().starts_with("drop")
        || scrubbed.trim_start().starts_with("alter")
    {
        // schema changes are allowed only on staged tables
        let touches_sheet = sheet_table_re()
            .find_iter(&sql)
            .any(|m| catalog.is_sheet_table(m.as_str()));
        if touches_sheet {
            return Err(EngineError::validation(
                "sheet tables cannot be altered through executeTempSql",
            ));
        }
    }
    Ok(sql)
}

// ── Pipeline pieces ─────────────────────────────────────────────────

/// Blank out single-quoted string literals (honoring the doubled-quote
/// escape), `--` line comments, and `/* */` block comments, preserving
/// byte length. Keyword scans and statement splitting run on this
/// scrubbed text so data and comments can neither trip a blacklist nor
/// hide executable SQL. Double-quoted identifiers are left in place.
fn scrub(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                out.push(b'\'');
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            out.extend_from_slice(b"  ");
                            i += 2;
                            continue;
                        }
                        out.push(b'\'');
                        i += 1;
                        break;
                    }
                    out.push(b' ');
                    i += 1;
                }
            }
            b'-' if i + 1 < bytes.len() && bytes[i + 1] == b'-' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                out.extend_from_slice(b"  ");
                i += 2;
                while i < bytes.len() {
                    if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                        out.extend_from_slice(b"  ");
                        i += 2;
                        break;
                    }
                    out.push(b' ');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    // Only ASCII bytes were rewritten; everything else was copied.
    String::from_utf8_lossy(&out).into_owned()
}

/// Reject empty input and stacked statements; returns the single
/// statement with any trailing semicolon dropped. Semicolons inside
/// string literals are not statement breaks.
fn single_statement(sql: &str) -> Result<String, EngineError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(EngineError::validation("empty SQL statement"));
    }
    let scrubbed = scrub(trimmed);
    let parts: Vec<&str> = scrubbed
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    match parts.len() {
        0 => Err(EngineError::validation("empty SQL statement")),
        1 => Ok(trimmed.trim_end_matches(';').trim_end().to_string()),
        _ => Err(EngineError::validation("multiple statements are not allowed")),
    }
}

fn scan_blacklist(lower_sql: &str, blacklist: &[&str]) -> Result<(), EngineError> {
    // Skip the leading verb: "update ..." legitimately starts with a
    // word that the read blacklist would otherwise never let through.
    let body = lower_sql.trim_start();
    let after_verb = body
        .split_once(|c: char| c.is_whitespace())
        .map(|(_, rest)| rest)
        .unwrap_or("");
    let leading_verb = body
        .split_whitespace()
        .next()
        .unwrap_or_default();

    for word in blacklist {
        if word == &leading_verb {
            return Err(EngineError::validation(
                "destructive statements are not allowed",
            ));
        }
        if contains_word(after_verb, word) {
            return Err(EngineError::validation(format!(
                "destructive statements are not allowed (found '{word}')"
            )));
        }
    }
    Ok(())
}

/// Word-boundary substring check without compiling a regex per keyword.
fn contains_word(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(word) {
        let at = start + pos;
        let before_ok = at == 0 || !is_word_byte(bytes[at - 1]);
        let end = at + word.len();
        let after_ok = end >= bytes.len() || !is_word_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
    }
    false
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn require_bound_table(sql: &str, table: &str) -> Result<(), EngineError> {
    if contains_word(sql, table) {
        Ok(())
    } else {
        Err(EngineError::validation("must reference this sheet's table"))
    }
}

fn reject_foreign_tables(
    sql: &str,
    table: &str,
    catalog: &dyn SheetCatalog,
) -> Result<(), EngineError> {
    for m in sheet_table_re().find_iter(sql) {
        let token = m.as_str();
        if token != table && catalog.is_sheet_table(token) {
            return Err(EngineError::validation("queries may target only one sheet"));
        }
    }
    Ok(())
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

    const T: &str = "sheet_1";

    #[test]
    fn accepts_plain_select() {
        let bound = validate_read(
            r#"SELECT "revenue" FROM context.spreadsheet.sheets["Sales"] WHERE "product" = 'Widget'"#,
            T,
            &catalog(),
        )
        .unwrap();
        assert!(bound.sql.contains("\"sheet_1\""));
    }

    #[test]
    fn accepts_with_cte() {
        assert!(validate_read(
            "WITH t AS (SELECT * FROM \"sheet_1\") SELECT COUNT(*) FROM t",
            T,
            &catalog()
        )
        .is_ok());
    }

    #[test]
    fn read_rejects_empty_and_whitespace() {
        assert!(validate_read("", T, &catalog()).is_err());
        assert!(validate_read("   \n\t ", T, &catalog()).is_err());
    }

    #[test]
    fn read_rejects_non_select() {
        let err = validate_read("UPDATE sheet_1 SET x = 1", T, &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "not a read query");
    }

    #[test]
    fn read_allows_blacklisted_word_inside_literal() {
        let bound = validate_read(
            "SELECT * FROM sheet_1 WHERE note = 'drop everything'",
            T,
            &catalog(),
        )
        .unwrap();
        assert!(bound.sql.contains("'drop everything'"));

        // the doubled-quote escape does not end the literal early
        assert!(validate_read(
            "SELECT * FROM sheet_1 WHERE note = 'it''s a delete; truly'",
            T,
            &catalog()
        )
        .is_ok());
    }

    #[test]
    fn read_rejects_keyword_outside_literal() {
        let err = validate_read(
            "SELECT * FROM sheet_1 WHERE note = 'x' OR 1 IN (DELETE FROM sheet_1)",
            T,
            &catalog(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("destructive"));
    }

    #[test]
    fn comments_cannot_hide_executable_sql() {
        // a keyword that only exists inside a comment is harmless
        assert!(validate_read(
            "SELECT * FROM sheet_1 -- drop table later\n",
            T,
            &catalog()
        )
        .is_ok());
        // a verb split by a block comment is not a valid read verb
        assert!(validate_read("SEL/**/ECT * FROM sheet_1", T, &catalog()).is_err());
    }

    #[test]
    fn read_rejects_stacked_statements() {
        let err = validate_read(
            "SELECT * FROM sheet_1; DELETE FROM sheet_1",
            T,
            &catalog(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "multiple statements are not allowed");
        // a trailing semicolon alone is fine
        assert!(validate_read("SELECT * FROM sheet_1;", T, &catalog()).is_ok());
    }

    #[test]
    fn read_requires_bound_table() {
        let err = validate_read("SELECT 1", T, &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "must reference this sheet's table");
        // partial token is not a reference
        let err = validate_read("SELECT * FROM sheet_10", T, &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "must reference this sheet's table");
    }

    #[test]
    fn read_rejects_other_sheets() {
        let err = validate_read(
            "SELECT * FROM sheet_1 JOIN sheet_2 ON 1=1",
            T,
            &catalog(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "queries may target only one sheet");

        let err = validate_read(
            r#"SELECT * FROM context.spreadsheet.sheets["Sales"], context.spreadsheet.sheets["Costs"]"#,
            T,
            &catalog(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "queries may target only one sheet");
    }

    #[test]
    fn mutation_accepts_insert_update_alter_add() {
        let m = validate_mutation(
            r#"INSERT INTO context.spreadsheet.sheets["Sales"] ("product") VALUES ('x')"#,
            T,
            &catalog(),
        )
        .unwrap();
        assert_eq!(m.kind, MutationKind::Insert);

        let m = validate_mutation("UPDATE sheet_1 SET product = 'y'", T, &catalog()).unwrap();
        assert_eq!(m.kind, MutationKind::Update);

        let m = validate_mutation(
            "ALTER TABLE sheet_1 ADD COLUMN margin REAL",
            T,
            &catalog(),
        )
        .unwrap();
        assert_eq!(m.kind, MutationKind::AlterAddColumn);
    }

    #[test]
    fn mutation_rejects_delete_and_drop() {
        let err = validate_mutation(
            r#"DELETE FROM context.spreadsheet.sheets["Sales"]"#,
            T,
            &catalog(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "destructive statements are not allowed");

        assert!(validate_mutation("DROP TABLE sheet_1", T, &catalog()).is_err());
        assert!(validate_mutation(
            "UPDATE sheet_1 SET x = (SELECT 1); DROP TABLE sheet_1",
            T,
            &catalog()
        )
        .is_err());
    }

    #[test]
    fn mutation_rejects_other_alter_forms() {
        let err = validate_mutation(
            "ALTER TABLE sheet_1 RENAME TO sheet_99",
            T,
            &catalog(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("ADD COLUMN"));

        // DROP COLUMN trips the blacklist before the shape check matters
        assert!(validate_mutation("ALTER TABLE sheet_1 DROP COLUMN x", T, &catalog()).is_err());
    }

    #[test]
    fn mutation_stays_on_bound_sheet() {
        let err = validate_mutation(
            "UPDATE sheet_2 SET x = 1",
            T,
            &catalog(),
        )
        .unwrap_err();
        // sheet_2 is present and sheet_1 is not: bound-table check fires first
        assert_eq!(err.to_string(), "must reference this sheet's table");

        let err = validate_mutation(
            "UPDATE sheet_1 SET x = (SELECT y FROM sheet_2)",
            T,
            &catalog(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "queries may target only one sheet");
    }

    #[test]
    fn select_fragment_may_join_sheets_but_not_write() {
        let out = validate_select_fragment(
            r#"SELECT a.p FROM context.spreadsheet.sheets["Sales"] a
               JOIN context.spreadsheet.sheets["Costs"] b ON a.p = b.p"#,
            &catalog(),
        )
        .unwrap();
        assert!(out.contains("\"sheet_1\"") && out.contains("\"sheet_2\""));

        assert!(validate_select_fragment("DELETE FROM sheet_1", &catalog()).is_err());
        assert!(validate_select_fragment("SELECT 1; SELECT 2", &catalog()).is_err());
    }

    #[test]
    fn condition_checks() {
        assert_eq!(
            validate_condition("\"revenue\" > 100", T, &catalog()).unwrap(),
            "\"revenue\" > 100"
        );
        assert!(validate_condition("", T, &catalog()).is_err());
        assert!(validate_condition("1=1; DROP TABLE sheet_1", T, &catalog()).is_err());
        assert!(validate_condition("x IN (SELECT y FROM sheet_2)", T, &catalog()).is_err());
        // keyword inside a literal is data, not a verb
        assert!(validate_condition("\"note\" = 'please drop this'", T, &catalog()).is_ok());
    }

    #[test]
    fn temp_create_requires_prefix() {
        assert!(validate_temp(
            "CREATE TABLE tmp_staging AS SELECT * FROM sheet_1",
            "tmp_",
            &catalog()
        )
        .is_ok());
        let err = validate_temp(
            "CREATE TABLE staging AS SELECT * FROM sheet_1",
            "tmp_",
            &catalog(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("tmp_"));
    }

    #[test]
    fn temp_rewrites_sheet_refs() {
        let sql = validate_temp(
            r#"CREATE TABLE tmp_x AS SELECT * FROM context.spreadsheet.sheets["Costs"]"#,
            "tmp_",
            &catalog(),
        )
        .unwrap();
        assert!(sql.contains("\"sheet_2\""));
    }

    #[test]
    fn temp_cannot_mutate_or_drop_sheet_tables() {
        assert!(validate_temp("DELETE FROM tmp_staging WHERE x = 1", "tmp_", &catalog()).is_ok());
        assert!(validate_temp("DELETE FROM sheet_1", "tmp_", &catalog()).is_err());
        assert!(validate_temp("UPDATE sheet_2 SET x = 1", "tmp_", &catalog()).is_err());
        assert!(validate_temp("DROP TABLE tmp_staging", "tmp_", &catalog()).is_ok());
        assert!(validate_temp("DROP TABLE sheet_1", "tmp_", &catalog()).is_err());
        assert!(validate_temp("PRAGMA journal_mode = wal", "tmp_", &catalog()).is_err());
    }

    #[test]
    fn temp_mutation_target_cannot_hide_behind_a_schema_prefix() {
        assert!(validate_temp("DELETE FROM main.sheet_1", "tmp_", &catalog()).is_err());
        assert!(validate_temp("DELETE FROM main . \"sheet_1\"", "tmp_", &catalog()).is_err());
        assert!(validate_temp("UPDATE main.sheet_2 SET x = 1", "tmp_", &catalog()).is_err());
        assert!(validate_temp("INSERT INTO temp.sheet_1 VALUES (1)", "tmp_", &catalog()).is_err());
        assert!(validate_temp("REPLACE INTO sheet_1 VALUES (1)", "tmp_", &catalog()).is_err());
        assert!(validate_temp(
            "INSERT OR IGNORE INTO main.sheet_1 VALUES (1)",
            "tmp_",
            &catalog()
        )
        .is_err());
        // staging sheet rows into a temp table stays legal
        assert!(validate_temp(
            "INSERT INTO main.tmp_staging SELECT * FROM sheet_1",
            "tmp_",
            &catalog()
        )
        .is_ok());
    }
}
