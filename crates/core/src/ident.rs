// SQL identifier sanitization for column names and sheet slugs.
//
// Key invariants:
// - Output matches [a-z][a-z0-9_]* (prefixed with "c_" if it would
//   start with a digit or come out empty)
// - Sanitizing the same header twice yields the same identifier;
//   uniqueness within a sheet is the caller's job (numeric suffixing)

/// Sanitize a display header into a candidate SQL column identifier.
///
/// Lowercases, maps runs of non-alphanumerics to a single underscore,
/// trims leading/trailing underscores. A result that is empty or starts
/// with a digit gets a `c_` prefix.
pub fn sanitize_sql_name(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut last_us = true; // suppress leading underscore
    for ch in header.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_us = false;
        } else if !last_us {
            out.push('_');
            last_us = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        format!("c_{out}")
    } else {
        out
    }
}

/// Resolve a candidate identifier against names already in use by
/// appending `_2`, `_3`, ... until it is unique.
pub fn dedupe_sql_name(candidate: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == candidate) {
        return candidate.to_string();
    }
    let mut n = 2;
    loop {
        let next = format!("{candidate}_{n}");
        if !taken.iter().any(|t| t == &next) {
            return next;
        }
        n += 1;
    }
}

/// Slug form of a sheet name, used for symbolic sheet references.
pub fn slugify(name: &str) -> String {
    sanitize_sql_name(name)
}

/// Default display header for column index `i` (0-based): `COLUMN_1`, ...
pub fn default_header(index: usize) -> String {
    format!("COLUMN_{}", index + 1)
}

/// Quote an identifier for direct inclusion in SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
