// Tool schema surface handed to the model.

use serde::Serialize;
use serde_json::{json, Value};

/// One tool definition in provider-neutral form. Backends translate
/// this into their own function/tool wire format.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

/// The full tool schema surface, in the order it is presented.
pub fn tool_specs() -> Vec<ToolSpec> {
    let sheet_param = json!({
        "type": "string",
        "description": "Sheet name, slug, or id"
    });
    vec![
        ToolSpec {
            name: "executeSheetSql",
            description: "Run a read-only SELECT against one sheet's table. \
                Address the table as context.spreadsheet.sheets[\"<sheet>\"]. \
                Results are capped; large results report truncated=true.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sheet": sheet_param.clone(),
                    "sql": {"type": "string", "description": "A single SELECT or WITH statement"}
                },
                "required": ["sheet", "sql"]
            }),
        },
        ToolSpec {
            name: "mutateSheetSql",
            description: "Run an INSERT, UPDATE, or ALTER TABLE ... ADD COLUMN against one \
                sheet's table, or CREATE TABLE context.spreadsheet.sheets[\"New\"] AS SELECT ... \
                to derive a new sheet. DELETE and DROP are not allowed; use deleteRows.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sheet": sheet_param.clone(),
                    "sql": {"type": "string", "description": "A single mutation statement"}
                },
                "required": ["sheet", "sql"]
            }),
        },
        ToolSpec {
            name: "deleteRows",
            description: "Delete rows from a sheet, either by explicit row numbers or by a SQL \
                boolean condition (exactly one of the two).",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sheet": sheet_param.clone(),
                    "rowNumbers": {"type": "array", "items": {"type": "integer"}},
                    "condition": {"type": "string", "description": "SQL boolean condition over the sheet's columns"}
                },
                "required": ["sheet"]
            }),
        },
        ToolSpec {
            name: "highlights_add",
            description: "Highlight rows for the user, by A1 range or by SQL condition \
                (exactly one of the two). A condition is resolved to concrete row numbers.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sheet": sheet_param.clone(),
                    "range": {"type": "string", "description": "A1-style range, e.g. B2:D10"},
                    "condition": {"type": "string"},
                    "color": {"type": "string", "description": "CSS color, defaults to yellow"},
                    "message": {"type": "string", "description": "Short note shown with the highlight"}
                },
                "required": ["sheet"]
            }),
        },
        ToolSpec {
            name: "highlights_clear",
            description: "Remove all highlights.",
            parameters: json!({"type": "object", "properties": {}}),
        },
        ToolSpec {
            name: "filter_add",
            description: "Add a SQL boolean condition narrowing the sheet's visible rows. \
                Conditions combine with AND.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sheet": sheet_param.clone(),
                    "condition": {"type": "string"}
                },
                "required": ["sheet", "condition"]
            }),
        },
        ToolSpec {
            name: "filter_clear",
            description: "Remove all filters from a sheet, restoring the full row set.",
            parameters: json!({
                "type": "object",
                "properties": {"sheet": sheet_param.clone()},
                "required": ["sheet"]
            }),
        },
        ToolSpec {
            name: "filters_get",
            description: "List the sheet's active filter conditions.",
            parameters: json!({
                "type": "object",
                "properties": {"sheet": sheet_param.clone()},
                "required": ["sheet"]
            }),
        },
        ToolSpec {
            name: "createSheet",
            description: "Create a new empty sheet, optionally with named columns.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "columns": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["name"]
            }),
        },
        ToolSpec {
            name: "executeTempSql",
            description: "Escape hatch for staging computations in scratch tables. CREATE TABLE \
                targets must be prefixed tmp_; sheet tables are readable but not writable here.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string"}
                },
                "required": ["sql"]
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specs_cover_the_tool_surface() {
        let names: Vec<&str> = tool_specs().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "executeSheetSql",
                "mutateSheetSql",
                "deleteRows",
                "highlights_add",
                "highlights_clear",
                "filter_add",
                "filter_clear",
                "filters_get",
                "createSheet",
                "executeTempSql",
            ]
        );
    }

    #[test]
    fn every_spec_declares_an_object_schema() {
        for spec in tool_specs() {
            assert_eq!(spec.parameters["type"], "object", "{}", spec.name);
            assert!(spec.parameters["properties"].is_object(), "{}", spec.name);
        }
    }
}
