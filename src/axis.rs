//! Maps the two classification axes onto output sheets and columns.

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{AxisRole, ClassCode, HandlerSpec, PeriodConfig};
use crate::error::{Result, ToolError};

/// Which axis selects the output sheet and which the output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisLayout {
    pub sheet: AxisRole,
    pub column: AxisRole,
}

/// Reads the designated sheet axis; the column axis defaults to the other role.
pub fn resolve_axes(config: &PeriodConfig) -> Result<AxisLayout> {
    let sheet = config.axes.to_sheet;
    let column = config.axes.to_column.unwrap_or_else(|| sheet.other());
    if sheet == column {
        return Err(ToolError::InvalidConfig(format!(
            "axis '{}' cannot map to both sheets and columns",
            sheet.name()
        )));
    }
    Ok(AxisLayout { sheet, column })
}

/// Returns the override for `key` if one exists, else `key` itself.
pub fn resolve_alias_name<'a>(key: &'a str, overrides: &'a IndexMap<String, String>) -> &'a str {
    overrides.get(key).map(String::as_str).unwrap_or(key)
}

/// Looks up the handler for a list-axis key. Keys without a handler produce
/// no formula and no column; callers skip them.
pub fn lookup_handler<'a>(
    table: &'a IndexMap<String, HandlerSpec>,
    key: &str,
) -> Option<&'a HandlerSpec> {
    table.get(key)
}

/// One (output sheet, output column) cell of the axis product that has a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement<'a> {
    pub sheet_key: &'a str,
    pub output_sheet: String,
    pub column_key: &'a str,
    pub column_label: String,
    /// List-axis key the handler was found under.
    pub handler_key: &'a str,
    pub handler: &'a HandlerSpec,
    /// Source sheet to read, `None` when declared absent.
    pub source_sheet: Option<&'a str>,
    pub code: &'a ClassCode,
}

/// Resolves axis keys into concrete placements, column-axis key major.
pub fn plan_placements(config: &PeriodConfig) -> Result<Vec<Placement<'_>>> {
    let layout = resolve_axes(config)?;
    let mut placements = Vec::new();

    for column_key in axis_keys(config, layout.column) {
        for sheet_key in axis_keys(config, layout.sheet) {
            let (rows_key, list_key) = match layout.sheet {
                AxisRole::Rows => (sheet_key, column_key),
                AxisRole::List => (column_key, sheet_key),
            };
            let Some(handler) = lookup_handler(&config.funcs, list_key) else {
                debug!(key = list_key, "no handler for classification key, skipping");
                continue;
            };
            let Some(code) = config.axes.rows.codes.get(rows_key) else {
                continue;
            };
            placements.push(Placement {
                sheet_key,
                output_sheet: alias(config, layout.sheet, sheet_key).to_string(),
                column_key,
                column_label: alias(config, layout.column, column_key).to_string(),
                handler_key: list_key,
                handler,
                source_sheet: source_sheet(config, list_key, handler),
                code,
            });
        }
    }

    Ok(placements)
}

/// Output sheet names along the sheet axis, in axis order and without repeats.
pub fn output_sheets(config: &PeriodConfig) -> Result<Vec<String>> {
    let layout = resolve_axes(config)?;
    let mut names: Vec<String> = Vec::new();
    for key in axis_keys(config, layout.sheet) {
        let name = alias(config, layout.sheet, key);
        if !names.iter().any(|existing| existing == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn axis_keys(config: &PeriodConfig, role: AxisRole) -> Vec<&str> {
    match role {
        AxisRole::Rows => config.axes.rows.codes.keys().map(String::as_str).collect(),
        AxisRole::List => config.axes.list.sheets.keys().map(String::as_str).collect(),
    }
}

fn alias<'a>(config: &'a PeriodConfig, role: AxisRole, key: &'a str) -> &'a str {
    let overrides = match role {
        AxisRole::Rows => &config.axes.rows.aliases,
        AxisRole::List => &config.axes.list.aliases,
    };
    resolve_alias_name(key, overrides)
}

fn source_sheet<'a>(config: &'a PeriodConfig, key: &str, handler: &'a HandlerSpec) -> Option<&'a str> {
    match handler.actual_name.as_deref() {
        Some("None") => None,
        Some(name) => Some(name),
        None => config.axes.list.source_sheet(key),
    }
}
