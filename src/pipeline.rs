//! Per-period orchestration: discover sources, fill the template grid with
//! lookup columns, add the summary and save the result.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, instrument, warn};

use crate::axis::{Placement, output_sheets, plan_placements};
use crate::config::{ConfigDocument, PeriodConfig};
use crate::error::{Result, ToolError};
use crate::formula::{FormulaCompiler, SheetRef};
use crate::grid::GridWriter;
use crate::io::discovery::find_sources;
use crate::io::excel_read::{SheetProbe, read_template};
use crate::io::excel_write::write_grid;
use crate::model::{OutputGrid, Provenance};
use crate::reference::parse_column;
use crate::summary::build_summary;

/// Keyword selecting every configured period.
pub const ALL_PERIODS: &str = "all";

/// Inputs of one run shared by every period.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Directory holding one source bundle per period.
    pub input_dir: PathBuf,
    pub template: PathBuf,
    pub output_dir: PathBuf,
    /// Requested periods; empty or `all` selects every configured period.
    pub periods: Vec<String>,
    pub include_optional: bool,
}

/// Loads the configuration and processes the selected periods, returning the
/// written workbooks.
#[instrument(
    level = "info",
    skip_all,
    fields(config = %config_path.display(), input = %options.input_dir.display())
)]
pub fn run(config_path: &Path, options: &RunOptions) -> Result<Vec<PathBuf>> {
    let document = ConfigDocument::load(config_path)?;
    let periods = select_periods(&document, &options.periods);
    info!(periods = ?periods, "periods selected");
    process_periods(&document, &periods, options)
}

/// Resolves the requested periods against the configuration, in request order.
pub fn select_periods(document: &ConfigDocument, requested: &[String]) -> Vec<String> {
    let available = document.periods_available();
    if requested.is_empty()
        || requested
            .iter()
            .any(|period| period.eq_ignore_ascii_case(ALL_PERIODS))
    {
        return available.into_iter().map(str::to_string).collect();
    }

    requested
        .iter()
        .filter(|period| {
            let known = available.contains(&period.as_str());
            if !known {
                warn!(period = %period, "period not configured, skipping");
            }
            known
        })
        .cloned()
        .collect()
}

pub fn process_periods(
    document: &ConfigDocument,
    periods: &[String],
    options: &RunOptions,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&options.output_dir)?;
    periods
        .iter()
        .map(|period| process_period(document, period, options))
        .collect()
}

/// Builds and saves the consolidated workbook of one period.
#[instrument(level = "info", skip_all, fields(period = %period))]
pub fn process_period(
    document: &ConfigDocument,
    period: &str,
    options: &RunOptions,
) -> Result<PathBuf> {
    let config = document.effective(period)?;
    let location = options
        .input_dir
        .join(format!("{}{period}", config.period_dir_prefix));
    let sources = find_sources(&location, &config.search_patterns, options.include_optional)?;
    info!(sources = sources.len(), location = %location.display(), "source workbooks found");

    let template = read_template(&options.template)?;
    let output = output_path(&options.output_dir, period, &options.template);
    let destination_dir = std::path::absolute(&options.output_dir)?;

    let grid = build_period_grid(&config, template, &sources, &destination_dir)?;
    debug!(sheets = ?grid.sheet_names(), "period grid built");
    write_grid(&output, &grid)?;
    info!(output = %output.display(), "period workbook written");
    Ok(output)
}

/// Fills `grid` (the loaded template) with one column per source and placement,
/// then adds the summary sheet and drops the template placeholder.
///
/// Failures of a single source or placement are logged and skipped.
pub fn build_period_grid(
    config: &PeriodConfig,
    mut grid: OutputGrid,
    sources: &[PathBuf],
    destination_dir: &Path,
) -> Result<OutputGrid> {
    let placements = plan_placements(config)?;
    let compiler = FormulaCompiler::new(&config.formula, parse_column(&config.axes.rows.column)?);
    let mut probe = config.check_sheet_existence.then(SheetProbe::new);

    let mut writer = GridWriter::new(&mut grid, config.template_sheet.clone());
    for source in sources {
        match fill_from_source(
            &mut writer,
            &compiler,
            &placements,
            source,
            destination_dir,
            probe.as_mut(),
        ) {
            Ok(columns) => debug!(source = %source.display(), columns, "source processed"),
            Err(err) => error!(source = %source.display(), error = %err, "skipping source workbook"),
        }
    }
    let first_write = writer.into_first_write_columns();

    let sheets = output_sheets(config)?;
    if let Some(summary) = config.summary() {
        build_summary(&mut grid, summary, &sheets, &first_write, &config.template_sheet)?;
    }

    let placeholder_used = sheets.contains(&config.template_sheet)
        || config
            .summary()
            .and_then(|summary| summary.sheet_name())
            .is_some_and(|name| name == config.template_sheet);
    if !placeholder_used {
        grid.remove_sheet(&config.template_sheet);
    }
    Ok(grid)
}

fn fill_from_source(
    writer: &mut GridWriter<'_>,
    compiler: &FormulaCompiler<'_>,
    placements: &[Placement<'_>],
    source: &Path,
    destination_dir: &Path,
    mut probe: Option<&mut SheetProbe>,
) -> Result<usize> {
    let source_stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .ok_or_else(|| ToolError::MissingInput(source.to_path_buf()))?;

    let mut written = 0;
    for placement in placements {
        let sheet = match placement.source_sheet {
            Some(name) => {
                let present = match probe.as_deref_mut() {
                    Some(probe) => probe.has_sheet(source, name)?,
                    None => true,
                };
                if present {
                    Some(SheetRef::external(
                        source,
                        destination_dir,
                        name,
                        compiler.path_separator(),
                    )?)
                } else {
                    None
                }
            }
            None => None,
        };

        let formula = match compiler.compile(
            sheet,
            placement.handler_key,
            placement.handler,
            placement.code,
        ) {
            Ok(formula) => formula,
            Err(err) => {
                error!(
                    handler = placement.handler_key,
                    sheet = %placement.output_sheet,
                    error = %err,
                    "skipping placement"
                );
                continue;
            }
        };

        let provenance = Provenance {
            source_stem: source_stem.clone(),
            sheet_key: placement.sheet_key.to_string(),
            column_key: placement.column_key.to_string(),
            column_label: placement.column_label.clone(),
        };
        writer.write_column(&placement.output_sheet, provenance, &formula)?;
        written += 1;
    }
    Ok(written)
}

/// `<output_dir>/<period>_<template stem without its last "_" segment>.xlsx`.
pub fn output_path(output_dir: &Path, period: &str, template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = stem.rsplit_once('_').map_or(stem.as_str(), |(head, _)| head);
    output_dir.join(format!("{period}_{base}.xlsx"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::{CellValue, Sheet};

    fn document() -> ConfigDocument {
        ConfigDocument::from_value(json!({
            "common": {
                "axes": {
                    "rows": {"column": "B", "codes": {"ВО": 1, "СПО": 2}},
                    "list": {"sheets": {"students": "Р2_1_1", "graduates": null}},
                    "to_sheet": "rows"
                },
                "funcs": {
                    "students": {
                        "array": "$A$12:$W$467",
                        "row_num": {"lookup_array": "D", "lookup_value": "A2"},
                        "columns_num": {"lookup_value": "\"Всего\"", "match_type": 0}
                    },
                    "graduates": {}
                },
                "summary_sheet": {"name": "Итого", "range_col": "A", "criteria_col": "A"}
            },
            "2020": {},
            "2021": {"summary_sheet": {"name": "None"}}
        }))
        .expect("document parsed")
    }

    fn template() -> OutputGrid {
        let mut sheet = Sheet::new("шаблон");
        sheet.set(1, 0, CellValue::Text("Код".into()));
        sheet.set(1, 1, CellValue::Text("Наименование".into()));
        sheet.set(2, 0, CellValue::Text("01".into()));
        sheet.set(3, 0, CellValue::Text("02".into()));
        let mut grid = OutputGrid::new();
        grid.push_sheet(sheet);
        grid
    }

    #[test]
    fn selects_all_or_known_periods() {
        let document = document();
        assert_eq!(select_periods(&document, &[]), ["2020", "2021"]);
        assert_eq!(select_periods(&document, &["ALL".into()]), ["2020", "2021"]);
        assert_eq!(
            select_periods(&document, &["2021".into(), "1999".into()]),
            ["2021"]
        );
    }

    #[test]
    fn output_name_drops_last_template_segment() {
        let out = Path::new("/out");
        assert_eq!(
            output_path(out, "2020", Path::new("templates/vpo_template_v2.xlsx")),
            Path::new("/out/2020_vpo_template.xlsx")
        );
        assert_eq!(
            output_path(out, "2020", Path::new("template.xlsx")),
            Path::new("/out/2020_template.xlsx")
        );
    }

    #[test]
    fn grid_gets_one_column_per_source_and_placement() {
        let document = document();
        let config = document.effective("2020").expect("config resolved");
        let destination = Path::new("/data/out");
        let sources = [
            PathBuf::from("/data/out/a_свод.xlsx"),
            PathBuf::from("/data/in/b_свод.xlsx"),
        ];

        let grid = build_period_grid(&config, template(), &sources, destination)
            .expect("grid built");

        assert_eq!(grid.sheet_names(), ["ВО", "СПО", "Итого"]);
        let sheet = grid.sheet("ВО").expect("output sheet");
        let headers: Vec<&str> = (2..6).filter_map(|col| sheet.header(col)).collect();
        assert_eq!(
            headers,
            ["a_свод_students", "a_свод_graduates", "b_свод_students", "b_свод_graduates"]
        );

        let Some(CellValue::Formula(local)) = sheet.get(3, 2) else {
            panic!("expected a formula");
        };
        assert!(local.starts_with("=IFERROR(INDEX('[a_свод.xlsx]Р2_1_1'!$A$12:$W$467,"));
        assert!(local.contains("$D$12:$D$467=A3)"));
        assert_eq!(sheet.get(2, 3), Some(&CellValue::Formula("=NA()".into())));
        let Some(CellValue::Formula(remote)) = sheet.get(2, 4) else {
            panic!("expected a formula");
        };
        assert!(remote.contains("'/data/in/[b_свод.xlsx]Р2_1_1'!"));

        let summary = grid.sheet("Итого").expect("summary sheet");
        assert_eq!(summary.header(2), Some("a_свод_students"));
        assert_eq!(
            summary.get(2, 2),
            Some(&CellValue::Formula(
                "=SUMIF('ВО'!$A:$A,$A2,'ВО'!C:C) + SUMIF('СПО'!$A:$A,$A2,'СПО'!C:C)".into()
            ))
        );
    }

    #[test]
    fn disabled_summary_without_sources_leaves_no_sheets() {
        let document = document();
        let config = document.effective("2021").expect("config resolved");
        let grid = build_period_grid(&config, template(), &[], Path::new("/out"))
            .expect("grid built");
        assert!(grid.sheet_names().is_empty());
    }
}
