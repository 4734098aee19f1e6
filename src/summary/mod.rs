//! Summary sheet synthesis over the filled grid.
//!
//! Two modes exist. Per-header mode adds one summary column per distinct
//! generated header; tag-group mode adds one column per keyword set and
//! combines every header whose tokens contain the set. Either way a summary
//! cell is the sum of `SUMIF` terms over the contributing sheets, matching a
//! fixed range column there against the criteria column of the summary row.

mod tags;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::config::{SummarySpec, TagGroup};
use crate::error::Result;
use crate::formula::{BinaryOp, Expr, FormulaTemplate, RowHole, SheetRef};
use crate::model::{CellValue, OutputGrid, Sheet};
use crate::reference::parse_column;

pub use tags::{header_matches, tokenize};

/// Generated headers of one contributing sheet, left to right.
#[derive(Debug, Clone, PartialEq)]
struct SheetHeaders {
    sheet: String,
    headers: Vec<(u16, String)>,
}

/// Source columns feeding one summary column, grouped by sheet.
#[derive(Debug, Clone, PartialEq)]
struct SummarySource {
    header: String,
    sources: Vec<(String, Vec<u16>)>,
}

/// What was written to the summary sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryReport {
    pub sheet: String,
    pub columns: Vec<SummaryColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryColumn {
    pub header: String,
    pub column: u16,
    /// Number of source columns summed; 0 leaves the data cells empty.
    pub source_columns: usize,
}

/// Builds the summary sheet described by `spec`.
///
/// `contributing` lists candidate sheets in order; `first_write` holds the
/// first generated column of each sheet and bounds the header scan. Sheets
/// without a recorded write contribute nothing. `base_sheet` is copied when
/// the summary sheet does not exist yet.
pub fn build_summary(
    grid: &mut OutputGrid,
    spec: &SummarySpec,
    contributing: &[String],
    first_write: &IndexMap<String, u16>,
    base_sheet: &str,
) -> Result<Option<SummaryReport>> {
    let Some(name) = spec.sheet_name() else {
        return Ok(None);
    };
    let range_column = parse_column(&spec.range_col)?;
    let criteria_column = parse_column(&spec.criteria_col)?;

    let headers: Vec<SheetHeaders> = contributing
        .iter()
        .filter(|sheet| sheet.as_str() != name)
        .filter_map(|sheet| {
            let start = *first_write.get(sheet)?;
            let source = grid.sheet(sheet)?;
            Some(collect_headers(source, start))
        })
        .collect();

    let plan = match &spec.tag_groups {
        Some(groups) => plan_tag_groups(&headers, groups),
        None => plan_per_header(&headers),
    };

    if !grid.contains(name) {
        let sheet = grid
            .sheet(base_sheet)
            .or_else(|| grid.first_sheet())
            .map(|base| base.copy_structure(name))
            .unwrap_or_else(|| Sheet::new(name));
        grid.push_sheet(sheet);
    }
    let Some(summary) = grid.sheet_mut(name) else {
        return Ok(None);
    };

    let start = summary.first_empty_column();
    let last_row = summary.last_row();
    let criteria = RowHole::new(criteria_column, true);
    let mut columns = Vec::with_capacity(plan.len());

    for (offset, entry) in plan.iter().enumerate() {
        let column = start + offset as u16;
        summary.set(1, column, CellValue::Text(entry.header.clone()));
        let source_columns = entry.sources.iter().map(|(_, cols)| cols.len()).sum();
        if let Some(template) = sum_template(&entry.sources, range_column, &criteria) {
            for row in 2..=last_row {
                summary.set(row, column, CellValue::Formula(template.for_row(row)));
            }
        } else {
            debug!(header = %entry.header, "no contributing columns, cells left empty");
        }
        columns.push(SummaryColumn {
            header: entry.header.clone(),
            column,
            source_columns,
        });
    }

    info!(
        sheet = name,
        columns = columns.len(),
        contributing = headers.len(),
        "summary sheet built"
    );
    Ok(Some(SummaryReport {
        sheet: name.to_string(),
        columns,
    }))
}

/// Scans row 1 from `start` until the first empty cell.
fn collect_headers(sheet: &Sheet, start: u16) -> SheetHeaders {
    let mut headers = Vec::new();
    let mut column = start;
    while let Some(cell) = sheet.get(1, column) {
        if let Some(text) = cell.as_text() {
            headers.push((column, text.to_string()));
        }
        column += 1;
    }
    SheetHeaders {
        sheet: sheet.name().to_string(),
        headers,
    }
}

/// One entry per distinct header, first-seen order; first matching column per sheet.
fn plan_per_header(sheets: &[SheetHeaders]) -> Vec<SummarySource> {
    let mut distinct: Vec<&str> = Vec::new();
    for sheet in sheets {
        for (_, header) in &sheet.headers {
            if !distinct.contains(&header.as_str()) {
                distinct.push(header);
            }
        }
    }

    distinct
        .into_iter()
        .map(|header| SummarySource {
            header: header.to_string(),
            sources: sheets
                .iter()
                .filter_map(|sheet| {
                    sheet
                        .headers
                        .iter()
                        .find(|(_, text)| text == header)
                        .map(|(column, _)| (sheet.sheet.clone(), vec![*column]))
                })
                .collect(),
        })
        .collect()
}

/// One entry per tag group; every matching column of every sheet.
fn plan_tag_groups(sheets: &[SheetHeaders], groups: &[TagGroup]) -> Vec<SummarySource> {
    groups
        .iter()
        .map(|group| SummarySource {
            header: group.display_name(),
            sources: sheets
                .iter()
                .filter_map(|sheet| {
                    let matched: Vec<u16> = sheet
                        .headers
                        .iter()
                        .filter(|(_, text)| header_matches(group, text))
                        .map(|(column, _)| *column)
                        .collect();
                    (!matched.is_empty()).then(|| (sheet.sheet.clone(), matched))
                })
                .collect(),
        })
        .collect()
}

/// `SUMIF` terms joined across sheets; several columns of one sheet are
/// summed inside a group first.
fn sum_template(
    sources: &[(String, Vec<u16>)],
    range_column: u16,
    criteria: &RowHole,
) -> Option<FormulaTemplate> {
    let per_sheet = sources.iter().filter_map(|(sheet, columns)| {
        let sheet_ref = SheetRef::Local(sheet.clone());
        let terms = columns
            .iter()
            .map(|column| sumif(&sheet_ref, range_column, criteria, *column));
        let summed = Expr::fold(terms, BinaryOp::Add)?;
        Some(if columns.len() > 1 {
            Expr::group(summed)
        } else {
            summed
        })
    });
    Expr::fold(per_sheet, BinaryOp::Add).map(FormulaTemplate::new)
}

fn sumif(sheet: &SheetRef, range_column: u16, criteria: &RowHole, column: u16) -> Expr {
    Expr::call(
        "SUMIF",
        vec![
            Expr::Column {
                sheet: Some(sheet.clone()),
                column: range_column,
                absolute: true,
            },
            Expr::RowHole(criteria.clone()),
            Expr::Column {
                sheet: Some(sheet.clone()),
                column,
                absolute: false,
            },
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    /// Template with code/name columns and three data rows, plus generated
    /// headers starting at column C.
    fn sheet(name: &str, generated: &[&str]) -> Sheet {
        let mut sheet = Sheet::new(name);
        sheet.set(1, 0, text("Код"));
        sheet.set(1, 1, text("Наименование"));
        for row in 2..=4 {
            sheet.set(row, 0, text(&format!("{row:03}")));
        }
        for (offset, header) in generated.iter().enumerate() {
            sheet.set(1, 2 + offset as u16, text(header));
        }
        sheet
    }

    fn grid() -> (OutputGrid, IndexMap<String, u16>) {
        let mut grid = OutputGrid::new();
        grid.push_sheet(sheet("шаблон", &[]));
        grid.push_sheet(sheet("ВО", &["f_Москва очная", "f_Москва заочная"]));
        grid.push_sheet(sheet(
            "СПО",
            &["f_Москва заочная", "f_Москва очно-заочная заочная"],
        ));
        let first_write = [("ВО".to_string(), 2), ("СПО".to_string(), 2)]
            .into_iter()
            .collect();
        (grid, first_write)
    }

    fn spec(tag_groups: Option<Vec<TagGroup>>) -> SummarySpec {
        SummarySpec {
            name: Some("Итого".into()),
            range_col: "A".into(),
            criteria_col: "A".into(),
            tag_groups,
        }
    }

    fn contributing() -> Vec<String> {
        vec!["ВО".into(), "СПО".into(), "ДПО".into()]
    }

    #[test]
    fn per_header_mode_sums_first_match_per_sheet() {
        let (mut grid, first_write) = grid();
        let report = build_summary(&mut grid, &spec(None), &contributing(), &first_write, "шаблон")
            .expect("summary built")
            .expect("summary enabled");

        let headers: Vec<&str> = report.columns.iter().map(|c| c.header.as_str()).collect();
        assert_eq!(
            headers,
            [
                "f_Москва очная",
                "f_Москва заочная",
                "f_Москва очно-заочная заочная"
            ]
        );
        assert_eq!(report.columns[0].column, 2);

        let summary = grid.sheet("Итого").expect("summary sheet");
        assert_eq!(summary.header(0), Some("Код"));
        assert_eq!(summary.header(3), Some("f_Москва заочная"));
        assert_eq!(
            summary.get(2, 2),
            Some(&CellValue::Formula("=SUMIF('ВО'!$A:$A,$A2,'ВО'!C:C)".into()))
        );
        assert_eq!(
            summary.get(4, 3),
            Some(&CellValue::Formula(
                "=SUMIF('ВО'!$A:$A,$A4,'ВО'!D:D) + SUMIF('СПО'!$A:$A,$A4,'СПО'!C:C)".into()
            ))
        );
        assert_eq!(summary.get(5, 3), None);
    }

    #[test]
    fn tag_mode_groups_matching_columns_inside_a_sheet() {
        let (mut grid, first_write) = grid();
        let groups = vec![
            TagGroup::new(["москва", "заочная"]),
            TagGroup::new(["москва", "вечерняя"]),
        ];
        let report = build_summary(
            &mut grid,
            &spec(Some(groups)),
            &contributing(),
            &first_write,
            "шаблон",
        )
        .expect("summary built")
        .expect("summary enabled");

        assert_eq!(report.columns[0].header, "москва заочная");
        assert_eq!(report.columns[0].source_columns, 3);
        assert_eq!(report.columns[1].source_columns, 0);

        let summary = grid.sheet("Итого").expect("summary sheet");
        assert_eq!(
            summary.get(3, 2),
            Some(&CellValue::Formula(
                "=SUMIF('ВО'!$A:$A,$A3,'ВО'!D:D) + (SUMIF('СПО'!$A:$A,$A3,'СПО'!C:C) + SUMIF('СПО'!$A:$A,$A3,'СПО'!D:D))"
                    .into()
            ))
        );
        assert_eq!(summary.header(3), Some("москва вечерняя"));
        for row in 2..=4 {
            assert_eq!(summary.get(row, 3), None);
        }
    }

    #[test]
    fn sheets_without_writes_do_not_contribute() {
        let (mut grid, mut first_write) = grid();
        first_write.shift_remove("СПО");
        let report = build_summary(&mut grid, &spec(None), &contributing(), &first_write, "шаблон")
            .expect("summary built")
            .expect("summary enabled");
        assert_eq!(report.columns.len(), 2);
        assert!(report.columns.iter().all(|c| c.source_columns == 1));
    }

    #[test]
    fn disabled_summary_writes_nothing() {
        let (mut grid, first_write) = grid();
        let mut disabled = spec(None);
        disabled.name = Some("None".into());
        let report = build_summary(&mut grid, &disabled, &contributing(), &first_write, "шаблон")
            .expect("no error");
        assert!(report.is_none());
        assert!(!grid.contains("None"));
    }
}
