use std::collections::HashMap;
use std::path::{Path, PathBuf};

use calamine::{DataType, Reader, Xlsx, open_workbook, open_workbook_auto};
use tracing::{debug, warn};

use crate::error::{Result, ToolError};
use crate::io::layout;
use crate::model::{CellValue, OutputGrid, Sheet};

/// Reads the template workbook into an output grid: every sheet with its
/// cell values, formulas and column widths, in workbook order.
///
/// Formula cells keep their formula text; cached results are ignored.
pub fn read_template(path: &Path) -> Result<OutputGrid> {
    if !path.exists() {
        return Err(ToolError::MissingInput(path.to_path_buf()));
    }
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let mut widths = layout::read_column_widths(path)?;

    let mut grid = OutputGrid::new();
    for name in workbook.sheet_names().to_vec() {
        let mut sheet = Sheet::new(name.as_str());

        let range = read_required_sheet(&mut workbook, &name)?;
        let origin = range.start().unwrap_or((0, 0));
        for (row_offset, row) in range.rows().enumerate() {
            for (col_offset, cell) in row.iter().enumerate() {
                let Some(value) = cell_value(cell) else {
                    continue;
                };
                let (row_number, column) = position(&name, origin, row_offset, col_offset)?;
                sheet.set(row_number, column, value);
            }
        }

        if let Some(formulas) = workbook.worksheet_formula(&name) {
            let formulas = formulas?;
            let origin = formulas.start().unwrap_or((0, 0));
            for (row_offset, row) in formulas.rows().enumerate() {
                for (col_offset, formula) in row.iter().enumerate() {
                    if formula.is_empty() {
                        continue;
                    }
                    let (row_number, column) = position(&name, origin, row_offset, col_offset)?;
                    sheet.set(row_number, column, CellValue::Formula(format!("={formula}")));
                }
            }
        }

        for (column, width) in widths.remove(&name).unwrap_or_default() {
            sheet.set_column_width(column, width);
        }
        debug!(sheet = %name, rows = sheet.last_row(), "template sheet loaded");
        grid.push_sheet(sheet);
    }

    if grid.sheets().is_empty() {
        return Err(ToolError::InvalidTemplate(format!(
            "{} contains no sheets",
            path.display()
        )));
    }
    Ok(grid)
}

/// One-based row and zero-based column of a cell inside a range at `origin`.
fn position(
    sheet: &str,
    origin: (u32, u32),
    row_offset: usize,
    col_offset: usize,
) -> Result<(u32, u16)> {
    let (first_row, first_col) = origin;
    let row_number = first_row + row_offset as u32 + 1;
    let column = u16::try_from(first_col as usize + col_offset).map_err(|_| {
        ToolError::InvalidTemplate(format!("sheet '{sheet}' is wider than a worksheet"))
    })?;
    Ok((row_number, column))
}

fn read_required_sheet<R: std::io::Read + std::io::Seek>(
    workbook: &mut Xlsx<R>,
    name: &str,
) -> Result<calamine::Range<DataType>> {
    let range_result = workbook
        .worksheet_range(name)
        .ok_or_else(|| ToolError::InvalidTemplate(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(ToolError::from)?;
    Ok(range)
}

fn cell_value(cell: &DataType) -> Option<CellValue> {
    match cell {
        DataType::Empty => None,
        DataType::String(value) if value.is_empty() => None,
        DataType::String(value) => Some(CellValue::Text(value.clone())),
        DataType::Float(value) => Some(CellValue::Number(*value)),
        DataType::Int(value) => Some(CellValue::Number(*value as f64)),
        DataType::Bool(value) => Some(CellValue::Boolean(*value)),
        other => Some(CellValue::Text(other.to_string())),
    }
}

/// Answers whether source workbooks contain a sheet, opening each file once.
#[derive(Debug, Default)]
pub struct SheetProbe {
    known: HashMap<PathBuf, Vec<String>>,
}

impl SheetProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_sheet(&mut self, path: &Path, sheet: &str) -> Result<bool> {
        if !self.known.contains_key(path) {
            let names = sheet_names(path)?;
            self.known.insert(path.to_path_buf(), names);
        }
        let present = self
            .known
            .get(path)
            .is_some_and(|names| names.iter().any(|name| name == sheet));
        if !present {
            warn!(source = %path.display(), sheet, "sheet not found in source workbook");
        }
        Ok(present)
    }
}

/// Sheet names of a workbook in any format calamine understands.
pub fn sheet_names(path: &Path) -> Result<Vec<String>> {
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names().to_vec())
}

#[cfg(test)]
mod tests {
    use rust_xlsxwriter::Workbook;
    use tempfile::tempdir;

    use super::*;
    use crate::io::excel_write::write_grid;

    #[test]
    fn template_round_trips_values_and_widths() {
        let temp_dir = tempdir().expect("temporary directory");
        let path = temp_dir.path().join("vpo_template_v1.xlsx");

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("шаблон").expect("sheet named");
        worksheet.write_string(0, 0, "Код").expect("cell written");
        worksheet.write_string(0, 1, "Наименование").expect("cell written");
        worksheet.write_number(1, 0, 1.0).expect("cell written");
        worksheet.write_string(2, 1, "МГУ").expect("cell written");
        worksheet.set_column_width(1, 42.0).expect("width set");
        workbook.add_worksheet().set_name("ВО").expect("sheet named");
        workbook.save(&path).expect("workbook saved");

        let grid = read_template(&path).expect("template read");

        assert_eq!(grid.sheet_names(), ["шаблон", "ВО"]);
        let template = grid.sheet("шаблон").expect("template sheet");
        assert_eq!(template.header(1), Some("Наименование"));
        assert_eq!(template.get(2, 0), Some(&CellValue::Number(1.0)));
        assert_eq!(template.last_row(), 3);
        assert_eq!(template.column_widths().collect::<Vec<_>>(), [(1, 42.0)]);

        let mut probe = SheetProbe::new();
        assert!(probe.has_sheet(&path, "ВО").expect("probe succeeded"));
        assert!(!probe.has_sheet(&path, "СПО").expect("probe succeeded"));
    }

    #[test]
    fn template_formulas_are_kept_as_formulas() {
        let temp_dir = tempdir().expect("temporary directory");
        let path = temp_dir.path().join("template.xlsx");

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("шаблон").expect("sheet named");
        worksheet.write_string(0, 0, "Код").expect("cell written");
        worksheet.write_number(1, 0, 4.0).expect("cell written");
        worksheet.write_formula(1, 1, "=A2*2").expect("formula written");
        worksheet.write_formula(3, 0, "=SUM(A2:A3)").expect("formula written");
        workbook.save(&path).expect("workbook saved");

        let grid = read_template(&path).expect("template read");
        let template = grid.sheet("шаблон").expect("template sheet");

        assert_eq!(template.get(2, 1), Some(&CellValue::Formula("=A2*2".into())));
        assert_eq!(
            template.get(4, 0),
            Some(&CellValue::Formula("=SUM(A2:A3)".into()))
        );
        assert_eq!(template.get(2, 0), Some(&CellValue::Number(4.0)));
        assert_eq!(template.last_row(), 4);
    }

    #[test]
    fn widths_survive_repeated_copies() {
        let temp_dir = tempdir().expect("temporary directory");
        let path = temp_dir.path().join("template.xlsx");

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name("шаблон").expect("sheet named");
        worksheet.write_string(0, 0, "Код").expect("cell written");
        worksheet.set_column_width(0, 12.0).expect("width set");
        worksheet.set_column_width(1, 30.0).expect("width set");
        workbook.save(&path).expect("workbook saved");

        let mut current = path;
        for generation in 0..3 {
            let grid = read_template(&current).expect("template read");
            let next = temp_dir.path().join(format!("copy_{generation}.xlsx"));
            write_grid(&next, &grid).expect("grid written");
            current = next;
        }

        let widths = layout::read_column_widths(&current).expect("widths read");
        assert_eq!(
            widths["шаблон"].iter().map(|(c, w)| (*c, *w)).collect::<Vec<_>>(),
            [(0, 12.0), (1, 30.0)]
        );
    }

    #[test]
    fn missing_template_is_reported() {
        let result = read_template(Path::new("/no/such/template.xlsx"));
        assert!(matches!(result, Err(ToolError::MissingInput(_))));
    }
}
