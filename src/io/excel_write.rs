use std::path::Path;

use rust_xlsxwriter::Workbook;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::{CellValue, OutputGrid};

/// Writes the grid to `path`, one worksheet per sheet in grid order.
pub fn write_grid(path: &Path, grid: &OutputGrid) -> Result<()> {
    let mut workbook_writer = Workbook::new();

    for sheet in grid.sheets() {
        let worksheet = workbook_writer.add_worksheet();
        worksheet.set_name(sheet.name())?;
        worksheet.use_future_functions(true);

        for (column, width) in sheet.column_widths() {
            worksheet.set_column_width(column, width)?;
        }

        for (row, column, value) in sheet.cells() {
            let row = row.saturating_sub(1);
            match value {
                CellValue::Text(text) => worksheet.write_string(row, column, text)?,
                CellValue::Number(number) => worksheet.write_number(row, column, *number)?,
                CellValue::Boolean(flag) => worksheet.write_boolean(row, column, *flag)?,
                CellValue::Formula(formula) => {
                    worksheet.write_formula(row, column, formula.as_str())?
                }
            };
        }
        debug!(sheet = sheet.name(), "worksheet serialised");
    }

    workbook_writer
        .save(path)
        .map_err(|source| ToolError::Save {
            path: path.to_path_buf(),
            source,
        })
}
