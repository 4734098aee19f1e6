//! Places compiled formulas into the output grid.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::{Result, ToolError};
use crate::formula::GeneratedFormula;
use crate::model::{CellValue, OutputGrid, Provenance};

/// Appends generated columns to the sheets of one period's grid.
///
/// Columns go to the first empty header cell of their sheet, left to right.
/// The writer remembers, per sheet, the column of its first write; the
/// aggregation pass scans headers from there.
#[derive(Debug)]
pub struct GridWriter<'g> {
    grid: &'g mut OutputGrid,
    /// Sheet copied when a requested output sheet does not exist yet.
    base_sheet: String,
    first_write: IndexMap<String, u16>,
}

impl<'g> GridWriter<'g> {
    pub fn new(grid: &'g mut OutputGrid, base_sheet: impl Into<String>) -> Self {
        Self {
            grid,
            base_sheet: base_sheet.into(),
            first_write: IndexMap::new(),
        }
    }

    /// Creates `name` from the base sheet (or the first sheet) when missing.
    pub fn ensure_sheet(&mut self, name: &str) -> Result<()> {
        if self.grid.contains(name) {
            return Ok(());
        }
        let base = self
            .grid
            .sheet(&self.base_sheet)
            .or_else(|| self.grid.first_sheet())
            .ok_or_else(|| {
                ToolError::InvalidTemplate(format!("no sheet to copy for output sheet '{name}'"))
            })?;
        let sheet = base.copy_structure(name);
        debug!(sheet = name, base = base.name(), "created output sheet");
        self.grid.push_sheet(sheet);
        Ok(())
    }

    /// Writes one column: the header `<stem>_<label>` in row 1 and the
    /// row-specific formula in rows 2 through the sheet's last row.
    pub fn write_column(
        &mut self,
        sheet_name: &str,
        provenance: Provenance,
        formula: &GeneratedFormula,
    ) -> Result<u16> {
        self.ensure_sheet(sheet_name)?;
        let sheet = self
            .grid
            .sheet_mut(sheet_name)
            .ok_or_else(|| ToolError::InvalidTemplate(format!("missing sheet '{sheet_name}'")))?;

        let column = sheet.first_empty_column();
        let last_row = sheet.last_row();
        let header = format!("{}_{}", provenance.source_stem, provenance.column_label);

        sheet.set(1, column, CellValue::Text(header));
        for row in 2..=last_row {
            sheet.set(row, column, CellValue::Formula(formula.for_row(row)));
        }
        sheet.record_provenance(column, provenance);
        self.first_write
            .entry(sheet_name.to_string())
            .or_insert(column);

        trace!(
            sheet = sheet_name,
            column,
            rows = last_row.saturating_sub(1),
            applicable = formula.sheet_exists(),
            "column written"
        );
        Ok(column)
    }

    /// Column of the first write into each sheet during this period.
    pub fn first_write_columns(&self) -> &IndexMap<String, u16> {
        &self.first_write
    }

    pub fn into_first_write_columns(self) -> IndexMap<String, u16> {
        self.first_write
    }
}
