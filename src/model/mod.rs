use std::collections::BTreeMap;

/// Value stored in an output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    /// Formula text including the leading `=`.
    Formula(String),
}

impl CellValue {
    /// Text shown for header matching; formulas and numbers have none.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Where a generated column came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Source file name without extension.
    pub source_stem: String,
    pub sheet_key: String,
    pub column_key: String,
    pub column_label: String,
}

/// One worksheet of the output grid.
///
/// Rows are one-based (as in formula text), columns zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    cells: BTreeMap<(u32, u16), CellValue>,
    column_widths: BTreeMap<u16, f64>,
    provenance: BTreeMap<u16, Provenance>,
    /// Memoised first empty header column; only ever moves right.
    header_cursor: Option<u16>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            column_widths: BTreeMap::new(),
            provenance: BTreeMap::new(),
            header_cursor: None,
        }
    }

    /// Copies cell values and column widths of `self` into a new sheet.
    pub fn copy_structure(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: self.cells.clone(),
            column_widths: self.column_widths.clone(),
            provenance: BTreeMap::new(),
            header_cursor: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, row: u32, column: u16) -> Option<&CellValue> {
        self.cells.get(&(row, column))
    }

    pub fn set(&mut self, row: u32, column: u16, value: CellValue) {
        self.cells.insert((row, column), value);
        if row == 1 && self.header_cursor == Some(column) {
            self.header_cursor = Some(self.scan_header_from(column));
        }
    }

    /// Header text of `column` (row 1).
    pub fn header(&self, column: u16) -> Option<&str> {
        self.get(1, column).and_then(CellValue::as_text)
    }

    /// Last row holding any value, 0 for an empty sheet.
    pub fn last_row(&self) -> u32 {
        self.cells.keys().map(|(row, _)| *row).max().unwrap_or(0)
    }

    /// One past the rightmost column holding any value.
    pub fn column_span(&self) -> u16 {
        self.cells
            .keys()
            .map(|(_, column)| column + 1)
            .max()
            .unwrap_or(0)
    }

    /// First column whose row-1 cell is empty, scanning from column A.
    pub fn first_empty_column(&mut self) -> u16 {
        if let Some(column) = self.header_cursor {
            return column;
        }
        let column = self.scan_header_from(0);
        self.header_cursor = Some(column);
        column
    }

    fn scan_header_from(&self, start: u16) -> u16 {
        let mut column = start;
        while self.cells.contains_key(&(1, column)) {
            column += 1;
        }
        column
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u16, &CellValue)> {
        self.cells
            .iter()
            .map(|((row, column), value)| (*row, *column, value))
    }

    pub fn set_column_width(&mut self, column: u16, width: f64) {
        self.column_widths.insert(column, width);
    }

    pub fn column_widths(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.column_widths
            .iter()
            .map(|(column, width)| (*column, *width))
    }

    pub fn record_provenance(&mut self, column: u16, provenance: Provenance) {
        self.provenance.insert(column, provenance);
    }

    pub fn provenance(&self, column: u16) -> Option<&Provenance> {
        self.provenance.get(&column)
    }

    /// Columns written by the grid writer, left to right.
    pub fn generated_columns(&self) -> impl Iterator<Item = (u16, &Provenance)> {
        self.provenance
            .iter()
            .map(|(column, provenance)| (*column, provenance))
    }
}

/// An ordered set of named sheets making up one output workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputGrid {
    sheets: Vec<Sheet>,
}

impl OutputGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(Sheet::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sheet(name).is_some()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|sheet| sheet.name == name)
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    /// Appends `sheet`, replacing any sheet with the same name in place.
    pub fn push_sheet(&mut self, sheet: Sheet) {
        match self.sheets.iter_mut().find(|existing| existing.name == sheet.name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    /// Removes a sheet by name, returning it if present.
    pub fn remove_sheet(&mut self, name: &str) -> Option<Sheet> {
        let index = self.sheets.iter().position(|sheet| sheet.name == name)?;
        Some(self.sheets.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    #[test]
    fn first_empty_column_is_memoised_and_advances() {
        let mut sheet = Sheet::new("ВО");
        sheet.set(1, 0, text("Код"));
        sheet.set(1, 1, text("Наименование"));
        sheet.set(1, 3, text("После пропуска"));

        assert_eq!(sheet.first_empty_column(), 2);
        sheet.set(1, 2, text("svod_students"));
        assert_eq!(sheet.first_empty_column(), 4);
        sheet.set(5, 4, text("not a header"));
        assert_eq!(sheet.first_empty_column(), 4);
    }

    #[test]
    fn copy_structure_keeps_cells_and_widths_only() {
        let mut template = Sheet::new("шаблон");
        template.set(1, 0, text("Код"));
        template.set(3, 0, text("001"));
        template.set_column_width(0, 18.5);
        template.record_provenance(0, Provenance {
            source_stem: "s".into(),
            sheet_key: "k".into(),
            column_key: "c".into(),
            column_label: "c".into(),
        });

        let copy = template.copy_structure("ВО");
        assert_eq!(copy.name(), "ВО");
        assert_eq!(copy.last_row(), 3);
        assert_eq!(copy.column_span(), 1);
        assert_eq!(copy.column_widths().collect::<Vec<_>>(), [(0, 18.5)]);
        assert_eq!(copy.generated_columns().count(), 0);
    }

    #[test]
    fn grid_keeps_sheet_order_and_replaces_by_name() {
        let mut grid = OutputGrid::new();
        grid.push_sheet(Sheet::new("шаблон"));
        grid.push_sheet(Sheet::new("ВО"));
        let mut replacement = Sheet::new("шаблон");
        replacement.set(1, 0, text("x"));
        grid.push_sheet(replacement);

        assert_eq!(grid.sheet_names(), ["шаблон", "ВО"]);
        assert_eq!(grid.first_sheet().unwrap().last_row(), 1);
        assert!(grid.remove_sheet("шаблон").is_some());
        assert!(grid.remove_sheet("шаблон").is_none());
        assert_eq!(grid.sheet_names(), ["ВО"]);
    }
}
