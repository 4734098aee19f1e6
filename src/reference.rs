//! A1-style reference arithmetic.
//!
//! Columns are handled as zero-based indices internally and rows as the
//! one-based numbers that appear in formula text.

use std::fmt;

use crate::error::{Result, ToolError};

/// Highest zero-based column index an xlsx worksheet can hold (`XFD`).
pub const MAX_COLUMN: u16 = 16_383;

/// Converts a column label such as `A` or `AB` into a zero-based index.
pub fn column_index(label: &str) -> Option<u16> {
    if label.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in label.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        if col > MAX_COLUMN as u32 + 1 {
            return None;
        }
    }
    Some((col - 1) as u16)
}

/// Converts a zero-based column index into its letter label.
pub fn column_letter(index: u16) -> String {
    let mut n = index as u32 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// An absolute cell reference such as `$A$12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellAddress {
    /// Zero-based column index.
    pub column: u16,
    /// One-based row number.
    pub row: u32,
}

impl CellAddress {
    /// Parses a fully absolute reference (`$COL$ROW`).
    pub fn parse_absolute(text: &str) -> Result<Self> {
        let invalid = || ToolError::InvalidReference(text.to_string());
        let rest = text.trim().strip_prefix('$').ok_or_else(invalid)?;
        let (letters, row) = rest.split_once('$').ok_or_else(invalid)?;
        let column = column_index(letters).ok_or_else(invalid)?;
        if row.is_empty() || !row.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid());
        }
        let row: u32 = row.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }
        Ok(Self { column, row })
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}${}", column_letter(self.column), self.row)
    }
}

/// A rectangular absolute range parsed from two corners (`$A$12:$W$467`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Parses `$A$12:$W$467`. Sheet-qualified corners are rejected because
    /// the sheet is supplied separately by the formula compiler.
    pub fn parse_absolute(text: &str) -> Result<Self> {
        let invalid = || ToolError::InvalidReference(text.to_string());
        if text.contains('!') {
            return Err(invalid());
        }
        let (first, second) = text.split_once(':').ok_or_else(invalid)?;
        let start = CellAddress::parse_absolute(first)?;
        let end = CellAddress::parse_absolute(second)?;
        if start.row > end.row || start.column > end.column {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }

    pub fn start_row(&self) -> u32 {
        self.start.row
    }

    pub fn end_row(&self) -> u32 {
        self.end.row
    }

    pub fn start_column(&self) -> u16 {
        self.start.column
    }

    pub fn end_column(&self) -> u16 {
        self.end.column
    }

    /// Single-column slice of this range's rows at `column`.
    pub fn column_slice(&self, column: u16) -> CellRange {
        CellRange {
            start: CellAddress {
                column,
                row: self.start.row,
            },
            end: CellAddress {
                column,
                row: self.end.row,
            },
        }
    }

    /// The first row of the range, used as the header row.
    pub fn header_row(&self) -> CellRange {
        CellRange {
            start: self.start,
            end: CellAddress {
                column: self.end.column,
                row: self.start.row,
            },
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Parses a bare column label (optionally `$`-prefixed) from configuration.
pub fn parse_column(text: &str) -> Result<u16> {
    let trimmed = text.trim();
    let label = trimmed.strip_prefix('$').unwrap_or(trimmed);
    column_index(label).ok_or_else(|| ToolError::InvalidReference(text.to_string()))
}
