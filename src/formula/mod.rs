//! Formula construction.
//!
//! Formulas are assembled as a small expression tree and rendered to the
//! spreadsheet's formula text. A tree may contain [`RowHole`] nodes: cell
//! references whose row is filled in when the template is rendered for a
//! destination row, so per-row formulas differ only in those references.
//!
//! External references spell the source directory with the configured path
//! separator (`formula.path_separator`, the host's by default); set it to `\`
//! for workbooks opened by Excel on Windows.

mod compile;

use std::fmt::{self, Write as _};
use std::path::Path;

use crate::error::{Result, ToolError};
use crate::reference::{CellRange, column_index, column_letter};

pub use compile::{FormulaCompiler, RangeSpec};

/// Formula written into every row of a column whose source sheet is absent.
pub const NOT_APPLICABLE: &str = "=NA()";

/// Worksheet qualifier of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRef {
    /// A sheet inside another workbook. `directory` ends with its separator
    /// and is omitted when the source workbook lives next to the output.
    External {
        directory: Option<String>,
        file_name: String,
        sheet: String,
    },
    /// A sheet of the workbook being written.
    Local(String),
}

impl SheetRef {
    /// Builds the external reference used for `source` when the output is
    /// written into `destination_dir`, spelling directories with `separator`.
    pub fn external(
        source: &Path,
        destination_dir: &Path,
        sheet: &str,
        separator: char,
    ) -> Result<Self> {
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ToolError::MissingInput(source.to_path_buf()))?
            .to_string();
        let directory = match source.parent() {
            Some(parent) if parent == destination_dir => None,
            Some(parent) if !parent.as_os_str().is_empty() => {
                let mut directory: String = parent
                    .to_string_lossy()
                    .chars()
                    .map(|ch| if ch == '/' || ch == '\\' { separator } else { ch })
                    .collect();
                if !directory.ends_with(separator) {
                    directory.push(separator);
                }
                Some(directory)
            }
            _ => None,
        };
        Ok(SheetRef::External {
            directory,
            file_name,
            sheet: sheet.to_string(),
        })
    }
}

impl fmt::Display for SheetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = match self {
            SheetRef::External {
                directory: Some(directory),
                file_name,
                sheet,
            } => format!("{directory}[{file_name}]{sheet}"),
            SheetRef::External {
                directory: None,
                file_name,
                sheet,
            } => format!("[{file_name}]{sheet}"),
            SheetRef::Local(sheet) => sheet.clone(),
        };
        write!(f, "'{}'!", inner.replace('\'', "''"))
    }
}

/// A destination-row cell reference such as `A2`, rewritten per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHole {
    pub column: u16,
    pub absolute_column: bool,
    /// Row used when the template is rendered without a destination row.
    pub default_row: Option<u32>,
}

impl RowHole {
    pub fn new(column: u16, absolute_column: bool) -> Self {
        Self {
            column,
            absolute_column,
            default_row: None,
        }
    }

    /// Parses `A2`, `$A2` or a bare column such as `A`.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || ToolError::InvalidReference(text.to_string());
        let trimmed = text.trim();
        let (absolute_column, rest) = match trimmed.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let digits_at = rest
            .find(|ch: char| ch.is_ascii_digit())
            .unwrap_or(rest.len());
        let (letters, digits) = rest.split_at(digits_at);
        let column = column_index(letters).ok_or_else(invalid)?;
        let default_row = if digits.is_empty() {
            None
        } else if digits.chars().all(|ch| ch.is_ascii_digit()) {
            Some(digits.parse().map_err(|_| invalid())?)
        } else {
            return Err(invalid());
        };
        Ok(Self {
            column,
            absolute_column,
            default_row,
        })
    }

    fn write(&self, out: &mut String, row: Option<u32>) {
        if self.absolute_column {
            out.push('$');
        }
        out.push_str(&column_letter(self.column));
        if let Some(row) = row.or(self.default_row) {
            let _ = write!(out, "{row}");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Mul,
    Sub,
    Add,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Mul => "*",
            BinaryOp::Sub => "-",
            BinaryOp::Add => " + ",
        }
    }
}

/// Formula expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Formula text emitted verbatim.
    Literal(String),
    Number(i64),
    /// String literal, quoted on output.
    Text(String),
    Range {
        sheet: Option<SheetRef>,
        range: CellRange,
    },
    /// Whole-column reference such as `$A:$A`.
    Column {
        sheet: Option<SheetRef>,
        column: u16,
        absolute: bool,
    },
    RowHole(RowHole),
    Call {
        function: &'static str,
        args: Vec<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinaryOp,
        rhs: Box<Expr>,
    },
    Group(Box<Expr>),
}

impl Expr {
    pub fn call(function: &'static str, args: Vec<Expr>) -> Self {
        Expr::Call { function, args }
    }

    pub fn binary(lhs: Expr, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub fn group(inner: Expr) -> Self {
        Expr::Group(Box::new(inner))
    }

    /// Joins `terms` with `op`, left-associative. Returns `None` for no terms.
    pub fn fold(terms: impl IntoIterator<Item = Expr>, op: BinaryOp) -> Option<Self> {
        terms
            .into_iter()
            .reduce(|lhs, rhs| Expr::binary(lhs, op, rhs))
    }

    /// Whether the tree contains a row hole.
    pub fn has_row_hole(&self) -> bool {
        match self {
            Expr::RowHole(_) => true,
            Expr::Call { args, .. } => args.iter().any(Expr::has_row_hole),
            Expr::Binary { lhs, rhs, .. } => lhs.has_row_hole() || rhs.has_row_hole(),
            Expr::Group(inner) => inner.has_row_hole(),
            _ => false,
        }
    }

    fn write(&self, out: &mut String, row: Option<u32>) {
        match self {
            Expr::Literal(text) => out.push_str(text),
            Expr::Number(value) => {
                let _ = write!(out, "{value}");
            }
            Expr::Text(text) => {
                let _ = write!(out, "\"{}\"", text.replace('"', "\"\""));
            }
            Expr::Range { sheet, range } => {
                if let Some(sheet) = sheet {
                    let _ = write!(out, "{sheet}");
                }
                let _ = write!(out, "{range}");
            }
            Expr::Column {
                sheet,
                column,
                absolute,
            } => {
                if let Some(sheet) = sheet {
                    let _ = write!(out, "{sheet}");
                }
                let letter = column_letter(*column);
                let prefix = if *absolute { "$" } else { "" };
                let _ = write!(out, "{prefix}{letter}:{prefix}{letter}");
            }
            Expr::RowHole(hole) => hole.write(out, row),
            Expr::Call { function, args } => {
                out.push_str(function);
                out.push('(');
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        out.push(',');
                    }
                    arg.write(out, row);
                }
                out.push(')');
            }
            Expr::Binary { lhs, op, rhs } => {
                lhs.write(out, row);
                out.push_str(op.symbol());
                rhs.write(out, row);
            }
            Expr::Group(inner) => {
                out.push('(');
                inner.write(out, row);
                out.push(')');
            }
        }
    }
}

/// A formula with row holes, rendered once per destination row.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaTemplate {
    body: Expr,
}

impl FormulaTemplate {
    pub fn new(body: Expr) -> Self {
        Self { body }
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    /// Formula text for `row` (one-based).
    pub fn for_row(&self, row: u32) -> String {
        self.render(Some(row))
    }

    /// Formula text with every hole at its configured default row.
    pub fn template_text(&self) -> String {
        self.render(None)
    }

    fn render(&self, row: Option<u32>) -> String {
        let mut out = String::from("=");
        self.body.write(&mut out, row);
        out
    }
}

/// Output of the compiler for one (handler, classification code) pair.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedFormula {
    Lookup(FormulaTemplate),
    /// The source sheet is declared absent; every row gets [`NOT_APPLICABLE`].
    NotApplicable,
}

impl GeneratedFormula {
    pub fn sheet_exists(&self) -> bool {
        matches!(self, GeneratedFormula::Lookup(_))
    }

    pub fn for_row(&self, row: u32) -> String {
        match self {
            GeneratedFormula::Lookup(template) => template.for_row(row),
            GeneratedFormula::NotApplicable => NOT_APPLICABLE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_hole_parses_and_renders_rows() {
        let hole = RowHole::parse("A2").expect("hole parsed");
        assert_eq!(hole, RowHole {
            column: 0,
            absolute_column: false,
            default_row: Some(2)
        });
        let template = FormulaTemplate::new(Expr::RowHole(hole));
        assert_eq!(template.template_text(), "=A2");
        assert_eq!(template.for_row(17), "=A17");

        let bare = RowHole::parse("$C").expect("hole parsed");
        let template = FormulaTemplate::new(Expr::RowHole(bare));
        assert_eq!(template.template_text(), "=$C");
        assert_eq!(template.for_row(4), "=$C4");

        assert!(RowHole::parse("2A").is_err());
        assert!(RowHole::parse("A2B").is_err());
    }

    #[test]
    fn external_sheet_refs_follow_excel_grammar() {
        let bare = SheetRef::External {
            directory: None,
            file_name: "source.xlsx".into(),
            sheet: "Р2_1_1".into(),
        };
        assert_eq!(bare.to_string(), "'[source.xlsx]Р2_1_1'!");

        let quoted = SheetRef::External {
            directory: None,
            file_name: "o'neil.xlsx".into(),
            sheet: "it's".into(),
        };
        assert_eq!(quoted.to_string(), "'[o''neil.xlsx]it''s'!");

        let local = SheetRef::Local("Итого".into());
        assert_eq!(local.to_string(), "'Итого'!");
    }

    #[test]
    fn external_ref_drops_directory_next_to_output() {
        let dir = Path::new("data").join("2020");
        let source = dir.join("svod.xlsx");

        let shared = SheetRef::external(&source, &dir, "S", '/').expect("reference built");
        assert_eq!(shared.to_string(), "'[svod.xlsx]S'!");

        let other =
            SheetRef::external(&source, Path::new("out"), "S", '/').expect("reference built");
        assert_eq!(other.to_string(), "'data/2020/[svod.xlsx]S'!");
    }

    #[test]
    fn external_ref_uses_configured_separator() {
        let source = Path::new("/data/in/VPO_1_2020/svod.xlsx");
        let windows = SheetRef::external(source, Path::new("/data/out"), "Р2_1_1", '\\')
            .expect("reference built");
        assert_eq!(
            windows.to_string(),
            "'\\data\\in\\VPO_1_2020\\[svod.xlsx]Р2_1_1'!"
        );

        let rooted = SheetRef::external(Path::new("/svod.xlsx"), Path::new("/out"), "S", '\\')
            .expect("reference built");
        assert_eq!(rooted.to_string(), "'\\[svod.xlsx]S'!");
    }

    #[test]
    fn renders_calls_groups_and_operators() {
        let expr = Expr::call(
            "SUMIF",
            vec![
                Expr::Column {
                    sheet: Some(SheetRef::Local("ВО".into())),
                    column: 0,
                    absolute: true,
                },
                Expr::RowHole(RowHole::new(0, true)),
                Expr::Column {
                    sheet: Some(SheetRef::Local("ВО".into())),
                    column: 3,
                    absolute: false,
                },
            ],
        );
        let sum = Expr::fold([expr.clone(), Expr::group(expr)], BinaryOp::Add)
            .expect("non-empty terms");
        let template = FormulaTemplate::new(sum);
        assert_eq!(
            template.for_row(5),
            "=SUMIF('ВО'!$A:$A,$A5,'ВО'!D:D) + (SUMIF('ВО'!$A:$A,$A5,'ВО'!D:D))"
        );
        assert!(template.body().has_row_hole());
        assert_eq!(Expr::fold(Vec::new(), BinaryOp::Add), None);
    }

    #[test]
    fn text_literals_escape_quotes() {
        let template = FormulaTemplate::new(Expr::Text("say \"hi\"".into()));
        assert_eq!(template.template_text(), "=\"say \"\"hi\"\"\"");
    }

    #[test]
    fn not_applicable_ignores_row() {
        let formula = GeneratedFormula::NotApplicable;
        assert!(!formula.sheet_exists());
        assert_eq!(formula.for_row(2), NOT_APPLICABLE);
        assert_eq!(formula.for_row(99), NOT_APPLICABLE);
    }
}
