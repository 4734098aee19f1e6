use tracing::trace;

use crate::config::{
    ClassCode, ErrorPolicy, FormulaPolicy, HandlerSpec, HeaderKey, MatchMode, TieBreak,
};
use crate::error::{Result, ToolError};
use crate::formula::{BinaryOp, Expr, FormulaTemplate, GeneratedFormula, RowHole, SheetRef};
use crate::reference::{CellRange, parse_column};

/// Resolved handler parameters: where the value lives inside a source sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSpec {
    pub array: CellRange,
    /// Column holding the per-row key.
    pub key_column: u16,
    /// Destination cell compared against the key column.
    pub row_key: RowHole,
    pub header_key: HeaderKey,
    pub match_mode: MatchMode,
}

impl RangeSpec {
    /// Validates `handler` and extracts its range parameters.
    pub fn from_handler(name: &str, handler: &HandlerSpec) -> Result<Self> {
        let missing = |reason: String| ToolError::MissingRangeSpec {
            handler: name.to_string(),
            reason,
        };
        let array = handler
            .array
            .as_deref()
            .ok_or_else(|| missing("no 'array' given".into()))?;
        let array = CellRange::parse_absolute(array).map_err(|err| missing(err.to_string()))?;
        let rows = handler
            .row_num
            .as_ref()
            .ok_or_else(|| missing("no 'row_num' given".into()))?;
        let columns = handler
            .columns_num
            .as_ref()
            .ok_or_else(|| missing("no 'columns_num' given".into()))?;
        let key_column =
            parse_column(&rows.lookup_array).map_err(|err| missing(err.to_string()))?;
        let row_key = RowHole::parse(&rows.lookup_value).map_err(|err| missing(err.to_string()))?;

        Ok(Self {
            array,
            key_column,
            row_key,
            header_key: columns.lookup_value.clone(),
            match_mode: columns.match_type,
        })
    }
}

/// Translates handlers into cross-workbook lookup formulas.
#[derive(Debug, Clone)]
pub struct FormulaCompiler<'a> {
    policy: &'a FormulaPolicy,
    /// Source column holding the classification code.
    code_column: u16,
}

impl<'a> FormulaCompiler<'a> {
    pub fn new(policy: &'a FormulaPolicy, code_column: u16) -> Self {
        Self {
            policy,
            code_column,
        }
    }

    /// Separator for source directories in external references.
    pub fn path_separator(&self) -> char {
        self.policy.path_separator()
    }

    /// Compiles the formula reading `handler`'s field for rows classified as
    /// `code`. A `sheet` of `None` means the source sheet is declared absent.
    pub fn compile(
        &self,
        sheet: Option<SheetRef>,
        handler_name: &str,
        handler: &HandlerSpec,
        code: &ClassCode,
    ) -> Result<GeneratedFormula> {
        let Some(sheet) = sheet else {
            return Ok(GeneratedFormula::NotApplicable);
        };
        let spec = RangeSpec::from_handler(handler_name, handler)?;
        let template = FormulaTemplate::new(self.lookup(&sheet, &spec, code));
        trace!(handler = handler_name, formula = %template.template_text(), "compiled lookup");
        Ok(GeneratedFormula::Lookup(template))
    }

    /// `INDEX(array, row, column)` wrapped by the active error policy.
    pub fn lookup(&self, sheet: &SheetRef, spec: &RangeSpec, code: &ClassCode) -> Expr {
        let index = Expr::call(
            "INDEX",
            vec![
                range(sheet, spec.array),
                self.row_selector(sheet, spec, code),
                column_selector(sheet, spec),
            ],
        );
        self.wrap_errors(index)
    }

    /// Offset, within the array, of the row matching both the key and the code.
    pub fn row_selector(&self, sheet: &SheetRef, spec: &RangeSpec, code: &ClassCode) -> Expr {
        let keys = range(sheet, spec.array.column_slice(spec.key_column));
        let codes = range(sheet, spec.array.column_slice(self.code_column));
        let key_matches = Expr::group(Expr::binary(
            keys.clone(),
            BinaryOp::Eq,
            Expr::RowHole(spec.row_key.clone()),
        ));
        let code_matches = Expr::group(Expr::binary(codes, BinaryOp::Eq, code_literal(code)));
        let both = Expr::binary(key_matches, BinaryOp::Mul, code_matches);

        match self.policy.tie_break {
            TieBreak::Last => {
                let rows = Expr::binary(both, BinaryOp::Mul, Expr::call("ROW", vec![keys]));
                let last = Expr::call("SUMPRODUCT", vec![Expr::call("MAX", vec![rows])]);
                let offset = i64::from(spec.array.start_row()) - 1;
                Expr::binary(last, BinaryOp::Sub, Expr::Number(offset))
            }
            TieBreak::First => Expr::call(
                "MATCH",
                vec![Expr::Number(1), both, Expr::Number(0)],
            ),
        }
    }

    fn wrap_errors(&self, expr: Expr) -> Expr {
        match &self.policy.errors {
            ErrorPolicy::Single { fallback } => {
                Expr::call("IFERROR", vec![expr, Expr::Literal(fallback.clone())])
            }
            ErrorPolicy::Layered {
                not_available,
                error,
            } => {
                let na = Expr::call("IFNA", vec![expr, Expr::Literal(not_available.clone())]);
                Expr::call("IFERROR", vec![na, Expr::Literal(error.clone())])
            }
        }
    }
}

/// `MATCH(key, header_row, match_type)`.
fn column_selector(sheet: &SheetRef, spec: &RangeSpec) -> Expr {
    Expr::call(
        "MATCH",
        vec![
            header_literal(&spec.header_key),
            range(sheet, spec.array.header_row()),
            Expr::Number(spec.match_mode.match_type()),
        ],
    )
}

fn range(sheet: &SheetRef, range: CellRange) -> Expr {
    Expr::Range {
        sheet: Some(sheet.clone()),
        range,
    }
}

fn code_literal(code: &ClassCode) -> Expr {
    match code {
        ClassCode::Number(value) => Expr::Number(*value),
        ClassCode::Text(text) => Expr::Text(text.clone()),
    }
}

fn header_literal(key: &HeaderKey) -> Expr {
    match key {
        HeaderKey::Integer(value) => Expr::Number(*value),
        HeaderKey::Number(value) => Expr::Literal(value.to_string()),
        HeaderKey::Text(text) if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') => {
            Expr::Literal(text.clone())
        }
        HeaderKey::Text(text) => Expr::Text(text.clone()),
    }
}
