use indexmap::IndexMap;
use serde::Deserialize;

use crate::axis::resolve_axes;
use crate::error::Result;
use crate::reference::parse_column;

/// Source-sheet value meaning "this sheet does not exist in the source file".
const ABSENT_SHEET: &str = "None";

fn default_period_dir_prefix() -> String {
    "VPO_1_".to_string()
}

fn default_template_sheet() -> String {
    "шаблон".to_string()
}

fn zero_literal() -> String {
    "0".to_string()
}

fn default_error_marker() -> String {
    "\"н/д\"".to_string()
}

/// Effective configuration of one period after the overlay has been merged.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PeriodConfig {
    #[serde(default)]
    pub search_patterns: SearchPatterns,
    /// Directory (or archive stem) prefix of a period's source bundle.
    #[serde(default = "default_period_dir_prefix")]
    pub period_dir_prefix: String,
    /// Open every source workbook to confirm the declared sheet exists.
    #[serde(default, alias = "checking_list_existence")]
    pub check_sheet_existence: bool,
    /// Template sheet removed from the output before it is saved.
    #[serde(default = "default_template_sheet")]
    pub template_sheet: String,
    pub axes: AxesConfig,
    /// Handler table keyed by list-axis key.
    #[serde(default)]
    pub funcs: IndexMap<String, HandlerSpec>,
    #[serde(default)]
    pub formula: FormulaPolicy,
    #[serde(default)]
    pub summary_sheet: Option<SummarySpec>,
}

impl PeriodConfig {
    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        resolve_axes(self)?;
        parse_column(&self.axes.rows.column)?;
        if let Some(summary) = self.summary() {
            parse_column(&summary.range_col)?;
            parse_column(&summary.criteria_col)?;
        }
        Ok(())
    }

    /// The summary sheet specification, unless disabled.
    pub fn summary(&self) -> Option<&SummarySpec> {
        self.summary_sheet
            .as_ref()
            .filter(|summary| summary.sheet_name().is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchPatterns {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

/// The two classification axes and how they map onto the output grid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AxesConfig {
    pub rows: RowsAxis,
    pub list: ListAxis,
    pub to_sheet: AxisRole,
    #[serde(default)]
    pub to_column: Option<AxisRole>,
}

/// Built-in axis roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisRole {
    /// Classification → numeric code used as a row filter.
    #[serde(alias = "rowsAxis", alias = "rows_axis")]
    Rows,
    /// Classification → source sheet name.
    #[serde(alias = "listAxis", alias = "list_axis")]
    List,
}

impl AxisRole {
    /// The role not designated by `self`.
    pub fn other(self) -> Self {
        match self {
            AxisRole::Rows => AxisRole::List,
            AxisRole::List => AxisRole::Rows,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AxisRole::Rows => "rows",
            AxisRole::List => "list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowsAxis {
    /// Source column holding the classification code.
    pub column: String,
    pub codes: IndexMap<String, ClassCode>,
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListAxis {
    /// List key → source sheet name; `null` or `"None"` marks an absent sheet.
    pub sheets: IndexMap<String, Option<String>>,
    #[serde(default)]
    pub aliases: IndexMap<String, String>,
}

impl ListAxis {
    /// Source sheet declared for `key`, `None` when declared absent.
    pub fn source_sheet(&self, key: &str) -> Option<&str> {
        self.sheets
            .get(key)
            .and_then(|sheet| sheet.as_deref())
            .filter(|sheet| *sheet != ABSENT_SHEET)
    }
}

/// A classification code used as a row filter value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClassCode {
    Number(i64),
    Text(String),
}

/// How one logical field is located inside a source sheet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandlerSpec {
    /// Absolute rectangle such as `$A$12:$W$467`.
    #[serde(default)]
    pub array: Option<String>,
    #[serde(default)]
    pub row_num: Option<RowLookup>,
    #[serde(default)]
    pub columns_num: Option<ColumnLookup>,
    /// Overrides the list axis' source sheet name for this handler.
    #[serde(default)]
    pub actual_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowLookup {
    /// Column holding the per-row key.
    #[serde(alias = "looup_array")]
    pub lookup_array: String,
    /// Destination cell compared with the key column, e.g. `A2`.
    pub lookup_value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnLookup {
    pub lookup_value: HeaderKey,
    #[serde(default)]
    pub match_type: MatchMode,
}

/// Value searched for in the header row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HeaderKey {
    Integer(i64),
    Number(f64),
    Text(String),
}

/// Header matching mode, configured with the spreadsheet's integer convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum MatchMode {
    #[default]
    Exact,
    /// Largest value less than or equal to the key (sorted header row).
    NearestBelow,
}

impl MatchMode {
    pub fn match_type(self) -> i64 {
        match self {
            MatchMode::Exact => 0,
            MatchMode::NearestBelow => 1,
        }
    }
}

impl TryFrom<i64> for MatchMode {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(MatchMode::Exact),
            1 => Ok(MatchMode::NearestBelow),
            other => Err(format!("unsupported match_type {other}, expected 0 or 1")),
        }
    }
}

/// Formula generation policy; exactly one tie-break and one error policy is
/// active per period.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormulaPolicy {
    #[serde(default)]
    pub tie_break: TieBreak,
    #[serde(default)]
    pub errors: ErrorPolicy,
    /// Separator of source directories inside external references.
    #[serde(default)]
    pub path_separator: Option<char>,
}

impl FormulaPolicy {
    pub fn path_separator(&self) -> char {
        self.path_separator.unwrap_or(std::path::MAIN_SEPARATOR)
    }
}

/// Which row wins when several rows match both key and code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Largest matching row index.
    #[default]
    Last,
    /// Smallest matching row index.
    First,
}

/// How lookup errors are substituted in the emitted formula.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// `IFERROR(expr, fallback)`.
    Single {
        #[serde(default = "zero_literal")]
        fallback: String,
    },
    /// `IFERROR(IFNA(expr, not_available), error)`.
    Layered {
        #[serde(default = "zero_literal")]
        not_available: String,
        #[serde(default = "default_error_marker")]
        error: String,
    },
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        ErrorPolicy::Single {
            fallback: zero_literal(),
        }
    }
}

/// Summary sheet layout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SummarySpec {
    #[serde(default)]
    pub name: Option<String>,
    /// Column on each contributing sheet compared against the criteria.
    pub range_col: String,
    /// Column on the summary sheet holding the per-row criteria.
    pub criteria_col: String,
    /// Presence selects tag-group mode.
    #[serde(default)]
    pub tag_groups: Option<Vec<TagGroup>>,
}

impl SummarySpec {
    /// Sheet name, `None` when the summary is disabled.
    pub fn sheet_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty() && *name != ABSENT_SHEET)
    }
}

/// A set of keywords selecting header columns during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<String>")]
pub struct TagGroup {
    keywords: Vec<String>,
}

impl TagGroup {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Summary column header for the group.
    pub fn display_name(&self) -> String {
        self.keywords.join(" ")
    }
}

impl From<Vec<String>> for TagGroup {
    fn from(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}
