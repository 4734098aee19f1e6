use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur while the
/// tool loads configuration, compiles formulas, or reads and writes workbooks.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails outside of config loading.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the xlsx reader used for the template.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Errors bubbled up when probing source workbooks of any format.
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// Raised when a zip archive (source bundle or xlsx package) is unreadable.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Raised when the xlsx package XML cannot be parsed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Raised when the configuration file does not exist.
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Raised when the configuration file is not valid (commented) JSON.
    #[error("failed to parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Raised when the effective configuration of a period is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when a requested period is not present in the configuration.
    #[error("unknown period '{0}'")]
    UnknownPeriod(String),

    /// Raised when a handler lacks the range parameters needed for a lookup.
    #[error("handler '{handler}' has no usable range: {reason}")]
    MissingRangeSpec { handler: String, reason: String },

    /// Raised when a cell or range reference cannot be parsed.
    #[error("invalid cell reference '{0}'")]
    InvalidReference(String),

    /// Raised when the template workbook does not follow the expected layout.
    #[error("invalid template workbook: {0}")]
    InvalidTemplate(String),

    /// Raised when the output workbook cannot be written.
    #[error("failed to save workbook {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },

    /// Raised when the user provides a path that does not exist.
    #[error("input not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
