//! Filesystem and workbook adapters around the formula engine.

pub mod discovery;
pub mod excel_read;
pub mod excel_write;
pub mod layout;
