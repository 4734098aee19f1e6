//! Core library for the vpo-tables command line application.
//!
//! The crate turns yearly batches of statistical workbooks into one
//! consolidated workbook per period whose cells are lookup formulas into the
//! source files. Configuration loading and overlay merging live in
//! [`config`], axis resolution in [`axis`], formula construction in
//! [`formula`], column placement in [`grid`], the summary sheet in
//! [`summary`], workbook IO under [`io`], and per-period orchestration in
//! [`pipeline`].

pub mod axis;
pub mod config;
pub mod error;
pub mod formula;
pub mod grid;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod reference;
pub mod summary;

pub use error::{Result, ToolError};
