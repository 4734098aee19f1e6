//! Configuration loading and per-period overlay merging.
//!
//! The configuration document is a JSON tree (comments allowed) with one
//! reserved `common` key holding the baseline and one key per reporting
//! period holding that period's overlay. The effective configuration of a
//! period is produced by [`merge`] and never written back into the baseline.

mod model;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use json_comments::StripComments;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, ToolError};

pub use model::{
    AxesConfig, AxisRole, ClassCode, ColumnLookup, ErrorPolicy, FormulaPolicy, HandlerSpec,
    HeaderKey, ListAxis, MatchMode, PeriodConfig, RowLookup, RowsAxis, SearchPatterns,
    SummarySpec, TagGroup, TieBreak,
};

/// Reserved top-level key holding the baseline configuration.
pub const COMMON_KEY: &str = "common";

/// Loads a configuration tree from disk, tolerating `//` and `/* */` comments.
pub fn load_tree(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(ToolError::ConfigNotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let reader = StripComments::new(BufReader::new(file));
    serde_json::from_reader(reader).map_err(|source| ToolError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Recursively merges `overlay` onto `base` and returns the merged tree.
///
/// Mappings present on both sides are merged key by key; any other value in
/// the overlay (scalars, lists, or a mapping replacing a non-mapping) replaces
/// the base value wholesale. Neither input is modified.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// The parsed configuration document: a shared baseline plus period overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    common: Value,
    periods: Map<String, Value>,
}

impl ConfigDocument {
    /// Loads and splits the configuration document stored at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let tree = load_tree(path)?;
        Self::from_value(tree)
    }

    /// Splits an in-memory configuration tree into baseline and overlays.
    pub fn from_value(tree: Value) -> Result<Self> {
        let Value::Object(root) = tree else {
            return Err(ToolError::InvalidConfig(
                "configuration root must be an object".into(),
            ));
        };
        let mut common = None;
        let mut periods = Map::new();
        for (key, value) in root {
            if key == COMMON_KEY {
                common = Some(value);
            } else {
                periods.insert(key, value);
            }
        }
        let common = common
            .ok_or_else(|| ToolError::InvalidConfig(format!("missing '{COMMON_KEY}' section")))?;
        if !common.is_object() {
            return Err(ToolError::InvalidConfig(format!(
                "'{COMMON_KEY}' must be an object"
            )));
        }
        Ok(Self { common, periods })
    }

    /// The shared baseline tree.
    pub fn common(&self) -> &Value {
        &self.common
    }

    /// Every period key in document order (the reserved key excluded).
    pub fn periods_available(&self) -> Vec<&str> {
        self.periods.keys().map(String::as_str).collect()
    }

    /// Returns the raw overlay of a period.
    pub fn overlay(&self, period: &str) -> Result<&Value> {
        self.periods
            .get(period)
            .ok_or_else(|| ToolError::UnknownPeriod(period.to_string()))
    }

    /// Merges the period overlay over the baseline without touching either.
    pub fn effective_tree(&self, period: &str) -> Result<Value> {
        let overlay = self.overlay(period)?;
        Ok(merge(&self.common, overlay))
    }

    /// Produces the typed effective configuration of a period.
    pub fn effective(&self, period: &str) -> Result<PeriodConfig> {
        let tree = self.effective_tree(period)?;
        let config: PeriodConfig = serde_json::from_value(tree)
            .map_err(|err| ToolError::InvalidConfig(format!("period '{period}': {err}")))?;
        config.validate()?;
        debug!(
            period,
            handlers = config.funcs.len(),
            "effective configuration resolved"
        );
        Ok(config)
    }
}
