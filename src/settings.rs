//! Bake settings, persisted as JSON.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::util::{Error, Result};

/// Knobs for one bake pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    /// Upper bound on emitted records (internal, leaf and terminator).
    /// `None` sizes the budget at twice the triangle count.
    pub max_records: Option<usize>,

    /// Log tree statistics at info level after the bake.
    pub log_stats: bool,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            max_records: None,
            log_stats: true,
        }
    }
}

/// Records per triangle when no explicit budget is set.
const DEFAULT_RECORDS_PER_TRIANGLE: usize = 2;

impl BakeSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_records == Some(0) {
            return Err(Error::invalid_settings("max_records must be at least 1"));
        }
        Ok(())
    }

    /// Record budget for a scene of `triangle_count` triangles.
    pub fn record_budget(&self, triangle_count: usize) -> usize {
        self.max_records
            .unwrap_or_else(|| triangle_count.saturating_mul(DEFAULT_RECORDS_PER_TRIANGLE))
    }
}
