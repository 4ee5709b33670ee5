// Application settings
// Loaded from ~/.config/chartdoc/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// What to do with imported rows carrying more fields than the header row.
/// Short rows are always padded; this only governs over-long ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlongRows {
    /// Drop the extra trailing fields (default)
    #[default]
    Truncate,
    /// Fail the import
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interval between re-render ticks, in milliseconds
    #[serde(rename = "render.debounceMs")]
    pub debounce_ms: u64,

    /// Cap on materialized query result rows
    #[serde(rename = "query.rowCap")]
    pub row_cap: usize,

    /// Default field delimiter for imports (single character)
    #[serde(rename = "import.defaultDelimiter")]
    pub default_delimiter: char,

    /// Whether imports treat the first line as headers by default
    #[serde(rename = "import.defaultHasHeaders")]
    pub default_has_headers: bool,

    /// Policy for imported rows with too many fields
    #[serde(rename = "import.overlongRows")]
    pub overlong_rows: OverlongRows,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            row_cap: 10_000,
            default_delimiter: ',',
            default_has_headers: true,
            overlong_rows: OverlongRows::Truncate,
        }
    }
}

impl Settings {
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chartdoc")
            .join("settings.json")
    }

    /// Load settings, falling back to defaults when the file is missing
    /// or unreadable.
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &PathBuf) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.debounce_ms, 500);
        assert_eq!(settings.row_cap, 10_000);
        assert_eq!(settings.default_delimiter, ',');
        assert!(settings.default_has_headers);
        assert_eq!(settings.overlong_rows, OverlongRows::Truncate);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"query.rowCap": 50, "import.overlongRows": "reject"}"#)
                .unwrap();
        assert_eq!(settings.row_cap, 50);
        assert_eq!(settings.overlong_rows, OverlongRows::Reject);
        assert_eq!(settings.debounce_ms, 500);
    }

    #[test]
    fn test_roundtrip() {
        let mut settings = Settings::default();
        settings.default_delimiter = ';';
        settings.debounce_ms = 250;
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.default_delimiter, ';');
        assert_eq!(back.debounce_ms, 250);
    }
}
