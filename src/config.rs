//! Runtime configuration.
//!
//! Loaded from `~/.workboard/config.json` when present, with defaults that
//! match the board layout the formulas assume. Column indices are 0-based.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Column layout of the operational board. The contract-id column is the key
/// column: the contiguous run of rows sharing a value there is the range
/// owned by that contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardLayout {
    pub spreadsheet: String,
    pub sheet: String,
    pub header_row: usize,
    pub first_data_row: usize,
    pub col_project: usize,
    pub col_contract: usize,
    pub col_contract_id: usize,
    pub col_milestone: usize,
    pub col_case: usize,
    pub col_task: usize,
    pub col_owner: usize,
    pub col_deadline: usize,
    pub col_status: usize,
    pub col_planned: usize,
    pub col_consumed: usize,
    pub col_remaining: usize,
    pub col_task_id: usize,
    /// First column of the per-person capacity summary block.
    pub summary_start_col: usize,
}

impl Default for BoardLayout {
    fn default() -> Self {
        BoardLayout {
            spreadsheet: "operations".to_string(),
            sheet: "Board".to_string(),
            header_row: 0,
            first_data_row: 1,
            col_project: 0,
            col_contract: 1,
            col_contract_id: 2,
            col_milestone: 3,
            col_case: 4,
            col_task: 5,
            col_owner: 6,
            col_deadline: 7,
            col_status: 8,
            col_planned: 9,
            col_consumed: 10,
            col_remaining: 11,
            col_task_id: 12,
            summary_start_col: 13,
        }
    }
}

impl BoardLayout {
    /// Width of the data block (everything left of the summary columns).
    pub fn data_width(&self) -> usize {
        self.summary_start_col
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub board: BoardLayout,
    /// Rebuild the capacity summary whenever the contract-header count is
    /// below this. Under it, the manual layout assumptions other formulas
    /// rely on no longer hold.
    pub summary_rebuild_threshold: usize,
    /// Highest role rank still shown on the board. Owners ranked above this
    /// keep their tasks off the board.
    pub visible_role_rank_max: i32,
    /// Managers whose email matches one of these patterns keep their
    /// contracts off the board.
    pub excluded_manager_emails: Vec<String>,
    /// Weekly hours assumed per person in the capacity summary.
    pub weekly_capacity_hours: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            board: BoardLayout::default(),
            summary_rebuild_threshold: 13,
            visible_role_rank_max: 3,
            excluded_manager_emails: Vec::new(),
            weekly_capacity_hours: 40.0,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file. A missing file yields defaults;
    /// a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    /// Load from the default location, `~/.workboard/config.json`.
    pub fn load_default() -> Result<Self, String> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Config::default()),
        }
    }

    fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".workboard").join("config.json"))
    }

    /// Compile the excluded-email patterns. Invalid patterns are logged and
    /// skipped rather than taking the whole predicate down.
    pub fn excluded_email_patterns(&self) -> Vec<regex::Regex> {
        self.excluded_manager_emails
            .iter()
            .filter_map(|p| match regex::Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Ignoring invalid excluded-email pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect()
    }
}
