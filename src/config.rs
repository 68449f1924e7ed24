use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::{
    foundation::error::{StudioError, StudioResult},
    history::DEFAULT_HISTORY_CAPACITY,
    overlay::{DEFAULT_MAX_OVERLAY_BYTES, DEFAULT_OVERLAY_FRACTION},
    scheduler::{DEFAULT_DEBOUNCE, SchedulerConfig},
};

pub const DATA_DIR_ENV: &str = "CODESTUDIO_DATA_DIR";
const DEFAULT_DATA_DIR: &str = ".codestudio";
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// Runtime configuration. Every field has a default, so a partial JSON file is valid.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudioConfig {
    /// Directory backing the key-value store.
    pub data_dir: PathBuf,
    pub debounce_ms: u64,
    pub history_capacity: usize,
    pub overlay_fraction: f32,
    pub max_overlay_bytes: u64,
    /// Directory holding `<family>-Regular.ttf` and friends, for PDF export.
    pub pdf_font_dir: Option<PathBuf>,
    pub pdf_font_family: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        let data_dir = std::env::var_os(DATA_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        Self {
            data_dir,
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            overlay_fraction: DEFAULT_OVERLAY_FRACTION,
            max_overlay_bytes: DEFAULT_MAX_OVERLAY_BYTES,
            pdf_font_dir: None,
            pdf_font_family: "LiberationSans".to_owned(),
        }
    }
}

impl StudioConfig {
    pub fn from_json_file(path: &Path) -> StudioResult<Self> {
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| StudioError::serde(format!("parse config '{}': {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> StudioResult<()> {
        if !(1..=DEFAULT_HISTORY_CAPACITY).contains(&self.history_capacity) {
            return Err(StudioError::validation(format!(
                "history_capacity must be in [1, {DEFAULT_HISTORY_CAPACITY}]"
            )));
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(StudioError::validation(format!(
                "debounce_ms must be <= {MAX_DEBOUNCE_MS}"
            )));
        }
        if !(self.overlay_fraction > 0.0 && self.overlay_fraction <= 0.5) {
            return Err(StudioError::validation(
                "overlay_fraction must be in (0, 0.5]",
            ));
        }
        if self.pdf_font_family.trim().is_empty() {
            return Err(StudioError::validation("pdf_font_family must not be empty"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            debounce: self.debounce(),
            overlay_fraction: self.overlay_fraction,
        }
    }
}
