//! Remux configuration: app name used for the output folder, output directory override,
//! and the allow-list of output containers.
//!
//! Loaded from the JSON file named by `QUICKMUX_CONFIG` (optional), then
//! `QUICKMUX_OUTPUT_DIR` overrides the output directory. Every field is optional and
//! resolved through an `effective_*` accessor.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_APP_NAME: &str = "Quickmux";
pub const DEFAULT_FORMATS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm"];

const CONFIG_ENV: &str = "QUICKMUX_CONFIG";
const OUTPUT_DIR_ENV: &str = "QUICKMUX_OUTPUT_DIR";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RemuxConfig {
    /// Name of the folder created under the user's videos directory.
    pub app_name: Option<String>,
    /// Explicit destination directory; takes precedence over `app_name`.
    pub output_dir: Option<PathBuf>,
    /// Supported output containers (case-insensitive). Empty or missing means the defaults.
    pub formats: Option<Vec<String>>,
}

impl RemuxConfig {
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        serde_json::from_str(json).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Reads `QUICKMUX_CONFIG` if set, then applies env overrides.
    pub fn load() -> Result<Self, AppError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                log::debug!(
                    target: "quickmux::config",
                    "Loading config from {}",
                    path.display()
                );
                let json = fs::read_to_string(&path).map_err(|e| {
                    AppError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_json(&json)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = std::env::var_os(OUTPUT_DIR_ENV).filter(|d| !d.is_empty()) {
            self.output_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn effective_app_name(&self) -> &str {
        self.app_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_APP_NAME)
    }

    /// Lowercased, deduplicated allow-list in configured order.
    pub fn effective_formats(&self) -> Vec<String> {
        let mut formats: Vec<String> = Vec::new();
        for format in self.formats.iter().flatten() {
            let format = format.trim().trim_start_matches('.').to_lowercase();
            if !format.is_empty() && !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            return DEFAULT_FORMATS.iter().map(|f| f.to_string()).collect();
        }
        formats
    }

    pub fn effective_output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => videos_base_dir().join(self.effective_app_name()),
        }
    }
}

/// The platform's per-user videos folder, then the home dir, then the temp dir.
fn videos_base_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
}
