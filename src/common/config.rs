//! Run configuration of the command-line driver.

use serde::Deserialize;
use std::path::Path;

use crate::simulation::channel_model::NO_INTERFERENCE_DBM;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interference() -> f64 {
    NO_INTERFERENCE_DBM
}

/// Settings read from `config.toml` next to the scene file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Log filter level (`error`, `warn`, `info`, `debug`, `trace`)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Seed of the generator used for randomized draws
    #[serde(default)]
    pub seed: u64,
    /// Interference level for links that do not set their own (dBm)
    #[serde(default = "default_interference")]
    pub interference_dbm: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            seed: 0,
            interference_dbm: default_interference(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(RunConfig)` if the file was successfully loaded and parsed
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> std::path::PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }

    /// Parsed log level, `None` if the text is not a level name.
    pub fn level_filter(&self) -> Option<log::LevelFilter> {
        self.log_level.parse().ok()
    }
}
