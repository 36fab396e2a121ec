use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "wristband_sync".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Tuning of the steps read cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Today's steps above this value are treated as a corrupt read
    #[serde(default = "default_steps_sanity_ceiling")]
    pub steps_sanity_ceiling: u32,
    /// Re-reads attempted after a corrupt read before giving up
    #[serde(default = "default_max_steps_retries")]
    pub max_steps_retries: u32,
    /// Delay handed to the transport before each re-read; 0 re-reads at once
    #[serde(default)]
    pub steps_retry_delay_ms: u64,
}

impl ProtocolSettings {
    pub fn steps_retry_delay(&self) -> Duration {
        Duration::from_millis(self.steps_retry_delay_ms)
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            steps_sanity_ceiling: default_steps_sanity_ceiling(),
            max_steps_retries: default_max_steps_retries(),
            steps_retry_delay_ms: 0,
        }
    }
}

fn default_steps_sanity_ceiling() -> u32 {
    10_000_000
}
fn default_max_steps_retries() -> u32 {
    10
}

/// Body data used to build the settings written to the wristband.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub steps_target: u32,
    /// Micrometers
    pub distance_per_step: u32,
    /// Kilograms
    pub weight: f64,
    /// Centimeters
    pub height: f64,
    /// "m" selects the male formula, anything else the female one
    pub gender: String,
    /// "yyyy-mm-dd"
    pub date_of_birth: String,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            steps_target: 10_000,
            distance_per_step: 500_000,
            weight: 50.0,
            height: 160.0,
            gender: "m".to_string(),
            date_of_birth: "1968-07-03".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Protocol Settings
    #[serde(default)]
    pub protocol: ProtocolSettings,

    // User Settings
    #[serde(default)]
    pub user: UserProfile,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load from an explicit path, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn from_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("WristbandSync");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.settings_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn update_user(&mut self, user: UserProfile) -> anyhow::Result<()> {
        if user.gender != "m" && user.gender != "f" {
            warn!(
                "Gender code '{}' is not 'm'; the female BMR formula will be used",
                user.gender
            );
        }
        self.settings.user = user;
        self.save()
    }
}
