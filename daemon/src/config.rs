use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::drivers::DriversConfig;
use crate::management::config::{MinecraftConfig, StartMode};
use crate::storage::{Config, FileIoWithBackup};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// entries kept in the console history
    pub max_history: usize,
    /// entries replayed to a freshly authenticated subscriber
    pub max_display_lines: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_history: 1000,
            max_display_lines: 500,
        }
    }
}

/// Periodic work driven by the scheduler, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub system_update_interval_ms: u64,
    pub position_update_interval_ms: u64,
    pub play_time_update_interval_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            system_update_interval_ms: 2_000,
            position_update_interval_ms: 3_000,
            play_time_update_interval_ms: 60_000,
        }
    }
}

impl MonitoringConfig {
    pub fn system_update_interval(&self) -> Duration {
        Duration::from_millis(self.system_update_interval_ms.max(1))
    }

    pub fn position_update_interval(&self) -> Duration {
        Duration::from_millis(self.position_update_interval_ms.max(1))
    }

    pub fn play_time_update_interval(&self) -> Duration {
        Duration::from_millis(self.play_time_update_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynmapConfig {
    pub url: String,
}

impl Default for DynmapConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
        }
    }
}

/// immutable through full lifetime of app, unless restart app.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub drivers: DriversConfig,
    pub minecraft: MinecraftConfig,
    pub auth: AuthConfig,
    pub console: ConsoleConfig,
    pub monitoring: MonitoringConfig,
    pub dynmap: DynmapConfig,
}

impl FileIoWithBackup for AppConfig {}

impl Config for AppConfig {
    type ConfigType = AppConfig;
}

impl AppConfig {
    /// Loads `path` (creating it with defaults when absent) and applies the
    /// environment overrides on top.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<AppConfig> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    fn load_with<P, F>(path: P, var: F) -> anyhow::Result<AppConfig>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let mut config = Self::load_config_or_default(path, Self::default)?;
        if !config.auth.is_configured() {
            config.auth = AuthConfig::generate();
            Self::save_config(path, &config)?;
            warn!(
                "no auth password configured, generated one and saved it to {}: {}",
                path.display(),
                config.auth.password
            );
        }
        config.apply_env_overrides(var);
        Ok(config)
    }

    fn apply_env_overrides<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(port) = var("PORT") {
            match port.parse() {
                Ok(port) => self.drivers.websocket.uni_config.port = port,
                Err(_) => warn!("ignored invalid PORT: {}", port),
            }
        }
        if let Some(dir) = var("WORK_DIR") {
            self.minecraft.work_dir = PathBuf::from(dir);
        }
        if let Some(mode) = var("START_MODE") {
            match mode.as_str() {
                "java" => self.minecraft.start_mode = StartMode::Java,
                "script" => self.minecraft.start_mode = StartMode::Script,
                other => warn!("ignored invalid START_MODE: {}", other),
            }
        }

        let text_overrides: [(&str, &mut String); 8] = [
            ("SERVER_NAME", &mut self.minecraft.server_name),
            ("JAVA_PATH", &mut self.minecraft.java_path),
            ("JAR_FILE", &mut self.minecraft.jar_file),
            ("MIN_MEM", &mut self.minecraft.min_memory),
            ("MAX_MEM", &mut self.minecraft.max_memory),
            ("JVM_ARGS", &mut self.minecraft.jvm_args),
            ("PASSWORD", &mut self.auth.password),
            ("DYNMAP_URL", &mut self.dynmap.url),
        ];
        for (key, slot) in text_overrides {
            if let Some(value) = var(key) {
                *slot = value;
            }
        }
    }
}
