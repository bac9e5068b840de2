use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    /// `java -Xms.. -Xmx.. <jvm args> -jar <jar> nogui`
    #[default]
    Java,
    /// run a launch script from the work directory
    Script,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error("launch file {} not found", .0.display())]
    MissingArtifact(PathBuf),
}

pub struct ProcessStartInfo {
    pub target: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub envs: HashMap<String, String>,
}

impl ProcessStartInfo {
    /// Human readable command line for the console.
    pub fn command_line(&self) -> String {
        std::iter::once(self.target.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the supervised server is launched and how long the supervisor waits
/// at each lifecycle step. Delays are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinecraftConfig {
    pub work_dir: PathBuf,
    pub server_name: String,
    pub start_mode: StartMode,

    pub java_path: String,
    pub jar_file: String,
    pub min_memory: String,
    pub max_memory: String,
    pub jvm_args: String,

    pub start_script: String,
    pub env: HashMap<String, String>,

    pub max_players: u32,

    /// fallback for the ready line, after which `starting` becomes `online`
    pub startup_delay_ms: u64,
    /// after `stop()`, the process is terminated if it is still alive
    pub shutdown_timeout_ms: u64,
    /// pause between the exit and the new launch of a restart
    pub restart_delay_ms: u64,
    /// gap between `save-all` and `stop`
    pub stop_command_delay_ms: u64,
    /// delay of the `list` query after the server came online
    pub roster_refresh_delay_ms: u64,
}

impl Default for MinecraftConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/mine"),
            server_name: "Minecraft Server".to_string(),
            start_mode: StartMode::Java,
            java_path: "java".to_string(),
            jar_file: "server.jar".to_string(),
            min_memory: "2G".to_string(),
            max_memory: "6G".to_string(),
            jvm_args: "-XX:+UseG1GC -XX:+ParallelRefProcEnabled -XX:MaxGCPauseMillis=200"
                .to_string(),
            start_script: "run.sh".to_string(),
            env: HashMap::new(),
            max_players: 20,
            startup_delay_ms: 10_000,
            shutdown_timeout_ms: 20_000,
            restart_delay_ms: 3_000,
            stop_command_delay_ms: 2_000,
            roster_refresh_delay_ms: 1_000,
        }
    }
}

impl MinecraftConfig {
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn stop_command_delay(&self) -> Duration {
        Duration::from_millis(self.stop_command_delay_ms)
    }

    pub fn roster_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.roster_refresh_delay_ms)
    }

    /// The file that must exist in the work directory for the current mode.
    pub fn launch_artifact(&self) -> &str {
        match self.start_mode {
            StartMode::Java => &self.jar_file,
            StartMode::Script => &self.start_script,
        }
    }

    /// Checks the launch preconditions and builds the command to spawn.
    pub fn start_info(&self) -> Result<ProcessStartInfo, LaunchError> {
        if !self.work_dir.is_dir() {
            return Err(LaunchError::MissingDirectory(self.work_dir.clone()));
        }
        let artifact = self.work_dir.join(self.launch_artifact());
        if !artifact.is_file() {
            return Err(LaunchError::MissingArtifact(artifact));
        }

        let (target, args) = self.launch_script();
        Ok(ProcessStartInfo {
            target,
            args,
            working_dir: self.work_dir.clone(),
            envs: self.env.clone(),
        })
    }

    fn launch_script(&self) -> (String, Vec<String>) {
        match self.start_mode {
            StartMode::Java => {
                let mut args = vec![
                    format!("-Xms{}", self.min_memory),
                    format!("-Xmx{}", self.max_memory),
                ];
                args.extend(self.jvm_args.split_whitespace().map(str::to_string));
                args.push("-jar".into());
                args.push(self.jar_file.clone());
                args.push("nogui".into());
                (self.java_path.clone(), args)
            }
            StartMode::Script => {
                let script = Path::new(&self.start_script).to_string_lossy().to_string();
                if cfg!(windows) {
                    ("cmd".into(), vec!["/C".into(), script])
                } else {
                    ("bash".into(), vec![script])
                }
            }
        }
    }
}
