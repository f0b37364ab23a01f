use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 28745;
pub const MAX_LAUNCH_DELAY_MS: u64 = 10_000;

/// All configurable settings with their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSettings {
    pub worker_port: u16,
    pub worker_command: String,
    pub worker_args: Vec<String>,
    pub launch_delay_ms: u64,
    pub read_timeout_ms: u64,
    pub annotate: bool,
    pub verbose: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            worker_port: DEFAULT_PORT,
            worker_command: "python".to_string(),
            worker_args: vec!["ea_emu_server.py".to_string()],
            launch_delay_ms: 500,
            read_timeout_ms: 30_000,
            annotate: true,
            verbose: true,
        }
    }
}

impl BridgeSettings {
    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Raw JSON representation — all fields optional for partial overrides.
#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(rename = "worker.port")]
    worker_port: Option<u32>,
    #[serde(rename = "worker.command")]
    worker_command: Option<String>,
    #[serde(rename = "worker.args")]
    worker_args: Option<Vec<String>>,
    #[serde(rename = "worker.launchDelayMs")]
    launch_delay_ms: Option<u64>,
    #[serde(rename = "worker.readTimeoutMs")]
    read_timeout_ms: Option<u64>,
    #[serde(rename = "emulation.annotate")]
    annotate: Option<bool>,
    #[serde(rename = "emulation.verbose")]
    verbose: Option<bool>,
}

/// Resolve settings: defaults → user global → project-local.
pub fn resolve(project_root: Option<&Path>) -> BridgeSettings {
    let global_path = dirs::home_dir()
        .map(|h| h.join(".emubridge/settings.json"));
    let project_path = project_root
        .map(|r| r.join(".emubridge/settings.json"));
    resolve_with_paths(
        global_path.as_deref(),
        project_path.as_deref(),
    )
}

/// Testable resolver that accepts explicit file paths (no home dir dependency).
fn resolve_with_paths(
    global_path: Option<&Path>,
    project_path: Option<&Path>,
) -> BridgeSettings {
    let mut settings = BridgeSettings::default();

    if let Some(path) = global_path {
        apply_file(&mut settings, path);
    }
    if let Some(path) = project_path {
        apply_file(&mut settings, path);
    }

    settings
}

fn apply_file(settings: &mut BridgeSettings, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let Ok(file) = serde_json::from_str::<SettingsFile>(&content) else {
        tracing::warn!("Invalid settings file, ignoring: {}", path.display());
        return;
    };
    if let Some(v) = file.worker_port {
        match u16::try_from(v) {
            Ok(port) if port > 0 => settings.worker_port = port,
            _ => tracing::warn!("worker.port ({}) out of range (1..65535), using default", v),
        }
    }
    if let Some(v) = file.worker_command {
        if v.trim().is_empty() {
            tracing::warn!("worker.command is empty, using default");
        } else {
            settings.worker_command = v;
        }
    }
    if let Some(v) = file.worker_args {
        settings.worker_args = v;
    }
    if let Some(v) = file.launch_delay_ms {
        if v <= MAX_LAUNCH_DELAY_MS {
            settings.launch_delay_ms = v;
        } else {
            tracing::warn!(
                "worker.launchDelayMs ({}) out of range (0..{}), using default",
                v, MAX_LAUNCH_DELAY_MS
            );
        }
    }
    if let Some(v) = file.read_timeout_ms {
        if (100..=600_000).contains(&v) {
            settings.read_timeout_ms = v;
        } else {
            tracing::warn!(
                "worker.readTimeoutMs ({}) out of range (100..600000), using default",
                v
            );
        }
    }
    if let Some(v) = file.annotate {
        settings.annotate = v;
    }
    if let Some(v) = file.verbose {
        settings.verbose = v;
    }
}
