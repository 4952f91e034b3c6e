use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:11400";
pub const DEFAULT_DEEPL_TARGET: &str = "ZH";
pub const DEFAULT_GOOGLE_TARGET: &str = "zh-CN";
pub const DEFAULT_CONTEXT_WINDOW_MAX: u32 = 15;
pub const DEFAULT_CONTEXT_OVERRIDE_SIZE: u32 = 5;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_addr: String,
    pub storage_path: Option<PathBuf>,
    pub deepl_target: String,
    pub google_target: String,
    pub context_window_max: u32,
    pub context_override_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            storage_path: None,
            deepl_target: DEFAULT_DEEPL_TARGET.to_string(),
            google_target: DEFAULT_GOOGLE_TARGET.to_string(),
            context_window_max: DEFAULT_CONTEXT_WINDOW_MAX,
            context_override_size: DEFAULT_CONTEXT_OVERRIDE_SIZE,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    storage: Option<StorageSettings>,
    languages: Option<LanguageSettings>,
    injector: Option<InjectorSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSettings {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguageSettings {
    deepl_target: Option<String>,
    google_target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InjectorSettings {
    context_window_max: Option<u32>,
    context_override_size: Option<u32>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn resolved_storage_path(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(paths::storage_path)
    }

    pub(crate) fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            if let Some(addr) = server.addr {
                if !addr.trim().is_empty() {
                    self.server_addr = addr.trim().to_string();
                }
            }
        }
        if let Some(storage) = incoming.storage {
            if let Some(path) = storage.path {
                if let Some(resolved) = paths::resolve_configured_path(&path) {
                    self.storage_path = Some(resolved);
                }
            }
        }
        if let Some(languages) = incoming.languages {
            if let Some(target) = languages.deepl_target {
                if !target.trim().is_empty() {
                    self.deepl_target = target.trim().to_uppercase();
                }
            }
            if let Some(target) = languages.google_target {
                if !target.trim().is_empty() {
                    self.google_target = target.trim().to_string();
                }
            }
        }
        if let Some(injector) = incoming.injector {
            if let Some(max) = injector.context_window_max {
                self.context_window_max = max;
            }
            if let Some(size) = injector.context_override_size {
                self.context_override_size = size;
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
