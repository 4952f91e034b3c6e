use std::path::{Path, PathBuf};

const BASE_DIR_ENV: &str = "CAT_MT_ASSIST_DIR";
const DEFAULT_DIR_NAME: &str = ".cat-mt-assist";

pub(crate) fn settings_dir() -> Option<PathBuf> {
    if let Some(dir) = base_dir_override() {
        return Some(dir);
    }
    default_base_dir()
}

pub(crate) fn storage_path() -> PathBuf {
    if let Some(dir) = base_dir_override() {
        return dir.join("storage.json");
    }
    home_join(".cat-mt-assist/storage.json")
        .unwrap_or_else(|| PathBuf::from(".cat-mt-assist/storage.json"))
}

pub(crate) fn resolve_configured_path(value: &str) -> Option<PathBuf> {
    normalize_dir(value)
}

fn base_dir_override() -> Option<PathBuf> {
    std::env::var(BASE_DIR_ENV)
        .ok()
        .and_then(|value| normalize_dir(&value))
}

fn default_base_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(DEFAULT_DIR_NAME))
        }
    })
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(suffix))
        }
    })
}

fn normalize_dir(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_tilde(trimmed);
    Some(normalize_path(PathBuf::from(expanded)))
}

fn normalize_path(path: PathBuf) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        normalized.push(component.as_os_str());
    }
    normalized
}

fn expand_tilde(value: &str) -> String {
    if value == "~" || value.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let home = home.trim();
            if home.is_empty() {
                return value.to_string();
            }
            if value == "~" {
                return home.to_string();
            }
            return format!("{}{}", home, &value[1..]);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn storage_path_lives_under_home() {
        with_temp_home(|home| {
            assert_eq!(
                storage_path(),
                home.join(".cat-mt-assist").join("storage.json")
            );
        });
    }

    #[test]
    fn configured_path_expands_tilde() {
        with_temp_home(|home| {
            let path = resolve_configured_path("~/data/store.json").unwrap();
            assert_eq!(path, home.join("data").join("store.json"));
            assert!(resolve_configured_path("   ").is_none());
        });
    }
}
