//! Key-value configuration storage with change notifications.
//!
//! A `StorageArea` is the persisted store every component reads from. The
//! options page is the only writer in practice; readers cache derived values
//! and drop them when a listener reports that one of their keys changed.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const LOCAL_AREA: &str = "local";

#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type StorageChanges = BTreeMap<String, StorageChange>;

#[derive(Debug)]
pub struct StorageEvent<'a> {
    pub area: &'a str,
    pub changes: &'a StorageChanges,
    /// Set when the whole area was wiped; readers drop every cached value.
    pub cleared: bool,
}

impl StorageEvent<'_> {
    pub fn touches(&self, key: &str) -> bool {
        self.cleared || self.changes.contains_key(key)
    }
}

type Listener = Arc<dyn Fn(&StorageEvent<'_>) + Send + Sync>;

#[derive(Clone)]
pub struct StorageArea {
    inner: Arc<AreaInner>,
}

struct AreaInner {
    name: String,
    path: Option<PathBuf>,
    data: Mutex<Map<String, Value>>,
    listeners: Mutex<Vec<Listener>>,
}

impl std::fmt::Debug for StorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageArea")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .finish()
    }
}

impl StorageArea {
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::with_data(name.into(), None, Map::new())
    }

    /// Opens a file-backed area; a missing file starts empty.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read storage: {}", path.display()))?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse storage: {}", path.display()))?
            }
        } else {
            Map::new()
        };
        Ok(Self::with_data(name.into(), Some(path), data))
    }

    fn with_data(name: String, path: Option<PathBuf>, data: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(AreaInner {
                name,
                path,
                data: Mutex::new(data),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn get<I, S>(&self, keys: I) -> Map<String, Value>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let data = self.data();
        let mut result = Map::new();
        for key in keys {
            if let Some(value) = data.get(key.as_ref()) {
                result.insert(key.as_ref().to_string(), value.clone());
            }
        }
        result
    }

    pub fn get_one(&self, key: &str) -> Option<Value> {
        self.data().get(key).cloned()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get_one(key)? {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.get_one(key) {
            Some(Value::Bool(value)) => value,
            Some(Value::String(value)) => value.trim().eq_ignore_ascii_case("true"),
            Some(Value::Number(value)) => value.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }

    pub fn set(&self, items: Map<String, Value>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        self.commit(false, |draft| {
            let mut changes = StorageChanges::new();
            for (key, value) in items {
                let old_value = draft.insert(key.clone(), value.clone());
                changes.insert(
                    key,
                    StorageChange {
                        old_value,
                        new_value: Some(value),
                    },
                );
            }
            changes
        })
    }

    pub fn set_one(&self, key: &str, value: Value) -> Result<()> {
        let mut items = Map::new();
        items.insert(key.to_string(), value);
        self.set(items)
    }

    pub fn remove<I, S>(&self, keys: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.commit(false, |draft| {
            let mut changes = StorageChanges::new();
            for key in keys {
                if let Some(old_value) = draft.remove(key.as_ref()) {
                    changes.insert(
                        key.as_ref().to_string(),
                        StorageChange {
                            old_value: Some(old_value),
                            new_value: None,
                        },
                    );
                }
            }
            changes
        })
    }

    /// Removes every key. Listeners receive a change entry for each removed key
    /// and a clear always reaches every listener, even on an empty area.
    pub fn clear(&self) -> Result<()> {
        self.commit(true, |draft| {
            std::mem::take(draft)
                .into_iter()
                .map(|(key, old_value)| {
                    (
                        key,
                        StorageChange {
                            old_value: Some(old_value),
                            new_value: None,
                        },
                    )
                })
                .collect::<StorageChanges>()
        })
    }

    /// Applies `apply` to a copy of the area and swaps it in only once the copy
    /// is persisted, so a failed write leaves memory and listeners untouched.
    fn commit<F>(&self, cleared: bool, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Map<String, Value>) -> StorageChanges,
    {
        let changes = {
            let mut data = self.data();
            let mut draft = data.clone();
            let changes = apply(&mut draft);
            if changes.is_empty() && !cleared {
                return Ok(());
            }
            self.persist(&draft)?;
            *data = draft;
            changes
        };
        self.notify(&changes, cleared);
        Ok(())
    }

    pub fn on_changed<F>(&self, listener: F)
    where
        F: Fn(&StorageEvent<'_>) + Send + Sync + 'static,
    {
        self.listeners().push(Arc::new(listener));
    }

    fn notify(&self, changes: &StorageChanges, cleared: bool) {
        if changes.is_empty() && !cleared {
            return;
        }
        let event = StorageEvent {
            area: &self.inner.name,
            changes,
            cleared,
        };
        let listeners = self.listeners().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let Some(path) = self.inner.path.as_deref() else {
            return Ok(());
        };
        write_atomic(path, data)
    }

    fn data(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.inner
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<Listener>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn write_atomic(path: &Path, data: &Map<String, Value>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create storage directory: {}", dir.display()))?;
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| "failed to create temporary storage file")?;
    let json = serde_json::to_string_pretty(data)?;
    file.write_all(json.as_bytes())
        .with_context(|| "failed to write storage")?;
    file.persist(path)
        .with_context(|| format!("failed to persist storage: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn items(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn set_reports_old_and_new_values() {
        let area = StorageArea::in_memory(LOCAL_AREA);
        area.set_one("deepl_apiKey", json!("first")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        area.on_changed(move |event| {
            sink.lock()
                .unwrap()
                .push((event.area.to_string(), event.changes.clone()));
        });

        area.set_one("deepl_apiKey", json!("second")).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let (name, changes) = &seen[0];
        assert_eq!(name, "local");
        let change = &changes["deepl_apiKey"];
        assert_eq!(change.old_value, Some(json!("first")));
        assert_eq!(change.new_value, Some(json!("second")));
    }

    #[test]
    fn clear_notifies_even_when_empty() {
        let area = StorageArea::in_memory(LOCAL_AREA);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        area.on_changed(move |event| {
            assert!(event.cleared);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        area.clear().unwrap();
        area.remove(["missing"]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn file_backed_area_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");
        let area = StorageArea::open(LOCAL_AREA, &path).unwrap();
        area.set(items(json!({"debug": true, "openai_model": "gpt-4o"})))
            .unwrap();

        let reopened = StorageArea::open(LOCAL_AREA, &path).unwrap();
        assert!(reopened.get_bool("debug"));
        assert_eq!(reopened.get_string("openai_model").as_deref(), Some("gpt-4o"));
        let subset = reopened.get(["openai_model", "absent"]);
        assert_eq!(subset.len(), 1);
    }

    #[test]
    fn failed_write_leaves_area_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let area = StorageArea::open(LOCAL_AREA, blocker.join("storage.json")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        area.on_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(area.set_one("deepl_apiKey", json!("k")).is_err());
        assert_eq!(area.get_one("deepl_apiKey"), None);
        assert!(area.clear().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
