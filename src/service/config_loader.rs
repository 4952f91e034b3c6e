use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::error::{ServiceError, ServiceResult};
use crate::storage::StorageArea;

type DeriveFn<T> = dyn Fn(&Map<String, Value>) -> ServiceResult<T> + Send + Sync;

/// Memoized view over a set of storage keys.
///
/// `load` derives the value once and hands out the same `Arc` until one of the
/// watched keys changes (or the area is cleared, or `invalidate` is called).
/// The fetch happens while holding the cache lock, so callers racing a pending
/// fetch wait for it and share its result instead of reading storage again.
pub struct ConfigLoader<T> {
    inner: Arc<LoaderInner<T>>,
}

struct LoaderInner<T> {
    area: StorageArea,
    keys: Vec<String>,
    defaults: Map<String, Value>,
    derive: Box<DeriveFn<T>>,
    cache: Mutex<Option<Arc<T>>>,
}

impl<T> Clone for ConfigLoader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> std::fmt::Debug for ConfigLoader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader")
            .field("area", &self.inner.area.name())
            .field("keys", &self.inner.keys)
            .finish()
    }
}

impl<T: Send + Sync + 'static> ConfigLoader<T> {
    pub fn new<F>(
        area: &StorageArea,
        keys: &[&str],
        defaults: Map<String, Value>,
        derive: F,
    ) -> ServiceResult<Self>
    where
        F: Fn(&Map<String, Value>) -> ServiceResult<T> + Send + Sync + 'static,
    {
        if keys.is_empty() {
            return Err(ServiceError::Config(
                "storageKeys must be a non-empty array.".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        let keys = keys
            .iter()
            .filter(|key| seen.insert(**key))
            .map(|key| key.to_string())
            .collect::<Vec<_>>();

        let inner = Arc::new(LoaderInner {
            area: area.clone(),
            keys,
            defaults,
            derive: Box::new(derive),
            cache: Mutex::new(None),
        });

        let weak: Weak<LoaderInner<T>> = Arc::downgrade(&inner);
        area.on_changed(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.keys.iter().any(|key| event.touches(key)) {
                *inner.lock_cache() = None;
            }
        });

        Ok(Self { inner })
    }

    pub fn load(&self) -> ServiceResult<Arc<T>> {
        let mut cache = self.inner.lock_cache();
        if let Some(cached) = cache.as_ref() {
            return Ok(cached.clone());
        }
        let stored = self.inner.area.get(&self.inner.keys);
        let merged = self.merge_with_defaults(stored);
        let derived = Arc::new((self.inner.derive)(&merged)?);
        *cache = Some(derived.clone());
        Ok(derived)
    }

    pub fn invalidate(&self) {
        *self.inner.lock_cache() = None;
    }

    pub fn keys(&self) -> &[String] {
        &self.inner.keys
    }

    fn merge_with_defaults(&self, stored: Map<String, Value>) -> Map<String, Value> {
        let mut merged = self.inner.defaults.clone();
        for key in &self.inner.keys {
            if let Some(value) = stored.get(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

impl<T> LoaderInner<T> {
    fn lock_cache(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub(crate) fn string_field(config: &Map<String, Value>, key: &str) -> String {
    match config.get(key) {
        Some(Value::String(value)) => value.trim().to_string(),
        _ => String::new(),
    }
}

pub(crate) fn finite_number(config: &Map<String, Value>, key: &str) -> Option<f64> {
    config
        .get(key)
        .and_then(Value::as_f64)
        .filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Foo {
        foo: String,
    }

    fn foo_loader(area: &StorageArea, calls: Arc<AtomicUsize>) -> ConfigLoader<Foo> {
        let mut defaults = Map::new();
        defaults.insert("foo_key".to_string(), json!(""));
        ConfigLoader::new(area, &["foo_key", "foo_key"], defaults, move |config| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Foo {
                foo: string_field(config, "foo_key"),
            })
        })
        .unwrap()
    }

    #[test]
    fn caches_until_watched_key_changes() {
        let area = StorageArea::in_memory("local");
        area.set_one("foo_key", json!("  value  ")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = foo_loader(&area, calls.clone());
        assert_eq!(loader.keys(), ["foo_key".to_string()]);

        let first = loader.load().unwrap();
        assert_eq!(*first, Foo { foo: "value".into() });
        let second = loader.load().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        area.set_one("unrelated", json!(1)).unwrap();
        assert!(Arc::ptr_eq(&first, &loader.load().unwrap()));

        area.set_one("foo_key", json!("next")).unwrap();
        let third = loader.load().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.foo, "next");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_and_explicit_invalidation_drop_the_cache() {
        let area = StorageArea::in_memory("local");
        area.set_one("foo_key", json!("a")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = foo_loader(&area, calls.clone());

        let first = loader.load().unwrap();
        area.clear().unwrap();
        let second = loader.load().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.foo, "");

        loader.invalidate();
        let third = loader.load().unwrap();
        assert!(!Arc::ptr_eq(&second, &third));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_loads_share_one_fetch() {
        let area = StorageArea::in_memory("local");
        area.set_one("foo_key", json!("shared")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = foo_loader(&area, calls.clone());

        let handles = (0..8)
            .map(|_| {
                let loader = loader.clone();
                std::thread::spawn(move || loader.load().unwrap())
            })
            .collect::<Vec<_>>();
        let results = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    #[test]
    fn rejects_empty_key_list() {
        let area = StorageArea::in_memory("local");
        let err = ConfigLoader::new(&area, &[], Map::new(), |_| Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "storageKeys must be a non-empty array.");
    }
}
