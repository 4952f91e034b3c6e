use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing_subscriber::fmt::{self, MakeWriter};

use crate::storage::StorageArea;

pub const DEBUG_STORAGE_KEY: &str = "debug";

/// Installs the stderr subscriber. `Logger` output is gated by the persisted
/// debug flag; `verbose` adds debug-level events.
pub fn init(verbose: bool) -> Result<()> {
    let _ = tracing::subscriber::set_global_default(subscriber(verbose, std::io::stderr));
    Ok(())
}

fn subscriber<W>(verbose: bool, writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    fmt::fmt()
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_max_level(level)
        .with_writer(writer)
        .finish()
}

/// The persisted `debug` toggle, read once and then kept current by a storage
/// listener. While the cached value is off, every check re-reads storage so a
/// write that raced the listener is still picked up.
#[derive(Debug, Clone)]
pub struct DebugFlag {
    enabled: Arc<AtomicBool>,
    area: StorageArea,
}

impl DebugFlag {
    pub fn watch(area: &StorageArea) -> Self {
        let enabled = Arc::new(AtomicBool::new(area.get_bool(DEBUG_STORAGE_KEY)));
        let live = enabled.clone();
        area.on_changed(move |event| {
            if !event.touches(DEBUG_STORAGE_KEY) {
                return;
            }
            let value = event
                .changes
                .get(DEBUG_STORAGE_KEY)
                .is_some_and(|change| {
                    matches!(change.new_value, Some(serde_json::Value::Bool(true)))
                });
            live.store(value, Ordering::Relaxed);
        });
        Self {
            enabled,
            area: area.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        if self.enabled.load(Ordering::Relaxed) {
            return true;
        }
        let refreshed = self.area.get_bool(DEBUG_STORAGE_KEY);
        self.enabled.store(refreshed, Ordering::Relaxed);
        refreshed
    }
}

#[derive(Debug, Clone)]
pub struct Logger {
    prefix: &'static str,
    flag: DebugFlag,
}

impl Logger {
    pub fn new(prefix: &'static str, flag: DebugFlag) -> Self {
        Self { prefix, flag }
    }

    pub fn enabled(&self) -> bool {
        self.flag.is_enabled()
    }

    pub fn log(&self, message: &str) {
        if self.enabled() {
            tracing::info!("{} {}", self.prefix, message);
        }
    }

    pub fn log_with(&self, message: &str, fields: serde_json::Value) {
        if self.enabled() {
            tracing::info!("{} {} {}", self.prefix, message, fields);
        }
    }
}
