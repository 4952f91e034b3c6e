use anyhow::{Context, Result};
use std::path::Path;

pub mod coordinator;
pub mod error;
pub mod formatter;
pub mod injector;
pub mod logging;
pub mod options;
mod paths;
pub mod popup;
pub mod providers;
pub mod server;
pub mod service;
pub mod settings;
pub mod storage;
#[cfg(test)]
mod test_util;

pub use coordinator::{AppContext, Coordinator, HttpChannel, Message, MessageChannel, Reply};
pub use error::{ServiceError, ServiceResult};
pub use injector::{ClickOutcome, Injector, Modifiers};
pub use options::{GeneralSettings, OptionsPage, ProviderForm};
pub use popup::{Popup, StatusCard};
pub use providers::{Provider, ProviderKind};
pub use settings::Settings;
pub use storage::StorageArea;

/// Settings plus the storage area they point at.
pub struct Runtime {
    pub settings: Settings,
    pub storage: StorageArea,
}

impl Runtime {
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        let settings = settings::load_settings(settings_path)?;
        let path = settings.resolved_storage_path();
        let storage = StorageArea::open(storage::LOCAL_AREA, &path)
            .with_context(|| format!("failed to open storage: {}", path.display()))?;
        Ok(Self { settings, storage })
    }

    pub fn coordinator(&self) -> Result<Coordinator> {
        let context = AppContext::init(self.settings.clone(), self.storage.clone())
            .with_context(|| "failed to initialize providers")?;
        Ok(Coordinator::new(context))
    }
}
