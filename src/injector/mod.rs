//! Page-side assistant over a snapshot of the CAT editor.
//!
//! The `Injector` owns a parsed copy of the host page. Scans keep a button
//! strip in every glossary container; clicking a provider button scrapes the
//! active segment, its glossary terms and optional preceding rows, sends a
//! `translate` message and writes the reply back into the segment.

pub mod buttons;
pub mod context;
pub mod observer;
pub mod scrape;
pub mod selectors;
pub mod toast;

use kuchiki::NodeRef;
use kuchiki::traits::*;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::coordinator::{Message, MessageChannel};
use crate::logging::{DebugFlag, Logger};
use crate::providers::ProviderKind;
use crate::settings::Settings;
use crate::storage::{StorageArea, StorageEvent};

pub use buttons::{ButtonChanges, copy_text};
pub use context::{CONTEXT_WINDOW_STORAGE_KEY, ContextWindow, Modifiers, Platform};
pub use observer::PageObserver;
pub use toast::{ToastEntry, Toasts};

const IDLE_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Storage notifications waiting for the page loop to pick them up.
#[derive(Debug, Default)]
struct PendingStorage {
    api_keys: bool,
    context_window: Option<Option<Value>>,
}

impl PendingStorage {
    fn absorb(&mut self, event: &StorageEvent<'_>) {
        if event.cleared
            || ProviderKind::ALL
                .iter()
                .any(|kind| event.changes.contains_key(&kind.api_key_storage_key()))
        {
            self.api_keys = true;
        }
        if event.cleared {
            self.context_window = Some(None);
        } else if let Some(change) = event.changes.get(CONTEXT_WINDOW_STORAGE_KEY) {
            self.context_window = Some(change.new_value.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub containers: usize,
    pub changes: Vec<ButtonChanges>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    NoActiveRow,
    EmptySource,
    Written(String),
    /// The coordinator answered without a translation.
    Failed(Option<String>),
    ChannelError(String),
}

pub struct Injector {
    document: NodeRef,
    storage: StorageArea,
    enabled: BTreeSet<ProviderKind>,
    window: ContextWindow,
    context_size: u32,
    platform: Platform,
    observer: PageObserver,
    toasts: Toasts,
    logger: Logger,
    pending: Arc<Mutex<PendingStorage>>,
    last_idle_log: Option<Instant>,
}

impl Injector {
    /// Parses the page, reads availability and context size, runs the first
    /// scan and starts observing.
    pub fn load(html: &str, storage: &StorageArea, settings: &Settings, debug: &DebugFlag) -> Self {
        let pending = Arc::new(Mutex::new(PendingStorage::default()));
        let sink = pending.clone();
        storage.on_changed(move |event| {
            if let Ok(mut pending) = sink.lock() {
                pending.absorb(event);
            }
        });

        let window = ContextWindow {
            max: settings.context_window_max,
            override_size: settings.context_override_size,
        };
        let mut injector = Self {
            document: kuchiki::parse_html().one(html),
            storage: storage.clone(),
            enabled: BTreeSet::new(),
            context_size: window.clamp(storage.get_one(CONTEXT_WINDOW_STORAGE_KEY).as_ref()),
            window,
            platform: Platform::current(),
            observer: PageObserver::new(),
            toasts: Toasts::new(),
            logger: Logger::new("[TransAsst]", debug.clone()),
            pending,
            last_idle_log: None,
        };
        injector.refresh_availability();
        injector.observer.schedule();
        injector.run_frame();
        injector.observer.observe();
        injector
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    pub fn html(&self) -> String {
        self.document.to_string()
    }

    pub fn enabled(&self) -> &BTreeSet<ProviderKind> {
        &self.enabled
    }

    pub fn context_size(&self) -> u32 {
        self.context_size
    }

    pub fn toasts(&self) -> &Toasts {
        &self.toasts
    }

    pub fn observer(&self) -> &PageObserver {
        &self.observer
    }

    /// A provider is enabled when its stored API key is a non-blank string.
    pub fn refresh_availability(&mut self) {
        self.enabled = ProviderKind::ALL
            .into_iter()
            .filter(|kind| {
                self.storage
                    .get_string(&kind.api_key_storage_key())
                    .is_some_and(|key| !key.trim().is_empty())
            })
            .collect();
        self.logger.log_with(
            "Enabled providers",
            json!(self.enabled.iter().map(|kind| kind.as_str()).collect::<Vec<_>>()),
        );
    }

    /// Applies storage changes seen since the last call.
    pub fn poll_storage(&mut self) {
        let pending = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => return,
        };
        if pending.api_keys {
            self.refresh_availability();
            self.observer.schedule();
        }
        if let Some(value) = pending.context_window {
            self.context_size = self.window.clamp(value.as_ref());
            self.logger.log_with(
                "Context window updated via storage event",
                json!(self.context_size),
            );
        }
    }

    /// The host page changed under us.
    pub fn notify_mutation(&mut self) -> bool {
        self.observer.record_mutation()
    }

    /// Runs the pending scan, if any. Returns `None` when nothing was queued.
    pub fn run_frame(&mut self) -> Option<ScanReport> {
        self.poll_storage();
        if !self.observer.take_scheduled() {
            return None;
        }
        Some(self.scan())
    }

    pub fn scan(&mut self) -> ScanReport {
        let was_observing = self.observer.pause();
        if self.enabled.is_empty() {
            let now = Instant::now();
            if self
                .last_idle_log
                .is_none_or(|last| now.duration_since(last) > IDLE_LOG_INTERVAL)
            {
                self.logger
                    .log("No providers enabled, skipping button injection");
                self.last_idle_log = Some(now);
            }
        }
        let containers = self
            .document
            .select(selectors::BUTTON_CONTAINER)
            .map(|found| found.map(|el| el.as_node().clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        self.logger
            .log_with("Scanning containers", json!(containers.len()));
        let changes = containers
            .iter()
            .map(|container| buttons::sync_container(container, &self.enabled))
            .collect::<Vec<_>>();
        self.observer.resume(was_observing);
        ScanReport {
            containers: containers.len(),
            changes,
        }
    }

    /// Handles a provider button click and reports what happened.
    pub async fn click_provider<C>(
        &mut self,
        kind: ProviderKind,
        modifiers: Modifiers,
        channel: &C,
    ) -> ClickOutcome
    where
        C: MessageChannel + ?Sized,
    {
        let Some(row) = scrape::active_row(&self.document) else {
            self.toasts.show("未找到激活句段", false);
            return ClickOutcome::NoActiveRow;
        };
        let row = row.as_node().clone();
        let source = scrape::source_text(&row);
        if source.is_empty() {
            self.toasts.show("原文为空", false);
            return ClickOutcome::EmptySource;
        }
        let terms = scrape::extract_terms(&self.document);
        let window = self
            .window
            .effective(kind, self.context_size, modifiers, self.platform);
        let reference = context::build_reference_context(&row, window)
            .trim()
            .to_string();
        let progress = self
            .toasts
            .persistent(format!("使用 {} 翻译中…", kind.label()));
        self.logger.log_with(
            "Requesting translation",
            json!({
                "provider": kind.as_str(),
                "len": source.chars().count(),
                "terms": terms.len(),
                "hasContext": !reference.is_empty(),
                "contextWindow": window,
            }),
        );

        let message = Message::translate(kind.as_str(), source, terms, Some(reference));
        let result = channel.send(message).await;
        self.toasts.dismiss(progress);

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                self.toasts.show("通信错误", false);
                self.logger
                    .log_with("Runtime error", json!({ "error": err.to_string() }));
                return ClickOutcome::ChannelError(err.to_string());
            }
        };
        match reply.translation.filter(|text| !text.is_empty()) {
            Some(translation) => {
                if scrape::write_translation(&row, &translation) {
                    self.observer.record_mutation();
                }
                self.toasts.show("已写入译文", true);
                ClickOutcome::Written(translation)
            }
            None => {
                let error = reply
                    .error
                    .map(|error| error.trim().to_string())
                    .filter(|error| !error.is_empty());
                match &error {
                    Some(error) => self.toasts.show(format!("翻译失败：{}", error), false),
                    None => self.toasts.show("翻译失败", false),
                };
                ClickOutcome::Failed(error)
            }
        }
    }

    /// Text the copy button puts on the clipboard, or `None` without an
    /// active segment.
    pub fn click_copy(&mut self) -> Option<String> {
        let Some(row) = scrape::active_row(&self.document) else {
            self.toasts.show("未找到激活句段", false);
            return None;
        };
        let source = scrape::source_text(row.as_node());
        let terms = scrape::extract_terms(&self.document);
        self.toasts.show("已复制原文和术语", true);
        Some(copy_text(&source, &terms))
    }
}
