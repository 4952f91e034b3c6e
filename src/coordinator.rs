//! Request dispatch between the page-side injector and the provider clients.
//!
//! Every message is handled independently: `translate` resolves a provider,
//! runs its request and optionally reformats the result; `queryService` runs a
//! provider's secondary read. Failures travel back inside the reply rather than
//! as transport errors.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::error::{ServiceError, ServiceResult};
use crate::formatter::{FORMATTER_STORAGE_KEY, PunctuationFormatter, TextFormatter};
use crate::logging::{DebugFlag, Logger};
use crate::providers::{self, Provider, ProviderKind, TranslateRequest};
use crate::service::{ServiceEntry, ServiceRegistry, TermPair};
use crate::settings::Settings;
use crate::storage::StorageArea;

const ACTIONS: [&str; 2] = ["translate", "queryService"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Message {
    Translate {
        #[serde(default)]
        provider: String,
        #[serde(default)]
        text: String,
        #[serde(default)]
        terms: Vec<TermPair>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    QueryService {
        #[serde(default)]
        service: String,
    },
}

impl Message {
    pub fn translate(
        provider: impl Into<String>,
        text: impl Into<String>,
        terms: Vec<TermPair>,
        context: Option<String>,
    ) -> Self {
        Message::Translate {
            provider: provider.into(),
            text: text.into(),
            terms,
            context,
        }
    }

    pub fn query_service(service: impl Into<String>) -> Self {
        Message::QueryService {
            service: service.into(),
        }
    }

    /// Validates an untyped payload received over a channel boundary.
    pub fn from_value(value: Value) -> ServiceResult<Self> {
        if let Some(action) = value.get("action").and_then(Value::as_str) {
            if !ACTIONS.contains(&action) {
                return Err(ServiceError::Validation(format!(
                    "Unknown action: {}",
                    action
                )));
            }
        }
        serde_json::from_value(value)
            .map_err(|err| ServiceError::Validation(format!("Invalid message: {}", err)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn translated(text: impl Into<String>) -> Self {
        Self {
            translation: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn queried(data: Value) -> Self {
        Self {
            ok: Some(true),
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn query_failed(error: impl Into<String>) -> Self {
        Self {
            ok: Some(false),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Everything the coordinator depends on, built once at start-up.
pub struct AppContext {
    settings: Settings,
    storage: StorageArea,
    debug: DebugFlag,
    registry: RwLock<ServiceRegistry>,
    formatter: Arc<dyn TextFormatter>,
    logger: Logger,
}

impl AppContext {
    pub fn init(settings: Settings, storage: StorageArea) -> ServiceResult<Self> {
        let debug = DebugFlag::watch(&storage);
        let registry = build_registry(&storage, &debug, &settings)?;
        Ok(Self {
            logger: Logger::new("[Coordinator]", debug.clone()),
            settings,
            storage,
            debug,
            registry: RwLock::new(registry),
            formatter: Arc::new(PunctuationFormatter),
        })
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn TextFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Swaps in a registry; tests use this to point providers at mock servers.
    pub fn with_registry(self, registry: ServiceRegistry) -> Self {
        *self.registry_mut() = registry;
        self
    }

    /// Rebuilds every provider from storage, dropping cached configuration.
    pub fn reset(&self) -> ServiceResult<()> {
        let registry = build_registry(&self.storage, &self.debug, &self.settings)?;
        *self.registry_mut() = registry;
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &StorageArea {
        &self.storage
    }

    pub fn debug_flag(&self) -> &DebugFlag {
        &self.debug
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, ServiceRegistry> {
        self.registry
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn registry_mut(&self) -> std::sync::RwLockWriteGuard<'_, ServiceRegistry> {
        self.registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(&self, id: &str) -> ServiceResult<ServiceEntry> {
        self.registry().resolve(id).cloned()
    }
}

pub fn build_registry(
    storage: &StorageArea,
    debug: &DebugFlag,
    settings: &Settings,
) -> ServiceResult<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    for kind in ProviderKind::ALL {
        let provider = providers::build_provider(kind, storage, debug, settings)?;
        registry.register(kind.as_str(), ServiceEntry::new(provider))?;
    }
    Ok(registry)
}

pub type ChannelFuture<'a> = Pin<Box<dyn Future<Output = ServiceResult<Reply>> + Send + 'a>>;

/// Transport between the page side and the coordinator. An `Err` means the
/// message never got an answer; handled failures arrive as `Reply::error`.
pub trait MessageChannel: Send + Sync {
    fn send(&self, message: Message) -> ChannelFuture<'_>;
}

#[derive(Clone)]
pub struct Coordinator {
    context: Arc<AppContext>,
}

impl Coordinator {
    pub fn new(context: AppContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn handle(&self, message: Message) -> Reply {
        match message {
            Message::Translate {
                provider,
                text,
                terms,
                context,
            } => self.handle_translate(&provider, &text, terms, context).await,
            Message::QueryService { service } => self.handle_query(&service).await,
        }
    }

    pub async fn handle_value(&self, value: Value) -> Reply {
        match Message::from_value(value) {
            Ok(message) => self.handle(message).await,
            Err(err) => Reply::failed(err.to_string()),
        }
    }

    async fn handle_translate(
        &self,
        provider: &str,
        text: &str,
        terms: Vec<TermPair>,
        context: Option<String>,
    ) -> Reply {
        let text = text.trim();
        if text.is_empty() {
            return Reply::failed("No text provided.");
        }
        let logger = &self.context.logger;
        logger.log_with(
            "Translate request",
            json!({
                "provider": provider,
                "length": text.chars().count(),
                "termCount": terms.len(),
                "hasContext": context.as_deref().is_some_and(|c| !c.trim().is_empty()),
            }),
        );
        match self.translate(provider, text, terms, context).await {
            Ok(translation) => Reply::translated(translation),
            Err(err) => {
                logger.log_with("Translate failed", json!({ "error": err.to_string() }));
                Reply::failed(err.to_string())
            }
        }
    }

    async fn translate(
        &self,
        provider: &str,
        text: &str,
        terms: Vec<TermPair>,
        context: Option<String>,
    ) -> ServiceResult<String> {
        let entry = self.context.resolve(provider)?;
        let request = TranslateRequest::new(text)
            .with_terms(terms)
            .with_context(context);
        let output = entry.provider.request(request).await?;
        if self.context.storage.get_bool(FORMATTER_STORAGE_KEY) {
            return Ok(self.context.formatter.format(&output.content));
        }
        Ok(output.content)
    }

    async fn handle_query(&self, service: &str) -> Reply {
        let entry = match self.context.resolve(service) {
            Ok(entry) => entry,
            Err(err) => return Reply::failed(err.to_string()),
        };
        let Some(query) = entry.provider.query(None) else {
            return Reply::query_failed(format!(
                "{} does not provide a query endpoint.",
                entry.metadata.label
            ));
        };
        match query.await {
            Ok(data) => Reply::queried(data),
            Err(err) => {
                self.context.logger.log_with(
                    "Query failed",
                    json!({ "service": service, "error": err.to_string() }),
                );
                Reply::query_failed(err.to_string())
            }
        }
    }
}

impl MessageChannel for Coordinator {
    fn send(&self, message: Message) -> ChannelFuture<'_> {
        Box::pin(async move { Ok(self.handle(message).await) })
    }
}

/// Talks to a running `serve` instance over `POST /message`.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChannel {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl MessageChannel for HttpChannel {
    fn send(&self, message: Message) -> ChannelFuture<'_> {
        Box::pin(async move {
            let response = self
                .client
                .post(format!("{}/message", self.base_url))
                .json(&message)
                .send()
                .await?
                .error_for_status()?;
            Ok(response.json::<Reply>().await?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_use_action_tags() {
        let message = Message::from_value(json!({
            "action": "translate",
            "provider": "deepl",
            "text": "Hello",
            "terms": [{"source": "Hello", "target": "你好"}]
        }))
        .unwrap();
        assert_eq!(
            message,
            Message::translate("deepl", "Hello", vec![TermPair::new("Hello", "你好")], None)
        );
        let value = serde_json::to_value(Message::query_service("deepl")).unwrap();
        assert_eq!(value, json!({"action": "queryService", "service": "deepl"}));
    }

    #[test]
    fn rejects_unknown_or_malformed_messages() {
        let err = Message::from_value(json!({"action": "ping"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: ping");
        let err = Message::from_value(json!({"text": "x"})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid message:"));
    }

    #[test]
    fn replies_skip_empty_fields() {
        assert_eq!(
            serde_json::to_value(Reply::translated("你好")).unwrap(),
            json!({"translation": "你好"})
        );
        assert_eq!(
            serde_json::to_value(Reply::query_failed("boom")).unwrap(),
            json!({"ok": false, "error": "boom"})
        );
    }

    fn coordinator() -> Coordinator {
        let storage = StorageArea::in_memory("local");
        Coordinator::new(AppContext::init(Settings::default(), storage).unwrap())
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_dispatch() {
        let reply = coordinator()
            .handle(Message::translate("deepl", "   ", Vec::new(), None))
            .await;
        assert_eq!(reply, Reply::failed("No text provided."));
    }

    #[tokio::test]
    async fn unknown_provider_and_missing_key_are_reported() {
        let coordinator = coordinator();
        let reply = coordinator
            .handle(Message::translate("bing", "Hello", Vec::new(), None))
            .await;
        assert_eq!(reply.error.as_deref(), Some("Unsupported provider: bing"));

        let reply = coordinator
            .handle(Message::translate("deepseek", "Hello", Vec::new(), None))
            .await;
        assert_eq!(
            reply.error.as_deref(),
            Some("DeepSeek API key is not configured.")
        );
    }

    #[tokio::test]
    async fn queries_report_ok_flag() {
        let coordinator = coordinator();
        let reply = coordinator.handle(Message::query_service("google")).await;
        assert_eq!(reply.ok, Some(false));
        let reply = coordinator.handle(Message::query_service("deepl")).await;
        assert_eq!(reply.ok, Some(false));
        assert_eq!(reply.error.as_deref(), Some("DeepL API key is not configured."));
        let reply = coordinator.handle(Message::query_service("nope")).await;
        assert_eq!(reply.ok, None);
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn reset_rebuilds_registry() {
        let coordinator = coordinator();
        coordinator.context().reset().unwrap();
        assert_eq!(coordinator.context().registry().len(), 4);
    }
}
