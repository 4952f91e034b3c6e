use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};
use crate::logging::{DebugFlag, Logger};
use crate::service::TermPair;
use crate::settings::Settings;
use crate::storage::StorageArea;

mod chat;
mod deepl;
mod deepseek;
pub mod hints;
mod google;
mod openai;

pub use deepl::{DeepL, DeepLConfig};
pub use deepseek::{DeepSeek, DeepSeekConfig};
pub use google::{Google, GoogleConfig};
pub use openai::{OpenAI, OpenAIConfig};

pub(crate) use chat::DEFAULT_TEMPERATURE;
pub(crate) use deepl::API_TYPES as DEEPL_API_TYPES;
pub(crate) use deepseek::{DEFAULT_MODEL as DEEPSEEK_DEFAULT_MODEL, MODELS as DEEPSEEK_MODELS};
pub(crate) use openai::{
    DEFAULT_BASE_URL as OPENAI_DEFAULT_BASE_URL, DEFAULT_MODEL as OPENAI_DEFAULT_MODEL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    DeepSeek,
    DeepL,
    Google,
    OpenAI,
}

impl ProviderKind {
    /// Button order on the host page.
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::DeepSeek,
        ProviderKind::DeepL,
        ProviderKind::Google,
        ProviderKind::OpenAI,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::DeepL => "deepl",
            ProviderKind::Google => "google",
            ProviderKind::OpenAI => "openai",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::DeepSeek => "DeepSeek",
            ProviderKind::DeepL => "DeepL",
            ProviderKind::Google => "Google",
            ProviderKind::OpenAI => "OpenAI",
        }
    }

    /// Name used in "API key is not configured" errors.
    pub fn key_label(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google Translate",
            other => other.label(),
        }
    }

    pub fn api_key_storage_key(&self) -> String {
        format!("{}_apiKey", self.as_str())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ServiceError::UnsupportedProvider(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranslateRequest {
    pub input: String,
    pub terms: Vec<TermPair>,
    pub context: Option<String>,
    pub temperature: Option<f64>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub signal: Option<CancellationToken>,
    pub extra_headers: Vec<(String, String)>,
}

impl TranslateRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_terms(mut self, terms: Vec<TermPair>) -> Self {
        self.terms = terms;
        self
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context.filter(|value| !value.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderOutput {
    pub content: String,
    pub raw: serde_json::Value,
}

pub type ProviderFuture<T> = Pin<Box<dyn Future<Output = ServiceResult<T>> + Send>>;

pub trait Provider: Clone + Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn is_configured(&self) -> ServiceResult<bool>;
    fn request(&self, request: TranslateRequest) -> ProviderFuture<ProviderOutput>;
    /// Secondary read-only call (usage or balance); `None` when the vendor
    /// has no such endpoint.
    fn query(&self, signal: Option<CancellationToken>) -> Option<ProviderFuture<serde_json::Value>>;
}

#[derive(Debug, Clone)]
pub enum ProviderImpl {
    DeepSeek(DeepSeek),
    DeepL(DeepL),
    Google(Google),
    OpenAI(OpenAI),
}

impl Provider for ProviderImpl {
    fn kind(&self) -> ProviderKind {
        match self {
            ProviderImpl::DeepSeek(provider) => provider.kind(),
            ProviderImpl::DeepL(provider) => provider.kind(),
            ProviderImpl::Google(provider) => provider.kind(),
            ProviderImpl::OpenAI(provider) => provider.kind(),
        }
    }

    fn is_configured(&self) -> ServiceResult<bool> {
        match self {
            ProviderImpl::DeepSeek(provider) => provider.is_configured(),
            ProviderImpl::DeepL(provider) => provider.is_configured(),
            ProviderImpl::Google(provider) => provider.is_configured(),
            ProviderImpl::OpenAI(provider) => provider.is_configured(),
        }
    }

    fn request(&self, request: TranslateRequest) -> ProviderFuture<ProviderOutput> {
        match self {
            ProviderImpl::DeepSeek(provider) => provider.request(request),
            ProviderImpl::DeepL(provider) => provider.request(request),
            ProviderImpl::Google(provider) => provider.request(request),
            ProviderImpl::OpenAI(provider) => provider.request(request),
        }
    }

    fn query(&self, signal: Option<CancellationToken>) -> Option<ProviderFuture<serde_json::Value>> {
        match self {
            ProviderImpl::DeepSeek(provider) => provider.query(signal),
            ProviderImpl::DeepL(provider) => provider.query(signal),
            ProviderImpl::Google(provider) => provider.query(signal),
            ProviderImpl::OpenAI(provider) => provider.query(signal),
        }
    }
}

pub fn build_provider(
    kind: ProviderKind,
    area: &StorageArea,
    flag: &DebugFlag,
    settings: &Settings,
) -> ServiceResult<ProviderImpl> {
    let client = reqwest::Client::new();
    let provider = match kind {
        ProviderKind::DeepSeek => ProviderImpl::DeepSeek(DeepSeek::new(
            client,
            area,
            Logger::new("[DeepSeek]", flag.clone()),
        )?),
        ProviderKind::DeepL => ProviderImpl::DeepL(
            DeepL::new(client, area, Logger::new("[DeepL]", flag.clone()))?
                .with_default_target(&settings.deepl_target),
        ),
        ProviderKind::Google => ProviderImpl::Google(Google::with_default_target(
            client,
            area,
            Logger::new("[Google]", flag.clone()),
            &settings.google_target,
        )?),
        ProviderKind::OpenAI => ProviderImpl::OpenAI(OpenAI::new(
            client,
            area,
            Logger::new("[OpenAI]", flag.clone()),
        )?),
    };
    Ok(provider)
}

/// Shared precondition for every vendor: key first, then source text.
pub(crate) fn ensure_ready(kind: ProviderKind, api_key: &str, input: &str) -> ServiceResult<()> {
    if api_key.is_empty() {
        return Err(ServiceError::ApiKeyMissing(kind));
    }
    if input.trim().is_empty() {
        return Err(ServiceError::EmptySourceText);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_case_insensitively() {
        assert_eq!(" DeepL ".parse::<ProviderKind>().unwrap(), ProviderKind::DeepL);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        let err = "bing".parse::<ProviderKind>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported provider: bing");
    }

    #[test]
    fn key_labels_name_the_product() {
        assert_eq!(ProviderKind::Google.key_label(), "Google Translate");
        assert_eq!(
            ServiceError::ApiKeyMissing(ProviderKind::DeepSeek).to_string(),
            "DeepSeek API key is not configured."
        );
        assert_eq!(ProviderKind::OpenAI.api_key_storage_key(), "openai_apiKey");
    }

    #[test]
    fn readiness_checks_key_before_text() {
        let err = ensure_ready(ProviderKind::DeepL, "", "").unwrap_err();
        assert!(matches!(err, ServiceError::ApiKeyMissing(ProviderKind::DeepL)));
        let err = ensure_ready(ProviderKind::DeepL, "k", "  ").unwrap_err();
        assert_eq!(err.to_string(), "Source text is empty.");
        assert!(ensure_ready(ProviderKind::DeepL, "k", "hi").is_ok());
    }
}
