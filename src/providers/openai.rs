use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::chat::{self, ChatCall, ChatConfig};
use super::{Provider, ProviderFuture, ProviderKind, ProviderOutput, TranslateRequest, ensure_ready};
use crate::error::ServiceResult;
use crate::logging::Logger;
use crate::service::config_loader::string_field;
use crate::service::{ConfigLoader, MessageBuilder};
use crate::storage::StorageArea;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const CHAT_PATH: &str = "/v1/chat/completions";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";
const API_BASE_KEY: &str = "openai_apiBaseUrl";

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAIConfig {
    pub chat: ChatConfig,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    loader: ConfigLoader<OpenAIConfig>,
    builder: MessageBuilder,
    logger: Logger,
}

impl OpenAI {
    pub fn new(client: reqwest::Client, area: &StorageArea, logger: Logger) -> ServiceResult<Self> {
        let mut keys = chat::storage_keys("openai");
        keys.push(API_BASE_KEY.to_string());
        let keys = keys.iter().map(String::as_str).collect::<Vec<_>>();
        let mut defaults: Map<String, Value> = chat::defaults("openai", DEFAULT_MODEL);
        defaults.insert(API_BASE_KEY.to_string(), json!(DEFAULT_BASE_URL));

        let loader = ConfigLoader::new(area, &keys, defaults, |config| {
            Ok(OpenAIConfig {
                chat: chat::derive(config, "openai", DEFAULT_MODEL),
                api_base: normalize_api_base(&string_field(config, API_BASE_KEY)),
            })
        })?;
        Ok(Self {
            client,
            loader,
            builder: chat::message_builder(ProviderKind::OpenAI),
            logger,
        })
    }

    pub fn load_config(&self) -> ServiceResult<Arc<OpenAIConfig>> {
        self.loader.load()
    }

    pub async fn translate(&self, request: TranslateRequest) -> ServiceResult<ProviderOutput> {
        let config = self.loader.load()?;
        ensure_ready(ProviderKind::OpenAI, &config.chat.api_key, &request.input)?;
        chat::complete(
            ChatCall {
                kind: ProviderKind::OpenAI,
                client: &self.client,
                url: format!("{}{}", config.api_base, CHAT_PATH),
                config: &config.chat,
                builder: &self.builder,
                logger: &self.logger,
            },
            request,
        )
        .await
    }
}

/// Trims, drops one trailing slash, and upgrades the plain-http default host.
pub fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    let normalized = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if normalized == "http://api.openai.com" {
        return DEFAULT_BASE_URL.to_string();
    }
    normalized.to_string()
}

impl Provider for OpenAI {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn is_configured(&self) -> ServiceResult<bool> {
        Ok(!self.loader.load()?.chat.api_key.is_empty())
    }

    fn request(&self, request: TranslateRequest) -> ProviderFuture<ProviderOutput> {
        let provider = self.clone();
        Box::pin(async move { provider.translate(request).await })
    }

    fn query(&self, _signal: Option<CancellationToken>) -> Option<ProviderFuture<Value>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DebugFlag;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn openai(area: &StorageArea) -> OpenAI {
        OpenAI::new(
            reqwest::Client::new(),
            area,
            Logger::new("[OpenAI]", DebugFlag::watch(area)),
        )
        .unwrap()
    }

    #[test]
    fn api_base_normalization() {
        assert_eq!(normalize_api_base(""), DEFAULT_BASE_URL);
        assert_eq!(normalize_api_base("http://api.openai.com/"), DEFAULT_BASE_URL);
        assert_eq!(
            normalize_api_base(" https://proxy.example.com/ "),
            "https://proxy.example.com"
        );
    }

    #[tokio::test]
    async fn configured_base_url_is_used() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "译文"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let area = StorageArea::in_memory("local");
        area.set_one("openai_apiKey", json!("sk-open")).unwrap();
        area.set_one(API_BASE_KEY, json!(format!("{}/", server.uri())))
            .unwrap();
        let provider = openai(&area);
        let output = provider.translate(TranslateRequest::new("text")).await.unwrap();
        assert_eq!(output.content, "译文");
        assert_eq!(provider.load_config().unwrap().chat.model, DEFAULT_MODEL);
        assert!(provider.query(None).is_none());
    }

    #[tokio::test]
    async fn quota_errors_map_to_keyword_hint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached for requests"}
            })))
            .mount(&server)
            .await;

        let area = StorageArea::in_memory("local");
        area.set_one("openai_apiKey", json!("sk-open")).unwrap();
        area.set_one(API_BASE_KEY, json!(server.uri())).unwrap();
        let err = openai(&area)
            .translate(TranslateRequest::new("text"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "请求过于频繁，触发 OpenAI 限流，请降低调用频率后再重试。"
        );
    }
}
