use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::chat::{self, ChatCall, ChatConfig};
use super::{
    Provider, ProviderFuture, ProviderKind, ProviderOutput, TranslateRequest, ensure_ready, hints,
};
use crate::error::{ServiceError, ServiceResult};
use crate::logging::Logger;
use crate::service::http::{self, HttpRequest};
use crate::service::{ConfigLoader, MessageBuilder};
use crate::storage::StorageArea;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const CHAT_PATH: &str = "/v1/chat/completions";
const BALANCE_PATH: &str = "/v1/user/balance";
pub(crate) const DEFAULT_MODEL: &str = "deepseek-chat";
pub const MODELS: [&str; 2] = ["deepseek-chat", "deepseek-reasoner"];

pub type DeepSeekConfig = ChatConfig;

#[derive(Debug, Clone)]
pub struct DeepSeek {
    client: reqwest::Client,
    loader: ConfigLoader<DeepSeekConfig>,
    builder: MessageBuilder,
    logger: Logger,
    base_url: String,
}

impl DeepSeek {
    pub fn new(client: reqwest::Client, area: &StorageArea, logger: Logger) -> ServiceResult<Self> {
        let keys = chat::storage_keys("deepseek");
        let keys = keys.iter().map(String::as_str).collect::<Vec<_>>();
        let loader = ConfigLoader::new(
            area,
            &keys,
            chat::defaults("deepseek", DEFAULT_MODEL),
            |config| Ok(chat::derive(config, "deepseek", DEFAULT_MODEL)),
        )?;
        Ok(Self {
            client,
            loader,
            builder: chat::message_builder(ProviderKind::DeepSeek),
            logger,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn load_config(&self) -> ServiceResult<std::sync::Arc<DeepSeekConfig>> {
        self.loader.load()
    }

    pub async fn translate(&self, request: TranslateRequest) -> ServiceResult<ProviderOutput> {
        let config = self.loader.load()?;
        ensure_ready(ProviderKind::DeepSeek, &config.api_key, &request.input)?;
        chat::complete(
            ChatCall {
                kind: ProviderKind::DeepSeek,
                client: &self.client,
                url: format!("{}{}", self.base_url, CHAT_PATH),
                config: &config,
                builder: &self.builder,
                logger: &self.logger,
            },
            request,
        )
        .await
    }

    pub async fn query_balance(&self, signal: Option<CancellationToken>) -> ServiceResult<Value> {
        let config = self.loader.load()?;
        if config.api_key.is_empty() {
            return Err(ServiceError::ApiKeyMissing(ProviderKind::DeepSeek));
        }
        self.logger.log("Querying balance");
        let request = HttpRequest::get(format!("{}{}", self.base_url, BALANCE_PATH))
            .header("Authorization", format!("Bearer {}", config.api_key))
            .error_message("Balance request failed")
            .signal(signal);
        let data: Value = http::send_json(&self.client, request)
            .await
            .map_err(|err| hints::enrich(ProviderKind::DeepSeek, err))?;
        self.logger.log_with(
            "Balance received",
            json!({ "hasBalance": data.get("balance_infos").is_some() }),
        );
        Ok(data)
    }
}

impl Provider for DeepSeek {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepSeek
    }

    fn is_configured(&self) -> ServiceResult<bool> {
        Ok(!self.loader.load()?.api_key.is_empty())
    }

    fn request(&self, request: TranslateRequest) -> ProviderFuture<ProviderOutput> {
        let provider = self.clone();
        Box::pin(async move { provider.translate(request).await })
    }

    fn query(&self, signal: Option<CancellationToken>) -> Option<ProviderFuture<Value>> {
        let provider = self.clone();
        Some(Box::pin(async move { provider.query_balance(signal).await }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::DebugFlag;
    use crate::service::TermPair;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn deepseek(area: &StorageArea, server: &MockServer) -> DeepSeek {
        let logger = Logger::new("[DeepSeek]", DebugFlag::watch(area));
        DeepSeek::new(reqwest::Client::new(), area, logger)
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn missing_key_fails_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let area = StorageArea::in_memory("local");
        let err = deepseek(&area, &server)
            .translate(TranslateRequest::new("Hello"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "DeepSeek API key is not configured.");
    }

    #[tokio::test]
    async fn empty_text_fails_after_key_check() {
        let server = MockServer::start().await;
        let area = StorageArea::in_memory("local");
        area.set_one("deepseek_apiKey", json!("sk-test")).unwrap();
        let err = deepseek(&area, &server)
            .translate(TranslateRequest::new("   "))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Source text is empty.");
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn sends_chat_payload_and_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "deepseek-reasoner",
                "temperature": 0.5,
                "stream": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "你好"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let area = StorageArea::in_memory("local");
        area.set_one("deepseek_apiKey", json!("sk-test")).unwrap();
        area.set_one("deepseek_model", json!("deepseek-reasoner")).unwrap();
        area.set_one("deepseek_temp", json!(0.5)).unwrap();

        let output = deepseek(&area, &server)
            .translate(
                TranslateRequest::new("Hello")
                    .with_terms(vec![TermPair::new("Hello", "你好")]),
            )
            .await
            .unwrap();
        assert_eq!(output.content, "你好");
        assert_eq!(output.raw["choices"][0]["message"]["role"], "assistant");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("术语:\nHello -> 你好"));
        assert!(user.ends_with(chat::TRANSLATE_INSTRUCTION));
    }

    #[tokio::test]
    async fn status_errors_use_hint_table() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {"message": "Insufficient Balance"}
            })))
            .mount(&server)
            .await;
        let area = StorageArea::in_memory("local");
        area.set_one("deepseek_apiKey", json!("sk-test")).unwrap();
        let err = deepseek(&area, &server)
            .translate(TranslateRequest::new("Hello"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "DeepSeek 账号余额不足，请先充值后再尝试调用。");
    }

    #[tokio::test]
    async fn balance_query_returns_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "is_available": true,
                "balance_infos": [{"currency": "CNY", "total_balance": "110.00"}]
            })))
            .mount(&server)
            .await;
        let area = StorageArea::in_memory("local");
        area.set_one("deepseek_apiKey", json!("sk-test")).unwrap();
        let provider = deepseek(&area, &server);
        let data = provider.query(None).unwrap().await.unwrap();
        assert_eq!(data["balance_infos"][0]["total_balance"], "110.00");
    }
}
