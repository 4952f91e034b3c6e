use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{
    Provider, ProviderFuture, ProviderKind, ProviderOutput, TranslateRequest, ensure_ready, hints,
};
use crate::error::{ServiceError, ServiceResult};
use crate::logging::Logger;
use crate::service::config_loader::string_field;
use crate::service::http::{self, HttpRequest, RequestBody};
use crate::service::ConfigLoader;
use crate::settings::DEFAULT_DEEPL_TARGET;
use crate::storage::StorageArea;

const FREE_BASE_URL: &str = "https://api-free.deepl.com";
const PRO_BASE_URL: &str = "https://api.deepl.com";
pub const API_TYPES: [&str; 2] = ["free", "pro"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepLApiType {
    Free,
    Pro,
}

impl DeepLApiType {
    pub fn parse(value: &str) -> Self {
        if value.trim() == "pro" {
            DeepLApiType::Pro
        } else {
            DeepLApiType::Free
        }
    }

    fn base_url(&self) -> &'static str {
        match self {
            DeepLApiType::Free => FREE_BASE_URL,
            DeepLApiType::Pro => PRO_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepLConfig {
    pub api_key: String,
    pub api_type: DeepLApiType,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct DeepL {
    client: reqwest::Client,
    loader: ConfigLoader<DeepLConfig>,
    logger: Logger,
    default_target: String,
    base_override: Option<String>,
}

impl DeepL {
    pub fn new(client: reqwest::Client, area: &StorageArea, logger: Logger) -> ServiceResult<Self> {
        let mut defaults = Map::new();
        defaults.insert("deepl_apiKey".to_string(), json!(""));
        defaults.insert("deepl_apiType".to_string(), json!("free"));
        let loader = ConfigLoader::new(area, &["deepl_apiKey", "deepl_apiType"], defaults, |config| {
            let api_type = DeepLApiType::parse(&string_field(config, "deepl_apiType"));
            Ok(DeepLConfig {
                api_key: string_field(config, "deepl_apiKey"),
                api_type,
                api_base: api_type.base_url().to_string(),
            })
        })?;
        Ok(Self {
            client,
            loader,
            logger,
            default_target: DEFAULT_DEEPL_TARGET.to_string(),
            base_override: None,
        })
    }

    pub fn with_default_target(mut self, target: &str) -> Self {
        self.default_target = normalize_lang(Some(target), DEFAULT_DEEPL_TARGET);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_override = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn load_config(&self) -> ServiceResult<Arc<DeepLConfig>> {
        self.loader.load()
    }

    fn api_base(&self, config: &DeepLConfig) -> String {
        self.base_override
            .clone()
            .unwrap_or_else(|| config.api_base.clone())
    }

    pub async fn translate(&self, request: TranslateRequest) -> ServiceResult<ProviderOutput> {
        let config = self.loader.load()?;
        ensure_ready(ProviderKind::DeepL, &config.api_key, &request.input)?;

        let target = normalize_lang(request.target_lang.as_deref(), &self.default_target);
        let source = normalize_lang(request.source_lang.as_deref(), "");
        self.logger.log_with(
            "Sending request",
            json!({
                "targetLang": target,
                "hasSourceLang": !source.is_empty(),
                "termsCount": request.terms.len(),
            }),
        );
        if !request.terms.is_empty() {
            self.logger
                .log("DeepL terms supplied but glossaries are not supported directly.");
        }

        let mut params = vec![
            ("text".to_string(), request.input.trim().to_string()),
            ("target_lang".to_string(), target),
        ];
        if !source.is_empty() {
            params.push(("source_lang".to_string(), source));
        }
        params.push(("preserve_formatting".to_string(), "1".to_string()));
        params.push(("split_sentences".to_string(), "0".to_string()));

        let outbound = HttpRequest::post(format!("{}/v2/translate", self.api_base(&config)))
            .header("Authorization", format!("DeepL-Auth-Key {}", config.api_key))
            .extra_headers(&request.extra_headers)
            .body(RequestBody::Form(params))
            .error_message("DeepL API request failed")
            .signal(request.signal.clone());
        let raw: Value = http::send_json(&self.client, outbound)
            .await
            .map_err(|err| hints::enrich(ProviderKind::DeepL, err))?;

        let content = raw
            .pointer("/translations/0/text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.logger.log_with(
            "Received response",
            json!({ "contentLength": content.chars().count() }),
        );
        Ok(ProviderOutput { content, raw })
    }

    pub async fn query_usage(&self, signal: Option<CancellationToken>) -> ServiceResult<Value> {
        let config = self.loader.load()?;
        if config.api_key.is_empty() {
            return Err(ServiceError::ApiKeyMissing(ProviderKind::DeepL));
        }
        let url = format!("{}/v2/usage", self.api_base(&config));
        self.logger.log_with("Querying usage", json!({ "url": url }));
        let request = HttpRequest::get(url)
            .header("Authorization", format!("DeepL-Auth-Key {}", config.api_key))
            .error_message("Usage request failed")
            .signal(signal);
        let data: Value = http::send_json(&self.client, request)
            .await
            .map_err(|err| hints::enrich(ProviderKind::DeepL, err))?;
        self.logger.log_with(
            "Usage received",
            json!({
                "hasCharacterCount": data.get("character_count").is_some(),
                "hasCharacterLimit": data.get("character_limit").is_some(),
            }),
        );
        Ok(data)
    }
}

fn normalize_lang(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.to_uppercase(),
        None => fallback.to_string(),
    }
}

impl Provider for DeepL {
    fn kind(&self) -> ProviderKind {
        ProviderKind::DeepL
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
        Some(Box::pin(async move { provider.query_usage(signal).await }))
    }
}
