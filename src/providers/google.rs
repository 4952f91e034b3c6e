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
use crate::settings::DEFAULT_GOOGLE_TARGET;
use crate::storage::StorageArea;

const TRANSLATE_URL: &str = "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Clone, PartialEq)]
pub struct GoogleConfig {
    pub api_key: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone)]
pub struct Google {
    client: reqwest::Client,
    loader: ConfigLoader<GoogleConfig>,
    logger: Logger,
    url: String,
}

impl Google {
    pub fn new(client: reqwest::Client, area: &StorageArea, logger: Logger) -> ServiceResult<Self> {
        Self::with_default_target(client, area, logger, DEFAULT_GOOGLE_TARGET)
    }

    /// `default_target` applies when `google_targetLang` is blank.
    pub fn with_default_target(
        client: reqwest::Client,
        area: &StorageArea,
        logger: Logger,
        default_target: &str,
    ) -> ServiceResult<Self> {
        let default_target = match default_target.trim() {
            "" => DEFAULT_GOOGLE_TARGET.to_string(),
            target => target.to_string(),
        };
        let mut defaults = Map::new();
        defaults.insert("google_apiKey".to_string(), json!(""));
        defaults.insert("google_sourceLang".to_string(), json!(""));
        defaults.insert("google_targetLang".to_string(), json!(default_target));
        let loader = ConfigLoader::new(
            area,
            &["google_apiKey", "google_sourceLang", "google_targetLang"],
            defaults,
            move |config| {
                let target = string_field(config, "google_targetLang");
                Ok(GoogleConfig {
                    api_key: string_field(config, "google_apiKey"),
                    source_lang: string_field(config, "google_sourceLang"),
                    target_lang: if target.is_empty() {
                        default_target.clone()
                    } else {
                        target
                    },
                })
            },
        )?;
        Ok(Self {
            client,
            loader,
            logger,
            url: TRANSLATE_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn load_config(&self) -> ServiceResult<Arc<GoogleConfig>> {
        self.loader.load()
    }

    pub async fn translate(&self, request: TranslateRequest) -> ServiceResult<ProviderOutput> {
        let config = self.loader.load()?;
        ensure_ready(ProviderKind::Google, &config.api_key, &request.input)?;

        let target = pick_lang(request.target_lang.as_deref(), &config.target_lang);
        let source = pick_lang(request.source_lang.as_deref(), &config.source_lang);
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
                .log("Glossary terms supplied but not supported directly for Google Translate.");
        }

        let target = if target.is_empty() {
            DEFAULT_GOOGLE_TARGET.to_string()
        } else {
            target
        };
        let mut payload = json!({
            "q": request.input.trim(),
            "target": target,
            "format": "text",
        });
        if !source.is_empty() {
            payload["source"] = json!(source);
        }

        let url = reqwest::Url::parse_with_params(&self.url, &[("key", config.api_key.as_str())])
            .map_err(|err| ServiceError::Config(format!("invalid Google URL: {}", err)))?;
        let outbound = HttpRequest::post(url.to_string())
            .extra_headers(&request.extra_headers)
            .body(RequestBody::Json(payload))
            .error_message("Google Translate API request failed")
            .signal(request.signal.clone());
        let raw: Value = http::send_json(&self.client, outbound)
            .await
            .map_err(|err| hints::enrich(ProviderKind::Google, err))?;

        let content = match raw.pointer("/data/translations/0/translatedText") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        self.logger.log_with(
            "Received response",
            json!({
                "contentLength": content.chars().count(),
                "hasTranslations": raw.pointer("/data/translations").is_some_and(Value::is_array),
            }),
        );
        Ok(ProviderOutput { content, raw })
    }
}

fn pick_lang(requested: Option<&str>, configured: &str) -> String {
    requested
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(configured)
        .to_string()
}

impl Provider for Google {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn is_configured(&self) -> ServiceResult<bool> {
        Ok(!self.loader.load()?.api_key.is_empty())
    }

    fn request(&self, request: TranslateRequest) -> ProviderFuture<ProviderOutput> {
        let provider = self.clone();
        Box::pin(async move { provider.translate(request).await })
    }

    fn query(&self, _signal: Option<CancellationToken>) -> Option<ProviderFuture<Value>> {
        None
    }
}
