//! Chat-completions plumbing shared by DeepSeek and OpenAI.

use serde_json::{Map, Value, json};

use super::{ProviderKind, ProviderOutput, TranslateRequest, hints};
use crate::error::ServiceResult;
use crate::logging::Logger;
use crate::service::config_loader::{finite_number, string_field};
use crate::service::http::{self, HttpRequest, RequestBody};
use crate::service::{MessageBuilder, MessageBuilderOptions, MessageInput};

pub(crate) const DEFAULT_TEMPERATURE: f64 = 1.0;
pub(crate) const TRANSLATE_INSTRUCTION: &str =
    "请将上述当前句段准确翻译为中文，只输出译文，不要附加说明。";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
    pub prompt: String,
    pub rules: String,
    pub temperature: f64,
}

pub(crate) fn storage_keys(prefix: &str) -> Vec<String> {
    ["apiKey", "model", "prompt", "rules", "temp"]
        .iter()
        .map(|field| format!("{}_{}", prefix, field))
        .collect()
}

pub(crate) fn defaults(prefix: &str, model: &str) -> Map<String, Value> {
    let mut defaults = Map::new();
    defaults.insert(format!("{}_apiKey", prefix), json!(""));
    defaults.insert(format!("{}_model", prefix), json!(model));
    defaults.insert(format!("{}_prompt", prefix), json!(""));
    defaults.insert(format!("{}_rules", prefix), json!(""));
    defaults.insert(format!("{}_temp", prefix), json!(DEFAULT_TEMPERATURE));
    defaults
}

pub(crate) fn derive(config: &Map<String, Value>, prefix: &str, default_model: &str) -> ChatConfig {
    let model = string_field(config, &format!("{}_model", prefix));
    let temperature = finite_number(config, &format!("{}_temp", prefix))
        .unwrap_or(DEFAULT_TEMPERATURE)
        .clamp(0.0, 2.0);
    ChatConfig {
        api_key: string_field(config, &format!("{}_apiKey", prefix)),
        model: if model.is_empty() {
            default_model.to_string()
        } else {
            model
        },
        prompt: string_field(config, &format!("{}_prompt", prefix)),
        rules: string_field(config, &format!("{}_rules", prefix)),
        temperature,
    }
}

pub(crate) fn message_builder(kind: ProviderKind) -> MessageBuilder {
    MessageBuilder::new(MessageBuilderOptions {
        needs_prompt: false,
        require_prompt_or_source: true,
        missing_prompt_or_source_message: format!(
            "Prompt or source text must be provided for {} request.",
            kind.label()
        ),
        final_instruction: TRANSLATE_INSTRUCTION.to_string(),
        ..Default::default()
    })
}

/// A finite request temperature wins over the configured one; both clamp to
/// the range the chat APIs accept.
pub(crate) fn resolve_temperature(configured: f64, requested: Option<f64>) -> f64 {
    requested
        .filter(|value| value.is_finite())
        .unwrap_or(configured)
        .clamp(0.0, 2.0)
}

pub(crate) struct ChatCall<'a> {
    pub kind: ProviderKind,
    pub client: &'a reqwest::Client,
    pub url: String,
    pub config: &'a ChatConfig,
    pub builder: &'a MessageBuilder,
    pub logger: &'a Logger,
}

pub(crate) async fn complete(
    call: ChatCall<'_>,
    request: TranslateRequest,
) -> ServiceResult<ProviderOutput> {
    let context = request.context.as_deref().unwrap_or_default();
    let messages = call.builder.build(&MessageInput {
        prompt: &call.config.prompt,
        rules: &call.config.rules,
        terms: &request.terms,
        source_text: &request.input,
        context_text: context,
        final_instruction: None,
    })?;
    let temperature = resolve_temperature(call.config.temperature, request.temperature);

    call.logger.log_with(
        "Sending request",
        json!({
            "url": call.url,
            "model": call.config.model,
            "temperature": temperature,
            "termCount": request.terms.len(),
            "hasContext": !context.trim().is_empty(),
        }),
    );

    let payload = json!({
        "model": call.config.model,
        "messages": messages,
        "temperature": temperature,
        "stream": false,
    });
    let outbound = HttpRequest::post(call.url)
        .header("Authorization", format!("Bearer {}", call.config.api_key))
        .extra_headers(&request.extra_headers)
        .body(RequestBody::Json(payload))
        .error_message(format!("{} API request failed", call.kind.label()))
        .signal(request.signal.clone());

    let raw: Value = match http::send_json(call.client, outbound).await {
        Ok(raw) => raw,
        Err(err) => {
            call.logger.log_with("Request failed", json!({ "error": err.to_string() }));
            return Err(hints::enrich(call.kind, err));
        }
    };
    let content = raw
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    call.logger.log_with(
        "Received response",
        json!({ "contentLength": content.chars().count() }),
    );
    Ok(ProviderOutput { content, raw })
}
