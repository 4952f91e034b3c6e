//! Human-readable failure messages keyed by HTTP status and body keywords.
//!
//! Selection order per provider: a specific `(status, keyword)` hint, then a
//! per-status message, then the text extracted from the body, then a generic
//! failure line.

use serde_json::Value;

use super::ProviderKind;
use crate::error::ServiceError;

const DEEPSEEK_STATUS: &[(u16, &str)] = &[
    (400, "DeepSeek 请求格式有误，请根据提示检查请求体参数与格式。"),
    (401, "DeepSeek API Key 认证失败，请确认已创建并正确填写 API Key。"),
    (402, "DeepSeek 账号余额不足，请先充值后再尝试调用。"),
    (422, "DeepSeek 请求参数错误，请根据提示修改参数。"),
    (429, "DeepSeek 请求速率已达到上限，请合理规划请求频率。"),
    (500, "DeepSeek 服务器故障，请稍后重试，持续异常请联系支持。"),
    (503, "DeepSeek 服务器繁忙，请稍后重试。"),
];

const DEEPL_STATUS: &[(u16, &str)] = &[
    (400, "DeepL 请求参数有误，请检查必填参数、拼写及取值是否符合 API 要求。"),
    (403, "DeepL 身份验证失败，请确认订阅的 API 计划有效且 API Key 填写正确。"),
    (404, "DeepL 请求地址不存在，请检查 API Base 与路径配置是否正确。"),
    (413, "文本过长，超过 DeepL 支持的单次请求大小，请拆分文本后重试。"),
    (414, "DeepL 请求 URL 过长，请改用 POST 请求或减少 URL 参数长度。"),
    (429, "DeepL 请求过于频繁，请等待更长时间再试，或减少单次文本长度。"),
    (456, "DeepL 已达到字符额度限制，请在账户的 Cost Control 中提高上限。"),
];

const OPENAI_KEYWORDS: &[(u16, &str, &str)] = &[
    (
        401,
        "invalid authentication",
        "OpenAI 身份验证失败，请确认 API Key 以及组织信息填写正确。",
    ),
    (
        401,
        "incorrect api key provided",
        "OpenAI API Key 不正确，请确认 API Key 后再试。",
    ),
    (
        401,
        "must be a member of an organization",
        "当前账号未加入任何 OpenAI 组织，请联系管理员或 OpenAI 支持加入组织。",
    ),
    (
        401,
        "ip not authorized",
        "请求 IP 不在 OpenAI 允许列表，请从已授权的 IP 发送请求或更新允许列表。",
    ),
    (
        403,
        "not supported",
        "当前所在国家或地区无法使用 OpenAI API，请确认访问方案是否受限。",
    ),
    (
        429,
        "rate limit",
        "请求过于频繁，触发 OpenAI 限流，请降低调用频率后再重试。",
    ),
    (
        429,
        "exceeded your current quota",
        "已用尽当前配额或额度，请购买更多额度或调整计划后再次调用。",
    ),
    (
        500,
        "server had an error",
        "OpenAI 服务器内部错误，请稍等片刻后再试，如持续失败可查看状态页。",
    ),
    (
        503,
        "currently overloaded",
        "OpenAI 服务正忙，请稍后再提交请求，或改用流量较低时段。",
    ),
    (
        503,
        "slow down",
        "请求速率突增导致服务限流，请恢复到原有速率，稳定一段时间后再提升。",
    ),
];

const OPENAI_STATUS: &[(u16, &str)] = &[
    (401, "OpenAI 身份验证未通过，请确认 API Key 与组织设置是否正确。"),
    (403, "OpenAI 拒绝了请求，请确认访问地区是否受支持。"),
    (429, "OpenAI 报告请求过多或额度不足，请减慢调用或检查额度。"),
    (500, "OpenAI 服务器出现错误，请稍后重试。"),
    (503, "OpenAI 服务暂时不可用，请稍后再试。"),
];

const GOOGLE_KEYWORDS: &[(u16, &str, &str)] = &[
    (
        400,
        "api key not valid",
        "Google Translate API Key 无效，请确认 API Key 填写正确。",
    ),
    (
        403,
        "billing",
        "Google Cloud 项目未启用结算，请在控制台开启结算后再试。",
    ),
];

const GOOGLE_STATUS: &[(u16, &str)] = &[
    (400, "Google Translate 请求参数有误，请检查目标语言与 API Key。"),
    (403, "Google Translate 拒绝了请求，请确认已启用 Cloud Translation API 且 Key 未受限制。"),
    (429, "Google Translate 请求过于频繁或配额已用尽，请稍后再试。"),
];

pub fn describe(provider: ProviderKind, status: u16, body: &str) -> String {
    let text = extract_error_text(provider, body);
    match provider {
        ProviderKind::DeepSeek => describe_deepseek(status, text),
        ProviderKind::DeepL => describe_deepl(status, text),
        ProviderKind::OpenAI => describe_openai(status, text),
        ProviderKind::Google => describe_google(status, text),
    }
}

/// Maps the shared helper's HTTP failure into the provider-specific error.
pub(crate) fn enrich(provider: ProviderKind, err: ServiceError) -> ServiceError {
    match err {
        ServiceError::Http { status, body, .. } => ServiceError::ProviderRequestFailed {
            provider,
            status,
            message: describe(provider, status, &body),
        },
        other => other,
    }
}

/// Pulls a readable message out of an error body. HTML pages and JSON the
/// provider did not shape as expected yield nothing rather than raw markup.
pub fn extract_error_text(provider: ProviderKind, body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
        let candidates: &[&[&str]] = match provider {
            ProviderKind::DeepSeek => &[&["error", "message"], &["message"], &["error"], &["detail"]],
            ProviderKind::DeepL => &[&["message"], &["error", "message"], &["error", "detail"], &["error"]],
            ProviderKind::OpenAI | ProviderKind::Google => &[&["error", "message"]],
        };
        for path in candidates {
            if let Some(message) = string_at(&parsed, path) {
                return Some(message);
            }
        }
        if !parsed.is_string() {
            return None;
        }
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return None;
    }
    Some(trimmed.to_string())
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn lookup(table: &[(u16, &'static str)], status: u16) -> Option<&'static str> {
    table
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, message)| *message)
}

fn keyword_hint(
    table: &[(u16, &str, &'static str)],
    status: u16,
    text: Option<&str>,
) -> Option<&'static str> {
    let normalized = text.unwrap_or_default().to_lowercase();
    table
        .iter()
        .find(|(code, keyword, _)| *code == status && normalized.contains(keyword))
        .map(|(_, _, message)| *message)
}

fn describe_deepseek(status: u16, text: Option<String>) -> String {
    if let Some(hint) = lookup(DEEPSEEK_STATUS, status) {
        return hint.to_string();
    }
    if (500..=599).contains(&status) {
        return match text {
            Some(text) => format!("DeepSeek 服务暂时不可用（{}）：{}", status, text),
            None => "DeepSeek 服务暂时不可用，请稍后重试。".to_string(),
        };
    }
    match text {
        Some(text) => format!("DeepSeek 请求失败：{}", text),
        None => "DeepSeek 请求失败，请稍后再试。".to_string(),
    }
}

fn describe_deepl(status: u16, text: Option<String>) -> String {
    if (500..=599).contains(&status) {
        if status == 503 {
            return "DeepL 服务繁忙，请稍等片刻后再试。".to_string();
        }
        return "DeepL 服务器内部错误，如多次出现请联系支持。".to_string();
    }
    if let Some(hint) = lookup(DEEPL_STATUS, status) {
        return hint.to_string();
    }
    match text {
        Some(text) => format!("DeepL 请求失败：{}", text),
        None => "DeepL 请求失败，请稍后再试。".to_string(),
    }
}

fn describe_openai(status: u16, text: Option<String>) -> String {
    if let Some(hint) = keyword_hint(OPENAI_KEYWORDS, status, text.as_deref()) {
        return hint.to_string();
    }
    if let Some(fallback) = lookup(OPENAI_STATUS, status) {
        return match text {
            Some(text) => format!("{}（{}）", fallback, text),
            None => fallback.to_string(),
        };
    }
    text.unwrap_or_else(|| "OpenAI 请求失败，请稍后再试。".to_string())
}

fn describe_google(status: u16, text: Option<String>) -> String {
    if let Some(hint) = keyword_hint(GOOGLE_KEYWORDS, status, text.as_deref()) {
        return hint.to_string();
    }
    if let Some(fallback) = lookup(GOOGLE_STATUS, status) {
        return fallback.to_string();
    }
    if (500..=599).contains(&status) {
        return "Google Translate 服务暂时不可用，请稍后再试。".to_string();
    }
    match text {
        Some(text) => format!("Google Translate 请求失败：{}", text),
        None => "Google Translate 请求失败，请稍后再试。".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_and_malformed_json_bodies_are_hidden() {
        assert_eq!(extract_error_text(ProviderKind::OpenAI, "<html>502</html>"), None);
        assert_eq!(extract_error_text(ProviderKind::OpenAI, "{not json"), None);
        assert_eq!(extract_error_text(ProviderKind::OpenAI, "{\"other\":1}"), None);
        assert_eq!(
            extract_error_text(ProviderKind::OpenAI, "  plain failure "),
            Some("plain failure".to_string())
        );
    }

    #[test]
    fn provider_specific_json_fields() {
        let body = r#"{"message":"Wrong endpoint"}"#;
        assert_eq!(
            extract_error_text(ProviderKind::DeepL, body).as_deref(),
            Some("Wrong endpoint")
        );
        assert_eq!(extract_error_text(ProviderKind::OpenAI, body), None);

        let body = r#"{"detail":"bad model"}"#;
        assert_eq!(
            extract_error_text(ProviderKind::DeepSeek, body).as_deref(),
            Some("bad model")
        );
    }

    #[test]
    fn deepseek_table_wins_over_body_text() {
        let message = describe(ProviderKind::DeepSeek, 402, r#"{"error":{"message":"Insufficient Balance"}}"#);
        assert_eq!(message, "DeepSeek 账号余额不足，请先充值后再尝试调用。");
        assert_eq!(
            describe(ProviderKind::DeepSeek, 502, "gateway"),
            "DeepSeek 服务暂时不可用（502）：gateway"
        );
        assert_eq!(
            describe(ProviderKind::DeepSeek, 418, ""),
            "DeepSeek 请求失败，请稍后再试。"
        );
    }

    #[test]
    fn deepl_server_errors_come_first() {
        assert_eq!(
            describe(ProviderKind::DeepL, 503, ""),
            "DeepL 服务繁忙，请稍等片刻后再试。"
        );
        assert!(describe(ProviderKind::DeepL, 403, "forbidden").starts_with("DeepL 身份验证失败"));
        assert_eq!(
            describe(ProviderKind::DeepL, 409, "conflict"),
            "DeepL 请求失败：conflict"
        );
    }

    #[test]
    fn openai_keywords_then_fallbacks() {
        let body = r#"{"error":{"message":"You exceeded your current quota, please check your plan"}}"#;
        assert_eq!(
            describe(ProviderKind::OpenAI, 429, body),
            "已用尽当前配额或额度，请购买更多额度或调整计划后再次调用。"
        );
        let body = r#"{"error":{"message":"Something else"}}"#;
        assert_eq!(
            describe(ProviderKind::OpenAI, 401, body),
            "OpenAI 身份验证未通过，请确认 API Key 与组织设置是否正确。（Something else）"
        );
        assert_eq!(describe(ProviderKind::OpenAI, 404, body), "Something else");
        assert_eq!(
            describe(ProviderKind::OpenAI, 404, ""),
            "OpenAI 请求失败，请稍后再试。"
        );
    }

    #[test]
    fn google_hints() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key."}}"#;
        assert_eq!(
            describe(ProviderKind::Google, 400, body),
            "Google Translate API Key 无效，请确认 API Key 填写正确。"
        );
        assert_eq!(
            describe(ProviderKind::Google, 500, ""),
            "Google Translate 服务暂时不可用，请稍后再试。"
        );
    }

    #[test]
    fn enrich_only_touches_http_failures() {
        let err = enrich(
            ProviderKind::DeepL,
            ServiceError::Http {
                status: 456,
                body: String::new(),
                message: "raw".into(),
            },
        );
        assert!(matches!(
            err,
            ServiceError::ProviderRequestFailed { status: 456, .. }
        ));
        let untouched = enrich(ProviderKind::DeepL, ServiceError::EmptySourceText);
        assert!(matches!(untouched, ServiceError::EmptySourceText));
    }
}
