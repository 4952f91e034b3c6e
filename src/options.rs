//! Per-provider settings forms and the general toggles.
//!
//! Each provider shows the API key plus the fields listed in its row of the
//! visibility table. Saving writes only those fields, trimmed, in one update.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use crate::formatter::FORMATTER_STORAGE_KEY;
use crate::injector::CONTEXT_WINDOW_STORAGE_KEY;
use crate::logging::DEBUG_STORAGE_KEY;
use crate::providers::{
    DEEPL_API_TYPES, DEEPSEEK_DEFAULT_MODEL, DEEPSEEK_MODELS, DEFAULT_TEMPERATURE,
    OPENAI_DEFAULT_BASE_URL, OPENAI_DEFAULT_MODEL, ProviderKind,
};
use crate::settings::{DEFAULT_CONTEXT_WINDOW_MAX, DEFAULT_GOOGLE_TARGET};
use crate::storage::StorageArea;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "lowercase")]
pub enum FieldKind {
    Secret,
    Text,
    TextArea,
    Number,
    Select(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Storage key suffix, e.g. `model` for `deepseek_model`.
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub default: &'static str,
}

const fn field(
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    default: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind,
        default,
    }
}

const API_KEY: FieldSpec = field("apiKey", "API Key", FieldKind::Secret, "");
const PROMPT: FieldSpec = field("prompt", "Prompt", FieldKind::TextArea, "");
const RULES: FieldSpec = field("rules", "Rules", FieldKind::TextArea, "");
const TEMPERATURE: FieldSpec = field("temp", "Temperature", FieldKind::Number, "1");

/// Fields shown for `kind`, API key first.
pub fn fields(kind: ProviderKind) -> Vec<FieldSpec> {
    match kind {
        ProviderKind::DeepSeek => vec![
            API_KEY,
            field(
                "model",
                "Model",
                FieldKind::Select(&DEEPSEEK_MODELS),
                DEEPSEEK_DEFAULT_MODEL,
            ),
            PROMPT,
            RULES,
            TEMPERATURE,
        ],
        ProviderKind::OpenAI => vec![
            API_KEY,
            field("model", "Model", FieldKind::Text, OPENAI_DEFAULT_MODEL),
            PROMPT,
            RULES,
            TEMPERATURE,
            field(
                "apiBaseUrl",
                "API Base URL",
                FieldKind::Text,
                OPENAI_DEFAULT_BASE_URL,
            ),
        ],
        ProviderKind::DeepL => vec![
            API_KEY,
            field(
                "apiType",
                "API Type",
                FieldKind::Select(&DEEPL_API_TYPES),
                "free",
            ),
        ],
        ProviderKind::Google => vec![
            API_KEY,
            field("sourceLang", "Source Language", FieldKind::Text, ""),
            field(
                "targetLang",
                "Target Language",
                FieldKind::Text,
                DEFAULT_GOOGLE_TARGET,
            ),
        ],
    }
}

fn storage_key(kind: ProviderKind, field: &FieldSpec) -> String {
    format!("{}_{}", kind.as_str(), field.name)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderForm {
    pub provider: ProviderKind,
    pub values: BTreeMap<&'static str, String>,
}

impl ProviderForm {
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Sets a visible field; unknown names are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match fields(self.provider).into_iter().find(|f| f.name == name) {
            Some(spec) => {
                self.values.insert(spec.name, value.into());
                true
            }
            None => false,
        }
    }
}

/// Stored value as form text. Defaults only fill keys that were never saved,
/// and whole numbers drop their fraction (`1`, not `1.0`).
fn display_value(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number
            .as_f64()
            .map(|value| value.to_string())
            .unwrap_or_else(|| number.to_string()),
        _ => default.to_string(),
    }
}

/// Form input for temperature; anything unparseable falls back to 1.
fn parse_temperature(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_TEMPERATURE)
}

#[derive(Debug, Clone)]
pub struct OptionsPage {
    storage: StorageArea,
}

impl OptionsPage {
    pub fn new(storage: StorageArea) -> Self {
        Self { storage }
    }

    pub fn load(&self, kind: ProviderKind) -> ProviderForm {
        let specs = fields(kind);
        let keys = specs
            .iter()
            .map(|spec| storage_key(kind, spec))
            .collect::<Vec<_>>();
        let stored = self.storage.get(keys.iter().map(String::as_str));
        let values = specs
            .iter()
            .zip(&keys)
            .map(|(spec, key)| (spec.name, display_value(stored.get(key), spec.default)))
            .collect();
        ProviderForm {
            provider: kind,
            values,
        }
    }

    /// Writes the visible fields and returns the confirmation message.
    pub fn save(&self, form: &ProviderForm) -> Result<String> {
        let mut payload = Map::new();
        for spec in fields(form.provider) {
            let raw = form.get(spec.name).trim();
            let value = match spec.kind {
                FieldKind::Number => json!(parse_temperature(raw)),
                _ => json!(raw),
            };
            payload.insert(storage_key(form.provider, &spec), value);
        }
        self.storage.set(payload)?;
        Ok(format!("{} 设置已保存！", form.provider.key_label()))
    }

    /// Static defaults for the form; storage is left untouched until saved.
    pub fn reset(&self, kind: ProviderKind) -> ProviderForm {
        ProviderForm {
            provider: kind,
            values: fields(kind)
                .into_iter()
                .map(|spec| (spec.name, spec.default.to_string()))
                .collect(),
        }
    }

    pub fn general(&self) -> GeneralSettings {
        GeneralSettings::load(&self.storage)
    }

    pub fn save_general(&self, settings: &GeneralSettings) -> Result<()> {
        settings.save(&self.storage)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralSettings {
    pub debug: bool,
    pub formatter_enabled: bool,
    pub context_window_size: u32,
}

impl GeneralSettings {
    pub fn load(storage: &StorageArea) -> Self {
        let size = storage
            .get_one(CONTEXT_WINDOW_STORAGE_KEY)
            .and_then(|value| value.as_f64())
            .filter(|value| value.is_finite())
            .map(|value| value.round().clamp(0.0, DEFAULT_CONTEXT_WINDOW_MAX as f64) as u32)
            .unwrap_or(0);
        Self {
            debug: storage.get_bool(DEBUG_STORAGE_KEY),
            formatter_enabled: storage.get_bool(FORMATTER_STORAGE_KEY),
            context_window_size: size,
        }
    }

    pub fn save(&self, storage: &StorageArea) -> Result<()> {
        let mut payload = Map::new();
        payload.insert(DEBUG_STORAGE_KEY.to_string(), json!(self.debug));
        payload.insert(
            FORMATTER_STORAGE_KEY.to_string(),
            json!(self.formatter_enabled),
        );
        payload.insert(
            CONTEXT_WINDOW_STORAGE_KEY.to_string(),
            json!(self.context_window_size.min(DEFAULT_CONTEXT_WINDOW_MAX)),
        );
        storage.set(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_table_per_provider() {
        let names = |kind| fields(kind).iter().map(|f| f.name).collect::<Vec<_>>();
        assert_eq!(
            names(ProviderKind::DeepSeek),
            vec!["apiKey", "model", "prompt", "rules", "temp"]
        );
        assert_eq!(
            names(ProviderKind::OpenAI),
            vec!["apiKey", "model", "prompt", "rules", "temp", "apiBaseUrl"]
        );
        assert_eq!(names(ProviderKind::DeepL), vec!["apiKey", "apiType"]);
        assert_eq!(
            names(ProviderKind::Google),
            vec!["apiKey", "sourceLang", "targetLang"]
        );
    }

    #[test]
    fn save_then_load_round_trips_trimmed_values() {
        let storage = StorageArea::in_memory("local");
        let page = OptionsPage::new(storage.clone());
        let mut form = page.load(ProviderKind::OpenAI);
        assert_eq!(form.get("model"), "gpt-4o-mini");
        form.set("apiKey", "  sk-live ");
        form.set("prompt", " Be brief. ");
        form.set("temp", "0.3");
        assert!(!form.set("apiType", "pro"));

        let message = page.save(&form).unwrap();
        assert_eq!(message, "OpenAI 设置已保存！");
        assert_eq!(storage.get_one("openai_temp"), Some(json!(0.3)));
        assert_eq!(storage.get_one("openai_apiType"), None);

        let reloaded = page.load(ProviderKind::OpenAI);
        assert_eq!(reloaded.get("apiKey"), "sk-live");
        assert_eq!(reloaded.get("prompt"), "Be brief.");
        assert_eq!(reloaded.get("temp"), "0.3");
    }

    #[test]
    fn whole_temperatures_and_blank_fields_reload_as_saved() {
        let storage = StorageArea::in_memory("local");
        let page = OptionsPage::new(storage.clone());
        let fresh = page.load(ProviderKind::OpenAI);
        assert_eq!(fresh.get("temp"), "1");

        for temp in ["1", "0", "0.3"] {
            let mut form = page.load(ProviderKind::OpenAI);
            form.set("temp", temp);
            form.set("model", "");
            page.save(&form).unwrap();
            let reloaded = page.load(ProviderKind::OpenAI);
            assert_eq!(reloaded.get("temp"), temp);
            assert_eq!(reloaded.get("model"), "");
            assert_eq!(reloaded, form);
        }
    }

    #[test]
    fn bad_temperature_falls_back_to_one() {
        let storage = StorageArea::in_memory("local");
        let page = OptionsPage::new(storage.clone());
        let mut form = page.load(ProviderKind::DeepSeek);
        form.set("temp", "warm");
        page.save(&form).unwrap();
        assert_eq!(storage.get_one("deepseek_temp"), Some(json!(1.0)));
    }

    #[test]
    fn reset_returns_defaults_without_writing() {
        let storage = StorageArea::in_memory("local");
        storage.set_one("google_apiKey", json!("g")).unwrap();
        let page = OptionsPage::new(storage.clone());
        let form = page.reset(ProviderKind::Google);
        assert_eq!(form.get("apiKey"), "");
        assert_eq!(form.get("targetLang"), "zh-CN");
        assert_eq!(storage.get_string("google_apiKey").as_deref(), Some("g"));
        assert_eq!(
            page.save(&form).unwrap(),
            "Google Translate 设置已保存！"
        );
    }

    #[test]
    fn general_settings_clamp_window() {
        let storage = StorageArea::in_memory("local");
        storage.set_one(CONTEXT_WINDOW_STORAGE_KEY, json!(22.4)).unwrap();
        let mut general = GeneralSettings::load(&storage);
        assert_eq!(general.context_window_size, 15);
        general.debug = true;
        general.context_window_size = 40;
        general.save(&storage).unwrap();
        assert_eq!(storage.get_one(CONTEXT_WINDOW_STORAGE_KEY), Some(json!(15)));
        assert!(storage.get_bool(DEBUG_STORAGE_KEY));
    }
}
