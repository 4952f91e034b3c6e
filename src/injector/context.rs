use kuchiki::NodeRef;
use kuchiki::traits::*;
use serde_json::Value;

use super::scrape;
use crate::providers::ProviderKind;

pub const CONTEXT_WINDOW_STORAGE_KEY: &str = "contextWindowSize";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mac,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Other
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub fn is_override(&self, platform: Platform) -> bool {
        match platform {
            Platform::Mac => self.meta,
            Platform::Other => self.ctrl || self.meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    pub max: u32,
    pub override_size: u32,
}

impl ContextWindow {
    /// Rounds and clamps a stored size; anything non-numeric counts as zero.
    pub fn clamp(&self, value: Option<&Value>) -> u32 {
        let parsed = match value {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            Some(Value::Bool(flag)) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        };
        match parsed.filter(|value| value.is_finite()) {
            Some(value) => value.round().clamp(0.0, self.max as f64) as u32,
            None => 0,
        }
    }

    /// With the override modifier held, chat providers flip between no
    /// context and the override size.
    pub fn effective(
        &self,
        provider: ProviderKind,
        configured: u32,
        modifiers: Modifiers,
        platform: Platform,
    ) -> u32 {
        if !modifiers.is_override(platform) {
            return configured;
        }
        if !matches!(provider, ProviderKind::DeepSeek | ProviderKind::OpenAI) {
            return configured;
        }
        if configured == 0 {
            self.override_size
        } else {
            0
        }
    }
}

/// Preceding `tr` siblings of `row`, nearest first.
pub fn context_rows(row: &NodeRef, limit: u32) -> Vec<NodeRef> {
    if limit == 0 {
        return Vec::new();
    }
    row.preceding_siblings()
        .elements()
        .filter(|sibling| sibling.name.local.as_ref() == "tr")
        .take(limit as usize)
        .map(|sibling| sibling.as_node().clone())
        .collect()
}

pub fn build_reference_context(row: &NodeRef, limit: u32) -> String {
    let rows = context_rows(row, limit);
    if rows.is_empty() {
        return String::new();
    }
    let sections = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            format!(
                "【前文{}】\n原文：{}\n译文：{}",
                index + 1,
                scrape::source_text(row),
                scrape::translation_text(row)
            )
        })
        .collect::<Vec<_>>();
    format!("\n{}", sections.join("\n"))
}
