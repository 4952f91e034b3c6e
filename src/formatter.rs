//! Punctuation clean-up applied to finished translations when
//! `translationFormatterEnabled` is on.

pub const FORMATTER_STORAGE_KEY: &str = "translationFormatterEnabled";

pub trait TextFormatter: Send + Sync {
    fn format(&self, text: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PunctuationFormatter;

impl TextFormatter for PunctuationFormatter {
    fn format(&self, text: &str) -> String {
        normalize_translation(text)
    }
}

pub fn normalize_translation(text: &str) -> String {
    replace_english_quotes(&replace_full_width_parentheses(text))
}

pub fn replace_full_width_parentheses(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '（' => '(',
            '）' => ')',
            other => other,
        })
        .collect()
}

/// Straight double quotes alternate between opening and closing curly quotes.
pub fn replace_english_quotes(text: &str) -> String {
    let mut opening = true;
    text.chars()
        .map(|ch| {
            if ch != '"' {
                return ch;
            }
            let replacement = if opening { '“' } else { '”' };
            opening = !opening;
            replacement
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_parentheses() {
        assert_eq!(replace_full_width_parentheses("（测试）"), "(测试)");
    }

    #[test]
    fn alternates_quotes() {
        assert_eq!(
            replace_english_quotes("\"你好\" she said \"再见\""),
            "“你好” she said “再见”"
        );
        assert_eq!(replace_english_quotes("odd \" quote"), "odd “ quote");
    }

    #[test]
    fn normalize_applies_both() {
        assert_eq!(normalize_translation("\"test （内容）\""), "“test (内容)”");
        assert_eq!(PunctuationFormatter.format("无变化"), "无变化");
    }
}
