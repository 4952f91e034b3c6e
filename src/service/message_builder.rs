use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPair {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
}

impl TermPair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// `source -> target`, the bare source when there is no target, or `None`
    /// when both sides are blank.
    pub fn render_line(&self) -> Option<String> {
        let src = self.source.trim();
        let tgt = self.target.trim();
        if src.is_empty() && tgt.is_empty() {
            return None;
        }
        if tgt.is_empty() {
            return Some(src.to_string());
        }
        Some(format!("{} -> {}", src, tgt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct MessageBuilderOptions {
    pub needs_prompt: bool,
    pub needs_rules: bool,
    pub needs_terms: bool,
    pub needs_source_text: bool,
    pub final_instruction: String,
    pub require_prompt_or_source: bool,
    pub missing_prompt_or_source_message: String,
    pub missing_prompt_message: String,
    pub rules_label: String,
    pub terms_label: String,
    pub source_label: String,
    pub context_label: String,
    pub instruction_label: String,
}

impl Default for MessageBuilderOptions {
    fn default() -> Self {
        Self {
            needs_prompt: true,
            needs_rules: true,
            needs_terms: true,
            needs_source_text: true,
            final_instruction: String::new(),
            require_prompt_or_source: false,
            missing_prompt_or_source_message: "Prompt or source text is required.".to_string(),
            missing_prompt_message: "System prompt is required.".to_string(),
            rules_label: "项目规则".to_string(),
            terms_label: "术语".to_string(),
            source_label: "当前句段（需要翻译）".to_string(),
            context_label: "以下是用于参考的前文（用于理解语境和确定术语，不需要翻译）："
                .to_string(),
            instruction_label: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageInput<'a> {
    pub prompt: &'a str,
    pub rules: &'a str,
    pub terms: &'a [TermPair],
    pub source_text: &'a str,
    pub context_text: &'a str,
    /// Overrides the builder's default instruction when set.
    pub final_instruction: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    options: MessageBuilderOptions,
}

impl MessageBuilder {
    pub fn new(options: MessageBuilderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MessageBuilderOptions {
        &self.options
    }

    pub fn build(&self, input: &MessageInput<'_>) -> ServiceResult<Vec<ChatMessage>> {
        let options = &self.options;
        let system_content = input.prompt.trim();
        let rules = input.rules.trim();
        let source = input.source_text.trim();
        let context = input.context_text.trim();

        if options.needs_prompt && system_content.is_empty() {
            return Err(ServiceError::Validation(
                options.missing_prompt_message.clone(),
            ));
        }
        if options.require_prompt_or_source && system_content.is_empty() && source.is_empty() {
            return Err(ServiceError::Validation(
                options.missing_prompt_or_source_message.clone(),
            ));
        }
        if options.needs_source_text && source.is_empty() {
            return Err(ServiceError::Validation(
                "Source text is required.".to_string(),
            ));
        }

        let mut user_parts = Vec::new();

        if options.needs_rules && !rules.is_empty() {
            user_parts.push(format!("{}:\n{}", options.rules_label, rules));
        }

        if options.needs_terms {
            let lines = input
                .terms
                .iter()
                .filter_map(TermPair::render_line)
                .collect::<Vec<_>>();
            if !lines.is_empty() {
                user_parts.push(format!("{}:\n{}", options.terms_label, lines.join("\n")));
            }
        }

        if !context.is_empty() {
            user_parts.push(format!("{}:\n{}", options.context_label, context));
        }

        if options.needs_source_text && !source.is_empty() {
            user_parts.push(format!("{}:\n{}", options.source_label, source));
        }

        let instruction = input
            .final_instruction
            .unwrap_or(&options.final_instruction)
            .trim();
        if !instruction.is_empty() {
            let label = options.instruction_label.trim();
            if label.is_empty() {
                user_parts.push(instruction.to_string());
            } else {
                user_parts.push(format!("{}:\n{}", label, instruction));
            }
        }

        let user_content = user_parts.join("\n\n").trim().to_string();
        if user_content.is_empty() {
            return Err(ServiceError::Validation(
                "User content is required for request.".to_string(),
            ));
        }

        Ok(vec![
            ChatMessage {
                role: Role::System,
                content: system_content.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: user_content,
            },
        ])
    }
}
