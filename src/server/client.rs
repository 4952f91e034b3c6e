use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

use crate::popup::StatusCard;

const POPUP_TEMPLATE: &str = include_str!("templates/popup.html.tera");

/// Renders the status page served at `/popup`.
pub fn render_popup_html(cards: &[StatusCard]) -> Result<String> {
    let mut context = TeraContext::new();
    context.insert("cards", cards);
    Tera::one_off(POPUP_TEMPLATE, &context, true).with_context(|| "failed to render popup template")
}
