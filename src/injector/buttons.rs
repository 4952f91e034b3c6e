use kuchiki::NodeRef;
use kuchiki::traits::*;
use std::collections::BTreeSet;

use super::selectors::{self, COPY_CLASS, PROVIDER_CLASS, WRAP_CLASS};
use crate::providers::ProviderKind;
use crate::service::TermPair;

const BUTTON_STYLE: &str = "display:inline-flex;align-items:center;justify-content:center;\
gap:6px;padding:0 10px;height:30px;border:0;border-radius:18px;background:rgb(216 237 251);\
color:rgb(86 181 237);font-weight:600;font-size:13px;cursor:pointer;\
box-shadow:0 2px 4px rgba(0, 0, 0, 0.15);transition:background 0.2s ease";
const WRAP_STYLE: &str = "display:flex;flex-direction:row;align-items:center;gap:6px;margin-bottom:10px";
const ICON_STYLE: &str = "width:16px;height:16px";

/// What a scan changed inside one container.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ButtonChanges {
    pub wrap_created: bool,
    pub added: Vec<ProviderKind>,
    pub removed: Vec<ProviderKind>,
    pub copy_added: bool,
}

/// Builds a detached node from markup.
fn fragment(markup: &str, selector: &str) -> Option<NodeRef> {
    let document = kuchiki::parse_html().one(markup);
    let node = document.select_first(selector).ok()?.as_node().clone();
    node.detach();
    Some(node)
}

fn icon_markup(src: &str, alt: &str) -> String {
    format!(
        r#"<img src="{}" alt="{}" style="{}">"#,
        src, alt, ICON_STYLE
    )
}

fn style_button(button: &NodeRef) {
    let Some(element) = button.as_element() else {
        return;
    };
    let mut attributes = element.attributes.borrow_mut();
    if attributes.get("data-styled") == Some("1") {
        return;
    }
    attributes.insert("style", BUTTON_STYLE.to_string());
    attributes.insert("data-styled", "1".to_string());
}

fn ensure_wrap(container: &NodeRef, changes: &mut ButtonChanges) -> Option<NodeRef> {
    if let Ok(wrap) = container.select_first(&format!(".{}", WRAP_CLASS)) {
        return Some(wrap.as_node().clone());
    }
    let wrap = fragment(
        &format!(r#"<div class="{}" style="{}"></div>"#, WRAP_CLASS, WRAP_STYLE),
        &format!("div.{}", WRAP_CLASS),
    )?;
    container.prepend(wrap.clone());
    changes.wrap_created = true;
    Some(wrap)
}

fn ensure_provider_buttons(
    wrap: &NodeRef,
    enabled: &BTreeSet<ProviderKind>,
    changes: &mut ButtonChanges,
) {
    for kind in ProviderKind::ALL {
        let class = selectors::provider_class(kind.as_str());
        let existing = wrap.select_first(&format!(".{}", class)).ok();
        if !enabled.contains(&kind) {
            if let Some(button) = existing {
                button.as_node().detach();
                changes.removed.push(kind);
            }
            continue;
        }
        if let Some(button) = existing {
            style_button(button.as_node());
            continue;
        }
        let markup = format!(
            r#"<button class="{} {}" type="button" title="{}" data-provider="{}">{}</button>"#,
            PROVIDER_CLASS,
            class,
            kind.label(),
            kind.as_str(),
            icon_markup(&format!("assets/icons/{}.svg", kind.as_str()), kind.label())
        );
        if let Some(button) = fragment(&markup, &format!("button.{}", class)) {
            style_button(&button);
            // provider buttons stay ahead of the copy button
            match wrap.select_first(&format!(".{}", COPY_CLASS)) {
                Ok(copy) => copy.as_node().insert_before(button),
                Err(()) => wrap.append(button),
            }
            changes.added.push(kind);
        }
    }
}

fn ensure_copy_button(wrap: &NodeRef, changes: &mut ButtonChanges) {
    let icon = icon_markup("assets/icons/copy.svg", "");
    if let Ok(button) = wrap.select_first(&format!(".{}", COPY_CLASS)) {
        let node = button.as_node();
        if node.select_first("img").is_err() {
            for child in node.children().collect::<Vec<_>>() {
                child.detach();
            }
            if let Some(img) = fragment(&icon, "img") {
                node.append(img);
            }
        }
        style_button(node);
        return;
    }
    let markup = format!(
        r#"<button class="{}" type="button">{}</button>"#,
        COPY_CLASS, icon
    );
    if let Some(button) = fragment(&markup, &format!("button.{}", COPY_CLASS)) {
        style_button(&button);
        wrap.append(button);
        changes.copy_added = true;
    }
}

/// Brings one container's button strip in line with the enabled providers.
pub fn sync_container(container: &NodeRef, enabled: &BTreeSet<ProviderKind>) -> ButtonChanges {
    let mut changes = ButtonChanges::default();
    let Some(wrap) = ensure_wrap(container, &mut changes) else {
        return changes;
    };
    ensure_provider_buttons(&wrap, enabled, &mut changes);
    ensure_copy_button(&wrap, &mut changes);
    changes
}

/// Clipboard text for the copy button.
pub fn copy_text(source: &str, terms: &[TermPair]) -> String {
    let mut text = format!("原文：{}\n\n术语：\n", source);
    if terms.is_empty() {
        text.push_str("（无术语）");
    } else {
        let lines = terms
            .iter()
            .map(|pair| format!("{} {}", pair.source, pair.target))
            .collect::<Vec<_>>();
        text.push_str(&lines.join("\n"));
    }
    text
}
