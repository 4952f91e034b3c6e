//! Reads segment text and glossary terms out of the host page and writes
//! translations back into it.

use kuchiki::traits::*;
use kuchiki::{ElementData, NodeDataRef, NodeRef};

use super::selectors;
use crate::service::TermPair;

pub type Element = NodeDataRef<ElementData>;

pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn active_row(document: &NodeRef) -> Option<Element> {
    document.select_first(selectors::ACTIVE_ROW).ok()
}

pub fn source_text(row: &NodeRef) -> String {
    row.select_first(selectors::SOURCE_CONTENT)
        .map(|el| normalize_text(&el.text_contents()))
        .unwrap_or_default()
}

fn translation_cell(row: &NodeRef) -> Option<Element> {
    row.select_first(selectors::TRANSLATION_CELL_CHINESE)
        .or_else(|_| row.select_first(selectors::TRANSLATION_CELL))
        .ok()
}

fn translation_span(cell: &NodeRef) -> Option<Element> {
    cell.select_first(selectors::SPAN_CHINESE)
        .or_else(|_| cell.select_first(selectors::SPAN))
        .ok()
}

pub fn translation_text(row: &NodeRef) -> String {
    let Some(cell) = translation_cell(row) else {
        return String::new();
    };
    if let Ok(editable) = cell.as_node().select_first(selectors::EDITABLE) {
        return normalize_text(&editable.text_contents());
    }
    translation_span(cell.as_node())
        .map(|span| normalize_text(&span.text_contents()))
        .unwrap_or_default()
}

/// One pair per Chinese target of each glossary entry; entries without a
/// target yield a pair with an empty target.
pub fn extract_terms(document: &NodeRef) -> Vec<TermPair> {
    let mut pairs = Vec::new();
    let Ok(results) = document.select_first(selectors::SEARCH_RESULTS) else {
        return pairs;
    };
    let Ok(vocabulary) = results.as_node().select_first(selectors::VOCABULARY) else {
        return pairs;
    };
    let Ok(items) = vocabulary.as_node().select("li") else {
        return pairs;
    };

    for item in items {
        let divs = item
            .as_node()
            .children()
            .elements()
            .filter(|child| child.name.local.as_ref() == "div")
            .collect::<Vec<_>>();
        let Some(first) = divs.first() else {
            continue;
        };
        let source = match first.as_node().select_first("a") {
            Ok(anchor) => normalize_text(&anchor.text_contents()),
            Err(()) => normalize_text(&first.text_contents()),
        };
        if source.is_empty() {
            continue;
        }
        let mut found = false;
        for div in &divs[1..] {
            let Ok(targets) = div.as_node().select(selectors::TERM_TARGET) else {
                continue;
            };
            for target in targets {
                let text = normalize_text(&target.text_contents());
                if !text.is_empty() {
                    pairs.push(TermPair::new(source.clone(), text));
                    found = true;
                }
            }
        }
        if !found {
            pairs.push(TermPair::new(source, ""));
        }
    }
    pairs
}

/// Appends `translation` to the row's editable area (blank-line separated) or,
/// failing that, to its translation span (space separated).
pub fn write_translation(row: &NodeRef, translation: &str) -> bool {
    let Some(cell) = translation_cell(row) else {
        return false;
    };
    if let Ok(editable) = cell.as_node().select_first(selectors::EDITABLE) {
        append_text(editable.as_node(), translation, "\n\n");
        return true;
    }
    if let Some(span) = translation_span(cell.as_node()) {
        append_text(span.as_node(), translation, " ");
        return true;
    }
    false
}

fn append_text(target: &NodeRef, addition: &str, separator: &str) {
    let current = target.text_contents();
    let joined = if current.trim().is_empty() {
        format!("{}{}", current, addition)
    } else {
        format!("{}{}{}", current, separator, addition)
    };
    for child in target.children().collect::<Vec<_>>() {
        child.detach();
    }
    target.append(NodeRef::new_text(joined));
}
