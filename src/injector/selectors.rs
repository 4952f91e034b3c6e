pub const ACTIVE_ROW: &str = "tr.activeSegment";
pub const SOURCE_CONTENT: &str = "td.original > span.content, td.original .content";
pub const TRANSLATION_CELL_CHINESE: &str = "td.translation.chinese";
pub const TRANSLATION_CELL: &str = "td.translation";
pub const EDITABLE: &str = r#"div.textarea[contenteditable="true"]"#;
pub const SPAN_CHINESE: &str = r#"span.content[lang="zh"]"#;
pub const SPAN: &str = "span.content";
pub const SEARCH_RESULTS: &str = "#searchResultsRow";
pub const VOCABULARY: &str = "div.vocabulary.col-md-3";
pub const TERM_TARGET: &str = r#".termField[lang="zh"]"#;
pub const BUTTON_CONTAINER: &str = "#searchResultsRow > td > div > div > div.vocabulary.col-md-3";

pub const WRAP_CLASS: &str = "TransAsst-wrap";
pub const COPY_CLASS: &str = "TransAsst-copy";
pub const PROVIDER_CLASS: &str = "TransAsst-provider";

pub fn provider_class(id: &str) -> String {
    format!("{}-{}", PROVIDER_CLASS, id)
}
