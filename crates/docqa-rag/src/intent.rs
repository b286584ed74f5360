//! Keyword-based question classification.
use docqa_core::types::QueryIntent;

const TABLE_WORDS: [&str; 5] = ["table", "list", "data", "rows", "columns"];
const CHART_WORDS: [&str; 5] = ["chart", "graph", "plot", "figure", "diagram"];
const NUMERICAL_WORDS: [&str; 5] = ["calculate", "sum", "average", "percentage", "total"];

/// Classify `query` by whole-word keyword membership.
///
/// Priority is table, then chart, then numerical; anything else is general.
/// Words are split on non-alphanumeric chars, so "summarize" is not "sum";
/// plural forms ("tables", "graphs", "totals") still match.
pub fn classify(query: &str) -> QueryIntent {
    let lowered = query.to_lowercase();
    let words: Vec<&str> = lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
    let has_any = |set: &[&str]| words.iter().any(|w| set.iter().any(|kw| matches_keyword(w, kw)));
    if has_any(&TABLE_WORDS) {
        QueryIntent::Table
    } else if has_any(&CHART_WORDS) {
        QueryIntent::Chart
    } else if has_any(&NUMERICAL_WORDS) {
        QueryIntent::Numerical
    } else {
        QueryIntent::General
    }
}

fn matches_keyword(word: &str, keyword: &str) -> bool {
    match word.strip_prefix(keyword) {
        Some(rest) => rest.is_empty() || rest == "s" || rest == "es",
        None => false,
    }
}
