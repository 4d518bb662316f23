//! Prompt shapes and parsing for the transformation-suggestion flow.

/// Suggestions requested when the query is empty (cast a wide net).
pub const BROAD_COUNT: usize = 7;
/// Suggestions requested for a non-empty query (narrow, steered).
pub const NARROW_COUNT: usize = 4;

/// Build the prompt asking for one-per-line transformation suggestions.
///
/// An empty query asks broadly; a non-empty query asks for fewer suggestions
/// biased toward what the user typed.
pub fn suggestion_prompt(selected: &str, query: &str) -> String {
    let query = query.trim();
    if query.is_empty() {
        format!(
            "I am using a language model to transform text. I will give you text, and you \
             will give me {BROAD_COUNT} prompts for transformations that can be done with the text. \
             Text can be code, raw data, written text or any other data in text format. \
             Prompts can be for example: \"Convert CSS to CSS-in-JS format\" if you recognise \
             the text is CSS, \"Convert json to yaml\" in case the text is JSON, \"Make the \
             text more formal\" for written texts, \"Fix grammar\" in case you see some \
             grammar issues. Now here is the text and you give me the {BROAD_COUNT} prompts, \
             one per line: `{selected}`"
        )
    } else {
        format!(
            "I am using a language model to transform text. I will give you text, and you \
             will give me {NARROW_COUNT} prompts for transformations that can be done with the \
             text, all related to \"{query}\". Answer with the {NARROW_COUNT} prompts only, one \
             per line. Here is the text: `{selected}`"
        )
    }
}

/// The prompt that applies one chosen suggestion to the selected text.
pub fn apply_prompt(suggestion: &str, selected: &str) -> String {
    format!("{suggestion}: `{selected}`")
}

/// Split a one-per-line suggestion listing into clean entries, tolerating
/// bullet and numbered decorations.
pub fn parse_suggestions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .map(strip_list_decoration)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_list_decoration(line: &str) -> &str {
    let line = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line);

    // "3. Fix grammar" -> "Fix grammar"
    if let Some((head, rest)) = line.split_once(". ") {
        if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
            return rest.trim_start();
        }
    }
    line
}
