use regex::Regex;
use std::sync::OnceLock;

// Opening fence, optional language tag, lazy body, closing fence. `.` does
// not cross newlines in this engine, hence the [\s\S] class.
fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```\w*([\s\S]*?)```").expect("fence pattern is valid"))
}

/// First fenced code block in `text`, trimmed, with any language tag on the
/// opening fence discarded. `None` when no fence pair exists.
pub fn first_code_block(text: &str) -> Option<String> {
    let caps = fence_pattern().captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}
