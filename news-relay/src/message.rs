use crate::utils::text::smart_truncate;

/// Longest caption the notification channel accepts.
pub const MAX_MESSAGE_CHARS: usize = 1024;

/// Longest title kept in the caption, before escaping.
const MAX_TITLE_CHARS: usize = MAX_MESSAGE_CHARS / 4;

/// Formats the notification text: bold title, blank line, summary. Markup
/// characters in either part are escaped and the result never exceeds
/// [`MAX_MESSAGE_CHARS`].
pub fn compose_message(title: &str, summary: &str) -> String {
    let header = format!("<b>{}</b>\n\n", fit_escaped(title.trim(), MAX_TITLE_CHARS));
    let budget = MAX_MESSAGE_CHARS.saturating_sub(header.chars().count());
    let body = fit_escaped(summary.trim(), budget);

    format!("{}{}", header, body)
}

/// Escaped `text`, truncated so the escaped form fits in `limit` chars.
///
/// Truncation happens before escaping so entities are never cut in half.
/// Each pass scales the raw budget by how much escaping overshot.
fn fit_escaped(text: &str, limit: usize) -> String {
    let mut max_chars = limit;

    while max_chars > 3 {
        let escaped = escape_html(&smart_truncate(text, max_chars));
        let len = escaped.chars().count();
        if len <= limit {
            return escaped;
        }
        max_chars = (max_chars * limit / len).min(max_chars - 1);
    }

    String::new()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
