/// Text helpers
pub mod text {
    use scraper::Html;

    /// Truncate text to a maximum length in characters, trying to break at sentence boundaries
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated = prefix_chars(text, max_chars);
        if let Some(last_sentence) = truncated.rfind(". ").or_else(|| truncated.rfind('.')) {
            return truncated[..last_sentence + 1].to_string();
        }

        // Leave room for the ellipsis
        let truncated = prefix_chars(text, max_chars.saturating_sub(3));
        match truncated.rfind(' ') {
            Some(last_space) => format!("{}...", truncated[..last_space].trim_end()),
            None => format!("{}...", truncated),
        }
    }

    fn prefix_chars(text: &str, max_chars: usize) -> &str {
        let cut = text
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(text.len());
        &text[..cut]
    }

    /// Plain text of an HTML fragment, whitespace collapsed
    pub fn strip_html(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        collapse_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
    }

    pub fn collapse_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// The first `count` sentences of `text`
    pub fn leading_sentences(text: &str, count: usize) -> String {
        let mut sentences = Vec::new();
        let mut start = 0;

        for (idx, c) in text.char_indices() {
            if matches!(c, '.' | '!' | '?') {
                let end = idx + c.len_utf8();
                let boundary = text[end..].chars().next().map_or(true, char::is_whitespace);
                if boundary {
                    let sentence = text[start..end].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = end;
                    if sentences.len() == count {
                        break;
                    }
                }
            }
        }

        if sentences.len() < count {
            let rest = text[start..].trim();
            if !rest.is_empty() {
                sentences.push(rest);
            }
        }

        sentences.join(" ")
    }
}

/// URL helpers
pub mod url {
    use url::Url;

    pub fn is_http_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
            Err(_) => false,
        }
    }

    pub fn extract_host(url_str: &str) -> Option<String> {
        Url::parse(url_str).ok().and_then(|url| url.host_str().map(|h| h.to_string()))
    }

    /// Canonical form used to match listing links against feed entries:
    /// fragment and `utm_*` tracking parameters removed.
    pub fn normalize_article_url(url_str: &str) -> Option<String> {
        let mut url = Url::parse(url_str).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        url.set_fragment(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !key.starts_with("utm_"))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }

        Some(url.to_string())
    }
}
