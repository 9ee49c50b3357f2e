use crate::types::{RelayError, Result};
use crate::utils::url::normalize_article_url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Paths that never lead to an article.
const SKIPPED_SEGMENTS: [&str; 8] = [
    "/tag/", "/author/", "/category/", "/page/", "/login", "/newsletter", "/events/", "/about",
];

/// Extracts candidate article links from a rendered listing page.
#[derive(Debug, Clone)]
pub struct ListingParser {
    selector: Selector,
    path_prefix: Option<String>,
}

impl ListingParser {
    /// Accepts any anchor with an `href`.
    pub fn new() -> Self {
        Self {
            selector: Selector::parse("a[href]").expect("static selector is valid"),
            path_prefix: None,
        }
    }

    pub fn with_selector(mut self, css: &str) -> Result<Self> {
        self.selector = Selector::parse(css)
            .map_err(|e| RelayError::Parse(format!("Invalid link selector '{}': {:?}", css, e)))?;
        Ok(self)
    }

    /// Only keep links whose path starts with `prefix`, e.g. `/2024/`.
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Same-host article links in page order, without duplicates.
    pub fn extract_links(&self, html: &str, page_url: &str) -> Result<Vec<String>> {
        let base = Url::parse(page_url)?;
        let document = Html::parse_document(html);

        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&self.selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };

            let Some(url) = self.resolve(&base, href.trim()) else {
                continue;
            };

            if seen.insert(url.clone()) {
                links.push(url);
            }
        }

        debug!("Extracted {} candidate links from {}", links.len(), page_url);
        Ok(links)
    }

    fn resolve(&self, base: &Url, href: &str) -> Option<String> {
        if href.is_empty() || href.starts_with('#') {
            return None;
        }

        let absolute = base.join(href).ok()?;

        if absolute.host_str() != base.host_str() {
            return None;
        }

        let path = absolute.path();
        if path == "/" || path == base.path() {
            return None;
        }

        if SKIPPED_SEGMENTS.iter().any(|segment| path.contains(segment)) {
            return None;
        }

        if let Some(prefix) = &self.path_prefix {
            if !path.starts_with(prefix.as_str()) {
                return None;
            }
        }

        normalize_article_url(absolute.as_str())
    }
}

impl Default for ListingParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"
        <html><body>
          <nav><a href="/">Home</a><a href="/tag/ai/">AI</a></nav>
          <article><a href="/2024/05/01/first-story/">First</a></article>
          <article><a href="https://news.test/2024/05/01/second-story/?utm_source=home#top">Second</a></article>
          <article><a href="/2024/05/01/first-story/">First again</a></article>
          <a href="https://elsewhere.test/2024/05/01/other/">Other site</a>
          <a href="#comments">Comments</a>
          <a href="mailto:tips@news.test">Tips</a>
        </body></html>
    "##;

    #[test]
    fn keeps_same_host_articles_in_order() {
        let links = ListingParser::new()
            .extract_links(PAGE, "https://news.test/latest/")
            .unwrap();

        assert_eq!(
            links,
            vec![
                "https://news.test/2024/05/01/first-story/".to_string(),
                "https://news.test/2024/05/01/second-story/".to_string(),
            ]
        );
    }

    #[test]
    fn selector_and_prefix_narrow_the_links() {
        let links = ListingParser::new()
            .with_selector("article a")
            .unwrap()
            .with_path_prefix("/2024/05/01/second")
            .extract_links(PAGE, "https://news.test/latest/")
            .unwrap();

        assert_eq!(links, vec!["https://news.test/2024/05/01/second-story/".to_string()]);
    }

    #[test]
    fn invalid_selector_is_an_error() {
        assert!(ListingParser::new().with_selector("a[[").is_err());
    }
}
