use crate::types::{FeedEntryMeta, RelayError, Result};
use crate::utils::{text, url::normalize_article_url};
use feed_rs::model::Entry;
use feed_rs::parser;
use std::collections::HashMap;
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif"];

/// Turns an RSS or Atom document into feed metadata keyed by article URL.
pub struct FeedParser;

impl FeedParser {
    pub fn parse_entries(content: &[u8]) -> Result<HashMap<String, FeedEntryMeta>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content)
            .map_err(|e| RelayError::Parse(format!("Failed to parse feed: {}", e)))?;

        let total = feed.entries.len();
        let mut entries = HashMap::with_capacity(total);

        for entry in feed.entries {
            if let Some((url, meta)) = Self::parse_entry(entry) {
                // First occurrence wins, feeds list newest first
                entries.entry(url).or_insert(meta);
            }
        }

        info!("Parsed feed with {} usable entries out of {}", entries.len(), total);
        Ok(entries)
    }

    fn parse_entry(entry: Entry) -> Option<(String, FeedEntryMeta)> {
        let url = Self::entry_url(&entry)?;

        let title = entry
            .title
            .as_ref()
            .map(|t| text::strip_html(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        // Prefer the summary, fall back to the full body
        let excerpt = entry
            .summary
            .as_ref()
            .map(|s| text::strip_html(&s.content))
            .filter(|s| !s.is_empty())
            .or_else(|| {
                entry
                    .content
                    .as_ref()
                    .and_then(|c| c.body.as_deref())
                    .map(text::strip_html)
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_default();

        let published = entry.published.or(entry.updated);
        let image_url = Self::entry_image(&entry);

        Some((
            url,
            FeedEntryMeta {
                title,
                published,
                excerpt,
                image_url,
            },
        ))
    }

    fn entry_url(entry: &Entry) -> Option<String> {
        let link = entry
            .links
            .iter()
            .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
            .map(|link| link.href.as_str())
            .or_else(|| Some(entry.id.as_str()).filter(|id| id.starts_with("http")))?;

        normalize_article_url(link.trim())
    }

    /// First image in media content, thumbnails, then enclosure links.
    fn entry_image(entry: &Entry) -> Option<String> {
        let from_media = entry.media.iter().find_map(|media| {
            media
                .content
                .iter()
                .filter_map(|content| {
                    let url = content.url.as_ref()?.to_string();
                    let is_image = match &content.content_type {
                        Some(mime) => mime.type_().as_str() == "image",
                        None => looks_like_image(&url),
                    };
                    is_image.then_some(url)
                })
                .next()
                .or_else(|| media.thumbnails.first().map(|thumb| thumb.image.uri.clone()))
        });

        from_media.or_else(|| {
            entry
                .links
                .iter()
                .find(|link| {
                    link.rel.as_deref() == Some("enclosure")
                        && link
                            .media_type
                            .as_deref()
                            .map_or_else(|| looks_like_image(&link.href), |t| t.starts_with("image/"))
                })
                .map(|link| link.href.clone())
        })
    }
}

fn looks_like_image(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}
