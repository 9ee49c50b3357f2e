use crate::fetcher::Fetcher;
use crate::parser::FeedParser;
use crate::sources::ListingParser;
use crate::traits::SourceFetcher;
use crate::types::{FeedEntryMeta, FetchConfig, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// Discovery sources of one news site: its rendered listing page and its feed.
pub struct SiteSourceFetcher {
    fetcher: Fetcher,
    listing: ListingParser,
}

impl SiteSourceFetcher {
    pub fn new(fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(fetch_config)?,
            listing: ListingParser::new(),
        })
    }

    pub fn with_listing_parser(mut self, listing: ListingParser) -> Self {
        self.listing = listing;
        self
    }
}

#[async_trait]
impl SourceFetcher for SiteSourceFetcher {
    async fn fetch_links(&self, listing_url: &str) -> Result<Vec<String>> {
        let html = self.fetcher.fetch_text(listing_url).await?;
        let links = self.listing.extract_links(&html, listing_url)?;

        info!("Listing {} yielded {} candidate links", listing_url, links.len());
        Ok(links)
    }

    async fn fetch_entries(&self, feed_url: &str) -> Result<HashMap<String, FeedEntryMeta>> {
        let body = self.fetcher.fetch_text(feed_url).await?;
        let entries = FeedParser::parse_entries(body.as_bytes())?;

        info!("Feed {} yielded {} entries", feed_url, entries.len());
        Ok(entries)
    }
}
