pub mod listing;
pub mod site;

pub use listing::ListingParser;
pub use site::SiteSourceFetcher;
