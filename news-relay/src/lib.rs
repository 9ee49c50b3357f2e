pub mod types;
pub mod config;
pub mod retry;
pub mod executor;
pub mod traits;
pub mod cache;
pub mod store;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod summarizer;
pub mod notifier;
pub mod message;
pub mod discovery;
pub mod delivery;
pub mod dispatch;
pub mod state;
pub mod relay;
pub mod utils;

pub use types::*;
pub use config::RelayConfig;
pub use retry::{RetryPolicy, StepPolicies};
pub use executor::{MemoryJournal, StepContext, StepJournal};
pub use cache::{article_cache_key, MemoryCache};
pub use store::PgStore;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use sources::{ListingParser, SiteSourceFetcher};
pub use summarizer::{ChatSummarizer, ExtractiveSummarizer};
pub use notifier::{FallbackImageNotifier, LogNotifier, TelegramNotifier};
pub use discovery::{run_discovery, DiscoveryDeps};
pub use delivery::{run_delivery, DeliveryDeps};
pub use dispatch::{Dispatcher, TaskDispatcher};
pub use state::RunRegistry;
pub use relay::{NewsRelay, RelayBuilder};
