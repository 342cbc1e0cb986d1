//! Analytics collaborators: GA4 reports, Search Console keywords and the
//! result cache.
//!
//! The chat pipeline depends only on the `AnalyticsProvider`,
//! `KeywordProvider` and `Cache` traits.

pub mod cache;
pub mod errors;
pub mod ga4;
pub mod provider;
pub mod search_console;
pub mod types;

pub use cache::{cache_key, Cache, MemoryCache, SqliteCache};
pub use errors::{CacheError, ProviderError};
pub use ga4::Ga4Client;
pub use provider::{AnalyticsProvider, KeywordProvider, ProviderResult};
pub use search_console::SearchConsoleClient;
pub use types::{AnalyticsTarget, DateRange, KeywordReport, Report, Row};
