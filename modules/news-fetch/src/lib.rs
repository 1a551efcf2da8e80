pub mod fetcher;
pub mod gateway;

pub use fetcher::{has_usable_source, BodyCache, BodyFetcher};
pub use gateway::{HttpScrapingGateway, ScrapingGateway};
