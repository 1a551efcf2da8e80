pub mod canonicalize;
pub mod collector;
pub mod html;

pub use canonicalize::canonicalize_url;
pub use collector::FeedCollector;
