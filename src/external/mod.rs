pub mod file_source;
pub mod holdings_source;
pub mod http_source;
pub mod inline_source;

pub use file_source::FileHoldingsSource;
pub use holdings_source::{DataSourceError, HoldingsSource};
pub use http_source::HttpHoldingsSource;
pub use inline_source::InlineHoldingsSource;
