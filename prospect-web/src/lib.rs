//! Web discovery and acquisition for Prospect.
//!
//! - Search providers behind [`SearchProvider`]: Tavily (`tavily`) and
//!   ScraperAPI structured Google search (`scraperapi`)
//! - Streaming answer search over server-sent events (`stream`)
//! - Page fetching with a WebDriver fallback for blocked pages (`fetch`,
//!   `browser`)
//! - Lightweight HTML to text reduction (`extract`)

pub mod browser;
pub mod extract;
pub mod fetch;
pub mod scraperapi;
pub mod stream;
pub mod tavily;
pub mod types;

pub use types::{SearchHit, SearchProvider, SearchReport};
