pub mod document;
mod parser;
pub mod scraper;
pub mod types;
pub mod utils;

pub use parser::{ParseError, parse_division, parse_policy_page};
pub use scraper::{Fetch, HttpFetcher, ScraperError, WebScraper};
pub use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.publicwhip.org.uk/";
