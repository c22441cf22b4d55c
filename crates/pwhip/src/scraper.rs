use std::future::Future;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use reqwest::Client;
use url::Url;

use crate::parser::{ParseError, parse_division, parse_policy_page};
use crate::types::{Motion, Policy};

#[derive(Debug, thiserror::Error)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Page not found: {0}")]
    NotFound(String),
}

/// Turns a page URL into its raw HTML.
pub trait Fetch {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String, ScraperError>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, ScraperError> {
        let html = self
            .client
            .get(url.clone())
            .send()
            .await
            .inspect_err(|e| log::error!("HTTP error: {e:?}"))?
            .error_for_status()?
            .text()
            .await
            .inspect_err(|e| log::error!("Decode error: {e:?}"))?;

        if html.trim().is_empty() {
            return Err(ScraperError::NotFound(format!("Empty response for {}", url)));
        }

        Ok(html)
    }
}

#[derive(Debug, Clone)]
pub struct WebScraper<F = HttpFetcher> {
    fetcher: F,
    base_url: Url,
    concurrency: usize,
}

impl WebScraper<HttpFetcher> {
    pub fn new() -> Result<Self, ScraperError> {
        Self::with_base_url(crate::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ScraperError> {
        Ok(Self::with_fetcher(HttpFetcher::new()?, parse_base_url(base_url)?))
    }
}

/// Relative links are joined onto the base, so it must end in a slash.
fn parse_base_url(base_url: &str) -> Result<Url, ScraperError> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Url::parse(&normalized).map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", base_url, e)))
}

impl<F: Fetch> WebScraper<F> {
    pub fn with_fetcher(fetcher: F, base_url: Url) -> Self {
        Self {
            fetcher,
            base_url,
            concurrency: 1,
        }
    }

    /// Number of division pages fetched at once within a policy. Results keep row order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resolve(&self, url_or_slug: &str) -> Result<Url, ScraperError> {
        self.base_url
            .join(url_or_slug)
            .map_err(|e| ScraperError::InvalidUrl(format!("{}: {}", url_or_slug, e)))
    }

    pub fn policy_url(&self, policy_id: u32) -> Result<Url, ScraperError> {
        self.resolve(&format!("policy.php?id={}", policy_id))
    }

    pub async fn fetch_division(&self, url_or_slug: &str) -> Result<Motion, ScraperError> {
        let url = self.resolve(url_or_slug)?;
        log::info!("Fetching division: {}", url);
        let html = self.fetcher.fetch(&url).await?;
        Ok(parse_division(&html, url.as_str(), &self.base_url)?)
    }

    /// Fetches a policy page and every Commons division it lists.
    ///
    /// The first division that fails aborts the whole policy.
    pub async fn fetch_policy(&self, url_or_slug: &str) -> Result<Policy, ScraperError> {
        let url = self.resolve(url_or_slug)?;
        log::info!("Fetching policy: {}", url);
        let html = self.fetcher.fetch(&url).await?;
        let page = parse_policy_page(&html, url.as_str())?;

        log::info!(
            "Fetching {} Commons division(s) for \"{}\"...",
            page.divisions.len(),
            page.text
        );

        let motions = stream::iter(page.divisions)
            .map(|link| async move {
                let motion = self.fetch_division(&link.url).await?;
                Ok::<_, ScraperError>(Motion {
                    direction: Some(link.direction),
                    ..motion
                })
            })
            .buffered(self.concurrency)
            .try_collect::<Vec<_>>()
            .await
            .inspect_err(|e| log::error!("Aborting policy {}: {}", url, e))?;

        Ok(Policy {
            text: page.text,
            motions,
        })
    }

    pub async fn fetch_policy_by_id(&self, policy_id: u32) -> Result<Policy, ScraperError> {
        let url = self.policy_url(policy_id)?;
        self.fetch_policy(url.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DivisionResult;
    use std::collections::HashMap;
    use std::fs;

    struct MapFetcher {
        pages: HashMap<String, String>,
        slow: Option<String>,
    }

    impl Fetch for MapFetcher {
        async fn fetch(&self, url: &Url) -> Result<String, ScraperError> {
            if self.slow.as_deref() == Some(url.as_str()) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.pages
                .get(url.as_str())
                .cloned()
                .ok_or_else(|| ScraperError::NotFound(url.to_string()))
        }
    }

    fn division_html(date: &str, number: u32, title: &str, hansard: bool) -> String {
        let hansard = if hansard {
            format!(r#"<a href="https://hansard.example/{date}/{number}">Online Hansard</a>"#)
        } else {
            String::new()
        };
        format!(
            r#"
            <div id="main">
                <h1>{title} — 1 Jan 2003 at 19:00</h1>
                {hansard}
                <a href="division.php?date={date}&amp;number={number}&amp;display=allpossible&amp;sort=constituency">Constituency</a>
                <table id="votetable">
                    <tr><td>Name</td><td>Constituency</td><td>Party</td><td>Vote</td></tr>
                    <tr><td><a href="mp.php?id=1">One</a></td><td>Seat One</td><td>Lab</td><td>aye</td></tr>
                    <tr><td><a href="mp.php?id=2">Two</a></td><td>Seat Two</td><td>Con</td><td>no</td></tr>
                    <tr><td><a href="mp.php?id=3">Three</a></td><td>Seat Three</td><td>Lab</td><td>tellaye</td></tr>
                </table>
            </div>
            "#
        )
    }

    fn page_url(slug: &str) -> String {
        format!("{}{}", crate::DEFAULT_BASE_URL, slug)
    }

    fn policy_site(third_has_hansard: bool) -> HashMap<String, String> {
        let policy = fs::read_to_string("fixtures/policy.html").expect("Failed to read fixture");
        HashMap::from([
            (page_url("policy.php?id=363"), policy),
            (
                page_url("division.php?date=2003-05-07&number=191&display=allpossible"),
                division_html("2003-05-07", 191, "Second Reading", true),
            ),
            (
                page_url("division.php?date=2003-07-08&number=276&display=allpossible"),
                division_html("2003-07-08", 276, "Third Reading", true),
            ),
            (
                page_url("division.php?date=2003-11-19&number=378&display=allpossible"),
                division_html("2003-11-19", 378, "NHS Foundation Trusts", third_has_hansard),
            ),
        ])
    }

    fn scraper(pages: HashMap<String, String>, slow: Option<String>) -> WebScraper<MapFetcher> {
        WebScraper::with_fetcher(
            MapFetcher { pages, slow },
            Url::parse(crate::DEFAULT_BASE_URL).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_policy_keeps_commons_rows_in_order() {
        let scraper = scraper(policy_site(true), None);

        let policy = scraper.fetch_policy_by_id(363).await.expect("Failed to fetch policy");

        assert_eq!(policy.text, "Introducing foundation hospitals");
        let ids: Vec<_> = policy.motions.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["pw-2003-05-07-191", "pw-2003-07-08-276", "pw-2003-11-19-378"]
        );
        let directions: Vec<_> = policy
            .motions
            .iter()
            .map(|m| m.direction.as_deref())
            .collect();
        assert_eq!(
            directions,
            vec![Some("Majority"), Some("Majority"), Some("minority")]
        );
        assert!(
            policy
                .motions
                .iter()
                .all(|m| m.result == DivisionResult::Passed)
        );
    }

    #[tokio::test]
    async fn test_concurrent_fetch_preserves_row_order() {
        let slow = page_url("division.php?date=2003-05-07&number=191&display=allpossible");
        let scraper = scraper(policy_site(true), Some(slow)).with_concurrency(3);

        let policy = scraper.fetch_policy("policy.php?id=363").await.unwrap();

        let texts: Vec<_> = policy.motions.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Second Reading", "Third Reading", "NHS Foundation Trusts"]
        );
    }

    #[tokio::test]
    async fn test_failing_division_aborts_policy() {
        let scraper = scraper(policy_site(false), None);

        let err = scraper.fetch_policy_by_id(363).await.unwrap_err();

        assert!(matches!(
            err,
            ScraperError::ParseError(ParseError::MissingField(_))
        ));
        assert!(err.to_string().contains("number=378"));
    }

    #[tokio::test]
    async fn test_fetch_division_resolves_slug() {
        let scraper = scraper(policy_site(true), None);

        let motion = scraper
            .fetch_division("division.php?date=2003-07-08&number=276&display=allpossible")
            .await
            .unwrap();

        assert_eq!(motion.id, "pw-2003-07-08-276");
        assert!(motion.direction.is_none());
        assert_eq!(motion.votes[0].url, page_url("mp.php?id=1"));
    }

    #[tokio::test]
    async fn test_missing_page_is_not_found() {
        let scraper = scraper(HashMap::new(), None);

        let err = scraper.fetch_policy_by_id(1).await.unwrap_err();
        assert!(matches!(err, ScraperError::NotFound(_)));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let base = parse_base_url("https://mirror.example/pw").unwrap();
        assert_eq!(base.join("policy.php?id=1").unwrap().as_str(), "https://mirror.example/pw/policy.php?id=1");

        assert!(matches!(
            parse_base_url("not a url"),
            Err(ScraperError::InvalidUrl(_))
        ));
    }
}
