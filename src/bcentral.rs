use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, PRAGMA, USER_AGENT};
use std::time::Duration;
use tracing::debug;

use crate::error::IndicatorError;

pub const BCENTRAL_URL: &str = "https://www.bcentral.cl/web/banco-central/inicio";

/// Downloads the page the daily indicators are scraped from.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_indicators_page(&self) -> Result<String, IndicatorError>;
}

fn build_headers() -> HeaderMap {
    let custom_user_agent = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/79.0.3945.88 Safari/537.36";
    let accept = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.9";

    let mut headers = HeaderMap::new();
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(USER_AGENT, HeaderValue::from_static(custom_user_agent));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(ACCEPT, HeaderValue::from_static(accept));
    headers
}

/// HTTP client for the Banco Central landing page.
///
/// The site has a history of serving an incomplete certificate chain, so
/// verification can be turned off. That only applies to this client.
pub struct BcentralClient {
    client: reqwest::Client,
    url: String,
}

impl BcentralClient {
    pub fn new(
        url: impl Into<String>,
        verify_tls: bool,
        timeout: Duration,
    ) -> Result<Self, IndicatorError> {
        let client = reqwest::Client::builder()
            .default_headers(build_headers())
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PageSource for BcentralClient {
    async fn fetch_indicators_page(&self) -> Result<String, IndicatorError> {
        debug!(url = %self.url, "fetching indicators page");
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(body)
    }
}
