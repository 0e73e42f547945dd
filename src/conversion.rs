use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::IndicatorError;

pub const EXCHANGE_RATE_URL: &str = "https://open.er-api.com/v6/latest";

/// Raw conversion as reported upstream: `(from value, from currency,
/// to value, to currency, timestamp)`, all still text.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionQuote {
    pub from_value: String,
    pub from_currency: String,
    pub to_value: String,
    pub to_currency: String,
    pub timestamp: String,
}

#[async_trait]
pub trait ConversionSource: Send + Sync {
    async fn fetch_conversion(
        &self,
        origin: &str,
        target: &str,
    ) -> Result<ConversionQuote, IndicatorError>;
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    result: String,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(default)]
    time_last_update_utc: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

impl LatestRates {
    fn into_quote(self, origin: &str, target: &str) -> Result<ConversionQuote, IndicatorError> {
        if self.result != "success" {
            let reason = self.error_type.unwrap_or(self.result);
            return Err(IndicatorError::Conversion(format!(
                "{origin}/{target} rejected: {reason}"
            )));
        }

        let rate = self.rates.get(target).ok_or_else(|| {
            IndicatorError::Conversion(format!("no rate for {target} in {origin} table"))
        })?;
        let timestamp = self.time_last_update_utc.ok_or_else(|| {
            IndicatorError::Conversion(format!("{origin} table has no update time"))
        })?;

        Ok(ConversionQuote {
            from_value: "1".to_string(),
            from_currency: self.base_code.unwrap_or_else(|| origin.to_string()),
            to_value: rate.to_string(),
            to_currency: target.to_string(),
            timestamp,
        })
    }
}

/// Client for an open exchange-rate endpoint serving
/// `GET {base_url}/{origin}` rate tables.
pub struct ExchangeRateClient {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeRateClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IndicatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndicatorError::Conversion(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ConversionSource for ExchangeRateClient {
    async fn fetch_conversion(
        &self,
        origin: &str,
        target: &str,
    ) -> Result<ConversionQuote, IndicatorError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), origin);
        debug!(%url, "fetching rate table");

        let table: LatestRates = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| IndicatorError::Conversion(e.to_string()))?
            .json()
            .await
            .map_err(|e| IndicatorError::Conversion(e.to_string()))?;

        table.into_quote(origin, target)
    }
}
