use actix_cors::Cors;
use actix_web::{
    http::header::{self, HeaderName},
    route, web, HttpResponse,
};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

pub mod bcentral;
pub mod cache;
pub mod clock;
pub mod conversion;
pub mod error;
pub mod extractor;
pub mod timestamp;

use bcentral::{BcentralClient, PageSource, BCENTRAL_URL};
use cache::{KeyedCache, Lookup};
use clock::Clock;
use conversion::{ConversionQuote, ConversionSource, ExchangeRateClient, EXCHANGE_RATE_URL};
use error::IndicatorError;
use extractor::{BcentralExtractor, Indicator, IndicatorExtractor};

#[derive(Parser, Debug, Clone)]
#[clap(about, version)]
pub struct Args {
    #[clap(short, long, default_value = "0.0.0.0")]
    pub ip: String,

    #[clap(short, long, default_value = "8002")]
    pub port: u16,

    /// Freshness window in hours
    #[clap(short, long, default_value = "24")]
    pub cache_lifetime: u16,

    /// Outbound request timeout in seconds
    #[clap(short, long, default_value = "30")]
    pub timeout: u64,

    #[clap(long, default_value = BCENTRAL_URL)]
    pub indicators_url: String,

    #[clap(long, default_value = EXCHANGE_RATE_URL)]
    pub conversion_url: String,

    /// Verify the certificate of the indicators page
    #[clap(long)]
    pub verify_tls: bool,
}

/// External collaborators the routes depend on.
pub struct Upstreams {
    pub page: Arc<dyn PageSource>,
    pub extractor: Arc<dyn IndicatorExtractor>,
    pub converter: Arc<dyn ConversionSource>,
}

impl Upstreams {
    pub fn from_config(config: &Args) -> Result<Self, IndicatorError> {
        let timeout = std::time::Duration::from_secs(config.timeout);
        let page = BcentralClient::new(&config.indicators_url, config.verify_tls, timeout)?;
        let converter = ExchangeRateClient::new(&config.conversion_url, timeout)?;

        Ok(Self {
            page: Arc::new(page),
            extractor: Arc::new(BcentralExtractor),
            converter: Arc::new(converter),
        })
    }
}

pub struct AppState {
    pub upstreams: Upstreams,
    pub clock: Arc<dyn Clock>,
    pub indicators: KeyedCache<Indicator, String>,
    pub conversions: KeyedCache<String, Conversion>,
}

impl AppState {
    pub fn new(config: &Args, upstreams: Upstreams, clock: Arc<dyn Clock>) -> Self {
        let lifetime = Duration::hours(config.cache_lifetime.into());

        Self {
            upstreams,
            clock,
            indicators: KeyedCache::new(lifetime),
            conversions: KeyedCache::new(lifetime),
        }
    }
}

/// UF and Dolar as served by `/uf` and `/dolar`. `today` is the refresh time
/// of the requested indicator; the other one is included when it is cached
/// and fresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyIndicator {
    pub today: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dolar: Option<String>,
}

impl DailyIndicator {
    fn set(&mut self, indicator: Indicator, value: Option<String>) {
        match indicator {
            Indicator::Uf => self.uf = value,
            Indicator::Dolar => self.dolar = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Amount {
    pub currency: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub from: Amount,
    pub to: Amount,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<ConversionQuote> for Conversion {
    type Error = IndicatorError;

    fn try_from(quote: ConversionQuote) -> Result<Self, Self::Error> {
        Ok(Self {
            from: Amount {
                value: parse_amount(&quote.from_value)?,
                currency: quote.from_currency,
            },
            to: Amount {
                value: parse_amount(&quote.to_value)?,
                currency: quote.to_currency,
            },
            timestamp: timestamp::parse_upstream_timestamp(&quote.timestamp)?,
        })
    }
}

fn parse_amount(raw: &str) -> Result<f64, IndicatorError> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(IndicatorError::Parse(format!("amount {raw:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyConversion {
    pub today: DateTime<Utc>,
    pub currency_conversion: Conversion,
}

fn validate_currency(code: &str) -> Result<(), IndicatorError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(IndicatorError::InvalidCurrency(code.to_string()))
    }
}

async fn daily_indicator(
    app: &AppState,
    indicator: Indicator,
) -> Result<DailyIndicator, IndicatorError> {
    let (entry, lookup) = app
        .indicators
        .get_or_refresh(&indicator, app.clock.as_ref(), || async move {
            info!(%indicator, "retrieving value");
            let html = app.upstreams.page.fetch_indicators_page().await?;
            indicator.scrape(app.upstreams.extractor.as_ref(), &html)
        })
        .await?;

    match lookup {
        Lookup::Refreshed => info!(%indicator, value = %entry.value, "retrieved value"),
        Lookup::Hit => info!(%indicator, value = %entry.value, "using cached value"),
    }

    let sibling = indicator.sibling();
    let sibling_value = app
        .indicators
        .peek(&sibling, app.clock.now())
        .await
        .map(|cached| cached.value);

    let mut record = DailyIndicator {
        today: entry.refreshed_at,
        uf: None,
        dolar: None,
    };
    record.set(indicator, Some(entry.value));
    record.set(sibling, sibling_value);

    Ok(record)
}

async fn currency_conversion(
    app: &AppState,
    origin: &str,
    target: &str,
) -> Result<CurrencyConversion, IndicatorError> {
    validate_currency(origin)?;
    validate_currency(target)?;

    let key = format!("{origin}/{target}");
    let pair = key.as_str();
    let (entry, lookup) = app
        .conversions
        .get_or_refresh(&key, app.clock.as_ref(), || async move {
            info!(pair, "retrieving currency conversion");
            let quote = app
                .upstreams
                .converter
                .fetch_conversion(origin, target)
                .await?;
            Conversion::try_from(quote)
        })
        .await?;

    match lookup {
        Lookup::Refreshed => info!(pair, "retrieved currency conversion"),
        Lookup::Hit => info!(pair, "using cached currency conversion"),
    }

    Ok(CurrencyConversion {
        today: entry.refreshed_at,
        currency_conversion: entry.value,
    })
}

#[route("/uf", method = "GET")]
async fn uf(app_data: web::Data<AppState>) -> Result<HttpResponse, IndicatorError> {
    let record = daily_indicator(&app_data, Indicator::Uf)
        .await
        .inspect_err(|e| error!(indicator = "uf", error = %e, "request failed"))?;

    Ok(HttpResponse::Ok().json(record))
}

#[route("/dolar", method = "GET")]
async fn dolar(app_data: web::Data<AppState>) -> Result<HttpResponse, IndicatorError> {
    let record = daily_indicator(&app_data, Indicator::Dolar)
        .await
        .inspect_err(|e| error!(indicator = "dolar", error = %e, "request failed"))?;

    Ok(HttpResponse::Ok().json(record))
}

#[route("/currency/{origin}/{target}", method = "GET")]
async fn currency(
    path: web::Path<(String, String)>,
    app_data: web::Data<AppState>,
) -> Result<HttpResponse, IndicatorError> {
    let (origin, target) = path.into_inner();
    let conversion = currency_conversion(&app_data, &origin, &target)
        .await
        .inspect_err(|e| error!(%origin, %target, error = %e, "request failed"))?;

    Ok(HttpResponse::Ok().json(conversion))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(uf).service(dolar).service(currency);
}

/// Any origin (echoed back), the usual verbs, and the token headers exposed.
pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST", "OPTIONS", "PUT", "DELETE"])
        .allowed_headers(vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers(vec![
            HeaderName::from_static("x-token"),
            HeaderName::from_static("x-refreshtoken"),
        ])
}
