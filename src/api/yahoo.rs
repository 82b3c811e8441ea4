//! Yahoo Finance option-chain client
//!
//! Uses the unofficial `v7/finance/options` endpoint. The first request
//! lists expiration timestamps; one request per expiration returns the
//! chain. Only calls are kept.

use crate::api::rate_limit::RequestLimiter;
use crate::api::QuoteSource;
use crate::config::FetchConfig;
use crate::error::{DensityError, Result};
use crate::models::{OptionQuote, QuoteBatch};
use chrono::{DateTime, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

static YAHOO_HEADERS: Lazy<HeaderMap> = Lazy::new(|| {
    let mut h = HeaderMap::new();
    h.insert(
        USER_AGENT,
        HeaderValue::from_static(
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
        ),
    );
    h.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    h.insert("accept-language", HeaderValue::from_static("en-US,en;q=0.9"));
    h
});

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Async Yahoo Finance client with a shared request quota
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: reqwest::Client,
    base_url: Url,
    limiter: RequestLimiter,
}

impl YahooClient {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DensityError::ConfigError(format!(
                "Invalid YAHOO_BASE_URL '{}': {}",
                config.base_url, e
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(DensityError::ConfigError(format!(
                "YAHOO_BASE_URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .default_headers(YAHOO_HEADERS.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DensityError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            limiter: RequestLimiter::per_minute(config.requests_per_minute),
        })
    }

    /// `{base}/{symbol}` with an optional `date` query parameter
    fn chain_url(&self, symbol: &str, expiration: Option<NaiveDate>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DensityError::ConfigError("base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(symbol);
        if let Some(expiration) = expiration {
            url.query_pairs_mut()
                .append_pair("date", &expiration_timestamp(expiration).to_string());
        }
        Ok(url)
    }

    async fn get_body(&self, url: Url) -> Result<String> {
        self.limiter.acquire().await;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DensityError::FetchError(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {} from {}", status, url);
            return Err(if is_retryable_status(status) {
                DensityError::FetchError(message)
            } else {
                DensityError::Other(message)
            });
        }

        response.text().await.map_err(|e| {
            DensityError::FetchError(format!("Failed to read body from {}: {}", url, e))
        })
    }
}

impl QuoteSource for YahooClient {
    async fn expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let url = self.chain_url(symbol, None)?;
        let body = self.get_body(url).await?;
        let dates = parse_expirations(&body)?;
        info!("{} lists {} expiration(s)", symbol, dates.len());
        Ok(dates)
    }

    async fn option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<QuoteBatch> {
        let url = self.chain_url(symbol, Some(expiration))?;
        let body = self.get_body(url).await?;
        parse_calls(&body, expiration)
    }
}

/// Throttling and server-side failures are worth retrying; client errors are not
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Yahoo keys expirations by midnight UTC of the expiration day
pub fn expiration_timestamp(expiration: NaiveDate) -> i64 {
    expiration.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[derive(Debug, Deserialize)]
struct OptionsResponse {
    #[serde(rename = "optionChain")]
    option_chain: OptionChain,
}

#[derive(Debug, Deserialize)]
struct OptionChain {
    #[serde(default)]
    result: Vec<OptionChainResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OptionChainResult {
    #[serde(rename = "expirationDates", default)]
    expiration_dates: Vec<i64>,
    #[serde(default)]
    options: Vec<OptionSet>,
}

#[derive(Debug, Deserialize)]
struct OptionSet {
    #[serde(rename = "expirationDate")]
    expiration_date: Option<i64>,
    #[serde(default)]
    calls: Vec<ContractQuote>,
}

#[derive(Debug, Deserialize)]
struct ContractQuote {
    strike: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
}

fn first_result(body: &str) -> Result<OptionChainResult> {
    let response: OptionsResponse = serde_json::from_str(body)
        .map_err(|e| DensityError::ParseError(format!("Failed to parse option chain: {}", e)))?;

    if let Some(error) = response.option_chain.error.filter(|e| !e.is_null()) {
        return Err(DensityError::ParseError(format!("Yahoo returned an error: {}", error)));
    }

    response
        .option_chain
        .result
        .into_iter()
        .next()
        .ok_or_else(|| DensityError::ParseError("No option chain data returned".to_string()))
}

/// Expiration dates from an options response, ascending and de-duplicated
pub fn parse_expirations(body: &str) -> Result<Vec<NaiveDate>> {
    let result = first_result(body)?;
    let mut dates: Vec<NaiveDate> = result
        .expiration_dates
        .iter()
        .filter_map(|&ts| DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive()))
        .collect();
    dates.sort();
    dates.dedup();
    Ok(dates)
}

/// Call quotes for `expiration` from an options response
pub fn parse_calls(body: &str, expiration: NaiveDate) -> Result<QuoteBatch> {
    let result = first_result(body)?;
    let Some(set) = result.options.into_iter().next() else {
        warn!("No option set returned for {}", expiration);
        return Ok(QuoteBatch::new(expiration, Vec::new()));
    };

    if let Some(returned) = set
        .expiration_date
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive())
    {
        if returned != expiration {
            warn!("Requested {} but chain is for {}", expiration, returned);
        }
    }

    let total = set.calls.len();
    let quotes: Vec<OptionQuote> = set
        .calls
        .into_iter()
        .filter_map(|c| Some(OptionQuote::new(c.strike?, c.bid, c.ask, expiration)))
        .collect();

    if quotes.len() < total {
        debug!("{}: dropped {} call(s) without a strike", expiration, total - quotes.len());
    }

    Ok(QuoteBatch::new(expiration, quotes))
}
