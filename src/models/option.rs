use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

impl std::str::FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "call" | "c" => Ok(OptionType::Call),
            "put" | "p" => Ok(OptionType::Put),
            other => Err(format!("unknown option type '{}'", other)),
        }
    }
}

/// A single raw call quote as delivered by the market-data source.
///
/// Bid and ask are optional because sources routinely omit one side for
/// illiquid strikes; the mid-price is only defined when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub expiration: NaiveDate,
}

impl OptionQuote {
    pub fn new(strike: f64, bid: Option<f64>, ask: Option<f64>, expiration: NaiveDate) -> Self {
        Self {
            strike,
            bid,
            ask,
            expiration,
        }
    }

    /// Quote with both sides present
    pub fn two_sided(strike: f64, bid: f64, ask: f64, expiration: NaiveDate) -> Self {
        Self::new(strike, Some(bid), Some(ask), expiration)
    }

    /// Arithmetic mean of bid and ask, `None` unless both sides are usable
    pub fn mid_price(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if valid_price(bid) && valid_price(ask) => {
                Some((bid + ask) / 2.0)
            }
            _ => {
                trace!(
                    "No mid-price for strike {}: bid={:?} ask={:?}",
                    self.strike,
                    self.bid,
                    self.ask
                );
                None
            }
        }
    }

    /// Reason this quote cannot be used at all, independent of the strike grid
    pub fn defect(&self) -> Option<String> {
        if !self.strike.is_finite() {
            return Some("strike is not finite".to_string());
        }
        for (side, value) in [("bid", self.bid), ("ask", self.ask)] {
            if let Some(v) = value {
                if !valid_price(v) {
                    return Some(format!("{} {} is negative or not finite", side, v));
                }
            }
        }
        None
    }
}

fn valid_price(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// All quotes fetched for one expiration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBatch {
    pub expiration: NaiveDate,
    pub quotes: Vec<OptionQuote>,
}

impl QuoteBatch {
    pub fn new(expiration: NaiveDate, quotes: Vec<OptionQuote>) -> Self {
        Self { expiration, quotes }
    }

    /// Build a batch from `(strike, bid, ask)` triples
    pub fn from_triples(expiration: NaiveDate, triples: &[(f64, f64, f64)]) -> Self {
        let quotes = triples
            .iter()
            .map(|&(strike, bid, ask)| OptionQuote::two_sided(strike, bid, ask, expiration))
            .collect();
        Self { expiration, quotes }
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}
