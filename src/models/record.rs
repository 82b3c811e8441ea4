use crate::models::chain::NormalizedChain;
use crate::models::option::OptionType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the persisted record set: one strike of one expiration.
///
/// Field names follow the flat-file schema consumed downstream
/// (`strike, midPrice, optionType, expirationDate, dataDate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionRecord {
    pub strike: f64,
    pub mid_price: f64,
    pub option_type: OptionType,
    pub expiration_date: NaiveDate,
    pub data_date: NaiveDate,
}

impl OptionRecord {
    /// Flatten a normalized chain into call records stamped with `data_date`
    pub fn from_chain(chain: &NormalizedChain, data_date: NaiveDate) -> Vec<Self> {
        chain
            .points
            .iter()
            .map(|p| Self {
                strike: p.strike,
                mid_price: p.mid_price,
                option_type: OptionType::Call,
                expiration_date: chain.expiration,
                data_date,
            })
            .collect()
    }
}
