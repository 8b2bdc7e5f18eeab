//! Inbound Price Frame Decoding
//!
//! The feed pushes JSON arrays of price records:
//!
//! ```json
//! [{"stock_ticker":"gs","ltp":"560.13","dp":"0.0","day_change":"0.0"}]
//! ```
//!
//! `ltp` and `day_change` arrive either as JSON numbers or numeric strings.
//! Unknown fields are ignored. Payloads that are valid JSON but not an array
//! (acks, notices) carry no prices and are reported as [`PriceFrame::Ignored`].
//! Array entries that are not valid price records are skipped one by one.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::{PriceUpdate, Symbol};

/// A payload that is not JSON at all. Nothing in it is applied.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Payload is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a single record of an array frame was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The record does not have the price record shape.
    #[error("record {index} is not a price record: {reason}")]
    InvalidShape {
        /// Position of the record in the frame.
        index: usize,
        /// Deserializer message.
        reason: String,
    },

    /// The record carries an empty ticker.
    #[error("record {index} has an empty stock_ticker")]
    EmptyTicker {
        /// Position of the record in the frame.
        index: usize,
    },

    /// A numeric field could not be coerced to a number.
    #[error("record {index} field `{field}` is not numeric: {value:?}")]
    NotNumeric {
        /// Position of the record in the frame.
        index: usize,
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceFrame {
    /// An array frame.
    Updates {
        /// Valid records, in frame order.
        updates: Vec<PriceUpdate>,
        /// Records that were skipped.
        skipped: Vec<RecordError>,
    },
    /// Valid JSON that is not a sequence of price records.
    Ignored,
}

impl PriceFrame {
    /// Valid updates of an array frame, empty otherwise.
    #[must_use]
    pub fn updates(&self) -> &[PriceUpdate] {
        match self {
            Self::Updates { updates, .. } => updates,
            Self::Ignored => &[],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(serde_json::Number),
    Text(String),
}

impl RawNumber {
    fn to_decimal(&self) -> Option<Decimal> {
        let text = match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        };
        if text.is_empty() {
            return None;
        }
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .ok()
    }

    fn raw(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPriceRecord {
    stock_ticker: String,
    ltp: RawNumber,
    day_change: RawNumber,
}

/// Decode a text frame into price updates.
///
/// Records of an array frame are normalized one by one. A record that cannot
/// be normalized is skipped and reported in `skipped`; the rest still apply.
///
/// # Errors
///
/// Returns an error if the frame is not JSON.
pub fn parse_frame(text: &str) -> Result<PriceFrame, FrameError> {
    let value: serde_json::Value = serde_json::from_str(text.trim())?;

    let serde_json::Value::Array(records) = value else {
        return Ok(PriceFrame::Ignored);
    };

    let mut updates = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        let normalized = serde_json::from_value::<RawPriceRecord>(record)
            .map_err(|e| RecordError::InvalidShape {
                index,
                reason: e.to_string(),
            })
            .and_then(|raw| normalize(index, &raw));
        match normalized {
            Ok(update) => updates.push(update),
            Err(e) => skipped.push(e),
        }
    }

    Ok(PriceFrame::Updates { updates, skipped })
}

fn normalize(index: usize, raw: &RawPriceRecord) -> Result<PriceUpdate, RecordError> {
    let symbol = Symbol::new(&raw.stock_ticker);
    if symbol.as_str().is_empty() {
        return Err(RecordError::EmptyTicker { index });
    }

    let last_price = raw.ltp.to_decimal().ok_or_else(|| RecordError::NotNumeric {
        index,
        field: "ltp",
        value: raw.ltp.raw(),
    })?;
    let day_change = raw
        .day_change
        .to_decimal()
        .ok_or_else(|| RecordError::NotNumeric {
            index,
            field: "day_change",
            value: raw.day_change.raw(),
        })?;

    Ok(PriceUpdate {
        symbol,
        last_price,
        day_change,
    })
}
