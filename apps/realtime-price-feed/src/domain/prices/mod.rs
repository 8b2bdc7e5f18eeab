//! Price Table Types
//!
//! Domain types for the latest price of each symbol pushed by the feed.
//!
//! # Merge Semantics
//!
//! Updates are merged per symbol: a new update replaces every field of that
//! symbol's entry and leaves all other symbols untouched. The table is never
//! replaced wholesale, so folding frames one at a time or all at once yields
//! the same table.

mod frame;

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

pub use frame::{FrameError, PriceFrame, RecordError, parse_frame};

// =============================================================================
// Symbol
// =============================================================================

/// Uppercased ticker identifier used as the price table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize a raw ticker into a symbol.
    #[must_use]
    pub fn new(ticker: &str) -> Self {
        Self(ticker.trim().to_uppercase())
    }

    /// Symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(ticker: &str) -> Self {
        Self::new(ticker)
    }
}

// =============================================================================
// Price Quote / Update
// =============================================================================

/// Latest known price fields for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceQuote {
    /// Last traded price.
    pub last_price: Decimal,
    /// Change versus the previous close.
    pub day_change: Decimal,
}

/// A validated price update for a single symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceUpdate {
    /// Normalized symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub last_price: Decimal,
    /// Change versus the previous close.
    pub day_change: Decimal,
}

impl PriceUpdate {
    /// Price fields of this update.
    #[must_use]
    pub const fn quote(&self) -> PriceQuote {
        PriceQuote {
            last_price: self.last_price,
            day_change: self.day_change,
        }
    }
}

// =============================================================================
// Price Table
// =============================================================================

/// Mapping from symbol to its latest price.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PriceTable {
    entries: HashMap<Symbol, PriceQuote>,
}

impl PriceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a single update, replacing that symbol's fields.
    pub fn merge(&mut self, update: &PriceUpdate) {
        self.entries.insert(update.symbol.clone(), update.quote());
    }

    /// Merge a whole batch. Later records for the same symbol win.
    ///
    /// Returns the number of records applied.
    pub fn apply_batch(&mut self, updates: &[PriceUpdate]) -> usize {
        for update in updates {
            self.merge(update);
        }
        updates.len()
    }

    /// Latest price for a symbol. Lookup is case-insensitive.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&PriceQuote> {
        self.entries
            .get(symbol)
            .or_else(|| self.entries.get(Symbol::new(symbol).as_str()))
    }

    /// Number of symbols tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &PriceQuote)> {
        self.entries.iter()
    }
}
