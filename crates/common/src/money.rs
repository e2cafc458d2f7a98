//! Monetary amounts attached to wish-list items.

use serde::{Deserialize, Serialize};

/// Money amount represented in minor units (cents) with an ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (e.g., 1250 = 12.50)
    cents: i64,
    /// Upper-case ISO 4217 code, e.g. `"USD"`.
    currency: String,
}

impl Money {
    /// Creates a new amount from minor units and a currency code.
    pub fn new(cents: i64, currency: impl Into<String>) -> Self {
        Self {
            cents,
            currency: currency.into().trim().to_ascii_uppercase(),
        }
    }

    /// Creates a US dollar amount from cents.
    pub fn usd(cents: i64) -> Self {
        Self::new(cents, "USD")
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the currency code.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Returns the whole-unit portion.
    pub fn units(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the minor-unit remainder.
    pub fn cents_part(&self) -> u64 {
        self.cents.unsigned_abs() % 100
    }

    fn symbol(&self) -> Option<&'static str> {
        match self.currency.as_str() {
            "USD" => Some("$"),
            "GBP" => Some("£"),
            _ => None,
        }
    }
}

/// Formats as `$12.50` for currencies with a known prefix symbol, and as
/// `12.50 EUR` otherwise.
impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let units = self.units().abs();
        let cents = self.cents_part();
        match self.symbol() {
            Some(symbol) => write!(f, "{sign}{symbol}{units}.{cents:02}"),
            None => write!(f, "{sign}{units}.{cents:02} {}", self.currency),
        }
    }
}
