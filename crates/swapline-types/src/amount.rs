//! Currency amounts in integer minor units.
//!
//! All ledger arithmetic is done on `u64` quantities of minor units (cents
//! for USD). [`rust_decimal`] is only used to render human-facing
//! major-unit values.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Party;

/// A currency and the number of minor-unit digits it carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Currency {
    /// ISO-4217 style code, e.g. `"USD"`.
    pub code: String,
    /// Digits after the decimal point (2 for USD, 0 for JPY).
    pub fraction_digits: u32,
}

impl Currency {
    /// Look up a fiat currency by code. Unknown codes default to 2 digits.
    #[must_use]
    pub fn fiat(code: &str) -> Self {
        let code = code.to_ascii_uppercase();
        let fraction_digits = match code.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" => 0,
            "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
            _ => 2,
        };
        Self {
            code,
            fraction_digits,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}

/// A currency bound to the party that issued it.
///
/// Two payment records are fungible with each other only if their
/// `IssuedCurrency` is equal: same code *and* same issuer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct IssuedCurrency {
    pub currency: Currency,
    pub issuer: Party,
}

impl IssuedCurrency {
    #[must_use]
    pub fn new(currency: Currency, issuer: Party) -> Self {
        Self { currency, issuer }
    }
}

impl fmt::Display for IssuedCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issued by {}", self.currency, self.issuer)
    }
}

/// A quantity of minor units of a currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub quantity: u64,
    pub currency: Currency,
}

impl Amount {
    #[must_use]
    pub fn new(quantity: u64, currency: Currency) -> Self {
        Self { quantity, currency }
    }

    /// Major-unit representation for display.
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.quantity), self.currency.fraction_digits)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiat_fraction_digits() {
        assert_eq!(Currency::fiat("usd").fraction_digits, 2);
        assert_eq!(Currency::fiat("JPY").fraction_digits, 0);
        assert_eq!(Currency::fiat("KWD").fraction_digits, 3);
        assert_eq!(Currency::fiat("usd").code, "USD");
    }

    #[test]
    fn display_renders_major_units() {
        let amt = Amount::new(100_000, Currency::fiat("USD"));
        assert_eq!(amt.to_string(), "1000.00 USD");
        let yen = Amount::new(500, Currency::fiat("JPY"));
        assert_eq!(yen.to_string(), "500 JPY");
    }

    #[test]
    fn issued_currency_distinguishes_issuers() {
        let a = IssuedCurrency::new(Currency::fiat("USD"), Party::dummy("BankA"));
        let b = IssuedCurrency::new(Currency::fiat("USD"), Party::dummy("BankB"));
        assert_ne!(a, b);
    }
}
