//! Amount normalization for the external accounting system.
//!
//! Internal amounts are integer minor units. The accounting API expects
//! decimal amounts with exactly two fractional digits, so every amount that
//! leaves the system passes through [`AmountNormalizer`].

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use ledgersync_shared::types::{Currency, Money};

/// Fractional digits used for every amount sent externally.
pub const EXTERNAL_SCALE: u32 = 2;

/// Stateless conversions between ledger minor units and external amounts.
pub struct AmountNormalizer;

impl AmountNormalizer {
    /// Converts minor units to a decimal with exactly two fractional digits.
    ///
    /// Currencies with fewer minor digits are rescaled without rounding
    /// (JPY 1500 becomes `1500.00`). Uses Banker's Rounding if a currency
    /// ever carries more than two minor digits.
    ///
    /// ```
    /// use ledgersync_core::amount::AmountNormalizer;
    /// use ledgersync_shared::types::Currency;
    ///
    /// let amount = AmountNormalizer::from_minor(10000, Currency::Usd);
    /// assert_eq!(amount.to_string(), "100.00");
    /// ```
    #[must_use]
    pub fn from_minor(minor_units: i64, currency: Currency) -> Decimal {
        Self::normalize(Decimal::new(minor_units, currency.exponent()))
    }

    /// Converts a [`Money`] value to its external decimal amount.
    #[must_use]
    pub fn from_money(money: Money) -> Decimal {
        Self::from_minor(money.minor_units, money.currency)
    }

    /// Absolute external amount, used for unit prices and line amounts
    /// whose direction is carried by the document type.
    #[must_use]
    pub fn magnitude(minor_units: i64, currency: Currency) -> Decimal {
        Self::from_minor(minor_units, currency).abs()
    }

    /// Negative external amount for outflows (refund and fee lines).
    #[must_use]
    pub fn outflow(minor_units: i64, currency: Currency) -> Decimal {
        -Self::magnitude(minor_units, currency)
    }

    /// Rounds to two places and pins the scale so the value always renders
    /// with two fractional digits.
    #[must_use]
    pub fn normalize(value: Decimal) -> Decimal {
        let mut rounded =
            value.round_dp_with_strategy(EXTERNAL_SCALE, RoundingStrategy::MidpointNearestEven);
        rounded.rescale(EXTERNAL_SCALE);
        rounded
    }

    /// Sums normalized amounts. Addition of two-place decimals is exact, so
    /// the result needs no further rounding.
    #[must_use]
    pub fn sum<'a>(amounts: impl IntoIterator<Item = &'a Decimal>) -> Decimal {
        Self::normalize(amounts.into_iter().copied().sum())
    }

    /// Renders an amount as the external decimal string.
    #[must_use]
    pub fn format(value: Decimal) -> String {
        Self::normalize(value).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_minor_usd() {
        assert_eq!(AmountNormalizer::from_minor(10000, Currency::Usd), dec!(100.00));
        assert_eq!(AmountNormalizer::from_minor(1, Currency::Usd), dec!(0.01));
        assert_eq!(AmountNormalizer::from_minor(0, Currency::Usd).to_string(), "0.00");
    }

    #[test]
    fn test_from_minor_zero_exponent_currency() {
        let amount = AmountNormalizer::from_minor(1500, Currency::Jpy);
        assert_eq!(amount.to_string(), "1500.00");
    }

    #[test]
    fn test_format_always_two_places() {
        assert_eq!(AmountNormalizer::format(dec!(100)), "100.00");
        assert_eq!(AmountNormalizer::format(dec!(50.5)), "50.50");
        assert_eq!(AmountNormalizer::format(dec!(-20)), "-20.00");
    }

    #[test]
    fn test_normalize_uses_bankers_rounding() {
        assert_eq!(AmountNormalizer::normalize(dec!(2.125)), dec!(2.12));
        assert_eq!(AmountNormalizer::normalize(dec!(2.135)), dec!(2.14));
    }

    #[test]
    fn test_magnitude_and_outflow() {
        assert_eq!(AmountNormalizer::magnitude(-5000, Currency::Usd), dec!(50.00));
        assert_eq!(AmountNormalizer::outflow(5000, Currency::Usd), dec!(-50.00));
        assert_eq!(AmountNormalizer::outflow(-5000, Currency::Usd), dec!(-50.00));
    }

    #[test]
    fn test_sum_keeps_scale() {
        let amounts = [dec!(100.00), dec!(50.00), dec!(-20.00)];
        let total = AmountNormalizer::sum(&amounts);
        assert_eq!(total.to_string(), "130.00");
    }
}
