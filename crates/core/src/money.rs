//! Two-decimal money arithmetic shared by stored totals and read-side line totals.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::DomainError;

pub const MONEY_SCALE: u32 = 2;

/// Rounds to two fractional digits, half away from zero (0.005 -> 0.01).
///
/// The result always carries scale 2 so `10` renders as `10.00`.
pub fn quantize(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Parses a money-like input without losing precision before rounding.
pub fn parse_money(field: &str, raw: &str) -> Result<Decimal, DomainError> {
    let trimmed = raw.trim();
    let parsed = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| DomainError::validation(field, "must be a valid decimal number"))?;
    Ok(quantize(parsed))
}

pub fn zero() -> Decimal {
    quantize(Decimal::ZERO)
}

/// Column width of quantities and catalog prices.
pub const QUANTITY_DIGITS: u32 = 10;
/// Column width of line prices, discounts and quotation totals.
pub const AMOUNT_DIGITS: u32 = 12;

/// Rejects values that need more than `max_digits` digits once quantized,
/// two of them fractional.
pub fn ensure_digits(field: &str, value: Decimal, max_digits: u32) -> Result<(), DomainError> {
    let limit = Decimal::from(10_i64.pow(max_digits - MONEY_SCALE));
    if value.abs() >= limit || quantize(value).abs() >= limit {
        return Err(DomainError::validation(
            field,
            format!("ensure that there are no more than {max_digits} digits in total"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{ensure_digits, parse_money, quantize, zero, AMOUNT_DIGITS, QUANTITY_DIGITS};

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    #[test]
    fn half_cent_rounds_up() {
        assert_eq!(quantize(dec("0.005")), dec("0.01"));
        assert_eq!(quantize(dec("2.675")), dec("2.68"));
        assert_eq!(quantize(dec("1.004")), dec("1.00"));
    }

    #[test]
    fn quantized_values_always_render_two_places() {
        assert_eq!(quantize(dec("10")).to_string(), "10.00");
        assert_eq!(zero().to_string(), "0.00");
    }

    #[test]
    fn string_input_keeps_precision_until_rounding() {
        assert_eq!(parse_money("price", "19.995").expect("parse"), dec("20.00"));
        assert_eq!(parse_money("price", " 7.1 ").expect("parse"), dec("7.10"));
    }

    #[test]
    fn garbage_input_is_a_field_error() {
        let error = parse_money("unit_price", "abc").expect_err("must fail");
        assert_eq!(error.field(), Some("unit_price"));
    }

    #[test]
    fn digit_limits_count_the_two_decimals() {
        ensure_digits("quantity", dec("99999999.99"), QUANTITY_DIGITS).expect("fits");
        ensure_digits("unit_price", dec("-9999999999.99"), AMOUNT_DIGITS).expect("fits");

        let error = ensure_digits("quantity", dec("100000000"), QUANTITY_DIGITS).expect_err("too wide");
        assert_eq!(error.field(), Some("quantity"));
        ensure_digits("quantity", dec("99999999.995"), QUANTITY_DIGITS).expect_err("rounds past the limit");
        ensure_digits("unit_price", Decimal::MAX, AMOUNT_DIGITS).expect_err("far too wide");
    }
}
