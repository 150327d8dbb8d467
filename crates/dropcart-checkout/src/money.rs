//! Order-total parsing and the budget check that gates "place order".

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::error::CheckoutError;

/// Parses a displayed currency string by keeping only digits and `.`.
///
/// Anything that still does not parse yields zero, which the budget check
/// rejects.
#[must_use]
pub fn parse_currency(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Rejects a zero (unparsed) total or one above `budget`.
///
/// # Errors
///
/// Returns [`CheckoutError::BudgetExceeded`] with the parsed total.
pub fn check_order_total(total: Decimal, budget: Decimal) -> Result<(), CheckoutError> {
    if total <= Decimal::ZERO || total > budget {
        return Err(CheckoutError::BudgetExceeded { total, budget });
    }
    Ok(())
}

/// Parses `displayed` and checks it against `budget`.
///
/// # Errors
///
/// Returns [`CheckoutError::BudgetExceeded`] when the check fails.
pub fn validate_order_total(displayed: &str, budget: Decimal) -> Result<Decimal, CheckoutError> {
    let total = parse_currency(displayed);
    check_order_total(total, budget)?;
    Ok(total)
}
