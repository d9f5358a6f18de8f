//! # Loyalty Math
//!
//! Pure point arithmetic. Accrual is a basis-point rate over the sale
//! total: at 100 bps a $899.00 sale earns 8 points (one point per whole
//! dollar of the rated amount, remainder dropped — the customer never
//! earns a fractional point and rounding never invents one).

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// Value of one loyalty point when redeemed, in cents.
pub const POINT_VALUE_CENTS: i64 = 100;

/// Points earned on a sale total at the account's accrual rate.
///
/// Negative or zero totals (refund documents) earn nothing.
pub fn accrue_points(total: Money, accrual_bps: i64) -> i64 {
    if total.cents() <= 0 || accrual_bps <= 0 {
        return 0;
    }
    let rated = total.cents() as i128 * accrual_bps as i128 / 10000;
    (rated / POINT_VALUE_CENTS as i128) as i64
}

/// Cents of discount a redemption of `points` is worth.
#[inline]
pub fn redemption_value(points: i64) -> Money {
    Money::from_cents(points * POINT_VALUE_CENTS)
}

/// Validates a redemption against the account balance.
pub fn check_redemption(account_id: &str, balance: i64, requested: i64) -> CoreResult<()> {
    if requested <= 0 {
        return Err(CoreError::NonPositiveQuantity(requested));
    }
    if requested > balance {
        return Err(CoreError::InsufficientPoints {
            account_id: account_id.to_string(),
            balance,
            requested,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrual_at_one_percent() {
        // $899.00 at 100 bps -> $8.99 rated -> 8 points
        assert_eq!(accrue_points(Money::from_cents(89900), 100), 8);
    }

    #[test]
    fn accrual_drops_fractional_points() {
        // $1.99 at 100 bps -> $0.0199 rated -> 0 points
        assert_eq!(accrue_points(Money::from_cents(199), 100), 0);
    }

    #[test]
    fn no_accrual_on_refunds_or_disabled_accounts() {
        assert_eq!(accrue_points(Money::from_cents(-5000), 100), 0);
        assert_eq!(accrue_points(Money::from_cents(5000), 0), 0);
    }

    #[test]
    fn redemption_value_is_linear() {
        assert_eq!(redemption_value(25).cents(), 2500);
    }

    #[test]
    fn redemption_checks_balance() {
        assert!(check_redemption("acc-1", 10, 10).is_ok());
        assert!(matches!(
            check_redemption("acc-1", 10, 11),
            Err(CoreError::InsufficientPoints { .. })
        ));
        assert!(check_redemption("acc-1", 10, 0).is_err());
    }
}
