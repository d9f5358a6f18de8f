//! # Weighted-Average Costing
//!
//! Pure math for inventory valuation. Every receipt re-blends the unit
//! cost; every issue is valued at the current average.
//!
//! ## The Blend
//! ```text
//!                on_hand * avg_cost  +  incoming * unit_cost
//!   new_avg  =  ──────────────────────────────────────────────
//!                        on_hand  +  incoming
//! ```
//!
//! Integer cents with round-half-up, i128 intermediates. When on-hand is
//! zero or negative (negative stock sold ahead of receipt) the incoming
//! cost wins outright: there is no meaningful existing layer to blend
//! against.
//!
//! ```rust
//! use strata_core::costing::blend_unit_cost;
//!
//! // 10 @ $600.00 on hand, receive 5 @ $660.00 -> $620.00
//! assert_eq!(blend_unit_cost(10, 60000, 5, 66000).unwrap(), 62000);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

/// Result of applying one costing-relevant movement to a stock position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostChange {
    pub qty_before: i64,
    pub avg_cost_before_cents: i64,
    pub qty_after: i64,
    pub avg_cost_after_cents: i64,
    /// Signed change in book value caused by the movement.
    pub value_delta_cents: i64,
}

/// Recomputes the weighted-average unit cost after a receipt.
///
/// `incoming_qty` must be positive. Returns the new average in cents.
pub fn blend_unit_cost(
    on_hand_qty: i64,
    avg_cost_cents: i64,
    incoming_qty: i64,
    unit_cost_cents: i64,
) -> CoreResult<i64> {
    if incoming_qty <= 0 {
        return Err(CoreError::NonPositiveQuantity(incoming_qty));
    }

    // No positive existing layer: incoming cost becomes the average.
    if on_hand_qty <= 0 {
        return Ok(unit_cost_cents);
    }

    let existing_value = on_hand_qty as i128 * avg_cost_cents as i128;
    let incoming_value = incoming_qty as i128 * unit_cost_cents as i128;
    let total_qty = (on_hand_qty + incoming_qty) as i128;

    // Round half-up on the division.
    let blended = (existing_value + incoming_value + total_qty / 2) / total_qty;
    Ok(blended as i64)
}

/// Applies a receipt to a position and returns the full cost change.
pub fn apply_receipt(
    on_hand_qty: i64,
    avg_cost_cents: i64,
    incoming_qty: i64,
    unit_cost_cents: i64,
) -> CoreResult<CostChange> {
    let new_avg = blend_unit_cost(on_hand_qty, avg_cost_cents, incoming_qty, unit_cost_cents)?;
    Ok(CostChange {
        qty_before: on_hand_qty,
        avg_cost_before_cents: avg_cost_cents,
        qty_after: on_hand_qty + incoming_qty,
        avg_cost_after_cents: new_avg,
        value_delta_cents: incoming_qty * unit_cost_cents,
    })
}

/// Applies an issue to a position. Issues never change the average; they
/// remove value at the current average cost.
pub fn apply_issue(
    on_hand_qty: i64,
    avg_cost_cents: i64,
    issue_qty: i64,
) -> CoreResult<CostChange> {
    if issue_qty <= 0 {
        return Err(CoreError::NonPositiveQuantity(issue_qty));
    }

    Ok(CostChange {
        qty_before: on_hand_qty,
        avg_cost_before_cents: avg_cost_cents,
        qty_after: on_hand_qty - issue_qty,
        avg_cost_after_cents: avg_cost_cents,
        value_delta_cents: -(issue_qty * avg_cost_cents),
    })
}

/// Valuation of an issue at the current average.
#[inline]
pub fn issue_value(qty: i64, avg_cost_cents: i64) -> Money {
    Money::from_cents(qty * avg_cost_cents)
}
