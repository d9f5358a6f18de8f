//! # Validation Module
//!
//! Input validation rules, applied before business logic runs. The
//! database constraints (NOT NULL, UNIQUE, FK) remain the last line of
//! defense; these checks exist to fail early with a precise message.

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum line quantity on any document. Catches fat-finger entries
/// (1000 instead of 10) before they hit inventory.
pub const MAX_LINE_QUANTITY: i64 = 999;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// Rules: non-empty, at most 50 characters, alphanumeric plus `-`/`_`.
///
/// ```rust
/// use strata_core::validation::validate_sku;
///
/// assert!(validate_sku("IPH15-128-BLK").is_ok());
/// assert!(validate_sku("").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an IMEI.
///
/// An IMEI is 15 digits where the last digit is a Luhn check digit over
/// the first 14. Mistyped serials are the single most common data entry
/// error in device intake, so the check digit is verified, not just the
/// shape.
///
/// ```rust
/// use strata_core::validation::validate_imei;
///
/// assert!(validate_imei("490154203237518").is_ok());
/// assert!(validate_imei("490154203237519").is_err()); // bad check digit
/// ```
pub fn validate_imei(imei: &str) -> ValidationResult<()> {
    let imei = imei.trim();

    if imei.len() != 15 || !imei.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "imei".to_string(),
            reason: "must be exactly 15 digits".to_string(),
        });
    }

    // Luhn: double every second digit from the right, sum digit-wise.
    let sum: u32 = imei
        .chars()
        .rev()
        .enumerate()
        .map(|(i, c)| {
            let d = c.to_digit(10).unwrap_or(0);
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();

    if sum % 10 != 0 {
        return Err(ValidationError::InvalidFormat {
            field: "imei".to_string(),
            reason: "check digit mismatch".to_string(),
        });
    }

    Ok(())
}

/// Validates an entity display name (store, customer, supplier, product).
pub fn validate_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a document line quantity.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a monetary amount that must not be negative (prices, costs,
/// floats, credit limits).
pub fn validate_non_negative_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a monetary amount that must be strictly positive (payments,
/// drawer movements).
pub fn validate_positive_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_rules() {
        assert!(validate_sku("IPH15-128-BLK").is_ok());
        assert!(validate_sku("  GLXS24_256 ").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("BAD SKU").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn imei_luhn() {
        // Known-valid IMEIs.
        assert!(validate_imei("490154203237518").is_ok());
        assert!(validate_imei("352099001761481").is_ok());
        // Wrong check digit.
        assert!(validate_imei("490154203237519").is_err());
        // Wrong shape.
        assert!(validate_imei("49015420323751").is_err());
        assert!(validate_imei("49015420323751a").is_err());
    }

    #[test]
    fn quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("Downtown Branch").is_ok());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(201)).is_err());
    }

    #[test]
    fn non_negative_cents() {
        assert!(validate_non_negative_cents("price", 0).is_ok());
        assert!(validate_non_negative_cents("price", -1).is_err());
    }

    #[test]
    fn positive_cents() {
        assert!(validate_positive_cents("payment amount", 1).is_ok());
        assert!(validate_positive_cents("payment amount", 0).is_err());
        assert!(validate_positive_cents("payment amount", -500).is_err());
    }
}
