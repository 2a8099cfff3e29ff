//! Conversion of quantities as typed on a form into base units.
//!
//! A line is entered either in base units (`"unit"`) or in the product's
//! packaging unit (its packaging-type code). Stock is always booked in base
//! units, which must come out as a positive whole number.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use stockbook_core::{DomainError, DomainResult};

/// Label of the canonical stock unit.
pub const BASE_UNIT: &str = "unit";

/// What a product allows as entry units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConversion<'a> {
    /// Code of the product's packaging type.
    pub packaging_code: &'a str,
    /// Base units per package; `None` when the product is not counted by package.
    pub units_per_package: Option<Decimal>,
}

/// Convert `entered_quantity` expressed in `entered_unit` to base units.
pub fn to_base_quantity(
    entered_quantity: Decimal,
    entered_unit: &str,
    conversion: &UnitConversion<'_>,
) -> DomainResult<u64> {
    if entered_quantity <= Decimal::ZERO {
        return Err(DomainError::field("quantity", "must be greater than 0"));
    }

    let unit = entered_unit.trim();
    let base = if unit.eq_ignore_ascii_case(BASE_UNIT) {
        entered_quantity
    } else if !unit.is_empty() && unit.eq_ignore_ascii_case(conversion.packaging_code) {
        let per_package = conversion.units_per_package.ok_or_else(|| {
            DomainError::field(
                "unit",
                format!("product has no units-per-package conversion for '{unit}'"),
            )
        })?;
        entered_quantity
            .checked_mul(per_package)
            .ok_or_else(|| DomainError::field("quantity", "is too large"))?
    } else {
        return Err(DomainError::field(
            "unit",
            format!(
                "must be '{BASE_UNIT}' or '{}'",
                conversion.packaging_code
            ),
        ));
    };

    if !base.fract().is_zero() {
        return Err(DomainError::field(
            "quantity",
            format!("must convert to a whole number of {BASE_UNIT}s (got {})", base.normalize()),
        ));
    }

    match base.to_u64() {
        Some(q) if q > 0 => Ok(q),
        _ => Err(DomainError::field("quantity", "is out of range")),
    }
}
