//! Quantity value object

use crate::domain::errors::ValidationError;

/// A strictly positive, finite trade quantity in base units.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Quantity(f64);

impl Quantity {
    pub fn new(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::MustBeFinite);
        }
        if value <= 0.0 {
            return Err(ValidationError::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                value
            )));
        }
        Ok(Quantity(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Notional value of this quantity at the given price.
    pub fn notional_at(&self, price: f64) -> f64 {
        self.0 * price
    }
}
