//! # Validation Module
//!
//! Input validation utilities for Rutero.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler (axum extractors)                               │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── Malformed JSON rejected before the core sees it                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Coordinates finite and in range                                   │
//! │  ├── Quantities and amounts positive                                   │
//! │  └── Status/method strings in the allowed set                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The geo module computes distances unconditionally; rejecting unusable
//! coordinates is the caller's job and happens here.

use crate::error::ValidationError;
use crate::geo::Point;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Coordinate Validators
// =============================================================================

/// Validates a latitude/longitude pair.
///
/// ## Rules
/// - Both values must be finite (no NaN/infinity)
/// - Latitude in [-90, 90], longitude in [-180, 180]
///
/// ## Example
/// ```rust
/// use rutero_core::validation::validate_coordinates;
///
/// assert!(validate_coordinates(-17.78, -63.18).is_ok());
/// assert!(validate_coordinates(f64::NAN, -63.18).is_err());
/// assert!(validate_coordinates(-17.78, 200.0).is_err());
/// ```
pub fn validate_coordinates(lat: f64, lon: f64) -> ValidationResult<Point> {
    if !lat.is_finite() {
        return Err(ValidationError::InvalidCoordinate {
            field: "latitude".to_string(),
            reason: "not a finite number".to_string(),
        });
    }
    if !lon.is_finite() {
        return Err(ValidationError::InvalidCoordinate {
            field: "longitude".to_string(),
            reason: "not a finite number".to_string(),
        });
    }
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::InvalidCoordinate {
            field: "latitude".to_string(),
            reason: format!("{lat} outside [-90, 90]"),
        });
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::InvalidCoordinate {
            field: "longitude".to_string(),
            reason: format!("{lon} outside [-180, 180]"),
        });
    }
    Ok(Point::new(lat, lon))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order quantity.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a unit price in cents.
pub fn validate_unit_price(unit_price_cents: i64) -> ValidationResult<()> {
    if unit_price_cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "unit_price_cents".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a customer or distributor display name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at most 100 characters
pub fn validate_name(field: &'static str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.len() > 100 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 100,
        });
    }

    Ok(())
}

/// Validates a product description.
pub fn validate_product(product: &str) -> ValidationResult<()> {
    let product = product.trim();

    if product.is_empty() {
        return Err(ValidationError::Required {
            field: "product".to_string(),
        });
    }

    if product.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "product".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_coordinates() {
        let p = validate_coordinates(-17.78, -63.18).unwrap();
        assert_eq!(p.lat, -17.78);
        assert_eq!(p.lon, -63.18);
    }

    #[test]
    fn test_rejects_nan_and_infinite() {
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
        assert!(validate_coordinates(90.0, 180.0).is_ok());
    }

    #[test]
    fn test_quantity_and_price() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_unit_price(100).is_ok());
        assert!(validate_unit_price(0).is_err());
    }

    #[test]
    fn test_names() {
        assert!(validate_name("customer", "Maria Flores").is_ok());
        assert!(validate_name("customer", "   ").is_err());
        assert!(validate_name("customer", &"x".repeat(101)).is_err());
        assert!(validate_product("Agua 20L").is_ok());
        assert!(validate_product("").is_err());
    }
}
