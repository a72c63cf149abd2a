//! Validation helper functions for configuration types.

use crate::core::errors::{Result, SuiteError};

/// Validate that a usize value is greater than zero.
pub fn validate_positive_usize(value: usize, field: &str) -> Result<()> {
    if value == 0 {
        return Err(SuiteError::validation_field(
            format!("{field} must be greater than 0"),
            field,
        ));
    }
    Ok(())
}

/// Validate that a u64 value is greater than zero.
pub fn validate_positive_u64(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(SuiteError::validation_field(
            format!("{field} must be greater than 0"),
            field,
        ));
    }
    Ok(())
}

/// Validate that a u32 value is greater than zero.
pub fn validate_positive_u32(value: u32, field: &str) -> Result<()> {
    if value == 0 {
        return Err(SuiteError::validation_field(
            format!("{field} must be greater than 0"),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f32 value is non-negative.
pub fn validate_non_negative_f32(value: f32, field: &str) -> Result<()> {
    if value.is_nan() || value < 0.0 {
        return Err(SuiteError::validation_field(
            format!("{field} must be non-negative"),
            field,
        ));
    }
    Ok(())
}

/// Validate that an f64 value is in the unit range [0.0, 1.0].
pub fn validate_unit_range(value: f64, field: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SuiteError::validation_field(
            format!("{field} must be between 0.0 and 1.0"),
            field,
        ));
    }
    Ok(())
}

/// Validate that a usize value is within a bounded range (inclusive).
pub fn validate_bounded_usize(value: usize, min: usize, max: usize, field: &str) -> Result<()> {
    if value < min || value > max {
        return Err(SuiteError::validation_field(
            format!("{field} must be between {min} and {max}"),
            field,
        ));
    }
    Ok(())
}
