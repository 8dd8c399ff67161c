// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not blank
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that a string is at least `min` bytes long
    pub fn min_len(value: &str, min: usize, field: &str) -> Result<()> {
        if value.len() < min {
            return Err(ConfigError::ValidationError(format!(
                "{} must be at least {} bytes",
                field, min
            )));
        }
        Ok(())
    }

    /// Validate that a value only uses ASCII letters, digits, `-` and `_`
    pub fn is_identifier(value: &str, field: &str) -> Result<()> {
        Self::not_empty(value, field)?;
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ConfigError::ValidationError(format!(
                "{} may only contain letters, digits, '-' and '_'",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a URL uses one of the allowed schemes
    pub fn has_scheme(value: &str, schemes: &[&str], field: &str) -> Result<()> {
        let scheme = value.split_once("://").map(|(scheme, _)| scheme);
        if !scheme.is_some_and(|s| schemes.contains(&s)) {
            return Err(ConfigError::ValidationError(format!(
                "{} must be a {} URL",
                field,
                schemes.join(" or ")
            )));
        }
        Ok(())
    }
}
