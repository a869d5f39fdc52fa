//! Validation Support
//!
//! Implement [`Validatable`] on the create and update payloads of a resource
//! to reject bad input with a `422 Unprocessable Entity` before anything is
//! written to the database.
//!
//! ```rust,ignore
//! use mongocrate::validation::{Validatable, ValidationErrors, validators};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! pub struct ProductCreate {
//!     pub name: String,
//!     pub price: i64,
//! }
//!
//! impl Validatable for ProductCreate {
//!     fn validate(&self) -> Result<(), ValidationErrors> {
//!         let mut errors = ValidationErrors::new();
//!         errors.check(validators::validate_length("name", &self.name, Some(3), None));
//!         errors.check(validators::validate_range("price", self.price, Some(1), None));
//!         errors.result()
//!     }
//! }
//! ```

use serde::Serialize;
use std::fmt;

/// Validation error with field name and message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Collection of validation errors
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Record the error of a single check, if any
    pub fn check(&mut self, outcome: Result<(), ValidationError>) {
        if let Err(error) = outcome {
            self.add(error);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Convert to Result
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one error was recorded.
    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed with {} error(s):", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Payloads that can be checked before they reach the database.
///
/// The default implementation accepts everything, so resources without
/// rules only need an empty `impl Validatable for MyCreate {}`.
pub trait Validatable {
    /// # Errors
    ///
    /// Returns every rule the payload violates.
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Helper validators for common patterns
pub mod validators {
    use super::ValidationError;
    use std::fmt;

    /// Validate string length (in characters) is within range
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the violated bound.
    pub fn validate_length(
        field: &str,
        value: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<(), ValidationError> {
        let len = value.chars().count();

        if let Some(min_len) = min
            && len < min_len
        {
            return Err(ValidationError::new(
                field,
                format!("Must be at least {min_len} characters"),
            ));
        }

        if let Some(max_len) = max
            && len > max_len
        {
            return Err(ValidationError::new(
                field,
                format!("Must be at most {max_len} characters"),
            ));
        }

        Ok(())
    }

    /// Validate number is within range
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the violated bound.
    pub fn validate_range<T: PartialOrd + fmt::Display>(
        field: &str,
        value: T,
        min: Option<T>,
        max: Option<T>,
    ) -> Result<(), ValidationError> {
        if let Some(min_val) = min
            && value < min_val
        {
            return Err(ValidationError::new(field, format!("Must be at least {min_val}")));
        }

        if let Some(max_val) = max
            && value > max_val
        {
            return Err(ValidationError::new(field, format!("Must be at most {max_val}")));
        }

        Ok(())
    }

    /// Validate value is not blank
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the value is empty or whitespace.
    pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::new(field, "This field is required"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_collection() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.check(Ok(()));
        assert!(errors.is_empty());

        errors.check(Err(ValidationError::new("field1", "error1")));
        errors.add(ValidationError::new("field2", "error2"));
        assert_eq!(errors.len(), 2);

        let err = errors.result().unwrap_err();
        assert!(err.to_string().contains("2 error(s)"));
    }

    #[test]
    fn test_validate_length_counts_characters() {
        use validators::validate_length;

        assert!(validate_length("name", "ab", Some(3), None).is_err());
        assert!(validate_length("name", "abcdef", None, Some(5)).is_err());
        assert!(validate_length("name", "abc", Some(3), Some(5)).is_ok());
        // Three characters, nine bytes
        assert!(validate_length("name", "日本語", None, Some(3)).is_ok());
    }

    #[test]
    fn test_validate_range() {
        use validators::validate_range;

        assert!(validate_range("age", 5, Some(10), None).is_err());
        assert!(validate_range("age", 150, None, Some(120)).is_err());
        assert!(validate_range("age", 25, Some(0), Some(120)).is_ok());
    }

    #[test]
    fn test_validate_required() {
        use validators::validate_required;

        assert!(validate_required("name", "").is_err());
        assert!(validate_required("name", "   ").is_err());
        assert!(validate_required("name", "John").is_ok());
    }

    #[test]
    fn test_default_validate_accepts() {
        struct Anything;
        impl Validatable for Anything {}
        assert!(Anything.validate().is_ok());
    }
}
