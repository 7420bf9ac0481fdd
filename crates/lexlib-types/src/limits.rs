//! Field length limits.
//!
//! One table of limits shared by every layer, so the size of a bounded text
//! column and the validation applied before writing to it never disagree.
//! Names follow `<type>.<field>`, all lowercase.
//!
//! Changing a limit after release requires a new schema version that alters
//! the affected columns.

use thiserror::Error;

/// Inclusive length bounds for a text field, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimit {
    /// Minimum length.
    pub min: u32,
    /// Maximum length; also the size of the backing `varchar` column.
    pub max: u32,
}

const FIELD_LIMITS: &[(&str, FieldLimit)] = &[
    ("user.name", FieldLimit { min: 0, max: 64 }),
    ("user.username", FieldLimit { min: 3, max: 64 }),
    ("group.name", FieldLimit { min: 1, max: 128 }),
    ("document.tag", FieldLimit { min: 1, max: 64 }),
    // BCP 47 tags are far shorter in practice.
    ("document.language", FieldLimit { min: 1, max: 50 }),
];

/// Errors produced by [`validate_field`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// No limit is registered under this name.
    #[error("no field limit registered for '{0}'")]
    UnknownField(String),

    /// The value is required but empty.
    #[error("{field} is a required field")]
    Required {
        /// Field name without its type prefix.
        field: String,
    },

    /// The value is shorter than the minimum.
    #[error("{field} must be at least {min} characters")]
    TooShort {
        /// Field name without its type prefix.
        field: String,
        /// Minimum length.
        min: u32,
    },

    /// The value is longer than the maximum.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name without its type prefix.
        field: String,
        /// Maximum length.
        max: u32,
    },
}

/// Returns the registered limit for `field`, if any.
pub fn field_limit(field: &str) -> Option<FieldLimit> {
    FIELD_LIMITS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, limit)| *limit)
}

impl FieldLimit {
    /// Whether `value` fits within the limit.
    pub fn is_valid(&self, value: &str) -> bool {
        let len = char_len(value);
        len >= self.min && len <= self.max
    }
}

/// Checks a value against a registered field limit.
///
/// Leading and trailing whitespace is ignored.
///
/// # Errors
///
/// Returns `FieldError::UnknownField` if no limit is registered, otherwise
/// the first bound the trimmed value violates.
pub fn validate_field(field: &str, value: &str) -> Result<(), FieldError> {
    let limit = field_limit(field).ok_or_else(|| FieldError::UnknownField(field.to_string()))?;
    let short_name = field
        .split_once('.')
        .map_or(field, |(_, name)| name)
        .to_string();
    let len = char_len(value.trim());

    if len > limit.max {
        return Err(FieldError::TooLong {
            field: short_name,
            max: limit.max,
        });
    }
    if len < limit.min {
        if limit.min == 1 {
            return Err(FieldError::Required { field: short_name });
        }
        return Err(FieldError::TooShort {
            field: short_name,
            min: limit.min,
        });
    }
    Ok(())
}

fn char_len(value: &str) -> u32 {
    u32::try_from(value.chars().count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_limits_resolve() {
        assert_eq!(
            field_limit("group.name"),
            Some(FieldLimit { min: 1, max: 128 })
        );
        assert_eq!(field_limit("group.nickname"), None);
    }

    #[test]
    fn validation_reports_the_violated_bound() {
        assert_eq!(validate_field("user.username", "bob"), Ok(()));
        assert_eq!(
            validate_field("user.username", "  ab  "),
            Err(FieldError::TooShort {
                field: "username".to_string(),
                min: 3
            })
        );
        assert_eq!(
            validate_field("group.name", "   "),
            Err(FieldError::Required {
                field: "name".to_string()
            })
        );
        assert_eq!(
            validate_field("document.tag", &"x".repeat(65)),
            Err(FieldError::TooLong {
                field: "tag".to_string(),
                max: 64
            })
        );
        assert!(matches!(
            validate_field("nope.field", "x"),
            Err(FieldError::UnknownField(_))
        ));
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let limit = FieldLimit { min: 1, max: 3 };
        assert!(limit.is_valid("♻⛄♪"));
        assert!(!limit.is_valid("♻⛄♪♪"));
    }
}
