//! Input validation for channel, tag and property payloads
//!
//! Checks the shape of a single record. Checks that need the backend
//! (referenced tags exist, listed channels exist) live with the managers.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("The {kind} name cannot be empty")]
    EmptyName { kind: &'static str },

    #[error("The {kind} '{name}' name is too long (max {max} characters)")]
    TooLong {
        kind: &'static str,
        name: String,
        max: usize,
    },

    #[error("The {kind} '{name}' must have an owner")]
    EmptyOwner { kind: &'static str, name: String },

    #[error("Property '{property}' on channel '{channel}' must have a non-empty value")]
    EmptyPropertyValue { property: String, channel: String },
}

/// Maximum length for channel, tag and property names
pub const MAX_NAME_LENGTH: usize = 255;

/// Validate a record name
///
/// Rules:
/// - Not empty or blank
/// - At most 255 characters
/// - No control characters (names end up in query strings and logs)
pub fn validate_name(kind: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyName { kind });
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            kind,
            name: name.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    if name.chars().any(char::is_control) {
        return Err(ValidationError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "contains control characters",
        });
    }

    if name != name.trim() {
        return Err(ValidationError::InvalidName {
            kind,
            name: name.to_string(),
            reason: "has leading or trailing whitespace",
        });
    }

    Ok(())
}

/// Validate the owner of a named record
pub fn validate_owner(kind: &'static str, name: &str, owner: &str) -> Result<(), ValidationError> {
    if owner.trim().is_empty() {
        return Err(ValidationError::EmptyOwner {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Validate a channel-specific property value
pub fn validate_property_value(
    property: &str,
    channel: &str,
    value: Option<&str>,
) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(ValidationError::EmptyPropertyValue {
            property: property.to_string(),
            channel: channel.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(validate_name("channel", "SR:C01-MG{PS:QH1A}I-I").is_ok());
        assert!(validate_name("tag", "archived").is_ok());
        assert!(validate_name("property", "a").is_ok());
    }

    #[test]
    fn test_empty_and_too_long() {
        assert_eq!(
            validate_name("tag", ""),
            Err(ValidationError::EmptyName { kind: "tag" })
        );
        assert!(validate_name("tag", "   ").is_err());
        let long_name = "a".repeat(256);
        assert!(matches!(
            validate_name("channel", &long_name),
            Err(ValidationError::TooLong { max: 255, .. })
        ));
    }

    #[test]
    fn test_control_and_padding_rejected() {
        assert!(validate_name("channel", "ch\n1").is_err());
        assert!(validate_name("channel", " ch1").is_err());
    }

    #[test]
    fn test_owner() {
        assert!(validate_owner("tag", "t1", "o1").is_ok());
        assert!(matches!(
            validate_owner("tag", "t1", " "),
            Err(ValidationError::EmptyOwner { .. })
        ));
    }

    #[test]
    fn test_property_value() {
        assert!(validate_property_value("domain", "ch1", Some("cryo")).is_ok());
        assert!(validate_property_value("domain", "ch1", Some("")).is_err());
        assert!(validate_property_value("domain", "ch1", None).is_err());
    }
}
