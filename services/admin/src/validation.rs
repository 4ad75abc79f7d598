//! Input validation utilities
//!
//! Every check runs before the store is touched.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }

    if password.len() > 128 {
        return Err("Password must be at most 128 characters long".to_string());
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;
    let mut has_special = false;

    for c in password.chars() {
        if c.is_ascii_uppercase() {
            has_upper = true;
        } else if c.is_ascii_lowercase() {
            has_lower = true;
        } else if c.is_ascii_digit() {
            has_digit = true;
        } else if !c.is_alphanumeric() {
            has_special = true;
        }
    }

    if !has_upper {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !has_lower {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !has_digit {
        return Err("Password must contain at least one digit".to_string());
    }

    if !has_special {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}

/// Validate a role name
pub fn validate_role_name(name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Role name is required".to_string());
    }

    if name.len() > 64 {
        return Err("Role name must be at most 64 characters long".to_string());
    }

    static ROLE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = ROLE_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_ -]+$").expect("Failed to compile role name regex")
    });

    if !regex.is_match(name) {
        return Err(
            "Role name can only contain letters, numbers, spaces, dashes and underscores"
                .to_string(),
        );
    }

    Ok(())
}

/// Validate a permission identifier of the form `module:action`
pub fn validate_permission_id(id: &str) -> Result<(), String> {
    static PERMISSION_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PERMISSION_REGEX.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_-]*:[a-z][a-z0-9_-]*$")
            .expect("Failed to compile permission regex")
    });

    if !regex.is_match(id) {
        return Err(format!(
            "Invalid permission '{}', expected the form module:action",
            id
        ));
    }

    Ok(())
}

/// Parse an identifier that must be a UUID
pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid, String> {
    Uuid::parse_str(value.trim()).map_err(|_| format!("{} must be a valid UUID", field))
}
