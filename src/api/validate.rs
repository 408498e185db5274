//! Profile field validation shared by the registration and update endpoints

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ApiError;
use crate::db::sqlite_helpers::str_to_date;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Deserializer for update fields that must distinguish "absent" (leave the
/// column alone) from explicit `null` (clear it). A present value, including
/// null, lands in the outer Some.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(ApiError::Invalid("Enter a valid email address".to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Invalid(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if password.len() > 128 {
        return Err(ApiError::Invalid(
            "Password must be at most 128 characters".to_string(),
        ));
    }
    Ok(())
}

/// Validate a birth date string: ISO format and an age between 13 and 100.
pub fn validate_birth_date(value: &str) -> Result<(), ApiError> {
    let birth_date = str_to_date(value).map_err(|_| {
        ApiError::Invalid("Birth date must be in the format YYYY-MM-DD".to_string())
    })?;

    let age = (Utc::now().date_naive() - birth_date).num_days() / 365;
    if age < 13 {
        return Err(ApiError::Invalid(
            "User must be at least 13 years old".to_string(),
        ));
    }
    if age > 100 {
        return Err(ApiError::Invalid(
            "User must be less than 100 years old".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user.name+tag@sub.example.org").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("spaces in@example.com").is_err());
    }

    #[test]
    fn password_length_window() {
        assert!(validate_password("eightch8").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn birth_date_age_window() {
        assert!(validate_birth_date("1990-06-15").is_ok());
        // Bad format
        assert!(validate_birth_date("15/06/1990").is_err());
        // Too young: born yesterday
        let yesterday = (Utc::now().date_naive() - chrono::Days::new(1)).to_string();
        assert!(validate_birth_date(&yesterday).is_err());
        // Too old
        assert!(validate_birth_date("1900-01-01").is_err());
    }
}
