//! SQLite helper utilities for type conversion
//!
//! SQLite doesn't natively support timestamps, dates, arrays, or booleans the
//! way PostgreSQL does. This module provides utilities to convert between
//! Rust types and SQLite-compatible formats.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Serialize, de::DeserializeOwned};

// ============================================================================
// Timestamp Helpers (stored as ISO8601 TEXT in SQLite)
// ============================================================================

/// Get current UTC timestamp as ISO8601 string for SQLite
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

/// Get current UTC calendar date as ISO8601 string (for DATE columns)
#[inline]
pub fn today_iso8601() -> String {
    Utc::now().date_naive().to_string()
}

/// Convert a chrono DateTime to ISO8601 string
#[inline]
pub fn datetime_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an ISO8601 string to DateTime
#[inline]
pub fn str_to_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Try parsing SQLite's datetime() format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| anyhow!("Invalid datetime '{}': {}", s, e))
        })
}

/// Parse an ISO8601 date string ("YYYY-MM-DD") to a NaiveDate
#[inline]
pub fn str_to_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| anyhow!("Invalid date '{}': {}", s, e))
}

// ============================================================================
// Array/Vec Helpers (stored as JSON strings in SQLite)
// ============================================================================

/// Serialize a Vec to a JSON string for SQLite storage
#[inline]
pub fn vec_to_json<T: Serialize>(v: &[T]) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON string from SQLite to a Vec
#[inline]
pub fn json_to_vec<T: DeserializeOwned>(s: &str) -> Vec<T> {
    serde_json::from_str(s).unwrap_or_default()
}

// ============================================================================
// Boolean Helpers (SQLite uses 0/1 integers)
// ============================================================================

/// Convert bool to SQLite integer (0 or 1)
#[inline]
pub fn bool_to_int(b: bool) -> i32 {
    if b { 1 } else { 0 }
}

/// Convert SQLite integer to bool
#[inline]
pub fn int_to_bool(i: i32) -> bool {
    i != 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_vec_json_roundtrip() {
        let v = vec!["hello".to_string(), "world".to_string()];
        let json = vec_to_json(&v);
        let parsed: Vec<String> = json_to_vec(&json);
        assert_eq!(v, parsed);
    }

    #[test]
    fn test_empty_vec() {
        let v: Vec<String> = vec![];
        let json = vec_to_json(&v);
        assert_eq!(json, "[]");
        let parsed: Vec<String> = json_to_vec(&json);
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_datetime_roundtrip() {
        let dt = Utc::now();
        let s = datetime_to_str(dt);
        let parsed = str_to_datetime(&s).unwrap();
        // Compare to second precision (rfc3339 might have slight differences)
        assert_eq!(dt.timestamp(), parsed.timestamp());
    }

    #[test]
    fn test_sqlite_datetime_format() {
        let s = "2024-01-15 10:30:45";
        let parsed = str_to_datetime(s).unwrap();
        assert_eq!(parsed.year(), 2024);
        assert_eq!(parsed.month(), 1);
        assert_eq!(parsed.day(), 15);
    }

    #[test]
    fn test_date_parsing() {
        let d = str_to_date("1990-06-15").unwrap();
        assert_eq!(d.year(), 1990);
        assert_eq!(d.month(), 6);
        assert_eq!(d.day(), 15);
        assert!(str_to_date("15/06/1990").is_err());
    }

    #[test]
    fn test_bool_conversion() {
        assert_eq!(bool_to_int(true), 1);
        assert_eq!(bool_to_int(false), 0);
        assert!(int_to_bool(1));
        assert!(int_to_bool(42)); // Any non-zero is true
        assert!(!int_to_bool(0));
    }
}
