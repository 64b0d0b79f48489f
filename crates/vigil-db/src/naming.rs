//! Storage naming convention and identifier checks.
//!
//! Logical names (`createdTime`, `Record`) map to physical names
//! (`created_time`, `vigil_record`) by snake-casing and, for tables, adding
//! the configured prefix. Nothing reaches a SQL string as an identifier
//! without passing one of the checks in this module first.

use crate::error::DbError;

/// Longest identifier accepted for databases and schemas (PostgreSQL's limit).
const MAX_IDENTIFIER_LEN: usize = 63;

/// Converts a logical camelCase name to its storage name.
///
/// Every uppercase letter after the first character starts a new
/// underscore-separated word; spaces are dropped.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut previous: Option<char> = None;
    for ch in name.chars().filter(|c| *c != ' ') {
        if ch.is_ascii_uppercase() && previous.is_some_and(|p| p != '_') {
            out.push('_');
        }
        out.push(ch.to_ascii_lowercase());
        previous = Some(ch);
    }
    out
}

/// Whether a request-supplied field name is safe to look up in an allow-list.
///
/// Only non-empty ASCII alphanumeric names qualify.
pub fn is_safe_field_name(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validates a configured database or schema name.
///
/// # Errors
///
/// Returns `DbError::Config` unless the name is 1..=63 ASCII alphanumerics or
/// underscores and does not start with a digit.
pub fn validate_identifier(kind: &str, name: &str) -> Result<(), DbError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DbError::Config(format!("invalid {kind} name: {name:?}")))
    }
}

/// Maps entity names to prefixed table names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableNaming {
    prefix: String,
}

impl TableNaming {
    /// Creates a mapper that prepends `prefix` to every snake-cased entity name.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` if the prefix contains anything other than
    /// ASCII alphanumerics and underscores.
    pub fn new(prefix: &str) -> Result<Self, DbError> {
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbError::Config(format!("invalid table prefix: {prefix:?}")));
        }
        Ok(Self {
            prefix: prefix.to_string(),
        })
    }

    /// Returns the physical table name for an entity.
    pub fn table_name(&self, entity: &str) -> String {
        format!("{}{}", self.prefix, snake_case(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_splits_camel_words() {
        assert_eq!(snake_case("createdTime"), "created_time");
        assert_eq!(snake_case("requestUri"), "request_uri");
        assert_eq!(snake_case("Record"), "record");
        assert_eq!(snake_case("name"), "name");
        assert_eq!(snake_case("display Name"), "display_name");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn safe_field_names_are_alphanumeric_only() {
        assert!(is_safe_field_name("name"));
        assert!(is_safe_field_name("clientIp"));
        assert!(!is_safe_field_name(""));
        assert!(!is_safe_field_name("name; DROP TABLE record"));
        assert!(!is_safe_field_name("created_time"));
        assert!(!is_safe_field_name("name--"));
    }

    #[test]
    fn identifiers_reject_quotes_and_leading_digits() {
        assert!(validate_identifier("database", "vigil").is_ok());
        assert!(validate_identifier("schema", "audit_2024").is_ok());
        assert!(validate_identifier("database", "").is_err());
        assert!(validate_identifier("database", "1db").is_err());
        assert!(validate_identifier("database", "vigil\"; DROP").is_err());
        assert!(validate_identifier("database", &"x".repeat(64)).is_err());
    }

    #[test]
    fn table_names_carry_the_prefix() {
        let naming = TableNaming::new("vigil_").expect("prefix should be valid");
        assert_eq!(naming.table_name("Record"), "vigil_record");
        assert_eq!(TableNaming::default().table_name("Dataset"), "dataset");
        assert!(TableNaming::new("bad-prefix").is_err());
    }
}
