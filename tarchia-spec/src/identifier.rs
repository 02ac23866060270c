/*!
Identifier validation shared by owners, tables, views and columns
*/

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

/// Checks `name` against `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_names() {
        assert!(validate_identifier("orders").is_ok());
        assert!(validate_identifier("_hidden").is_ok());
        assert!(validate_identifier("order_2024").is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_identifier("2024_orders").is_err());
    }

    #[test]
    fn rejects_empty_and_punctuation() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("orders-table").is_err());
        assert!(validate_identifier("orders.table").is_err());
    }
}
