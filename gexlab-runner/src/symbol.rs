//! Instrument symbol validation.
//!
//! Symbols are trimmed and upper-cased, then checked for length, alphabet,
//! a leading letter and a small set of placeholder words that external
//! producers emit when they could not read a ticker.

use thiserror::Error;

const MAX_LEN: usize = 10;
const RESERVED: [&str; 6] = ["UNKNOWN", "TEST", "N/A", "NULL", "NONE", "ERROR"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,

    #[error("'{0}' is a reserved word, not a symbol")]
    Reserved(String),

    #[error("symbol '{symbol}' has {len} characters (allowed 1-10)")]
    Length { symbol: String, len: usize },

    #[error("symbol '{0}' may only contain letters, digits, '.' and '-'")]
    InvalidCharacter(String),

    #[error("symbol '{0}' starts with a digit")]
    LeadingDigit(String),
}

/// Normalizes and validates a symbol, returning the canonical upper-case form.
pub fn validate_symbol(raw: &str) -> Result<String, SymbolError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(SymbolError::Empty);
    }
    if RESERVED.contains(&symbol.as_str()) {
        return Err(SymbolError::Reserved(symbol));
    }
    let len = symbol.chars().count();
    if len > MAX_LEN {
        return Err(SymbolError::Length { symbol, len });
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-')
    {
        return Err(SymbolError::InvalidCharacter(symbol));
    }
    if symbol.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(SymbolError::LeadingDigit(symbol));
    }
    Ok(symbol)
}
