//! App id extraction from free-form input.
//!
//! Accepts either a bare numeric id or a storefront URL like
//! `https://store.steampowered.com/app/220/Half-Life_2/` and yields the
//! numeric id. Pure string work, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ResolveError;

static STORE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?://store\.steampowered\.com/app/(\d+)").expect("valid pattern")
});

/// Resolve free-text input to a numeric app id.
pub fn resolve_input(input: &str) -> Result<String, ResolveError> {
    let trimmed = input.trim();

    if let Some(caps) = STORE_URL_RE.captures(trimmed) {
        return Ok(caps[1].to_string());
    }

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(trimmed.to_string());
    }

    Err(ResolveError::InvalidInput {
        input: trimmed.to_string(),
    })
}
