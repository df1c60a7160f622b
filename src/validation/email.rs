//! Email address check.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::MISSING_SENTINEL;

/// `local@domain.tld` with an ASCII local part.
pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"));

/// Whether an email cell should be routed to garbage.
///
/// Missing values (empty or the fill sentinel) are never flagged.
pub fn is_invalid_email(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) if v.is_empty() || v == MISSING_SENTINEL => false,
        Some(v) => !EMAIL_RE.is_match(v),
    }
}
