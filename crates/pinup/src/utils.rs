//! Helper routines.

/// The `User-Agent` sent with every outbound request.
pub(crate) static PINUP_AGENT: &str = concat!("pinup/", env!("CARGO_PKG_VERSION"));

/// Returns whether `value` looks like a full 40-character commit SHA.
pub(crate) fn is_commit_sha(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Strips one layer of matching single or double quotes from `value`.
///
/// A lone leading or trailing quote is also dropped, since a regex match
/// may stop short of the closing quote.
pub(crate) fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix(['"', '\'']).unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}
