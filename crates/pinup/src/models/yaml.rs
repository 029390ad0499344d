//! `key: value` line shapes, as found in workflows and manifests.

/// A `key: value` match split into its literal prefix and its value.
#[derive(Debug, PartialEq)]
pub(crate) struct KeyValue<'a> {
    /// The key, colon, and any whitespace around them, byte-for-byte.
    pub(crate) prefix: &'a str,
    /// The raw value, quotes included.
    pub(crate) value: &'a str,
}

impl<'a> KeyValue<'a> {
    /// Splits `matched` if it starts with `key` followed by a colon.
    ///
    /// Returns `None` when `matched` is some other key (e.g. `images:`
    /// for `image`) or has no value.
    pub(crate) fn split(matched: &'a str, key: &str) -> Option<Self> {
        let rest = matched.strip_prefix(key)?;
        let rest = rest.trim_start_matches([' ', '\t']).strip_prefix(':')?;
        let rest = rest.trim_start_matches([' ', '\t']);

        let value = rest.trim_end();
        if value.is_empty() {
            return None;
        }

        Some(Self {
            prefix: &matched[..matched.len() - rest.len()],
            value,
        })
    }
}
