//! Dockerfile `FROM` instructions.

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t'
}

/// Splits `s` at the end of its first whitespace-delimited token.
fn next_token(s: &str) -> (&str, &str) {
    s.split_at(s.find(is_space).unwrap_or(s.len()))
}

/// `FROM [--flag[=value]]... image [AS stage]`.
#[derive(Debug, PartialEq)]
pub(crate) struct FromInstruction<'a> {
    /// Everything up to the image, byte-for-byte, including indentation.
    pub(crate) prefix: &'a str,
    pub(crate) flags: Vec<&'a str>,
    pub(crate) image: &'a str,
    pub(crate) stage: Option<&'a str>,
}

impl<'a> FromInstruction<'a> {
    /// Returns `None` unless `matched` is a `FROM` with an image operand.
    pub(crate) fn parse(matched: &'a str) -> Option<Self> {
        let (keyword, mut rest) = next_token(matched.trim_start_matches(is_space));
        if !keyword.eq_ignore_ascii_case("FROM") || !rest.starts_with(is_space) {
            return None;
        }

        let mut flags = vec![];
        loop {
            rest = rest.trim_start_matches(is_space);
            if !rest.starts_with("--") {
                break;
            }
            let (flag, tail) = next_token(rest);
            flags.push(flag);
            rest = tail;
        }

        let prefix = &matched[..matched.len() - rest.len()];
        let (image, tail) = next_token(rest);
        if image.is_empty() {
            return None;
        }

        let (alias_kw, tail) = next_token(tail.trim_start_matches(is_space));
        let stage = if alias_kw.eq_ignore_ascii_case("AS") {
            let (stage, _) = next_token(tail.trim_start_matches(is_space));
            (!stage.is_empty()).then_some(stage)
        } else {
            None
        };

        Some(Self {
            prefix,
            flags,
            image,
            stage,
        })
    }

    /// Returns the value of `--platform`, if given.
    pub(crate) fn platform(&self) -> Option<&'a str> {
        self.flags
            .iter()
            .find_map(|flag| flag.strip_prefix("--platform="))
    }
}
