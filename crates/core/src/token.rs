//! Obfuscation tokens: runs of percent-encoded bytes with an optional extension.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:%[0-9A-Fa-f]{2})+(?:\.[A-Za-z0-9]+)?").expect("token pattern is valid")
});

/// Every token in `text`, in order of appearance (duplicates included).
pub fn find_tokens(text: &str) -> Vec<&str> {
    TOKEN_REGEX.find_iter(text).map(|m| m.as_str()).collect()
}

pub fn has_tokens(text: &str) -> bool {
    TOKEN_REGEX.is_match(text)
}

/// Trailing extension of a token, lowercased and without the dot.
/// Empty when the token has none.
pub fn token_extension(token: &str) -> String {
    match token.rfind('.') {
        Some(i) => token[i + 1..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// Replace every located token for which `lookup` yields a replacement.
///
/// Substitution happens only at the spans the pattern itself located, so a
/// known token that is merely a fragment of a longer unknown token is left
/// alone. Returns `Cow::Borrowed` when nothing changed.
pub fn replace_tokens<'t, F>(text: &'t str, mut lookup: F) -> Cow<'t, str>
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out: Option<String> = None;
    let mut last = 0;

    for m in TOKEN_REGEX.find_iter(text) {
        if let Some(replacement) = lookup(m.as_str()) {
            let buf = out.get_or_insert_with(|| String::with_capacity(text.len()));
            buf.push_str(&text[last..m.start()]);
            buf.push_str(&replacement);
            last = m.end();
        }
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&text[last..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(text),
    }
}
