//! Quoting of single words for `bash -c`.

use std::borrow::Cow;

fn is_verbatim(b: u8) -> bool {
    matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'/' | b'+' | b',' | b':' | b'=' | b'@')
}

/// Returns the argument unchanged if bash would read it back as a single word, otherwise wraps it in single quotes.
pub fn quote(arg: &str) -> Cow<str> {
    if arg.is_empty() {
        return Cow::Borrowed("''");
    }

    if arg.bytes().all(is_verbatim) {
        return Cow::Borrowed(arg);
    }

    // A single quote can not appear inside single quotes, so close the quotes, emit an escaped quote and reopen.
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            out.push_str(r"'\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_works() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("repos"), "repos");
        assert_eq!(quote("conf/extra.list"), "conf/extra.list");
        assert_eq!(quote("my repos"), "'my repos'");
        assert_eq!(quote("*.dsc"), "'*.dsc'");
        assert_eq!(quote("$HOME"), "'$HOME'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert!(matches!(quote("plain"), Cow::Borrowed(_)));
    }
}
