//! POSIX shell quoting

/// Quote `s` as a single shell word.
///
/// Wraps the value in single quotes, so nothing inside is expanded; an
/// embedded `'` is written as `'\''`.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("/tmp/shots"), "'/tmp/shots'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_special_characters() {
        assert_eq!(quote("/tmp/my shots"), "'/tmp/my shots'");
        assert_eq!(quote("/tmp/$HOME/\"x\"/`id`"), "'/tmp/$HOME/\"x\"/`id`'");
        assert_eq!(quote("/tmp/it's"), "'/tmp/it'\\''s'");
    }
}
