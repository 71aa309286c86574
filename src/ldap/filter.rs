//! Search filter escaping and template rendering.

const USERNAME_PLACEHOLDER: &str = "{username}";
const EMAIL_PLACEHOLDER: &str = "{email}";

/// Escape the filter metacharacters of `input` (RFC 4515), plus `/`.
///
/// Each raw character yields exactly one `\xx` sequence; existing
/// backslashes are escaped like any other character.
pub fn escape_filter_value(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\\' => out.push_str(r"\5c"),
            '*' => out.push_str(r"\2a"),
            '(' => out.push_str(r"\28"),
            ')' => out.push_str(r"\29"),
            '\0' => out.push_str(r"\00"),
            '/' => out.push_str(r"\2f"),
            c => out.push(c),
        }
    }
    out
}

/// Substitute `{username}` and `{email}` in `template` with escaped values.
///
/// Single pass: substituted text is never scanned again, so a login that
/// itself contains `{email}` stays literal.
pub fn render(template: &str, username: &str, email: &str) -> String {
    let username = escape_filter_value(username);
    let email = escape_filter_value(email);

    let mut out = String::with_capacity(template.len() + email.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix(USERNAME_PLACEHOLDER) {
            out.push_str(&username);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(EMAIL_PLACEHOLDER) {
            out.push_str(&email);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const METACHARACTERS: [char; 6] = ['\\', '*', '(', ')', '\0', '/'];

    #[test]
    fn test_escape_every_metacharacter() {
        assert_eq!(escape_filter_value(r"\"), r"\5c");
        assert_eq!(escape_filter_value("*"), r"\2a");
        assert_eq!(escape_filter_value("("), r"\28");
        assert_eq!(escape_filter_value(")"), r"\29");
        assert_eq!(escape_filter_value("\0"), r"\00");
        assert_eq!(escape_filter_value("/"), r"\2f");
        assert_eq!(escape_filter_value("jane.doe@example.com"), "jane.doe@example.com");
    }

    #[test]
    fn test_escape_injection_attempt() {
        let escaped = escape_filter_value("*)(uid=*))(|(uid=*");
        assert_eq!(escaped, r"\2a\29\28uid=\2a\29\29\28|\28uid=\2a");

        let body = escaped.replace(r"\5c", "").replace(r"\2a", "")
            .replace(r"\28", "").replace(r"\29", "")
            .replace(r"\00", "").replace(r"\2f", "");
        assert!(!body.contains(METACHARACTERS));
    }

    #[test]
    fn test_escape_one_sequence_per_character() {
        // A literal backslash followed by hex is not mistaken for an escape.
        assert_eq!(escape_filter_value(r"a\2ab"), r"a\5c2ab");
        assert_eq!(escape_filter_value(r"\\"), r"\5c\5c");

        let input = "x\\y*z(w)v\0u/t";
        let escaped = escape_filter_value(input);
        let raw = input.chars().filter(|c| METACHARACTERS.contains(c)).count();
        assert_eq!(escaped.matches('\\').count(), raw);
        assert_eq!(escaped.len(), input.len() + raw * 2);
    }

    #[test]
    fn test_escape_keeps_unicode() {
        assert_eq!(escape_filter_value("zoë*"), r"zoë\2a");
    }

    #[test]
    fn test_render_both_placeholders() {
        let rendered = render(
            "(|(sAMAccountName={username})(mail={email}))",
            "jane.doe",
            "jane.doe@example.com",
        );
        assert_eq!(
            rendered,
            "(|(sAMAccountName=jane.doe)(mail=jane.doe@example.com))"
        );
    }

    #[test]
    fn test_render_escapes_values() {
        let rendered = render("(uid={username})", "*)(objectClass=*", "");
        assert_eq!(rendered, r"(uid=\2a\29\28objectClass=\2a)");
        assert_eq!(rendered.matches('(').count(), 1);
        assert_eq!(rendered.matches(')').count(), 1);
    }

    #[test]
    fn test_render_is_single_pass() {
        let rendered = render("(uid={username})(mail={email})", "{email}", "x@y");
        assert_eq!(rendered, "(uid={email})(mail=x@y)");
    }

    #[test]
    fn test_render_unknown_braces() {
        assert_eq!(render("{other}({username}", "a", "b"), "{other}(a");
        assert_eq!(render("no placeholder", "a", "b"), "no placeholder");
    }
}
