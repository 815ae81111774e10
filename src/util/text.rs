use std::borrow::Cow;

/// Strips control characters and ANSI escape sequences from feed text.
///
/// Feed titles end up in terminal output and JSON reports, so escape
/// sequences embedded by a publisher must not survive normalization.
///
/// Strips:
/// - ASCII control chars except tab, newline and carriage return
/// - ANSI CSI sequences: `\x1b[` ... (final byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL or `\x1b\\`)
/// - A bare ESC
///
/// Returns `Cow::Borrowed` when nothing needs stripping.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c == '\x7f' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_is_borrowed() {
        let input = "Plain title, with tabs\tand newlines\n";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_removes_controls() {
        assert_eq!(strip_control_chars("a\x00b\x07c\x7fd"), "abcd");
    }

    #[test]
    fn test_removes_csi_sequences() {
        assert_eq!(strip_control_chars("\x1b[1;31mRed\x1b[0m title"), "Red title");
    }

    #[test]
    fn test_removes_osc_sequences() {
        assert_eq!(strip_control_chars("\x1b]0;pwned\x07Title"), "Title");
        assert_eq!(strip_control_chars("\x1b]8;;http://x\x1b\\Link"), "Link");
    }

    #[test]
    fn test_bare_escape_and_unicode() {
        assert_eq!(strip_control_chars("caf\u{e9}\x1b \u{1f600}"), "caf\u{e9} \u{1f600}");
    }

    #[test]
    fn test_unterminated_sequences_do_not_panic() {
        assert_eq!(strip_control_chars("Title\x1b["), "Title");
        assert_eq!(strip_control_chars("Title\x1b]never ends"), "Title");
    }
}
