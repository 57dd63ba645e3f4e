//! Logging helpers for data that arrives over the link.
//! Names and payloads are untrusted, so they are escaped or hex-previewed before
//! they reach a log line.

/// Names may be up to 255 bytes; half that keeps one transfer on one log line.
const NAME_PREVIEW: usize = 120;

/// Single-line, printable rendering of a name taken off the wire. Backslash and
/// the usual whitespace escapes are spelled out, other control characters
/// become `\xNN`, and anything past [`NAME_PREVIEW`] characters is replaced by
/// an ellipsis.
pub fn escape_log(s: &str) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(s.len().min(NAME_PREVIEW) + 8);
    let mut chars = s.chars();
    for ch in chars.by_ref().take(NAME_PREVIEW) {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}

/// Lowercase hex of at most `max` leading bytes, with `..` when cut short.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut out: String = data
        .iter()
        .take(max)
        .map(|b| format!("{:02x}", b))
        .collect();
    if data.len() > max {
        out.push_str("..");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{escape_log, hex_snippet};

    #[test]
    fn escapes_controls_in_names() {
        assert_eq!(escape_log("a\nb\tc\\"), "a\\nb\\tc\\\\");
        assert_eq!(escape_log("x\u{7}"), "x\\x07");
    }

    #[test]
    fn long_names_are_cut() {
        let out = escape_log(&"n".repeat(500));
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 121);
        assert_eq!(escape_log(&"n".repeat(120)), "n".repeat(120));
    }

    #[test]
    fn hex_snippet_marks_truncation() {
        assert_eq!(hex_snippet(&[0xc0, 0x01], 8), "c001");
        assert_eq!(hex_snippet(&[1, 2, 3], 2), "0102..");
    }
}
