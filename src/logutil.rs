//! Logging utilities for modem traffic. AT responses are multi-line and may carry
//! control bytes (CR, Ctrl-Z); these helpers keep every log record on a single line.

/// Escape a string for single-line logging:
/// - `\n` => `\\n`
/// - `\r` => `\\r`
/// - `\t` => `\\t`
/// - backslash => `\\\\`
///   Truncates very long strings (over `max_preview`) with an ellipsis to cap log noise.
pub fn escape_log(s: &str) -> String {
    const MAX_PREVIEW: usize = 300;
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                // Ctrl-Z and friends show up as \xNN
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// UTF-8 safe truncation for log display. Never slices inside a multi-byte char.
/// Returns the escaped input, cut to `max_bytes` with `...` appended when it was longer.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let cut_target = max_bytes.saturating_sub(3);
    let mut cut = cut_target;
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = escape_log(&input[..cut]);
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::{escape_log, truncate_for_log};

    #[test]
    fn escapes_modem_response_framing() {
        let s = "AT+CMGF=1\r\r\nOK\r\n";
        assert_eq!(escape_log(s), "AT+CMGF=1\\r\\r\\nOK\\r\\n");
    }

    #[test]
    fn escapes_ctrl_z_as_hex() {
        let s = "1234#2#\u{1a}";
        assert_eq!(escape_log(s), "1234#2#\\x1A");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        // "é" is 2 bytes; max 6 => cut target 3 lands inside the second "é"
        let s = "aéé bcdef";
        assert_eq!(truncate_for_log(s, 6), "aé...");
    }

    #[test]
    fn no_truncation_when_within_limit() {
        assert_eq!(truncate_for_log("OK", 10), "OK");
    }
}
