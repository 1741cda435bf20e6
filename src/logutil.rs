//! Logging utilities for player-supplied text (display names, raw command lines)
//! so every log record stays on a single line.

use std::fmt::Write;

/// Longest preview of a command line or name that reaches the log.
pub const MAX_LOG_PREVIEW: usize = 120;

/// Escape a string for single-line logging, truncated to [`MAX_LOG_PREVIEW`] characters.
pub fn escape_log(s: &str) -> String {
    escape_log_with_limit(s, MAX_LOG_PREVIEW)
}

/// Escape `\n`, `\r`, `\t` and backslashes; other control characters become `\xNN`.
/// Input longer than `limit` characters is cut and ends with an ellipsis.
pub fn escape_log_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_in_command_lines() {
        let esc = escape_log("attack\nregister Mallory\r\t");
        assert_eq!(esc, "attack\\nregister Mallory\\r\\t");
    }

    #[test]
    fn control_characters_become_hex() {
        assert_eq!(escape_log("Ari\u{1b}a"), "Ari\\x1Ba");
    }

    #[test]
    fn long_lines_are_truncated() {
        let esc = escape_log(&"x".repeat(400));
        assert_eq!(esc.chars().count(), MAX_LOG_PREVIEW + 1);
        assert!(esc.ends_with('…'));
        assert_eq!(escape_log_with_limit("abcdef", 3), "abc…");
    }
}
