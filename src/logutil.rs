//! Keeps player-typed text and snapshot strings on one log line.

use std::fmt::Write;

const MAX_PREVIEW: usize = 200;

/// [`escape_log_with_limit`] at 200 chars.
pub fn escape_log(s: &str) -> String {
    escape_log_with_limit(s, MAX_PREVIEW)
}

/// Escape control characters (`\n`, `\r`, `\t`, backslash, others as `\xNN`) and cut
/// anything past `limit` chars with an ellipsis.
pub fn escape_log_with_limit(s: &str, limit: usize) -> String {
    let mut out = String::with_capacity(s.len().min(limit) + 8);
    let mut chars = s.chars();
    for ch in chars.by_ref().take(limit) {
        push_escaped(&mut out, ch);
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}

fn push_escaped(out: &mut String, ch: char) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_input_stays_on_one_line() {
        assert_eq!(escape_log("take lamp\r\n"), "take lamp\\r\\n");
        assert_eq!(escape_log("bell\u{7}"), "bell\\x07");
        assert_eq!(escape_log("a\\b"), "a\\\\b");
    }

    #[test]
    fn long_input_is_cut() {
        let esc = escape_log(&"a".repeat(500));
        assert!(esc.ends_with('…'));
        assert_eq!(esc.chars().count(), 201);
        assert_eq!(escape_log(&"b".repeat(200)), "b".repeat(200));
        assert_eq!(escape_log_with_limit("slot name", 4), "slot…");
    }
}
