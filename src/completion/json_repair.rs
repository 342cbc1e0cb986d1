//! Repair of truncated or slightly malformed JSON objects.
//!
//! Completion replies are often cut off by the output-token limit. The repair
//! is a pure text → text transformation driven by a three-state scanner
//! (`Normal`, `InString`, `Escaped`):
//!
//! 1. Escape raw control characters inside strings.
//! 2. Close an unterminated string (dropping a dangling `\` or partial `\uXXXX`).
//! 3. Strip trailing fragments that cannot be completed: a `"key":` with no
//!    value, a bare `"key"` inside an object, a trailing comma, a partial
//!    `true`/`false`/`null` or number.
//! 4. Append closers for every unmatched `{` / `[`, last-opened first.
//!
//! The result is not guaranteed to parse; callers retry the parse and fall
//! back to field extraction.

// ─── Scanner ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    Escaped,
}

/// Where the scan ended and what it saw along the way.
#[derive(Debug)]
struct ScanResult {
    state: ScanState,
    /// Unmatched openers, innermost last.
    stack: Vec<char>,
    /// Byte span of the most recently closed string, quotes included.
    last_string: Option<(usize, usize)>,
    /// Byte offset of the backslash of an incomplete `\uXXXX` escape.
    pending_unicode: Option<usize>,
    /// Byte offset of the backslash that left the scan in `Escaped`.
    escape_start: Option<usize>,
}

fn scan(text: &str) -> ScanResult {
    let mut state = ScanState::Normal;
    let mut stack = Vec::new();
    let mut string_start = 0;
    let mut last_string = None;
    let mut escape_start = None;
    // (backslash offset, hex digits seen so far)
    let mut unicode: Option<(usize, u8)> = None;

    for (i, ch) in text.char_indices() {
        match state {
            ScanState::Normal => match ch {
                '"' => {
                    state = ScanState::InString;
                    string_start = i;
                }
                '{' | '[' => stack.push(ch),
                '}' | ']' => {
                    stack.pop();
                }
                _ => {}
            },
            ScanState::InString => {
                if let Some((start, seen)) = unicode {
                    if ch.is_ascii_hexdigit() && seen < 4 {
                        unicode = if seen + 1 == 4 { None } else { Some((start, seen + 1)) };
                        continue;
                    }
                    unicode = None;
                }
                match ch {
                    '\\' => {
                        state = ScanState::Escaped;
                        escape_start = Some(i);
                    }
                    '"' => {
                        state = ScanState::Normal;
                        last_string = Some((string_start, i + 1));
                    }
                    _ => {}
                }
            }
            ScanState::Escaped => {
                if ch == 'u' {
                    unicode = escape_start.map(|s| (s, 0));
                }
                state = ScanState::InString;
            }
        }
    }

    ScanResult {
        state,
        stack,
        last_string,
        pending_unicode: unicode.map(|(start, _)| start),
        escape_start,
    }
}

// ─── Repair ──────────────────────────────────────────────────────────────────

/// Repair a (possibly truncated) JSON object so that it can be re-parsed.
pub fn repair_truncated_json(input: &str) -> String {
    let mut text = escape_control_chars_in_strings(input);

    close_open_string(&mut text);
    strip_incomplete_tail(&mut text);

    let scan = scan(&text);
    for opener in scan.stack.iter().rev() {
        text.push(if *opener == '{' { '}' } else { ']' });
    }
    text
}

/// Replace raw control characters inside strings with their escaped form.
fn escape_control_chars_in_strings(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut state = ScanState::Normal;

    for ch in input.chars() {
        match state {
            ScanState::Normal => {
                if ch == '"' {
                    state = ScanState::InString;
                }
                out.push(ch);
            }
            ScanState::InString => {
                match ch {
                    '\\' => state = ScanState::Escaped,
                    '"' => state = ScanState::Normal,
                    _ => {}
                }
                match ch {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_control() => {}
                    c => out.push(c),
                }
            }
            ScanState::Escaped => {
                state = ScanState::InString;
                out.push(ch);
            }
        }
    }
    out
}

/// If the text ends inside a string, drop any dangling escape and append the
/// closing quote.
fn close_open_string(text: &mut String) {
    let result = scan(text);
    match result.state {
        ScanState::Normal => return,
        ScanState::Escaped => {
            if let Some(start) = result.escape_start {
                text.truncate(start);
            }
        }
        ScanState::InString => {
            if let Some(start) = result.pending_unicode {
                text.truncate(start);
            }
        }
    }
    text.push('"');
}

/// Repeatedly strip trailing fragments that cannot be completed.
fn strip_incomplete_tail(text: &mut String) {
    loop {
        let trimmed_len = text.trim_end().len();
        text.truncate(trimmed_len);

        let Some(last) = text.chars().last() else {
            return;
        };

        match last {
            ',' => {
                text.pop();
            }
            ':' => {
                text.pop();
                let trimmed_len = text.trim_end().len();
                text.truncate(trimmed_len);
                let scan = scan(text);
                match scan.last_string {
                    Some((start, end)) if end == text.len() => text.truncate(start),
                    _ => return,
                }
            }
            '"' => {
                let scan = scan(text);
                let Some((start, end)) = scan.last_string else {
                    return;
                };
                let bare_key = end == text.len()
                    && scan.stack.last() == Some(&'{')
                    && matches!(text[..start].trim_end().chars().last(), Some(',') | Some('{'));
                if !bare_key {
                    return;
                }
                text.truncate(start);
            }
            c if c.is_ascii_alphabetic() => {
                let run_start = text
                    .char_indices()
                    .rev()
                    .take_while(|(_, ch)| ch.is_ascii_alphabetic())
                    .last()
                    .map(|(i, _)| i)
                    .unwrap_or(text.len());
                if matches!(&text[run_start..], "true" | "false" | "null") {
                    return;
                }
                text.truncate(run_start);
            }
            '-' | '+' | '.' => {
                text.pop();
            }
            _ => return,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
