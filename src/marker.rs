//! In-text landmark markers.
//!
//! A marker looks like `%^greet^%` and sits inside a source comment. Whatever
//! follows the closing delimiter on the same line is the comment body:
//!
//! ```text
//! # %^greet^% Say hello to the caller
//! ```
//!
//! Only the first (leftmost) marker on a line is significant. Any later
//! `%^...^%` on the same line is plain comment text.

use regex::Regex;
use std::sync::OnceLock;

pub const CLOSE_DELIMITER: &str = "^%";

static MARKER_REGEX: OnceLock<Regex> = OnceLock::new();

fn marker_regex() -> &'static Regex {
    MARKER_REGEX.get_or_init(|| {
        Regex::new(r"%\^([A-Za-z0-9_-]+)\^%").expect("marker pattern is a valid regex")
    })
}

/// A decoded marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker<'a> {
    /// Landmark identifier between the delimiters
    pub landmark: &'a str,
    /// Byte offset of the identifier's first character
    pub start: usize,
    /// Byte offset just past the identifier (the closing delimiter starts here)
    pub end: usize,
    /// Comment body after the delimiter, with trailing whitespace removed
    pub text: &'a str,
}

impl Marker<'_> {
    /// Byte offset just past the closing delimiter
    pub fn body_offset(&self) -> usize {
        self.end + CLOSE_DELIMITER.len()
    }

    /// True when the marker carries no comment body
    pub fn is_placeholder(&self) -> bool {
        self.text.is_empty()
    }
}

/// Split a line into its content and its line terminator (`\n`, `\r\n` or none)
fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// Find the first marker on a line.
///
/// Returns `None` when the line carries no marker; that is a passthrough,
/// not an error. The body drops the single separating space written by
/// [`encode`] and trailing whitespace only; inner spacing is preserved.
pub fn decode(line: &str) -> Option<Marker<'_>> {
    let captures = marker_regex().captures(line)?;
    let ident = captures.get(1)?;

    let (content, _) = split_line_ending(line);
    let body_offset = ident.end() + CLOSE_DELIMITER.len();
    let body = content.get(body_offset..).unwrap_or("");
    let body = body.strip_prefix(' ').unwrap_or(body);

    Some(Marker {
        landmark: ident.as_str(),
        start: ident.start(),
        end: ident.end(),
        text: body.trim_end(),
    })
}

/// Replace the comment body after `landmark`'s marker with `new_text`.
///
/// Everything up to and including the closing delimiter is kept untouched,
/// as is the line terminator. Line breaks inside `new_text` are folded into
/// spaces so the marker stays on one line. An empty `new_text` produces the
/// placeholder form (`%^greet^%`).
///
/// Returns `None` if the line's first marker is not `landmark`.
pub fn encode(line: &str, landmark: &str, new_text: &str) -> Option<String> {
    let marker = decode(line)?;
    if marker.landmark != landmark {
        return None;
    }

    let (_, line_ending) = split_line_ending(line);
    let head = &line[..marker.body_offset()];
    let body = fold_line_breaks(new_text);

    let mut out = String::with_capacity(head.len() + body.len() + 2);
    out.push_str(head);
    if !body.is_empty() {
        out.push(' ');
        out.push_str(&body);
    }
    out.push_str(line_ending);
    Some(out)
}

/// Strip the comment body, leaving only the marker
pub fn placeholder(line: &str, landmark: &str) -> Option<String> {
    encode(line, landmark, "")
}

fn fold_line_breaks(text: &str) -> String {
    if !text.contains(['\n', '\r']) {
        return text.to_string();
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
