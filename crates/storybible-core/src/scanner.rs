use serde::Deserialize;
use serde::Serialize;

use super::directive::Span;
use super::directive::DIRECTIVE_CLOSE;
use super::directive::DIRECTIVE_OPEN;

/// Why an opener was given up on and passed through as plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unterminated {
    /// A newline arrived before the closing bracket.
    LineBreak,
    /// No closing bracket within the byte bound.
    TooLong,
    /// The turn ended with the token still open.
    EndOfTurn,
    /// The token stayed open longer than the time bound.
    Timeout,
}

impl Unterminated {
    pub fn label(self) -> &'static str {
        match self {
            Self::LineBreak => "line_break",
            Self::TooLong => "too_long",
            Self::EndOfTurn => "end_of_turn",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Text(Span),
    Token(Span),
    /// Zero-width marker: the opener at this offset is plain text.
    Rejected { at: usize, reason: Unterminated },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    pub segments: Vec<Segment>,
    /// Bytes of `input` covered by `segments`. Anything after this is a
    /// possible token start that needs more input.
    pub consumed: usize,
}

enum Candidate {
    NotOpener,
    Incomplete,
    Token(usize),
    Rejected(Unterminated),
}

/// Splits `input` into text runs and complete directive tokens.
///
/// Decisions only look at the bytes from an opener up to `max_token_bytes`
/// past it, so scanning a text whole or in arbitrary pieces gives the same
/// segmentation. With `at_end` unset, a trailing opener that could still
/// complete is left unconsumed.
pub fn scan(input: &str, at_end: bool, max_token_bytes: usize) -> Scan {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut cursor = 0;

    while let Some(rel) = input[cursor..].find('[') {
        let at = cursor + rel;
        match classify(&input[at..], at_end, max_token_bytes) {
            Candidate::NotOpener => {
                cursor = at + 1;
            }
            Candidate::Incomplete => {
                push_text(&mut segments, text_start, at);
                return Scan {
                    segments,
                    consumed: at,
                };
            }
            Candidate::Token(len) => {
                push_text(&mut segments, text_start, at);
                segments.push(Segment::Token(Span::new(at, at + len)));
                cursor = at + len;
                text_start = cursor;
            }
            Candidate::Rejected(reason) => {
                push_text(&mut segments, text_start, at);
                segments.push(Segment::Rejected { at, reason });
                text_start = at;
                cursor = at + 1;
            }
        }
    }

    push_text(&mut segments, text_start, input.len());
    Scan {
        segments,
        consumed: input.len(),
    }
}

fn classify(rest: &str, at_end: bool, max_token_bytes: usize) -> Candidate {
    let open = DIRECTIVE_OPEN.as_bytes();
    let bytes = rest.as_bytes();
    let head = &bytes[..bytes.len().min(open.len())];
    if !head.eq_ignore_ascii_case(&open[..head.len()]) {
        return Candidate::NotOpener;
    }
    if head.len() < open.len() {
        return if at_end {
            Candidate::Rejected(Unterminated::EndOfTurn)
        } else {
            Candidate::Incomplete
        };
    }

    let window = &bytes[..bytes.len().min(max_token_bytes)];
    match window
        .iter()
        .position(|b| *b == DIRECTIVE_CLOSE || *b == b'\n')
    {
        Some(idx) if window[idx] == DIRECTIVE_CLOSE => Candidate::Token(idx + 1),
        Some(_) => Candidate::Rejected(Unterminated::LineBreak),
        None if bytes.len() >= max_token_bytes => Candidate::Rejected(Unterminated::TooLong),
        None if at_end => Candidate::Rejected(Unterminated::EndOfTurn),
        None => Candidate::Incomplete,
    }
}

fn push_text(segments: &mut Vec<Segment>, start: usize, end: usize) {
    if end > start {
        segments.push(Segment::Text(Span::new(start, end)));
    }
}
