use std::time::Duration;
use std::time::Instant;

use tracing::debug;

use super::directive::Span;
use super::scanner::scan;
use super::scanner::Segment;
use super::scanner::Unterminated;

/// A flushed unit of stream text, with spans relative to the start of the turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Token { raw: String, span: Span },
    Rejected { offset: usize, reason: Unterminated },
}

/// Accumulates stream chunks and releases them at safe boundaries. The
/// only thing ever held back is a tail that starts with something that may
/// still become a directive token.
#[derive(Debug)]
pub struct TokenBuffer {
    pending: String,
    base: usize,
    pending_since: Option<Instant>,
    max_token_bytes: usize,
    max_pending: Duration,
}

impl TokenBuffer {
    pub fn new(max_token_bytes: usize, max_pending: Duration) -> Self {
        Self {
            pending: String::new(),
            base: 0,
            pending_since: None,
            max_token_bytes,
            max_pending,
        }
    }

    pub fn push(&mut self, chunk: &str, now: Instant) -> Vec<Piece> {
        if chunk.is_empty() {
            return self.poll(now);
        }
        self.pending.push_str(chunk);
        let pieces = self.drain(false);
        self.touch(now);
        pieces
    }

    /// Gives up on a token that has stayed open past the time bound.
    pub fn poll(&mut self, now: Instant) -> Vec<Piece> {
        let Some(since) = self.pending_since else {
            return Vec::new();
        };
        if now.saturating_duration_since(since) < self.max_pending {
            return Vec::new();
        }

        debug!(
            offset = self.base,
            bytes = self.pending.len(),
            "flushing stale unterminated directive as text"
        );
        let offset = self.base;
        let text = std::mem::take(&mut self.pending);
        self.base += text.len();
        self.pending_since = None;
        vec![
            Piece::Rejected {
                offset,
                reason: Unterminated::Timeout,
            },
            Piece::Text(text),
        ]
    }

    /// End of turn: whatever is still held back is released as text.
    pub fn finish(&mut self) -> Vec<Piece> {
        let pieces = self.drain(true);
        self.pending_since = None;
        pieces
    }

    /// Stream aborted: the held-back tail is dropped unseen.
    pub fn discard(&mut self) -> Option<Span> {
        self.pending_since = None;
        if self.pending.is_empty() {
            return None;
        }
        let span = Span::new(self.base, self.base + self.pending.len());
        self.base = span.end;
        self.pending.clear();
        Some(span)
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Total bytes received this turn.
    pub fn received(&self) -> usize {
        self.base + self.pending.len()
    }

    fn drain(&mut self, at_end: bool) -> Vec<Piece> {
        let result = scan(&self.pending, at_end, self.max_token_bytes);
        let base = self.base;
        let pieces = result
            .segments
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(span) => Piece::Text(self.pending[span.start..span.end].to_string()),
                Segment::Token(span) => Piece::Token {
                    raw: self.pending[span.start..span.end].to_string(),
                    span: span.shift(base),
                },
                Segment::Rejected { at, reason } => Piece::Rejected {
                    offset: base + at,
                    reason,
                },
            })
            .collect();

        self.pending.replace_range(..result.consumed, "");
        self.base += result.consumed;
        if result.consumed > 0 {
            // Whatever is still held back is a new candidate; its clock starts now.
            self.pending_since = None;
        }
        pieces
    }

    fn touch(&mut self, now: Instant) {
        if self.pending.is_empty() {
            self.pending_since = None;
        } else if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }
}
