use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::actions::ManualEdit;
use super::actions::SessionAction;
use super::buffer::Piece;
use super::buffer::TokenBuffer;
use super::config::StorybibleConfig;
use super::config::StreamConfig;
use super::directive::Command;
use super::directive::RawDirective;
use super::directive::Span;
use super::error::ConfigError;
use super::error::DirectiveError;
use super::error::SessionError;
use super::reconcile::Reconciler;
use super::reconcile::ReconciliationWarning;
use super::reducer::reduce;
use super::reducer::SessionEffect;
use super::sanitize::Sanitizer;
use super::scanner::Unterminated;
use super::state::Phase;
use super::state::SessionState;
use super::validate::check;

/// Everything that went wrong (or looked suspicious) during a turn. None of
/// these ever reach the model's conversation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum TurnIssue {
    /// An opener that never closed and was passed through as text.
    Tokenization { offset: usize, reason: Unterminated },
    /// A token that was removed from the text but not applied.
    Directive { error: DirectiveError },
    /// A validated directive the executor refused.
    Execution { error: SessionError },
    UnknownCharacterReference { scene: u8, name: String },
    Reconciliation { warning: ReconciliationWarning },
    /// Tail dropped when the stream was aborted.
    Discarded { span: Span },
}

impl TurnIssue {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tokenization { .. } => "tokenization",
            Self::Directive {
                error: DirectiveError::UnknownAction { .. },
            } => "unknown_action",
            Self::Directive { .. } => "validation",
            Self::Execution { .. } => "execution",
            Self::UnknownCharacterReference { .. } => "unknown_character",
            Self::Reconciliation { .. } => "reconciliation",
            Self::Discarded { .. } => "discarded",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Tokenization { offset, reason } => format!(
                "unterminated directive at byte {offset} shown as text ({})",
                reason.label()
            ),
            Self::Directive { error } => format!("{error}: {}", error_raw(error)),
            Self::Execution { error } => error.to_string(),
            Self::UnknownCharacterReference { scene, name } => {
                format!("scene {scene} names `{name}`, who is not a character yet")
            }
            Self::Reconciliation { warning } => format!(
                "assistant said \"{}\" but no {} directive was applied",
                warning.phrase,
                warning.field.label()
            ),
            Self::Discarded { span } => {
                format!("stream aborted; dropped {} buffered bytes", span.len())
            }
        }
    }
}

fn error_raw(error: &DirectiveError) -> &str {
    match error {
        DirectiveError::UnknownAction { raw, .. }
        | DirectiveError::MissingParameter { raw, .. }
        | DirectiveError::InvalidParameter { raw, .. }
        | DirectiveError::MalformedParameter { raw, .. } => raw,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRecord {
    pub seq: u64,
    pub turn: u32,
    pub issue: TurnIssue,
}

/// Bounded operator log of issues across turns. Oldest records are evicted
/// first; sequence numbers keep counting. A zero capacity keeps nothing.
#[derive(Debug, Clone)]
pub struct IssueLog {
    cap: usize,
    next_seq: u64,
    buf: VecDeque<IssueRecord>,
}

impl IssueLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_seq: 1,
            buf: VecDeque::with_capacity(cap),
        }
    }

    pub fn append(&mut self, turn: u32, issue: TurnIssue) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.cap == 0 {
            return seq;
        }
        if self.buf.len() >= self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(IssueRecord { seq, turn, issue });
        seq
    }

    pub fn iter(&self) -> impl Iterator<Item = &IssueRecord> {
        self.buf.iter()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReport {
    pub turn: u32,
    pub sanitized: String,
    /// Commands applied this turn, in stream order.
    pub executed: Vec<Command>,
    pub issues: Vec<TurnIssue>,
    pub phase_before: Phase,
    pub phase_after: Phase,
    pub aborted: bool,
}

/// One conversation's story bible plus the machinery that feeds it. Owned by
/// a single task; a turn borrows it mutably for its whole duration.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    turn: u32,
    stream: StreamConfig,
    reconciler: Option<Reconciler>,
    issues: IssueLog,
}

impl Session {
    pub fn new(config: &StorybibleConfig) -> Result<Self, ConfigError> {
        Self::resume(config, SessionState::new(), 0)
    }

    /// Continues a session whose last started turn was `turn`.
    pub fn resume(
        config: &StorybibleConfig,
        state: SessionState,
        turn: u32,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state,
            turn,
            stream: config.stream.clone(),
            reconciler: config.reconciler()?,
            issues: IssueLog::new(config.log.issue_capacity),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Index of the most recently started turn; 0 before the first.
    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn issues(&self) -> &IssueLog {
        &self.issues
    }

    pub fn begin_turn(&mut self) -> TurnProcessor<'_> {
        self.turn += 1;
        debug!(turn = self.turn, "turn started");
        TurnProcessor {
            turn: self.turn,
            buffer: TokenBuffer::new(self.stream.max_pending_bytes, self.stream.max_pending()),
            sanitizer: Sanitizer::new(),
            sanitized: String::new(),
            executed: Vec::new(),
            issues: Vec::new(),
            phase_before: self.state.phase(),
            session: self,
        }
    }

    /// Runs a whole turn from already-received chunks.
    pub fn run_turn<I, S>(&mut self, chunks: I) -> TurnReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut turn = self.begin_turn();
        for chunk in chunks {
            turn.push_chunk(chunk.as_ref());
        }
        turn.finish()
    }

    pub fn apply_manual(&mut self, edit: ManualEdit) -> Result<Vec<SessionEffect>, SessionError> {
        let effects = reduce(&mut self.state, SessionAction::Manual(edit))?;
        info!(changes = effects.len(), "manual edit applied");
        Ok(effects)
    }
}

/// Incremental processing of one assistant turn.
#[derive(Debug)]
pub struct TurnProcessor<'a> {
    session: &'a mut Session,
    turn: u32,
    buffer: TokenBuffer,
    sanitizer: Sanitizer,
    sanitized: String,
    executed: Vec<Command>,
    issues: Vec<TurnIssue>,
    phase_before: Phase,
}

impl TurnProcessor<'_> {
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Sanitized text released so far.
    pub fn sanitized(&self) -> &str {
        &self.sanitized
    }

    pub fn state(&self) -> &SessionState {
        &self.session.state
    }

    /// Feeds one chunk and returns the text that may be displayed now.
    pub fn push_chunk(&mut self, chunk: &str) -> String {
        self.push_chunk_at(chunk, Instant::now())
    }

    pub fn push_chunk_at(&mut self, chunk: &str, now: Instant) -> String {
        let pieces = self.buffer.push(chunk, now);
        self.handle(pieces)
    }

    /// Releases a held-back token that has been open too long.
    pub fn poll(&mut self, now: Instant) -> String {
        let pieces = self.buffer.poll(now);
        self.handle(pieces)
    }

    /// Completes the turn. The returned report's `sanitized` holds the full
    /// text, including anything released by this call.
    pub fn finish(mut self) -> TurnReport {
        let pieces = self.buffer.finish();
        self.handle(pieces);

        let warnings = self
            .session
            .reconciler
            .as_ref()
            .map(|reconciler| reconciler.check(&self.sanitized, &self.executed))
            .unwrap_or_default();
        for warning in warnings {
            info!(
                turn = self.turn,
                field = warning.field.label(),
                phrase = %warning.phrase,
                "assistant narrated a save without a directive"
            );
            self.record(TurnIssue::Reconciliation { warning });
        }

        self.report(false)
    }

    /// Stream cut off: keeps what was already applied, drops the buffered
    /// tail unseen and skips reconciliation.
    pub fn abort(mut self) -> TurnReport {
        if let Some(span) = self.buffer.discard() {
            warn!(
                turn = self.turn,
                start = span.start,
                bytes = span.len(),
                "discarding partial directive on abort"
            );
            self.record(TurnIssue::Discarded { span });
        }
        self.report(true)
    }

    fn handle(&mut self, pieces: Vec<Piece>) -> String {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                Piece::Text(text) => self.sanitizer.text(&text, &mut out),
                Piece::Token { raw, span } => {
                    self.sanitizer.directive();
                    self.execute(&raw, span);
                }
                Piece::Rejected { offset, reason } => {
                    warn!(
                        turn = self.turn,
                        offset,
                        reason = reason.label(),
                        "unterminated directive passed through as text"
                    );
                    self.record(TurnIssue::Tokenization { offset, reason });
                }
            }
        }
        self.sanitized.push_str(&out);
        out
    }

    fn execute(&mut self, raw: &str, span: Span) {
        let command = match check(RawDirective::parse(raw, span)) {
            Ok(command) => command,
            Err(error) => {
                warn!(
                    turn = self.turn,
                    action = error.action(),
                    param = error.param().unwrap_or_default(),
                    start = span.start,
                    "dropping directive: {error}"
                );
                self.record(TurnIssue::Directive { error });
                return;
            }
        };

        let action = SessionAction::Directive {
            turn: self.turn,
            command: command.clone(),
        };
        match reduce(&mut self.session.state, action) {
            Ok(effects) => {
                debug!(
                    turn = self.turn,
                    action = command.action().label(),
                    changes = effects.len(),
                    "directive applied"
                );
                for effect in effects {
                    if let SessionEffect::UnknownCharacterReference { scene, name } = effect {
                        warn!(turn = self.turn, scene, name = %name, "scene names unknown character");
                        self.record(TurnIssue::UnknownCharacterReference { scene, name });
                    }
                }
                self.executed.push(command);
            }
            Err(error) => {
                warn!(
                    turn = self.turn,
                    action = command.action().label(),
                    "directive rejected: {error}"
                );
                self.record(TurnIssue::Execution { error });
            }
        }
    }

    fn record(&mut self, issue: TurnIssue) {
        self.session.issues.append(self.turn, issue.clone());
        self.issues.push(issue);
    }

    fn report(self, aborted: bool) -> TurnReport {
        let phase_after = self.session.state.phase();
        info!(
            turn = self.turn,
            executed = self.executed.len(),
            issues = self.issues.len(),
            phase = phase_after.label(),
            aborted,
            "turn finished"
        );
        TurnReport {
            turn: self.turn,
            sanitized: self.sanitized,
            executed: self.executed,
            issues: self.issues,
            phase_before: self.phase_before,
            phase_after,
            aborted,
        }
    }
}
