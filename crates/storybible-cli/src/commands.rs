use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;
use std::time::Instant;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use storybible_core::config::StorybibleConfig;
use storybible_core::ManualEdit;
use storybible_core::PersistedSessionEvent;
use storybible_core::ReplayedSession;
use storybible_core::Session;
use storybible_core::SessionEventStore;
use storybible_core::TurnReport;
use storybible_core::replay_session;
use storybible_stream::prompt::build_turn_prompt;
use storybible_stream::spawn_source;
use storybible_stream::ChatEvent;
use storybible_stream::CommandSource;
use storybible_stream::OutputFormat;
use storybible_stream::ProviderSpec;
use storybible_stream::ReaderSource;
use storybible_stream::ResponseSource;
use storybible_stream::ScriptedSource;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::render;

/// How often an idle stream is polled for held-back tokens that timed out.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An on-disk session: its event store plus the live session rebuilt from it.
struct OpenSession {
    store: SessionEventStore,
    session: Session,
}

impl OpenSession {
    fn open(config: &StorybibleConfig, dir: &Path) -> Result<Self> {
        let store = SessionEventStore::open_dir(dir)
            .with_context(|| format!("opening session {}", dir.display()))?;
        let restored = store
            .restore()
            .with_context(|| format!("restoring session {}", dir.display()))?;
        debug!(turn = restored.turn, seq = store.last_seq(), "session restored");
        let session = Session::resume(config, restored.state, restored.turn)?;
        Ok(Self { store, session })
    }

    /// Save point: refresh the snapshot so it covers everything logged so far.
    fn save(&self) -> Result<()> {
        let snapshot = ReplayedSession {
            state: self.session.state().clone(),
            turn: self.session.turn(),
        }
        .to_snapshot(self.store.last_seq());
        self.store
            .save_snapshot(&snapshot)
            .context("writing session snapshot")
    }

    fn run<S>(&mut self, source: S, json: bool) -> Result<()>
    where
        S: ResponseSource + Send + 'static,
    {
        let before = self.session.state().sidebar();
        let report = if json {
            drive_turn(&mut self.session, source, &mut io::sink())?
        } else {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let report = drive_turn(&mut self.session, source, &mut out)?;
            writeln!(out)?;
            report
        };

        self.store
            .record_turn(&report)
            .context("appending turn events")?;
        self.save()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            let after = self.session.state().sidebar();
            eprint!("{}", render::turn_summary(&report, &after.changed_since(&before)));
        }
        Ok(())
    }
}

/// Feeds one streamed response through a turn, writing displayable text to
/// `out` as soon as it is released.
pub(crate) fn drive_turn<S, W>(session: &mut Session, source: S, out: &mut W) -> Result<TurnReport>
where
    S: ResponseSource + Send + 'static,
    W: Write,
{
    let events = spawn_source(source);
    let mut turn = session.begin_turn();
    loop {
        let shown = match events.recv_timeout(POLL_INTERVAL) {
            Ok(ChatEvent::Token(chunk)) => turn.push_chunk(&chunk),
            Ok(ChatEvent::Meta(message)) => {
                debug!(turn = turn.turn(), "provider: {message}");
                continue;
            }
            Ok(ChatEvent::Aborted(reason)) => {
                warn!(turn = turn.turn(), "response aborted: {reason}");
                return Ok(turn.abort());
            }
            Ok(ChatEvent::Done) => break,
            Err(RecvTimeoutError::Timeout) => turn.poll(Instant::now()),
            Err(RecvTimeoutError::Disconnected) => {
                warn!(turn = turn.turn(), "response source went away");
                return Ok(turn.abort());
            }
        };
        if !shown.is_empty() {
            out.write_all(shown.as_bytes())?;
            out.flush()?;
        }
    }

    let released = turn.sanitized().len();
    let report = turn.finish();
    out.write_all(report.sanitized[released..].as_bytes())?;
    out.flush()?;
    Ok(report)
}

pub fn turn(
    config: &StorybibleConfig,
    dir: &Path,
    file: Option<&Path>,
    chunk_size: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut open = OpenSession::open(config, dir)?;
    let reader: Box<dyn Read + Send> = match file {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };
    match chunk_size {
        Some(0) => bail!("--chunk-size must be at least 1"),
        Some(chunk_chars) => {
            let mut text = String::new();
            let mut reader = reader;
            reader.read_to_string(&mut text).context("reading turn text")?;
            open.run(ScriptedSource::new(text).chunk_chars(chunk_chars), json)
        }
        None => open.run(ReaderSource::new(reader), json),
    }
}

pub fn chat(
    config: &StorybibleConfig,
    dir: &Path,
    provider: Option<String>,
    args: Vec<String>,
    json_lines: bool,
    message: &str,
) -> Result<()> {
    let (program, args) = match provider {
        Some(program) => (program, args),
        None => match config.provider.command.clone().filter(|cmd| !cmd.trim().is_empty()) {
            Some(program) if args.is_empty() => (program, config.provider.args.clone()),
            Some(program) => (program, args),
            None => bail!("no provider: pass --provider or set [provider].command"),
        },
    };
    let spec = ProviderSpec {
        program,
        args,
        format: if json_lines {
            OutputFormat::JsonLines
        } else {
            OutputFormat::Text
        },
    };

    let mut open = OpenSession::open(config, dir)?;
    let context = render::story_context(open.session.state());
    let prompt = build_turn_prompt(message, context.as_deref());
    info!(provider = spec.label(), turn = open.session.turn() + 1, "sending turn");
    open.run(CommandSource::new(spec, prompt), false)
}

pub fn state(config: &StorybibleConfig, dir: &Path, json: bool) -> Result<()> {
    let open = OpenSession::open(config, dir)?;
    let state = open.session.state();
    if json {
        println!("{}", serde_json::to_string_pretty(&state.snapshot())?);
    } else {
        print!("{}", render::sidebar(&state.sidebar()));
    }
    Ok(())
}

pub fn edit(config: &StorybibleConfig, dir: &Path, edit: ManualEdit) -> Result<()> {
    let mut open = OpenSession::open(config, dir)?;
    let before = open.session.state().sidebar();
    open.session
        .apply_manual(edit.clone())
        .context("edit rejected")?;
    open.store
        .append(PersistedSessionEvent::ManualEditApplied { edit })
        .context("appending edit event")?;
    open.save()?;

    let after = open.session.state().sidebar();
    let changed = after.changed_since(&before);
    if changed.is_empty() {
        println!("no change");
    } else {
        println!("updated: {}", changed.join(", "));
    }
    Ok(())
}

pub fn replay(dir: &Path) -> Result<()> {
    let store = SessionEventStore::open_dir(dir)
        .with_context(|| format!("opening session {}", dir.display()))?;
    let records = store.load().context("reading session events")?;
    let replayed = replay_session(ReplayedSession::default(), &records);
    let restored = store.restore().context("restoring session")?;
    if restored != replayed {
        warn!("snapshot disagrees with the event log; the log wins");
        store
            .save_snapshot(&replayed.to_snapshot(store.last_seq()))
            .context("rewriting session snapshot")?;
    }
    println!("{} events, {} turns", records.len(), replayed.turn);
    print!("{}", render::sidebar(&replayed.state.sidebar()));
    Ok(())
}
