use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use super::actions::ManualEdit;
use super::actions::SessionAction;
use super::directive::Command;
use super::reducer::reduce;
use super::state::SessionSnapshot;
use super::state::SessionState;
use super::turn::TurnReport;

pub const SESSION_LOG_FILE: &str = "session-events.jsonl";
pub const SESSION_SNAPSHOT_FILE: &str = "session-snapshot.json";
pub const PERSISTED_SNAPSHOT_V1: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedSessionEvent {
    TurnStarted {
        turn: u32,
    },
    CommandApplied {
        turn: u32,
        command: Command,
    },
    ManualEditApplied {
        edit: ManualEdit,
    },
    TurnCompleted {
        turn: u32,
        aborted: bool,
        issue_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSessionEventRecord {
    pub seq: u64,
    pub ts_ms: i64,
    #[serde(flatten)]
    pub event: PersistedSessionEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSessionSnapshot {
    pub version: u8,
    /// Last event folded into `state`.
    pub seq: u64,
    pub turn: u32,
    pub state: SessionSnapshot,
}

/// Append-only JSONL log of everything that changed a session, plus a
/// snapshot file next to it. Written only at save points.
#[derive(Debug)]
pub struct SessionEventStore {
    path: PathBuf,
    snapshot_path: PathBuf,
    next_seq: u64,
}

impl SessionEventStore {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existing = load_records(path.as_path())?;
        let next_seq = existing
            .iter()
            .map(|record| record.seq)
            .max()
            .map_or(1, |seq| seq.saturating_add(1));
        let snapshot_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(SESSION_SNAPSHOT_FILE);
        Ok(Self {
            path,
            snapshot_path,
            next_seq,
        })
    }

    /// Opens `<dir>/session-events.jsonl`.
    pub fn open_dir(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Self::open(dir.as_ref().join(SESSION_LOG_FILE))
    }

    pub fn append(&mut self, event: PersistedSessionEvent) -> std::io::Result<u64> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        let record = PersistedSessionEventRecord {
            seq,
            ts_ms: chrono::Utc::now().timestamp_millis(),
            event,
        };
        let line = serde_json::to_string(&record)
            .map_err(|err| std::io::Error::other(format!("serialize: {err}")))?;
        append_line(self.path.as_path(), line.as_str())?;
        Ok(seq)
    }

    /// Writes the events of one finished (or aborted) turn. Returns the last seq.
    pub fn record_turn(&mut self, report: &TurnReport) -> std::io::Result<u64> {
        self.append(PersistedSessionEvent::TurnStarted { turn: report.turn })?;
        for command in &report.executed {
            self.append(PersistedSessionEvent::CommandApplied {
                turn: report.turn,
                command: command.clone(),
            })?;
        }
        self.append(PersistedSessionEvent::TurnCompleted {
            turn: report.turn,
            aborted: report.aborted,
            issue_count: report.issues.len(),
        })
    }

    pub fn last_seq(&self) -> u64 {
        self.next_seq.saturating_sub(1)
    }

    pub fn load(&self) -> std::io::Result<Vec<PersistedSessionEventRecord>> {
        load_records(self.path.as_path())
    }

    pub fn load_since(
        &self,
        seq_exclusive: u64,
    ) -> std::io::Result<Vec<PersistedSessionEventRecord>> {
        let records = self.load()?;
        Ok(records
            .into_iter()
            .filter(|record| record.seq > seq_exclusive)
            .collect())
    }

    pub fn save_snapshot(&self, snapshot: &PersistedSessionSnapshot) -> std::io::Result<()> {
        let encoded = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| std::io::Error::other(format!("serialize snapshot: {err}")))?;
        std::fs::write(&self.snapshot_path, encoded)
    }

    pub fn load_snapshot(&self) -> std::io::Result<Option<PersistedSessionSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.snapshot_path)?;
        let snapshot = serde_json::from_slice::<PersistedSessionSnapshot>(&bytes)
            .map_err(|err| std::io::Error::other(format!("parse snapshot: {err}")))?;
        Ok(Some(snapshot))
    }

    /// Snapshot (when present) plus every later event.
    pub fn restore(&self) -> std::io::Result<ReplayedSession> {
        let (initial, since) = match self.load_snapshot()? {
            Some(snapshot) => {
                let seq = snapshot.seq;
                (ReplayedSession::from_snapshot(snapshot)?, seq)
            }
            None => (ReplayedSession::default(), 0),
        };
        let tail = self.load_since(since)?;
        Ok(replay_session(initial, &tail))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplayedSession {
    pub state: SessionState,
    pub turn: u32,
}

impl ReplayedSession {
    pub fn from_snapshot(snapshot: PersistedSessionSnapshot) -> std::io::Result<Self> {
        if snapshot.version != PERSISTED_SNAPSHOT_V1 {
            return Err(std::io::Error::other(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let state = SessionState::from_snapshot(snapshot.state)
            .map_err(|err| std::io::Error::other(format!("restore snapshot: {err}")))?;
        Ok(Self {
            state,
            turn: snapshot.turn,
        })
    }

    pub fn to_snapshot(&self, seq: u64) -> PersistedSessionSnapshot {
        PersistedSessionSnapshot {
            version: PERSISTED_SNAPSHOT_V1,
            seq,
            turn: self.turn,
            state: self.state.snapshot(),
        }
    }
}

/// Re-applies logged commands and edits in `seq` order. The phase falls out
/// of the reducer, so replay lands on the same state the live session had.
pub fn replay_session(
    initial: ReplayedSession,
    records: &[PersistedSessionEventRecord],
) -> ReplayedSession {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|record| record.seq);

    let mut session = initial;
    for record in sorted {
        let action = match record.event {
            PersistedSessionEvent::TurnStarted { turn } => {
                session.turn = session.turn.max(turn);
                continue;
            }
            PersistedSessionEvent::TurnCompleted { .. } => continue,
            PersistedSessionEvent::CommandApplied { turn, command } => {
                SessionAction::Directive { turn, command }
            }
            PersistedSessionEvent::ManualEditApplied { edit } => SessionAction::Manual(edit),
        };
        if let Err(err) = reduce(&mut session.state, action) {
            warn!(seq = record.seq, "skipping event that no longer applies: {err}");
        }
    }
    session
}

fn load_records(path: &Path) -> std::io::Result<Vec<PersistedSessionEventRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PersistedSessionEventRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => warn!("skipping unreadable session event: {err}"),
        }
    }
    Ok(records)
}

fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::replay_session;
    use super::PersistedSessionEvent;
    use super::PersistedSessionEventRecord;
    use super::ReplayedSession;
    use super::SessionEventStore;
    use super::SESSION_LOG_FILE;
    use crate::actions::ManualEdit;
    use crate::config::StorybibleConfig;
    use crate::directive::Command;
    use crate::state::Phase;
    use crate::turn::Session;
    use pretty_assertions::assert_eq;

    fn beat(text: &str) -> Command {
        Command::AddBeat {
            beat: text.to_string(),
        }
    }

    #[test]
    fn append_records_are_monotonic_across_reopen() {
        let dir = tempdir().expect("tmpdir");
        let mut store = SessionEventStore::open_dir(dir.path()).expect("open");
        let seq1 = store
            .append(PersistedSessionEvent::TurnStarted { turn: 1 })
            .expect("append");
        let seq2 = store
            .append(PersistedSessionEvent::CommandApplied {
                turn: 1,
                command: beat("They meet"),
            })
            .expect("append");
        assert_eq!((seq1, seq2), (1, 2));

        let mut reopened = SessionEventStore::open_dir(dir.path()).expect("reopen");
        assert_eq!(reopened.last_seq(), 2);
        let seq3 = reopened
            .append(PersistedSessionEvent::TurnCompleted {
                turn: 1,
                aborted: false,
                issue_count: 0,
            })
            .expect("append");
        assert_eq!(seq3, 3);
        assert_eq!(reopened.load().expect("load").len(), 3);
    }

    #[test]
    fn full_replay_matches_live_session() {
        let dir = tempdir().expect("tmpdir");
        let mut store = SessionEventStore::open_dir(dir.path()).expect("open");
        let mut session = Session::new(&StorybibleConfig::default()).expect("session");

        let turns = [
            "[DIRECTIVE:lock_title|title:Room for One] [DIRECTIVE:add_note|note:rooftop]",
            "[DIRECTIVE:lock_logline|logline:Two roommates, one guy.] \
             [DIRECTIVE:add_character|name:Emma|role:protagonist]",
            "[DIRECTIVE:add_beat|beat:They clash] [DIRECTIVE:add_scene|number:2|characters:Emma]",
        ];
        for text in turns {
            let report = session.run_turn([text]);
            store.record_turn(&report).expect("record");
        }
        let edit = ManualEdit::RenameCharacter {
            from: "emma".to_string(),
            to: "Emily".to_string(),
        };
        session.apply_manual(edit.clone()).expect("edit");
        store
            .append(PersistedSessionEvent::ManualEditApplied { edit })
            .expect("append");

        let restored = store.restore().expect("restore");
        assert_eq!(&restored.state, session.state());
        assert_eq!(restored.turn, 3);
        assert_eq!(restored.state.phase(), Phase::Complete);
        assert_eq!(restored.state.scenes()[&2].characters, vec!["Emily".to_string()]);
    }

    #[test]
    fn snapshot_plus_tail_matches_full_replay() {
        let dir = tempdir().expect("tmpdir");
        let mut store = SessionEventStore::open_dir(dir.path()).expect("open");
        let mut session = Session::new(&StorybibleConfig::default()).expect("session");

        let report = session.run_turn(["[DIRECTIVE:lock_title|title:Say I Don't]"]);
        let seq = store.record_turn(&report).expect("record");
        let checkpoint = ReplayedSession {
            state: session.state().clone(),
            turn: session.turn(),
        };
        store
            .save_snapshot(&checkpoint.to_snapshot(seq))
            .expect("save snapshot");

        let report = session.run_turn(["[DIRECTIVE:add_beat|beat:The wedding is off]"]);
        store.record_turn(&report).expect("record");

        let from_snapshot = store.restore().expect("restore");
        let full = replay_session(ReplayedSession::default(), &store.load().expect("load"));
        assert_eq!(from_snapshot, full);
        assert_eq!(from_snapshot.turn, 2);
        assert_eq!(from_snapshot.state.beats().len(), 1);
    }

    #[test]
    fn replay_orders_by_seq() {
        let records = vec![
            PersistedSessionEventRecord {
                seq: 2,
                ts_ms: 0,
                event: PersistedSessionEvent::CommandApplied {
                    turn: 1,
                    command: Command::SetTone {
                        tone: "warm".to_string(),
                    },
                },
            },
            PersistedSessionEventRecord {
                seq: 1,
                ts_ms: 0,
                event: PersistedSessionEvent::CommandApplied {
                    turn: 1,
                    command: Command::SetTone {
                        tone: "dry".to_string(),
                    },
                },
            },
        ];
        let replayed = replay_session(ReplayedSession::default(), &records);
        assert_eq!(replayed.state.tone(), Some("warm"));
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let dir = tempdir().expect("tmpdir");
        let mut store = SessionEventStore::open_dir(dir.path()).expect("open");
        store
            .append(PersistedSessionEvent::TurnStarted { turn: 1 })
            .expect("append");
        let path = dir.path().join(SESSION_LOG_FILE);
        let mut raw = std::fs::read_to_string(&path).expect("read");
        raw.push_str("{not json\n\n");
        std::fs::write(&path, raw).expect("write");
        store
            .append(PersistedSessionEvent::TurnStarted { turn: 2 })
            .expect("append");

        let seqs: Vec<u64> = store
            .load()
            .expect("load")
            .iter()
            .map(|record| record.seq)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn missing_snapshot_is_not_an_error() {
        let dir = tempdir().expect("tmpdir");
        let store = SessionEventStore::open_dir(dir.path().join("fresh")).expect("open");
        assert!(store.load_snapshot().expect("load").is_none());
        assert_eq!(store.restore().expect("restore"), ReplayedSession::default());
    }

    #[cfg(unix)]
    #[test]
    fn event_log_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().expect("tmpdir");
        let mut store = SessionEventStore::open_dir(dir.path()).expect("open");
        store
            .append(PersistedSessionEvent::TurnStarted { turn: 1 })
            .expect("append");
        let mode = std::fs::metadata(dir.path().join(SESSION_LOG_FILE))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
