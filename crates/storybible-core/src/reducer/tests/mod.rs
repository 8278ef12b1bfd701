use pretty_assertions::assert_eq;

pub(super) use super::reduce;
pub(super) use super::SessionEffect;
pub(super) use crate::actions::ManualEdit;
pub(super) use crate::actions::SessionAction;
pub(super) use crate::directive::CharacterPatch;
pub(super) use crate::directive::Command;
pub(super) use crate::directive::ScenePatch;
pub(super) use crate::error::SessionError;
pub(super) use crate::state::derive_phase;
pub(super) use crate::state::Field;
pub(super) use crate::state::Phase;
pub(super) use crate::state::SessionState;

mod idempotence;
mod manual_edits;

fn state() -> SessionState {
    SessionState::new()
}

fn run(state: &mut SessionState, turn: u32, command: Command) -> Vec<SessionEffect> {
    let effects = reduce(state, SessionAction::Directive { turn, command })
        .expect("directives always apply");
    assert_phase_sync(state);
    effects
}

fn run_all(state: &mut SessionState, commands: Vec<Command>) {
    for command in commands {
        run(state, 1, command);
    }
}

fn edit(state: &mut SessionState, edit: ManualEdit) -> Result<Vec<SessionEffect>, SessionError> {
    let result = reduce(state, SessionAction::Manual(edit));
    assert_phase_sync(state);
    result
}

fn lock_title(title: &str) -> Command {
    Command::LockTitle {
        title: title.to_string(),
    }
}

fn lock_logline(logline: &str) -> Command {
    Command::LockLogline {
        logline: logline.to_string(),
    }
}

fn add_beat(beat: &str) -> Command {
    Command::AddBeat {
        beat: beat.to_string(),
    }
}

fn character(name: &str) -> CharacterPatch {
    CharacterPatch {
        name: name.to_string(),
        ..CharacterPatch::default()
    }
}

fn scene(number: u8, title: &str) -> ScenePatch {
    ScenePatch {
        number,
        title: Some(title.to_string()),
        ..ScenePatch::default()
    }
}

fn foundation() -> Vec<Command> {
    vec![
        lock_title("Room for One"),
        lock_logline("Two roommates fall for the same guy."),
    ]
}

fn assert_phase_sync(state: &SessionState) {
    assert_eq!(state.phase(), derive_phase(state));
}
