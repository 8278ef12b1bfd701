use tracing::debug;
use tracing::info;

use super::actions::ManualEdit;
use super::actions::SessionAction;
use super::directive::CharacterPatch;
use super::directive::Command;
use super::directive::ScenePatch;
use super::error::SessionError;
use super::state::derive_phase;
use super::state::name_key;
use super::state::Character;
use super::state::Field;
use super::state::NotebookEntry;
use super::state::Phase;
use super::state::Scene;
use super::state::SessionState;
use super::state::DEFAULT_CHARACTER_ROLE;
use super::state::MAX_SCENE;
use super::state::MIN_SCENE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    FieldChanged(Field),
    PhaseChanged { from: Phase, to: Phase },
    /// A scene was stored naming someone who is not (yet) a character.
    UnknownCharacterReference { scene: u8, name: String },
}

/// Applies one action and recomputes the phase. Directives always apply;
/// manual edits are checked first and leave `state` untouched on error.
pub fn reduce(
    state: &mut SessionState,
    action: SessionAction,
) -> Result<Vec<SessionEffect>, SessionError> {
    let before = state.phase;
    let mut effects = match action {
        SessionAction::Directive { turn, command } => apply_command(state, turn, command),
        SessionAction::Manual(edit) => apply_manual(state, edit)?,
    };
    recompute_phase(state, before, &mut effects);
    Ok(effects)
}

fn apply_command(state: &mut SessionState, turn: u32, command: Command) -> Vec<SessionEffect> {
    let mut effects = Vec::new();
    let field = command.field();
    let changed = match command {
        Command::LockTitle { title } => state.title.lock(title),
        Command::LockLogline { logline } => state.logline.lock(logline),
        Command::SetTheme { theme } => overwrite(&mut state.theme, theme),
        Command::SetTone { tone } => overwrite(&mut state.tone, tone),
        Command::SetComps { comps } => overwrite(&mut state.comps, comps),
        Command::AddCharacter(patch) | Command::UpdateCharacter(patch) => {
            upsert_character(state, patch)
        }
        Command::AddBeat { beat } => {
            let beat = beat.trim();
            if state.beats.iter().any(|existing| existing == beat) {
                debug!(turn, beat, "beat already present");
                false
            } else {
                state.beats.push(beat.to_string());
                true
            }
        }
        Command::AddScene(patch) => upsert_scene(state, patch, &mut effects),
        Command::AddNote { note } => {
            state.notebook.push(NotebookEntry { turn, text: note });
            true
        }
    };
    if changed {
        effects.insert(0, SessionEffect::FieldChanged(field));
    }
    effects
}

fn overwrite(slot: &mut Option<String>, value: String) -> bool {
    if slot.as_deref() == Some(value.as_str()) {
        return false;
    }
    *slot = Some(value);
    true
}

fn merge(slot: &mut Option<String>, value: Option<String>) -> bool {
    match value {
        Some(value) => overwrite(slot, value),
        None => false,
    }
}

fn upsert_character(state: &mut SessionState, patch: CharacterPatch) -> bool {
    let CharacterPatch {
        name,
        role,
        description,
        flaw,
        arc,
    } = patch;

    let Some(idx) = state.character_index(&name) else {
        state.characters.push(Character {
            name: name.trim().to_string(),
            role: role.unwrap_or_else(|| DEFAULT_CHARACTER_ROLE.to_string()),
            description,
            flaw,
            arc,
        });
        return true;
    };

    let existing = &mut state.characters[idx];
    let mut changed = false;
    if let Some(role) = role {
        if existing.role != role {
            existing.role = role;
            changed = true;
        }
    }
    changed |= merge(&mut existing.description, description);
    changed |= merge(&mut existing.flaw, flaw);
    changed |= merge(&mut existing.arc, arc);
    changed
}

fn upsert_scene(
    state: &mut SessionState,
    patch: ScenePatch,
    effects: &mut Vec<SessionEffect>,
) -> bool {
    let ScenePatch {
        number,
        title,
        description,
        characters,
    } = patch;

    let characters = characters.map(|names| {
        names
            .into_iter()
            .map(|name| match state.character(&name) {
                Some(character) => character.name.clone(),
                None => {
                    effects.push(SessionEffect::UnknownCharacterReference {
                        scene: number,
                        name: name.clone(),
                    });
                    name
                }
            })
            .collect::<Vec<_>>()
    });

    let mut inserted = false;
    let scene = state.scenes.entry(number).or_insert_with(|| {
        inserted = true;
        Scene {
            number,
            ..Scene::default()
        }
    });
    let mut changed = inserted;
    changed |= merge(&mut scene.title, title);
    changed |= merge(&mut scene.description, description);
    if let Some(characters) = characters {
        if scene.characters != characters {
            scene.characters = characters;
            changed = true;
        }
    }
    changed
}

fn apply_manual(
    state: &mut SessionState,
    edit: ManualEdit,
) -> Result<Vec<SessionEffect>, SessionError> {
    match edit {
        ManualEdit::SetTitle { value } => {
            let value = non_empty("title", value)?;
            Ok(changed_if(state.title.lock(value), Field::Title))
        }
        ManualEdit::SetLogline { value } => {
            let value = non_empty("logline", value)?;
            Ok(changed_if(state.logline.lock(value), Field::Logline))
        }
        ManualEdit::RenameCharacter { from, to } => rename_character(state, &from, to),
        ManualEdit::SetCharacterDescription { name, description } => {
            let description = non_empty("description", description)?;
            let idx = state
                .character_index(&name)
                .ok_or(SessionError::CharacterNotFound { name })?;
            let changed = overwrite(&mut state.characters[idx].description, description);
            Ok(changed_if(changed, Field::Characters))
        }
        ManualEdit::SetSceneTitle { number, title } => {
            if !(i64::from(MIN_SCENE)..=i64::from(MAX_SCENE)).contains(&number) {
                return Err(SessionError::SceneOutOfRange { number });
            }
            let number = number as u8;
            let title = non_empty("title", title)?;
            let scene = state
                .scenes
                .get_mut(&number)
                .ok_or(SessionError::SceneNotFound { number })?;
            Ok(changed_if(overwrite(&mut scene.title, title), Field::Scenes))
        }
    }
}

fn rename_character(
    state: &mut SessionState,
    from: &str,
    to: String,
) -> Result<Vec<SessionEffect>, SessionError> {
    let to = non_empty("name", to)?;
    let idx = state
        .character_index(from)
        .ok_or_else(|| SessionError::CharacterNotFound {
            name: from.to_string(),
        })?;
    if let Some(other) = state.character_index(&to) {
        if other != idx {
            return Err(SessionError::DuplicateCharacter { name: to });
        }
    }

    let old = std::mem::replace(&mut state.characters[idx].name, to.clone());
    if old == to {
        return Ok(Vec::new());
    }

    let mut effects = vec![SessionEffect::FieldChanged(Field::Characters)];
    let old_key = name_key(&old);
    let mut scenes_changed = false;
    for scene in state.scenes.values_mut() {
        for reference in scene.characters.iter_mut() {
            if name_key(reference) == old_key {
                *reference = to.clone();
                scenes_changed = true;
            }
        }
    }
    if scenes_changed {
        effects.push(SessionEffect::FieldChanged(Field::Scenes));
    }
    Ok(effects)
}

fn non_empty(field: &str, value: String) -> Result<String, SessionError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyValue {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn changed_if(changed: bool, field: Field) -> Vec<SessionEffect> {
    if changed {
        vec![SessionEffect::FieldChanged(field)]
    } else {
        Vec::new()
    }
}

fn recompute_phase(state: &mut SessionState, before: Phase, effects: &mut Vec<SessionEffect>) {
    let phase = derive_phase(state);
    state.phase = phase;
    if phase != before {
        info!(from = before.label(), to = phase.label(), "story phase changed");
        effects.push(SessionEffect::PhaseChanged {
            from: before,
            to: phase,
        });
    }
}

#[cfg(test)]
mod tests;
