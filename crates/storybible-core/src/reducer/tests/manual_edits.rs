use super::*;
use pretty_assertions::assert_eq;

#[test]
fn manual_title_locks_and_can_complete_foundation() {
    let mut state = state();
    run(&mut state, 1, lock_logline("Two roommates, one guy."));
    let effects = edit(
        &mut state,
        ManualEdit::SetTitle {
            value: "  Room for One ".to_string(),
        },
    )
    .expect("edit applies");

    assert_eq!(state.title().value.as_deref(), Some("Room for One"));
    assert!(state.title().locked);
    assert_eq!(
        effects,
        vec![
            SessionEffect::FieldChanged(Field::Title),
            SessionEffect::PhaseChanged {
                from: Phase::Explore,
                to: Phase::BuildOut,
            },
        ]
    );
}

#[test]
fn empty_manual_value_is_rejected_without_mutation() {
    let mut state = state();
    run(&mut state, 1, lock_title("Room for One"));
    let before = state.clone();

    let err = edit(
        &mut state,
        ManualEdit::SetTitle {
            value: "   ".to_string(),
        },
    )
    .expect_err("empty");
    assert_eq!(
        err,
        SessionError::EmptyValue {
            field: "title".to_string()
        }
    );
    assert_eq!(state, before);
}

#[test]
fn rename_character_updates_scene_references() {
    let mut state = state();
    run(&mut state, 1, Command::AddCharacter(character("Emma")));
    run(
        &mut state,
        1,
        Command::AddScene(ScenePatch {
            characters: Some(vec!["Emma".to_string()]),
            ..scene(1, "Move-in day")
        }),
    );

    let effects = edit(
        &mut state,
        ManualEdit::RenameCharacter {
            from: "EMMA".to_string(),
            to: "Emily".to_string(),
        },
    )
    .expect("rename");

    assert_eq!(
        effects,
        vec![
            SessionEffect::FieldChanged(Field::Characters),
            SessionEffect::FieldChanged(Field::Scenes),
        ]
    );
    assert!(state.character("emma").is_none());
    assert_eq!(state.characters()[0].name, "Emily");
    assert_eq!(state.scenes()[&1].characters, vec!["Emily".to_string()]);
}

#[test]
fn rename_onto_existing_character_is_rejected() {
    let mut state = state();
    run(&mut state, 1, Command::AddCharacter(character("Emma")));
    run(&mut state, 1, Command::AddCharacter(character("Lars")));
    let before = state.clone();

    let err = edit(
        &mut state,
        ManualEdit::RenameCharacter {
            from: "Emma".to_string(),
            to: "lars".to_string(),
        },
    )
    .expect_err("duplicate");
    assert_eq!(
        err,
        SessionError::DuplicateCharacter {
            name: "lars".to_string()
        }
    );
    assert_eq!(state, before);
}

#[test]
fn rename_may_change_only_the_casing() {
    let mut state = state();
    run(&mut state, 1, Command::AddCharacter(character("emma")));
    edit(
        &mut state,
        ManualEdit::RenameCharacter {
            from: "emma".to_string(),
            to: "Emma".to_string(),
        },
    )
    .expect("recase");
    assert_eq!(state.characters()[0].name, "Emma");
}

#[test]
fn character_description_requires_existing_character() {
    let mut state = state();
    let err = edit(
        &mut state,
        ManualEdit::SetCharacterDescription {
            name: "Ghost".to_string(),
            description: "not here".to_string(),
        },
    )
    .expect_err("missing");
    assert_eq!(
        err,
        SessionError::CharacterNotFound {
            name: "Ghost".to_string()
        }
    );

    run(&mut state, 1, Command::AddCharacter(character("Emma")));
    edit(
        &mut state,
        ManualEdit::SetCharacterDescription {
            name: "emma".to_string(),
            description: "Architect, 29".to_string(),
        },
    )
    .expect("set");
    assert_eq!(
        state.characters()[0].description.as_deref(),
        Some("Architect, 29")
    );
}

#[test]
fn scene_title_edit_checks_range_then_existence() {
    let mut state = state();
    let out_of_range = edit(
        &mut state,
        ManualEdit::SetSceneTitle {
            number: 31,
            title: "Epilogue".to_string(),
        },
    );
    assert_eq!(out_of_range, Err(SessionError::SceneOutOfRange { number: 31 }));

    let missing = edit(
        &mut state,
        ManualEdit::SetSceneTitle {
            number: 4,
            title: "Rooftop".to_string(),
        },
    );
    assert_eq!(missing, Err(SessionError::SceneNotFound { number: 4 }));

    run(&mut state, 1, Command::AddScene(scene(4, "Roof")));
    edit(
        &mut state,
        ManualEdit::SetSceneTitle {
            number: 4,
            title: "Rooftop".to_string(),
        },
    )
    .expect("retitle");
    assert_eq!(state.scenes()[&4].title.as_deref(), Some("Rooftop"));
}
