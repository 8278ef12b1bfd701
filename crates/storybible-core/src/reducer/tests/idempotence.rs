use super::*;
use pretty_assertions::assert_eq;

#[test]
fn repeated_beat_is_stored_once() {
    let mut state = state();
    let first = run(&mut state, 1, add_beat("Emma finds the note"));
    let second = run(&mut state, 1, add_beat("  Emma finds the note "));

    assert_eq!(state.beats().to_vec(), vec!["Emma finds the note".to_string()]);
    assert_eq!(first, vec![SessionEffect::FieldChanged(Field::Beats)]);
    assert!(second.is_empty());
}

#[test]
fn beats_differing_in_text_are_both_kept() {
    let mut state = state();
    run(&mut state, 1, add_beat("They meet"));
    run(&mut state, 1, add_beat("They meet again"));
    assert_eq!(state.beats().len(), 2);
}

#[test]
fn replaying_a_turn_leaves_state_unchanged_except_notes() {
    let commands = vec![
        lock_title("Say I Don't"),
        Command::AddCharacter(character("Emma")),
        add_beat("The wedding is off"),
        Command::AddScene(scene(1, "Rehearsal dinner")),
        Command::SetTone {
            tone: "warm".to_string(),
        },
    ];

    let mut once = state();
    run_all(&mut once, commands.clone());
    let mut twice = once.clone();
    run_all(&mut twice, commands);

    assert_eq!(twice, once);
}

#[test]
fn relocking_with_same_value_reports_no_change() {
    let mut state = state();
    run(&mut state, 1, lock_title("Room for One"));
    assert!(run(&mut state, 2, lock_title("Room for One")).is_empty());
}
