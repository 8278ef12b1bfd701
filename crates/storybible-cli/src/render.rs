use std::fmt::Write;

use storybible_core::LockableField;
use storybible_core::SessionState;
use storybible_core::Sidebar;
use storybible_core::TurnReport;

fn lockable(field: &LockableField) -> String {
    match (&field.value, field.locked) {
        (Some(value), true) => format!("{value} (locked)"),
        (Some(value), false) => value.clone(),
        (None, _) => "-".to_string(),
    }
}

fn mark(done: bool) -> &'static str {
    if done {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn sidebar(sidebar: &Sidebar) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "phase:      {}", sidebar.phase.label());
    let _ = writeln!(out, "title:      {}", lockable(&sidebar.title));
    let _ = writeln!(out, "logline:    {}", lockable(&sidebar.logline));
    let _ = writeln!(
        out,
        "theme {} tone {} comps {}",
        mark(sidebar.has_theme),
        mark(sidebar.has_tone),
        mark(sidebar.has_comps)
    );
    let _ = writeln!(
        out,
        "characters: {}  beats: {}  scenes: {}  notes: {}",
        sidebar.characters, sidebar.beats, sidebar.scenes, sidebar.notes
    );
    for item in &sidebar.checklist {
        let _ = writeln!(out, "  {} {}", mark(item.done), item.key);
    }
    out
}

/// Operator-facing footer for a turn: issues, then what moved.
pub fn turn_summary(report: &TurnReport, changed: &[&str]) -> String {
    let mut out = String::new();
    for issue in &report.issues {
        let _ = writeln!(out, "turn {} {}: {}", report.turn, issue.label(), issue.describe());
    }
    if report.aborted {
        let _ = writeln!(out, "turn {} aborted", report.turn);
    }
    if report.phase_before != report.phase_after {
        let _ = writeln!(
            out,
            "phase: {} -> {}",
            report.phase_before.label(),
            report.phase_after.label()
        );
    }
    if !changed.is_empty() {
        let _ = writeln!(out, "updated: {}", changed.join(", "));
    }
    out
}

/// The story bible as prompt context. `None` while nothing is recorded.
pub fn story_context(state: &SessionState) -> Option<String> {
    let mut out = String::new();
    if let Some(title) = &state.title().value {
        let _ = writeln!(out, "Title: {}", lockable_prompt(title, state.title().locked));
    }
    if let Some(logline) = &state.logline().value {
        let _ = writeln!(out, "Logline: {}", lockable_prompt(logline, state.logline().locked));
    }
    for (label, value) in [
        ("Theme", state.theme()),
        ("Tone", state.tone()),
        ("Comps", state.comps()),
    ] {
        if let Some(value) = value {
            let _ = writeln!(out, "{label}: {value}");
        }
    }
    if !state.characters().is_empty() {
        out.push_str("Characters:\n");
        for character in state.characters() {
            let _ = write!(out, "- {} ({})", character.name, character.role);
            if let Some(description) = &character.description {
                let _ = write!(out, ": {description}");
            }
            out.push('\n');
        }
    }
    if !state.beats().is_empty() {
        out.push_str("Beats:\n");
        for (i, beat) in state.beats().iter().enumerate() {
            let _ = writeln!(out, "{}. {beat}", i + 1);
        }
    }
    if !state.scenes().is_empty() {
        out.push_str("Scenes:\n");
        for scene in state.scenes().values() {
            let _ = write!(out, "{}.", scene.number);
            if let Some(title) = &scene.title {
                let _ = write!(out, " {title}");
            }
            if !scene.characters.is_empty() {
                let _ = write!(out, " [{}]", scene.characters.join(", "));
            }
            out.push('\n');
        }
    }
    if !state.notebook().is_empty() {
        out.push_str("Notes:\n");
        for note in state.notebook() {
            let _ = writeln!(out, "- {}", note.text);
        }
    }
    let trimmed = out.trim_end();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn lockable_prompt(value: &str, locked: bool) -> String {
    if locked {
        format!("{value} (locked)")
    } else {
        value.to_string()
    }
}
