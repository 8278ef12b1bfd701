use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::error::SessionError;

pub const SNAPSHOT_SCHEMA_V1: u16 = 1;
pub const MIN_SCENE: u8 = 1;
pub const MAX_SCENE: u8 = 30;
pub const DEFAULT_CHARACTER_ROLE: &str = "supporting";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Logline,
    Theme,
    Tone,
    Comps,
    Characters,
    Beats,
    Scenes,
    Notebook,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Logline => "logline",
            Self::Theme => "theme",
            Self::Tone => "tone",
            Self::Comps => "comps",
            Self::Characters => "characters",
            Self::Beats => "beats",
            Self::Scenes => "scenes",
            Self::Notebook => "notebook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Explore,
    BuildOut,
    Complete,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Explore => "explore",
            Self::BuildOut => "build_out",
            Self::Complete => "complete",
        }
    }
}

/// A scalar that can be finalized. `locked` never goes back to false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockableField {
    pub value: Option<String>,
    pub locked: bool,
}

impl LockableField {
    pub(crate) fn lock(&mut self, value: String) -> bool {
        let changed = !self.locked || self.value.as_deref() != Some(value.as_str());
        self.value = Some(value);
        self.locked = true;
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub flaw: Option<String>,
    #[serde(default)]
    pub arc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub number: u8,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub characters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookEntry {
    pub turn: u32,
    pub text: String,
}

/// The in-progress story bible of one conversation. Mutated only through
/// [`crate::reducer::reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub(crate) title: LockableField,
    pub(crate) logline: LockableField,
    pub(crate) theme: Option<String>,
    pub(crate) tone: Option<String>,
    pub(crate) comps: Option<String>,
    pub(crate) characters: Vec<Character>,
    pub(crate) beats: Vec<String>,
    pub(crate) scenes: BTreeMap<u8, Scene>,
    pub(crate) notebook: Vec<NotebookEntry>,
    pub(crate) phase: Phase,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let mut state = Self {
            title: LockableField::default(),
            logline: LockableField::default(),
            theme: None,
            tone: None,
            comps: None,
            characters: Vec::new(),
            beats: Vec::new(),
            scenes: BTreeMap::new(),
            notebook: Vec::new(),
            phase: Phase::Explore,
        };
        state.phase = derive_phase(&state);
        state
    }

    pub fn title(&self) -> &LockableField {
        &self.title
    }

    pub fn logline(&self) -> &LockableField {
        &self.logline
    }

    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }

    pub fn tone(&self) -> Option<&str> {
        self.tone.as_deref()
    }

    pub fn comps(&self) -> Option<&str> {
        self.comps.as_deref()
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn beats(&self) -> &[String] {
        &self.beats
    }

    pub fn scenes(&self) -> &BTreeMap<u8, Scene> {
        &self.scenes
    }

    pub fn notebook(&self) -> &[NotebookEntry] {
        &self.notebook
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn character(&self, name: &str) -> Option<&Character> {
        self.character_index(name).map(|idx| &self.characters[idx])
    }

    pub(crate) fn character_index(&self, name: &str) -> Option<usize> {
        let key = name_key(name);
        self.characters
            .iter()
            .position(|character| name_key(&character.name) == key)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            schema_version: SNAPSHOT_SCHEMA_V1,
            title: self.title.clone(),
            logline: self.logline.clone(),
            theme: self.theme.clone(),
            tone: self.tone.clone(),
            comps: self.comps.clone(),
            characters: self.characters.clone(),
            beats: self.beats.clone(),
            scenes: self.scenes.values().cloned().collect(),
            notebook: self.notebook.clone(),
            phase: self.phase,
        }
    }

    /// Rebuilds a state from a snapshot, checking the collection invariants
    /// and recomputing the phase rather than trusting the stored one.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Result<Self, SessionError> {
        if snapshot.schema_version != SNAPSHOT_SCHEMA_V1 {
            return Err(SessionError::InvalidSnapshot {
                reason: format!("unsupported schema version {}", snapshot.schema_version),
            });
        }

        let mut seen = Vec::with_capacity(snapshot.characters.len());
        for character in &snapshot.characters {
            let key = name_key(&character.name);
            if key.is_empty() {
                return Err(SessionError::InvalidSnapshot {
                    reason: "character with empty name".to_string(),
                });
            }
            if seen.contains(&key) {
                return Err(SessionError::InvalidSnapshot {
                    reason: format!("duplicate character `{}`", character.name),
                });
            }
            seen.push(key);
        }

        let mut scenes = BTreeMap::new();
        for scene in snapshot.scenes {
            if !(MIN_SCENE..=MAX_SCENE).contains(&scene.number) {
                return Err(SessionError::InvalidSnapshot {
                    reason: format!("scene number {} out of range", scene.number),
                });
            }
            if scenes.contains_key(&scene.number) {
                return Err(SessionError::InvalidSnapshot {
                    reason: format!("duplicate scene {}", scene.number),
                });
            }
            scenes.insert(scene.number, scene);
        }

        let mut state = Self {
            title: snapshot.title,
            logline: snapshot.logline,
            theme: snapshot.theme,
            tone: snapshot.tone,
            comps: snapshot.comps,
            characters: snapshot.characters,
            beats: snapshot.beats,
            scenes,
            notebook: snapshot.notebook,
            phase: Phase::Explore,
        };
        state.phase = derive_phase(&state);
        Ok(state)
    }

    pub fn sidebar(&self) -> Sidebar {
        Sidebar {
            phase: self.phase,
            title: self.title.clone(),
            logline: self.logline.clone(),
            has_theme: self.theme.is_some(),
            has_tone: self.tone.is_some(),
            has_comps: self.comps.is_some(),
            characters: self.characters.len(),
            beats: self.beats.len(),
            scenes: self.scenes.len(),
            notes: self.notebook.len(),
            checklist: [
                ChecklistItem::new("title_locked", self.title.locked),
                ChecklistItem::new("logline_locked", self.logline.locked),
                ChecklistItem::new("characters_defined", !self.characters.is_empty()),
                ChecklistItem::new("scenes_created", !self.scenes.is_empty()),
                ChecklistItem::new("beats_added", !self.beats.is_empty()),
            ],
        }
    }
}

/// Case-insensitive identity of a character name.
pub(crate) fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Pure phase derivation. Never consults the stored phase, so replayed or
/// reordered batches converge on the same answer.
pub fn derive_phase(state: &SessionState) -> Phase {
    if !(state.title.locked && state.logline.locked) {
        return Phase::Explore;
    }

    let built = !state.characters.is_empty() && !state.beats.is_empty() && !state.scenes.is_empty();
    if built {
        Phase::Complete
    } else {
        Phase::BuildOut
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub schema_version: u16,
    pub title: LockableField,
    pub logline: LockableField,
    pub theme: Option<String>,
    pub tone: Option<String>,
    pub comps: Option<String>,
    pub characters: Vec<Character>,
    pub beats: Vec<String>,
    pub scenes: Vec<Scene>,
    pub notebook: Vec<NotebookEntry>,
    pub phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub key: &'static str,
    pub done: bool,
}

impl ChecklistItem {
    fn new(key: &'static str, done: bool) -> Self {
        Self { key, done }
    }
}

/// Compact projection for a sidebar-style display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sidebar {
    pub phase: Phase,
    pub title: LockableField,
    pub logline: LockableField,
    pub has_theme: bool,
    pub has_tone: bool,
    pub has_comps: bool,
    pub characters: usize,
    pub beats: usize,
    pub scenes: usize,
    pub notes: usize,
    pub checklist: [ChecklistItem; 5],
}

impl Sidebar {
    /// Keys of everything that differs from `before`, in display order.
    pub fn changed_since(&self, before: &Sidebar) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.phase != before.phase {
            changed.push("phase");
        }
        if self.title != before.title {
            changed.push("title");
        }
        if self.logline != before.logline {
            changed.push("logline");
        }
        if self.has_theme != before.has_theme {
            changed.push("theme");
        }
        if self.has_tone != before.has_tone {
            changed.push("tone");
        }
        if self.has_comps != before.has_comps {
            changed.push("comps");
        }
        if self.characters != before.characters {
            changed.push("characters");
        }
        if self.beats != before.beats {
            changed.push("beats");
        }
        if self.scenes != before.scenes {
            changed.push("scenes");
        }
        if self.notes != before.notes {
            changed.push("notes");
        }
        for (now, was) in self.checklist.iter().zip(before.checklist.iter()) {
            if now.done != was.done {
                changed.push(now.key);
            }
        }
        changed
    }
}
