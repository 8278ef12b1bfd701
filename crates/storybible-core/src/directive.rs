use serde::Deserialize;
use serde::Serialize;

use super::state::Field;

/// Opening delimiter of a directive token. Matched ASCII case-insensitively.
pub const DIRECTIVE_OPEN: &str = "[DIRECTIVE:";
pub const DIRECTIVE_CLOSE: u8 = b']';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveAction {
    LockTitle,
    LockLogline,
    AddCharacter,
    UpdateCharacter,
    SetTheme,
    SetTone,
    SetComps,
    AddBeat,
    AddScene,
    AddNote,
}

impl DirectiveAction {
    pub const ALL: [DirectiveAction; 10] = [
        DirectiveAction::LockTitle,
        DirectiveAction::LockLogline,
        DirectiveAction::AddCharacter,
        DirectiveAction::UpdateCharacter,
        DirectiveAction::SetTheme,
        DirectiveAction::SetTone,
        DirectiveAction::SetComps,
        DirectiveAction::AddBeat,
        DirectiveAction::AddScene,
        DirectiveAction::AddNote,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::LockTitle => "lock_title",
            Self::LockLogline => "lock_logline",
            Self::AddCharacter => "add_character",
            Self::UpdateCharacter => "update_character",
            Self::SetTheme => "set_theme",
            Self::SetTone => "set_tone",
            Self::SetComps => "set_comps",
            Self::AddBeat => "add_beat",
            Self::AddScene => "add_scene",
            Self::AddNote => "add_note",
        }
    }

    /// Resolves an action keyword, including the legacy names
    /// `add_to_notebook` and `add_outline_beat`.
    pub fn parse(keyword: &str) -> Option<Self> {
        let keyword = keyword.trim().to_ascii_lowercase();
        match keyword.as_str() {
            "add_to_notebook" => return Some(Self::AddNote),
            "add_outline_beat" => return Some(Self::AddBeat),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|action| action.label() == keyword)
    }

    pub fn field(self) -> Field {
        match self {
            Self::LockTitle => Field::Title,
            Self::LockLogline => Field::Logline,
            Self::AddCharacter | Self::UpdateCharacter => Field::Characters,
            Self::SetTheme => Field::Theme,
            Self::SetTone => Field::Tone,
            Self::SetComps => Field::Comps,
            Self::AddBeat => Field::Beats,
            Self::AddScene => Field::Scenes,
            Self::AddNote => Field::Notebook,
        }
    }
}

/// Byte range `[start, end)` within the raw text of one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shift(self, by: usize) -> Self {
        Self::new(self.start + by, self.end + by)
    }
}

/// Ordered parameter list. A repeated key replaces the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    /// First present key among `name` and its aliases, with its value.
    pub fn lookup<'a>(&'a self, name: &'a str, aliases: &[&'a str]) -> Option<(&'a str, &'a str)> {
        std::iter::once(name)
            .chain(aliases.iter().copied())
            .find_map(|key| self.get(key).map(|value| (key, value)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A directive token as it appeared in the stream, before the action keyword
/// is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirective {
    pub keyword: String,
    pub params: Params,
    /// Segments that carried no `key:value` separator.
    pub malformed: Vec<String>,
    pub span: Span,
    pub raw: String,
}

impl RawDirective {
    /// Parses a complete token (`[DIRECTIVE:` through `]`).
    pub fn parse(raw: &str, span: Span) -> Self {
        let body = raw
            .get(DIRECTIVE_OPEN.len()..raw.len().saturating_sub(1))
            .unwrap_or_default();
        let mut segments = body.split('|');
        let keyword = segments.next().unwrap_or_default().trim().to_string();

        let mut params = Params::default();
        let mut malformed = Vec::new();
        for segment in segments.map(str::trim).filter(|s| !s.is_empty()) {
            match segment.split_once(':') {
                Some((key, value)) => {
                    params.insert(key.trim().to_ascii_lowercase(), unquote(value.trim()));
                }
                None => malformed.push(segment.to_string()),
            }
        }

        Self {
            keyword,
            params,
            malformed,
            span,
            raw: raw.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub action: DirectiveAction,
    pub params: Params,
    pub malformed: Vec<String>,
    pub span: Span,
    pub raw: String,
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].trim();
        }
    }
    value
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterPatch {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flaw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePatch {
    pub number: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<String>>,
}

/// A validated directive, ready for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    LockTitle { title: String },
    LockLogline { logline: String },
    AddCharacter(CharacterPatch),
    UpdateCharacter(CharacterPatch),
    SetTheme { theme: String },
    SetTone { tone: String },
    SetComps { comps: String },
    AddBeat { beat: String },
    AddScene(ScenePatch),
    AddNote { note: String },
}

impl Command {
    pub fn action(&self) -> DirectiveAction {
        match self {
            Self::LockTitle { .. } => DirectiveAction::LockTitle,
            Self::LockLogline { .. } => DirectiveAction::LockLogline,
            Self::AddCharacter(_) => DirectiveAction::AddCharacter,
            Self::UpdateCharacter(_) => DirectiveAction::UpdateCharacter,
            Self::SetTheme { .. } => DirectiveAction::SetTheme,
            Self::SetTone { .. } => DirectiveAction::SetTone,
            Self::SetComps { .. } => DirectiveAction::SetComps,
            Self::AddBeat { .. } => DirectiveAction::AddBeat,
            Self::AddScene(_) => DirectiveAction::AddScene,
            Self::AddNote { .. } => DirectiveAction::AddNote,
        }
    }

    pub fn field(&self) -> Field {
        self.action().field()
    }
}
