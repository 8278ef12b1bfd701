use serde::Deserialize;
use serde::Serialize;

use super::directive::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// A validated directive emitted by the assistant during `turn`.
    Directive { turn: u32, command: Command },
    /// A direct edit by the writer, outside conversation.
    Manual(ManualEdit),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum ManualEdit {
    SetTitle { value: String },
    SetLogline { value: String },
    RenameCharacter { from: String, to: String },
    SetCharacterDescription { name: String, description: String },
    SetSceneTitle { number: i64, title: String },
}
