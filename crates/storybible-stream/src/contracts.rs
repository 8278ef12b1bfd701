use serde::Deserialize;
use serde::Serialize;

/// What a response source reports while it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Raw assistant text, directives and all.
    Token(String),
    /// Provider chatter that is not part of the response.
    Meta(String),
    /// The stream broke off; whatever arrived so far is all there is.
    Aborted(String),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// stdout is the response text.
    #[default]
    Text,
    /// stdout is JSON lines carrying text deltas.
    JsonLines,
}

/// A local provider CLI that answers one prompt on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

impl ProviderSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            format: OutputFormat::Text,
        }
    }

    pub fn label(&self) -> &str {
        std::path::Path::new(&self.program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.program)
    }
}
