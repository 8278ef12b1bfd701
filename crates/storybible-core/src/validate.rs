use tracing::debug;

use super::directive::CharacterPatch;
use super::directive::Command;
use super::directive::Directive;
use super::directive::DirectiveAction;
use super::directive::RawDirective;
use super::directive::ScenePatch;
use super::error::DirectiveError;
use super::state::MAX_SCENE;
use super::state::MIN_SCENE;

const VALUE: &[&str] = &["value"];

/// Resolves the action keyword of a scanned token.
pub fn resolve(raw: RawDirective) -> Result<Directive, DirectiveError> {
    let Some(action) = DirectiveAction::parse(&raw.keyword) else {
        return Err(DirectiveError::UnknownAction {
            action: raw.keyword,
            span: raw.span,
            raw: raw.raw,
        });
    };
    Ok(Directive {
        action,
        params: raw.params,
        malformed: raw.malformed,
        span: raw.span,
        raw: raw.raw,
    })
}

/// Checks a directive against its action schema and produces the typed
/// command the executor applies.
pub fn validate(directive: &Directive) -> Result<Command, DirectiveError> {
    if let Some(segment) = directive.malformed.first() {
        return Err(DirectiveError::MalformedParameter {
            action: directive.action.label().to_string(),
            segment: segment.clone(),
            span: directive.span,
            raw: directive.raw.clone(),
        });
    }

    let schema = Schema { directive };
    let command = match directive.action {
        DirectiveAction::LockTitle => Command::LockTitle {
            title: schema.required("title", VALUE)?,
        },
        DirectiveAction::LockLogline => Command::LockLogline {
            logline: schema.required("logline", VALUE)?,
        },
        DirectiveAction::SetTheme => Command::SetTheme {
            theme: schema.required("theme", VALUE)?,
        },
        DirectiveAction::SetTone => Command::SetTone {
            tone: schema.required("tone", VALUE)?,
        },
        DirectiveAction::SetComps => Command::SetComps {
            comps: schema.required("comps", VALUE)?,
        },
        DirectiveAction::AddBeat => Command::AddBeat {
            beat: schema.required("beat", &["text", "value"])?,
        },
        DirectiveAction::AddNote => Command::AddNote {
            note: schema.required("note", &["idea", "text", "value"])?,
        },
        DirectiveAction::AddCharacter => Command::AddCharacter(schema.character()?),
        DirectiveAction::UpdateCharacter => Command::UpdateCharacter(schema.character()?),
        DirectiveAction::AddScene => Command::AddScene(schema.scene()?),
    };

    schema.log_ignored();
    Ok(command)
}

pub fn check(raw: RawDirective) -> Result<Command, DirectiveError> {
    validate(&resolve(raw)?)
}

struct Schema<'a> {
    directive: &'a Directive,
}

impl Schema<'_> {
    fn required(&self, name: &str, aliases: &[&str]) -> Result<String, DirectiveError> {
        match self.directive.params.lookup(name, aliases) {
            None => Err(DirectiveError::MissingParameter {
                action: self.action(),
                param: name.to_string(),
                span: self.directive.span,
                raw: self.directive.raw.clone(),
            }),
            Some((key, value)) if value.trim().is_empty() => Err(self.invalid(key, "empty value")),
            Some((_, value)) => Ok(value.trim().to_string()),
        }
    }

    /// Present and non-empty, else `None`. An empty optional is treated as
    /// not supplied so it never blanks a stored value.
    fn optional(&self, name: &str, aliases: &[&str]) -> Option<String> {
        self.directive
            .params
            .lookup(name, aliases)
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn character(&self) -> Result<CharacterPatch, DirectiveError> {
        Ok(CharacterPatch {
            name: self.required("name", &[])?,
            role: self.optional("role", &[]),
            description: self.optional("description", &["desc"]),
            flaw: self.optional("flaw", &[]),
            arc: self.optional("arc", &[]),
        })
    }

    fn scene(&self) -> Result<ScenePatch, DirectiveError> {
        let (key, value) = self
            .directive
            .params
            .lookup("number", &["scene", "num"])
            .ok_or_else(|| DirectiveError::MissingParameter {
                action: self.action(),
                param: "number".to_string(),
                span: self.directive.span,
                raw: self.directive.raw.clone(),
            })?;

        let number = value
            .trim()
            .parse::<i64>()
            .map_err(|_| self.invalid(key, format!("`{}` is not an integer", value.trim())))?;
        if !(i64::from(MIN_SCENE)..=i64::from(MAX_SCENE)).contains(&number) {
            return Err(self.invalid(
                key,
                format!("{number} is outside {MIN_SCENE}..={MAX_SCENE}"),
            ));
        }

        let characters = self.optional("characters", &[]).map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        Ok(ScenePatch {
            number: number as u8,
            title: self.optional("title", &[]),
            description: self.optional("description", &["desc"]),
            characters,
        })
    }

    fn invalid(&self, param: &str, reason: impl Into<String>) -> DirectiveError {
        DirectiveError::InvalidParameter {
            action: self.action(),
            param: param.to_string(),
            reason: reason.into(),
            span: self.directive.span,
            raw: self.directive.raw.clone(),
        }
    }

    fn action(&self) -> String {
        self.directive.action.label().to_string()
    }

    fn log_ignored(&self) {
        let known: &[&str] = match self.directive.action {
            DirectiveAction::LockTitle => &["title", "value"],
            DirectiveAction::LockLogline => &["logline", "value"],
            DirectiveAction::SetTheme => &["theme", "value"],
            DirectiveAction::SetTone => &["tone", "value"],
            DirectiveAction::SetComps => &["comps", "value"],
            DirectiveAction::AddBeat => &["beat", "text", "value"],
            DirectiveAction::AddNote => &["note", "idea", "text", "value"],
            DirectiveAction::AddCharacter | DirectiveAction::UpdateCharacter => {
                &["name", "role", "description", "desc", "flaw", "arc"]
            }
            DirectiveAction::AddScene => &[
                "number",
                "scene",
                "num",
                "title",
                "description",
                "desc",
                "characters",
            ],
        };
        for (key, _) in self.directive.params.iter() {
            if !known.contains(&key) {
                debug!(
                    action = self.directive.action.label(),
                    param = key,
                    "ignoring unrecognized directive parameter"
                );
            }
        }
    }
}
