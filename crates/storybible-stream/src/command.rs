use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::process::Command;
use std::process::Stdio;
use std::thread;

use serde_json::Value;
use tracing::debug;

use crate::contracts::ChatEvent;
use crate::contracts::OutputFormat;
use crate::contracts::ProviderSpec;
use crate::decode::AnsiFilter;
use crate::decode::Utf8ChunkDecoder;
use crate::source::ResponseSource;

/// Argument placeholder replaced by the prompt. Without one, the prompt is
/// appended as the last argument.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Spawns a local provider CLI and streams its stdout as the assistant turn.
#[derive(Debug, Clone)]
pub struct CommandSource {
    spec: ProviderSpec,
    prompt: String,
}

impl CommandSource {
    pub fn new(spec: ProviderSpec, prompt: impl Into<String>) -> Self {
        Self {
            spec,
            prompt: prompt.into(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.spec.program);
        let mut placed = false;
        for arg in &self.spec.args {
            if arg == PROMPT_PLACEHOLDER {
                cmd.arg(&self.prompt);
                placed = true;
            } else {
                cmd.arg(arg);
            }
        }
        if !placed {
            cmd.arg(&self.prompt);
        }
        cmd
    }
}

impl ResponseSource for CommandSource {
    fn stream<F>(self, mut callback: F)
    where
        F: FnMut(ChatEvent),
    {
        let label = self.spec.label().to_string();
        let mut cmd = self.command();
        let spawn = cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).spawn();
        let mut child = match spawn {
            Ok(child) => child,
            Err(err) => {
                callback(ChatEvent::Aborted(format!("failed to start {label}: {err}")));
                return;
            }
        };
        debug!(provider = %label, "provider started");

        let stderr_handle = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut stderr_text = String::new();
                let _ = stderr.read_to_string(&mut stderr_text);
                stderr_text
            })
        });

        let streamed = match (child.stdout.take(), self.spec.format) {
            (Some(stdout), OutputFormat::Text) => stream_text(stdout, &mut callback),
            (Some(stdout), OutputFormat::JsonLines) => stream_json_lines(stdout, &mut callback),
            (None, _) => Ok(false),
        };
        let emitted = match streamed {
            Ok(emitted) => emitted,
            Err(err) => {
                debug!(provider = %label, "provider stdout failed: {err}");
                let _ = child.kill();
                let _ = child.wait();
                callback(ChatEvent::Aborted(format!("{label} output broke off: {err}")));
                return;
            }
        };

        let status = child.wait().ok();
        let stderr_text = stderr_handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
            .trim()
            .to_string();

        if !status.is_some_and(|s| s.success()) {
            let msg = if stderr_text.is_empty() {
                format!("{label} exited with a non-zero status")
            } else {
                format!("{label} error: {stderr_text}")
            };
            callback(ChatEvent::Aborted(msg));
            return;
        }
        if !stderr_text.is_empty() {
            callback(ChatEvent::Meta(stderr_text));
        }
        if !emitted {
            callback(ChatEvent::Meta(format!("{label} returned an empty response")));
        }
        callback(ChatEvent::Done);
    }
}

/// Streams stdout as text. A read error means the response broke off,
/// not that it ended.
fn stream_text<R, F>(mut stdout: R, callback: &mut F) -> std::io::Result<bool>
where
    R: Read,
    F: FnMut(ChatEvent),
{
    let mut decoder = Utf8ChunkDecoder::new();
    let mut filter = AnsiFilter::new();
    let mut emitted = false;
    let mut buf = [0_u8; 2048];
    loop {
        let (text, done) = match stdout.read(&mut buf) {
            Ok(0) => (decoder.finish(), true),
            Ok(n) => (decoder.push(&buf[..n]), false),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        let chunk = filter.push(&text);
        if !chunk.is_empty() {
            emitted = true;
            callback(ChatEvent::Token(chunk));
        }
        if done {
            break;
        }
    }
    Ok(emitted)
}

fn stream_json_lines<R, F>(stdout: R, callback: &mut F) -> std::io::Result<bool>
where
    R: Read,
    F: FnMut(ChatEvent),
{
    let mut emitted = false;
    for line in BufReader::new(stdout).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            callback(ChatEvent::Meta(trimmed.to_string()));
            continue;
        };
        let mut deltas = Vec::new();
        push_delta_strings(&value, &mut deltas);
        for delta in deltas {
            emitted = true;
            callback(ChatEvent::Token(delta));
        }
    }
    Ok(emitted)
}

/// Collects text-bearing string fields (`*delta*`, `text`, `content`) in
/// document order.
fn push_delta_strings(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, val) in map {
                if let Some(s) = val.as_str() {
                    let key = k.to_ascii_lowercase();
                    if (key.contains("delta") || key == "text" || key == "content") && !s.is_empty()
                    {
                        out.push(s.to_string());
                    }
                }
                push_delta_strings(val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                push_delta_strings(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn collect(source: CommandSource) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        source.stream(|event| events.push(event));
        events
    }

    fn sh(script: &str, format: OutputFormat) -> ProviderSpec {
        ProviderSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            format,
        }
    }

    #[test]
    fn prompt_is_appended_unless_placeholder_is_given() {
        let appended = CommandSource::new(ProviderSpec::new("ollama"), "hello");
        let args: Vec<_> = appended.command().get_args().map(|a| a.to_owned()).collect();
        assert_eq!(args, vec!["hello"]);

        let mut spec = ProviderSpec::new("llm");
        spec.args = vec!["-p".to_string(), PROMPT_PLACEHOLDER.to_string(), "--raw".to_string()];
        let placed = CommandSource::new(spec, "hello");
        let args: Vec<_> = placed.command().get_args().map(|a| a.to_owned()).collect();
        assert_eq!(args, vec!["-p", "hello", "--raw"]);
    }

    #[test]
    fn json_deltas_are_collected_in_order() {
        let value: Value = serde_json::from_str(
            r#"{"type":"delta","delta":"Hel","choices":[{"content":"lo"}],"id":"x"}"#,
        )
        .expect("json");
        let mut out = Vec::new();
        push_delta_strings(&value, &mut out);
        assert_eq!(out.concat().len(), 5);
        assert!(out.contains(&"Hel".to_string()));
        assert!(out.contains(&"lo".to_string()));
    }

    /// Yields `data` in one read, then fails.
    struct BreaksOff {
        data: Option<Vec<u8>>,
    }

    impl BreaksOff {
        fn new(data: &str) -> Self {
            Self {
                data: Some(data.as_bytes().to_vec()),
            }
        }
    }

    impl Read for BreaksOff {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                None => Err(std::io::Error::other("pipe closed")),
            }
        }
    }

    #[test]
    fn text_read_failure_mid_token_is_an_error_not_an_end() {
        let mut events = Vec::new();
        let result = stream_text(
            BreaksOff::new("Locking it. [DIRECTIVE:lock_logline|Two"),
            &mut |event| events.push(event),
        );
        assert!(result.is_err());
        assert_eq!(
            events,
            vec![ChatEvent::Token("Locking it. [DIRECTIVE:lock_logline|Two".to_string())]
        );
    }

    #[test]
    fn json_lines_read_failure_is_an_error_not_an_end() {
        let mut events = Vec::new();
        let result = stream_json_lines(
            BreaksOff::new("{\"delta\":\"Hel\"}\n"),
            &mut |event| events.push(event),
        );
        assert!(result.is_err());
        assert_eq!(events, vec![ChatEvent::Token("Hel".to_string())]);
    }

    #[cfg(unix)]
    #[test]
    fn text_provider_output_is_streamed() {
        let source = CommandSource::new(
            sh("printf '%s' \"$1\"", OutputFormat::Text),
            "Hi [DIRECTIVE:set_tone|tone:dry]",
        );
        let events = collect(source);
        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::Token(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hi [DIRECTIVE:set_tone|tone:dry]");
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }

    #[cfg(unix)]
    #[test]
    fn json_lines_provider_yields_tokens_and_meta() {
        let script = r#"printf '%s\n' '{"delta":"Hel"}' 'warming up' '{"delta":"lo"}'"#;
        let events = collect(CommandSource::new(sh(script, OutputFormat::JsonLines), "x"));
        assert_eq!(
            events,
            vec![
                ChatEvent::Token("Hel".to_string()),
                ChatEvent::Meta("warming up".to_string()),
                ChatEvent::Token("lo".to_string()),
                ChatEvent::Done,
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_provider_aborts_with_stderr() {
        let events = collect(CommandSource::new(
            sh("echo boom >&2; exit 3", OutputFormat::Text),
            "x",
        ));
        assert_eq!(events, vec![ChatEvent::Aborted("sh error: boom".to_string())]);
    }

    #[test]
    fn missing_program_aborts() {
        let events = collect(CommandSource::new(
            ProviderSpec::new("/nonexistent/storybible-provider"),
            "x",
        ));
        assert!(matches!(events.as_slice(), [ChatEvent::Aborted(_)]));
    }
}
