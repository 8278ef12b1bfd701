use std::io::Read;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::contracts::ChatEvent;
use crate::decode::Utf8ChunkDecoder;

/// Something that produces one assistant turn as a sequence of events.
/// Implementations always finish with `Done` or `Aborted`.
pub trait ResponseSource {
    fn stream<F>(self, callback: F)
    where
        F: FnMut(ChatEvent);
}

/// Runs `source` on its own thread and hands back the event channel, so the
/// consumer can wait with a timeout and keep polling its buffers.
pub fn spawn_source<S>(source: S) -> mpsc::Receiver<ChatEvent>
where
    S: ResponseSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        source.stream(|event| {
            let _ = tx.send(event);
        });
    });
    rx
}

/// Fixed text replayed in chunks, for recorded turns and tests.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    text: String,
    chunk_chars: usize,
    delay: Duration,
}

impl ScriptedSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chunk_chars: 24,
            delay: Duration::ZERO,
        }
    }

    pub fn chunk_chars(mut self, chunk_chars: usize) -> Self {
        self.chunk_chars = chunk_chars.max(1);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ResponseSource for ScriptedSource {
    fn stream<F>(self, mut callback: F)
    where
        F: FnMut(ChatEvent),
    {
        emit_chunked_text(&self.text, self.chunk_chars, self.delay, &mut callback);
        callback(ChatEvent::Done);
    }
}

pub(crate) fn emit_chunked_text<F>(text: &str, chunk_chars: usize, delay: Duration, callback: &mut F)
where
    F: FnMut(ChatEvent),
{
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let end = (i + chunk_chars).min(chars.len());
        let piece: String = chars[i..end].iter().collect();
        callback(ChatEvent::Token(piece));
        i = end;
        if i < chars.len() && !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Streams whatever a reader yields (a file, stdin, a pipe) as tokens.
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    buf_size: usize,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf_size: 2048,
        }
    }

    pub fn buf_size(mut self, buf_size: usize) -> Self {
        self.buf_size = buf_size.max(1);
        self
    }
}

impl<R: Read> ResponseSource for ReaderSource<R> {
    fn stream<F>(mut self, mut callback: F)
    where
        F: FnMut(ChatEvent),
    {
        let mut decoder = Utf8ChunkDecoder::new();
        let mut buf = vec![0_u8; self.buf_size];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = decoder.push(&buf[..n]);
                    if !chunk.is_empty() {
                        callback(ChatEvent::Token(chunk));
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!("reader source failed: {err}");
                    callback(ChatEvent::Aborted(format!("read failed: {err}")));
                    return;
                }
            }
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            callback(ChatEvent::Token(tail));
        }
        callback(ChatEvent::Done);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    fn collect<S: ResponseSource>(source: S) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        source.stream(|event| events.push(event));
        events
    }

    fn text_of(events: &[ChatEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                ChatEvent::Token(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn scripted_source_chunks_by_chars() {
        let events = collect(ScriptedSource::new("Café [DIRECTIVE:x]").chunk_chars(4));
        assert_eq!(
            events,
            vec![
                ChatEvent::Token("Café".to_string()),
                ChatEvent::Token(" [DI".to_string()),
                ChatEvent::Token("RECT".to_string()),
                ChatEvent::Token("IVE:".to_string()),
                ChatEvent::Token("x]".to_string()),
                ChatEvent::Done,
            ]
        );
    }

    #[test]
    fn reader_source_reassembles_multibyte_text() {
        let text = "Naïve plan ☕ [DIRECTIVE:add_note|note:rooftop]";
        let events = collect(ReaderSource::new(text.as_bytes()).buf_size(3));
        assert_eq!(text_of(&events), text);
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }

    #[test]
    fn reader_source_reads_files() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"Great idea.").expect("write");
        let reader = std::fs::File::open(file.path()).expect("open");
        let events = collect(ReaderSource::new(reader));
        assert_eq!(text_of(&events), "Great idea.");
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("connection reset"))
        }
    }

    #[test]
    fn read_error_aborts_the_turn() {
        let events = collect(ReaderSource::new(Broken));
        assert!(matches!(events.as_slice(), [ChatEvent::Aborted(_)]));
    }

    #[test]
    fn spawned_source_delivers_in_order() {
        let rx = spawn_source(ScriptedSource::new("abcdef").chunk_chars(2));
        let events: Vec<ChatEvent> = rx.iter().collect();
        assert_eq!(text_of(&events), "abcdef");
        assert_eq!(events.last(), Some(&ChatEvent::Done));
    }
}
