/// Turns arbitrary byte reads into text without splitting a multi-byte
/// character across chunks. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes a dangling partial sequence at end of input.
    pub fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum AnsiState {
    #[default]
    Plain,
    Escape,
    Csi,
}

/// Drops terminal escape sequences and carriage returns from provider
/// output, including sequences split across chunks.
#[derive(Debug, Default)]
pub struct AnsiFilter {
    state: AnsiState,
}

impl AnsiFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        for c in input.chars() {
            match self.state {
                AnsiState::Plain => self.plain(c, &mut out),
                AnsiState::Escape => {
                    if c == '[' {
                        self.state = AnsiState::Csi;
                    } else {
                        self.state = AnsiState::Plain;
                        self.plain(c, &mut out);
                    }
                }
                AnsiState::Csi => {
                    if ('@'..='~').contains(&c) {
                        self.state = AnsiState::Plain;
                    }
                }
            }
        }
        out
    }

    fn plain(&mut self, c: char, out: &mut String) {
        match c {
            '\u{1b}' => self.state = AnsiState::Escape,
            '\r' => {}
            _ => out.push(c),
        }
    }
}
