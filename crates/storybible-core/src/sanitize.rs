use super::scanner::scan;
use super::scanner::Segment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collapse {
    None,
    /// Drop spaces and tabs; stop at the first newline.
    Horizontal,
    /// Drop all whitespace, newlines included.
    All,
}

/// Builds the user-visible text from flushed pieces. Removing a directive
/// collapses only the whitespace that directly follows it, and only when
/// the text before it already ends in whitespace (or nothing has been
/// emitted yet). Output handed out is never revised.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    last: Option<char>,
    collapse: Collapse,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer {
    pub fn new() -> Self {
        Self {
            last: None,
            collapse: Collapse::None,
        }
    }

    /// Appends `text` to `out`, minus any whitespace still owed to a
    /// removed directive.
    pub fn text(&mut self, text: &str, out: &mut String) {
        let kept = match self.collapse {
            Collapse::None => text,
            Collapse::Horizontal => text.trim_start_matches([' ', '\t']),
            Collapse::All => text.trim_start(),
        };
        if kept.is_empty() {
            return;
        }
        self.collapse = Collapse::None;
        out.push_str(kept);
        self.last = kept.chars().next_back();
    }

    /// Records that a directive was cut out at the current position.
    pub fn directive(&mut self) {
        self.collapse = match self.last {
            None => Collapse::All,
            Some('\n') | Some('\r') => Collapse::All,
            Some(c) if c.is_whitespace() => Collapse::Horizontal,
            Some(_) => self.collapse,
        };
    }
}

/// One-shot sanitization of a complete text.
pub fn sanitize(text: &str, max_token_bytes: usize) -> String {
    let mut sanitizer = Sanitizer::new();
    let mut out = String::with_capacity(text.len());
    for segment in scan(text, true, max_token_bytes).segments {
        match segment {
            Segment::Text(span) => sanitizer.text(&text[span.start..span.end], &mut out),
            Segment::Token(_) => sanitizer.directive(),
            Segment::Rejected { .. } => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MAX: usize = 512;

    #[test]
    fn removes_token_and_collapses_to_single_space() {
        assert_eq!(
            sanitize(
                "Great idea. [DIRECTIVE:lock_title|title:Room for One] Let's nail the logline.",
                MAX
            ),
            "Great idea. Let's nail the logline."
        );
    }

    #[test]
    fn text_without_tokens_is_untouched() {
        let text = "  Spaces  stay   put.\n\n\tTabs too. [not a directive]  ";
        assert_eq!(sanitize(text, MAX), text);
    }

    #[test]
    fn token_glued_to_punctuation_keeps_following_space() {
        assert_eq!(
            sanitize("Locked.[DIRECTIVE:lock_title|title:X] Next up.", MAX),
            "Locked. Next up."
        );
    }

    #[test]
    fn token_on_its_own_line_takes_its_line_break_with_it() {
        assert_eq!(
            sanitize(
                "Love it.\n[DIRECTIVE:set_theme|theme:trust]\nNow the tone.",
                MAX
            ),
            "Love it.\nNow the tone."
        );
    }

    #[test]
    fn leading_token_leaves_no_leading_whitespace() {
        assert_eq!(
            sanitize("[DIRECTIVE:add_beat|beat:meet]\n\nHere we go.", MAX),
            "Here we go."
        );
    }

    #[test]
    fn adjacent_tokens_collapse_together() {
        assert_eq!(
            sanitize(
                "Saved: [DIRECTIVE:set_tone|tone:dry] [DIRECTIVE:set_comps|comps:Fleabag] done",
                MAX
            ),
            "Saved: done"
        );
    }

    #[test]
    fn space_then_token_then_newline_keeps_the_newline() {
        assert_eq!(
            sanitize("One more [DIRECTIVE:add_note|note:x]\nline", MAX),
            "One more \nline"
        );
    }

    #[test]
    fn invalid_tokens_are_removed_too() {
        assert_eq!(
            sanitize("A [DIRECTIVE:bogus|x:y] B [DIRECTIVE:add_scene|number:99] C", MAX),
            "A B C"
        );
    }

    #[test]
    fn collapse_carries_across_piece_boundaries() {
        let mut sanitizer = Sanitizer::new();
        let mut out = String::new();
        sanitizer.text("Great idea. ", &mut out);
        sanitizer.directive();
        sanitizer.text("", &mut out);
        sanitizer.text("  ", &mut out);
        sanitizer.text(" Next", &mut out);
        assert_eq!(out, "Great idea. Next");
    }
}
