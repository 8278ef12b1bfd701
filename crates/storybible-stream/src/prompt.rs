const DIRECTIVE_GUIDE: &str = "\
System:
You are a screenwriting partner helping the writer build a story bible through conversation.
Talk naturally. When the writer agrees to keep something, record it by writing a directive on a single line:
  [DIRECTIVE:<action>|<key>:<value>|...]
Actions:
  lock_title|title:...            lock_logline|logline:...
  add_character|name:...|role:...|description:...|flaw:...|arc:...
  update_character|name:...|<any character field>:...
  set_theme|theme:...   set_tone|tone:...   set_comps|comps:...
  add_beat|beat:...     add_note|note:...
  add_scene|number:<1-30>|title:...|description:...|characters:Name, Name
Only emit a directive for something the writer approved. Never mention directives in prose.
Saying you saved something without emitting its directive does not save it.

";

/// Builds the full prompt for one turn: directive guide, current story
/// bible, then the writer's message.
pub fn build_turn_prompt(message: &str, context: Option<&str>) -> String {
    let mut prompt = String::from(DIRECTIVE_GUIDE);

    if let Some(ctx) = context {
        prompt.push_str("Story bible so far:\n");
        prompt.push_str(ctx);
        prompt.push_str("\n\n");
    }

    prompt.push_str("Writer: ");
    prompt.push_str(message);
    prompt
}
