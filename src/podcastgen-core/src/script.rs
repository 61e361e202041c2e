//! Script parsing.
//!
//! Turns the free-form text returned by the script generator into an ordered
//! list of attributed utterances. The recognized format is line oriented:
//!
//! ```text
//! [Host]: "What do you think about the recent developments?"
//!
//! [Guest]: "Well, it's a grim prospect,
//! to say the least."
//! ```
//!
//! A marker is a bracketed label from the recognized set, at the start of a
//! line, immediately followed by a colon. Everything up to the next recognized
//! marker belongs to the current utterance. Bracketed labels outside the set
//! (a hallucinated `[Narrator]:` for instance) are ordinary text and end up in
//! the preceding utterance.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One attributed unit of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    sequence_index: usize,
    speaker_label: String,
    text: String,
}

impl Utterance {
    /// Position in the conversation, dense and 0-based.
    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn speaker_label(&self) -> &str {
        &self.speaker_label
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]: {}", self.speaker_label, self.text)
    }
}

/// Parser bound to a fixed set of speaker labels.
#[derive(Debug, Clone)]
pub struct ScriptParser {
    labels: Vec<String>,
}

impl ScriptParser {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn parse(&self, script_text: &str) -> Vec<Utterance> {
        parse(script_text, &self.labels)
    }
}

/// Parse `script_text` into utterances attributed to `recognized_labels`.
///
/// Returns an empty vector when no recognized marker is present.
pub fn parse<S: AsRef<str>>(script_text: &str, recognized_labels: &[S]) -> Vec<Utterance> {
    let mut utterances = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in script_text.lines() {
        match match_marker(line, recognized_labels) {
            Some((label, rest)) => {
                if let Some((speaker, text)) = current.take() {
                    push_utterance(&mut utterances, speaker, &text);
                }
                current = Some((label.to_string(), rest.to_string()));
            }
            None => {
                // Lines before the first marker are preamble and dropped.
                if let Some((_, text)) = current.as_mut() {
                    text.push('\n');
                    text.push_str(line);
                }
            }
        }
    }

    if let Some((speaker, text)) = current {
        push_utterance(&mut utterances, speaker, &text);
    }

    utterances
}

/// Recognize `[Label]:` at the start of `line`, returning the label and the
/// remainder after the colon.
fn match_marker<'a, S: AsRef<str>>(
    line: &'a str,
    recognized_labels: &[S],
) -> Option<(&'a str, &'a str)> {
    let line = line.trim_start_matches([' ', '\t']);
    let inner = line.strip_prefix('[')?;
    let close = inner.find(']')?;
    let label = &inner[..close];
    let rest = inner[close + 1..].strip_prefix(':')?;

    recognized_labels
        .iter()
        .any(|l| l.as_ref() == label)
        .then_some((label, rest))
}

fn push_utterance(utterances: &mut Vec<Utterance>, speaker_label: String, raw: &str) {
    let text = strip_enclosing_quotes(raw.trim());
    if text.is_empty() {
        return;
    }

    utterances.push(Utterance {
        sequence_index: utterances.len(),
        speaker_label,
        text: text.to_string(),
    });
}

/// Remove a single pair of quotes wrapping the whole utterance.
///
/// The script prompt asks for quoted dialogue, so `[Host]: "Hello!"` is
/// spoken as `Hello!` rather than with literal quote marks. Text that has
/// quotes inside (`"A" and "B"`) is left as written, since stripping the
/// outer pair would unbalance it.
fn strip_enclosing_quotes(text: &str) -> &str {
    const PAIRS: [(char, char); 2] = [('"', '"'), ('\u{201c}', '\u{201d}')];

    for (open, close) in PAIRS {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|t| t.strip_suffix(close))
        {
            if !inner.contains([open, close]) {
                return inner.trim();
            }
        }
    }

    text
}
