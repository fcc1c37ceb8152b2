//! Transcript accumulation with terminal control sequence stripping.
//!
//! Output read from the interactive PTY is full of cursor movement, colour
//! codes, carriage returns and bells. Prompt detection is substring based, so
//! every chunk is run through a [`ControlStripper`] before it is inspected or
//! stored. The stripper keeps its parser state between chunks: an escape
//! sequence or a multi-byte character split across two reads is still handled.

use serde::{Deserialize, Serialize};
use vte::{Parser, Perform};

/// How the submission command was judged complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// No output arrived for the whole idle window.
    Idle,
}

impl std::fmt::Display for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Idle => write!(f, "idle"),
        }
    }
}

/// Collects printable text, dropping every escape/control sequence.
#[derive(Default)]
struct TextSink {
    text: String,
}

impl Perform for TextSink {
    fn print(&mut self, c: char) {
        self.text.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.text.push('\n'),
            b'\t' => self.text.push('\t'),
            // \r, BEL, backspace and the rest of C0
            _ => {}
        }
    }
}

/// Streaming control-sequence stripper.
pub struct ControlStripper {
    parser: Parser,
    sink: TextSink,
}

impl ControlStripper {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            sink: TextSink::default(),
        }
    }

    /// Feed raw bytes, returning the clean text they completed.
    pub fn feed(&mut self, data: &[u8]) -> String {
        for &byte in data {
            self.parser.advance(&mut self.sink, byte);
        }
        std::mem::take(&mut self.sink.text)
    }
}

impl Default for ControlStripper {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip control sequences from a complete piece of text.
///
/// Idempotent: the output only contains printable characters, `\n` and `\t`.
pub fn strip_control(text: &str) -> String {
    ControlStripper::new().feed(text.as_bytes())
}

/// Append-only, already-cleaned record of an interactive session.
///
/// Besides the full text it tracks the output that arrived since the last
/// reply was sent, so a prompt split over several reads is still seen whole.
#[derive(Default)]
pub struct Transcript {
    text: String,
    unanswered: String,
    stripper: ControlStripper,
    completion: Option<Completion>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clean and append a raw chunk, returning the fresh clean text.
    pub fn append(&mut self, raw: &[u8]) -> String {
        let fresh = self.stripper.feed(raw);
        self.text.push_str(&fresh);
        self.unanswered.push_str(&fresh);
        fresh
    }

    /// Clean output received since the last [`Transcript::mark_replied`].
    pub fn unanswered(&self) -> &str {
        &self.unanswered
    }

    /// Record that the output so far has been answered.
    pub fn mark_replied(&mut self) {
        self.unanswered.clear();
    }

    pub fn mark_completion(&mut self, completion: Completion) {
        self.completion = Some(completion);
    }

    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("text", &self.text)
            .field("completion", &self.completion)
            .finish()
    }
}
