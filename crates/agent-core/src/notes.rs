//! Research-note accumulator. Notes arrive in objective order and are never
//! deduplicated; prompt windows bound their cost.

use serde::{Deserialize, Serialize};

/// Hard cap per stored snippet.
pub const NOTE_SNIPPET_CHARS: usize = 2_000;
/// Window injected into decision/objective prompts.
pub const NOTES_PROMPT_CHARS: usize = 3_000;
/// Window handed to the synthesizer.
pub const NOTES_SYNTHESIS_CHARS: usize = 6_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchNote {
    pub source_step_title: String,
    pub text: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResearchNotes {
    notes: Vec<ResearchNote>,
}

impl ResearchNotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source_step_title: impl Into<String>, text: &str) {
        let snippet: String = text.chars().take(NOTE_SNIPPET_CHARS).collect();
        self.notes.push(ResearchNote {
            source_step_title: source_step_title.into(),
            text: snippet,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResearchNote> {
        self.notes.iter()
    }

    /// True when at least one note is substantial enough to synthesize.
    pub fn worth_synthesizing(&self) -> bool {
        self.notes.iter().any(|note| note.text.len() > 100)
    }

    /// Render all notes and keep the last `max_chars` characters, so the
    /// most recent findings survive truncation.
    pub fn window_text(&self, max_chars: usize) -> String {
        let rendered = self
            .notes
            .iter()
            .map(|note| format!("[{}] {}", note.source_step_title, note.text))
            .collect::<Vec<_>>()
            .join("\n");
        if rendered.chars().count() <= max_chars {
            return rendered;
        }
        let skip = rendered.chars().count() - max_chars;
        rendered.chars().skip(skip).collect()
    }
}
