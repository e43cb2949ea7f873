//! Note-sequence detection for the kit's Start and Select buttons.
//!
//! A kit has no Start/Select pads, so fixed sequences of hits stand in for them. The tracker
//! holds the notes accepted so far; it resets on a timeout measured from the first pending note,
//! on a completed match, or when a note cannot extend any sequence.

use std::time::Duration;

use tracing::debug;

use crate::clock::EmuInstant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComboButton {
    Start,
    Select,
}

#[derive(Debug, Clone)]
pub struct ComboTracker {
    sequences: Vec<(ComboButton, Vec<u8>)>,
    window: Duration,
    pending: Vec<u8>,
    deadline: Option<EmuInstant>,
}

impl ComboTracker {
    pub fn new(sequences: Vec<(ComboButton, Vec<u8>)>, window: Duration) -> Self {
        Self {
            sequences: sequences
                .into_iter()
                .filter(|(_, notes)| !notes.is_empty())
                .collect(),
            window,
            pending: Vec::new(),
            deadline: None,
        }
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    /// Feeds one accepted note. Returns the button whose sequence this note completed.
    pub fn feed(&mut self, note: u8, now: EmuInstant) -> Option<ComboButton> {
        if self.deadline.is_some_and(|deadline| now > deadline) {
            self.reset();
        }

        self.pending.push(note);
        if !self.is_prefix() {
            // Resynchronize on the new note alone.
            self.reset();
            self.pending.push(note);
            if !self.is_prefix() {
                self.reset();
                return None;
            }
        }
        if self.pending.len() == 1 {
            self.deadline = Some(now + self.window);
        }

        let matched = self
            .sequences
            .iter()
            .find(|(_, notes)| *notes == self.pending)
            .map(|(button, _)| *button);
        if let Some(button) = matched {
            debug!(?button, "drum combo matched");
            self.reset();
        }
        matched
    }

    fn is_prefix(&self) -> bool {
        self.sequences
            .iter()
            .any(|(_, notes)| notes.starts_with(&self.pending))
    }
}
