//! Record of the git commands run on the user's behalf, newest first.

use std::collections::VecDeque;
use std::time::Instant;

const MAX_ENTRIES: usize = 200;

#[derive(Clone, Debug)]
pub struct CommandLogEntry {
    pub when: Instant,
    /// What the user asked for, e.g. "checkout".
    pub action: String,
    pub ok: bool,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct CommandLog {
    entries: VecDeque<CommandLogEntry>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T, E: ToString>(&mut self, action: impl Into<String>, result: &Result<T, E>) {
        self.entries.push_front(CommandLogEntry {
            when: Instant::now(),
            action: action.into(),
            ok: result.is_ok(),
            detail: result.as_ref().err().map(ToString::to_string),
        });
        while self.entries.len() > MAX_ENTRIES {
            self.entries.pop_back();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &CommandLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
