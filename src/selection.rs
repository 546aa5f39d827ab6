//! Per-panel selection that survives wholesale list replacement.
//!
//! Invariant kept by every operation: `index()` is `None` exactly when the
//! panel is empty, otherwise it lies in `0..len`.

use std::collections::HashMap;

use crate::models::{Branch, Commit, ReflogEntry, Tag};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PanelTag {
    Branches,
    Commits,
    /// Pending rebase entries. They live at the top of the commits panel.
    RebaseCommits,
    Reflog,
    Tags,
}

impl PanelTag {
    /// The panel whose selection this tag moves.
    pub fn selection_panel(self) -> PanelTag {
        match self {
            PanelTag::RebaseCommits => PanelTag::Commits,
            other => other,
        }
    }
}

/// Something a selection can follow across reloads.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Commit {
    fn id(&self) -> &str {
        &self.sha
    }
}

impl Identified for Branch {
    fn id(&self) -> &str {
        &self.name
    }
}

impl Identified for ReflogEntry {
    fn id(&self) -> &str {
        &self.sha
    }
}

impl Identified for Tag {
    fn id(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PanelSelection {
    index: Option<usize>,
    len: usize,
    remembered: Option<String>,
}

impl PanelSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Follow `id` through the next reload instead of the row number.
    pub fn remember(&mut self, id: impl Into<String>) {
        self.remembered = Some(id.into());
    }

    pub fn remembered(&self) -> Option<&str> {
        self.remembered.as_deref()
    }

    fn clamp(&self, index: usize) -> Option<usize> {
        if self.len == 0 {
            None
        } else {
            Some(index.min(self.len - 1))
        }
    }

    /// Explicit selection. Any remembered identity is dropped.
    pub fn select(&mut self, index: usize) {
        self.remembered = None;
        self.index = self.clamp(index);
    }

    /// Move by the same delta as a row move in the list, no lookup.
    pub fn shift(&mut self, delta: isize) {
        let Some(current) = self.index else {
            return;
        };
        self.index = self.clamp(current.saturating_add_signed(delta));
    }

    /// Cursor navigation. Returns the new index.
    pub fn move_by(&mut self, delta: isize) -> Option<usize> {
        self.remembered = None;
        match self.index {
            Some(_) => self.shift(delta),
            None => self.index = self.clamp(0),
        }
        self.index
    }

    /// Back to the first row, forgetting any remembered identity.
    pub fn reset(&mut self) {
        self.remembered = None;
        self.index = self.clamp(0);
    }

    /// Resolve the selection against a freshly loaded list.
    ///
    /// A remembered identity that is present wins. Otherwise the previous
    /// index is clamped into the new bounds. Either way the identity is
    /// forgotten, so it never resurfaces on a later reload.
    pub fn reconcile<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut len = 0;
        let mut found = None;
        for (i, id) in ids.into_iter().enumerate() {
            if found.is_none() && self.remembered.as_deref() == Some(id) {
                found = Some(i);
            }
            len += 1;
        }
        self.len = len;
        self.remembered = None;

        self.index = match found {
            Some(i) => Some(i),
            None => self.clamp(self.index.unwrap_or(0)),
        };
    }

    pub fn reconcile_items<T: Identified>(&mut self, items: &[T]) {
        self.reconcile(items.iter().map(Identified::id));
    }
}

/// One selection per panel.
#[derive(Clone, Debug, Default)]
pub struct Selections {
    panels: HashMap<PanelTag, PanelSelection>,
}

impl Selections {
    pub fn get(&self, tag: PanelTag) -> Option<&PanelSelection> {
        self.panels.get(&tag.selection_panel())
    }

    pub fn get_mut(&mut self, tag: PanelTag) -> &mut PanelSelection {
        self.panels.entry(tag.selection_panel()).or_default()
    }

    pub fn index(&self, tag: PanelTag) -> Option<usize> {
        self.get(tag).and_then(PanelSelection::index)
    }
}
