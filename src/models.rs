use std::fmt;

/// An action in the rebase todo list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TodoAction {
    Pick,
    Squash,
    Fixup,
    Drop,
    Edit,
    Reword,
}

impl TodoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TodoAction::Pick => "pick",
            TodoAction::Squash => "squash",
            TodoAction::Fixup => "fixup",
            TodoAction::Drop => "drop",
            TodoAction::Edit => "edit",
            TodoAction::Reword => "reword",
        }
    }

    /// Parse a todo keyword, including git's single-letter abbreviations.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "pick" | "p" => Some(TodoAction::Pick),
            "squash" | "s" => Some(TodoAction::Squash),
            "fixup" | "f" => Some(TodoAction::Fixup),
            "drop" | "d" => Some(TodoAction::Drop),
            "edit" | "e" => Some(TodoAction::Edit),
            "reword" | "r" => Some(TodoAction::Reword),
            _ => None,
        }
    }
}

impl fmt::Display for TodoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// A pending entry of the rebase todo list, not yet a committed object.
    Rebasing(TodoAction),
    /// The commit an in-progress rebase is stopped on. Bounds the range of
    /// pending entries above it.
    Selected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub sha: String,
    pub parents: Vec<String>,
    pub summary: String,
    pub status: CommitStatus,
}

impl Commit {
    pub fn short_sha(&self) -> &str {
        short_sha(&self.sha)
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_rebasing(&self) -> bool {
        matches!(self.status, CommitStatus::Rebasing(_))
    }
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub remote: String,
    pub branch: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub upstream: Option<Upstream>,
    pub ahead: Option<u32>,
    pub behind: Option<u32>,
    /// Loaders put the checked-out branch first; this flag states it outright.
    pub is_checked_out: bool,
    pub detached: bool,
    pub recency: Option<String>,
}

impl Branch {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            upstream: None,
            ahead: None,
            behind: None,
            is_checked_out: false,
            detached: false,
            recency: None,
        }
    }

    pub fn is_tracking_remote(&self) -> bool {
        self.upstream.is_some()
    }

    pub fn has_commits_to_push(&self) -> bool {
        self.ahead.is_some_and(|n| n > 0)
    }

    /// The upstream has a remote-tracking ref here, so ahead and behind are
    /// known. A `[gone]` upstream leaves both unknown.
    pub fn remote_branch_stored_locally(&self) -> bool {
        self.upstream.is_some() && self.ahead.is_some() && self.behind.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    /// Object the tag ref points at; the tag object itself when annotated.
    pub sha: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflogEntry {
    pub sha: String,
    pub selector: String,
    pub subject: String,
    pub unix_time: i64,
}

/// Follow-up commands for an interrupted rebase or merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebaseCommand {
    Continue,
    Abort,
    Skip,
}

impl RebaseCommand {
    pub fn as_arg(self) -> &'static str {
        match self {
            RebaseCommand::Continue => "continue",
            RebaseCommand::Abort => "abort",
            RebaseCommand::Skip => "skip",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetStrength {
    Soft,
    Mixed,
    Hard,
}

impl ResetStrength {
    pub fn as_flag(self) -> &'static str {
        match self {
            ResetStrength::Soft => "--soft",
            ResetStrength::Mixed => "--mixed",
            ResetStrength::Hard => "--hard",
        }
    }
}
