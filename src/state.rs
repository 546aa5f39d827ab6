//! What the repository is in the middle of.
//!
//! Nothing here is cached: every query re-reads git's on-disk state through
//! the gateway. The reads are cheap and a stale answer would route the next
//! verb to the wrong operation.

use std::collections::HashMap;

use tracing::info;

use crate::error::GitError;
use crate::git_ops::GitGateway;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingActionState {
    Normal,
    RebaseInProgress {
        current_todo_index: usize,
    },
    MergeInProgress,
    BisectInProgress {
        start_ref: String,
        current_ref: Option<String>,
        good_refs: Vec<String>,
        bad_refs: Vec<String>,
        skipped_refs: Vec<String>,
    },
}

impl PendingActionState {
    pub fn is_normal(&self) -> bool {
        matches!(self, PendingActionState::Normal)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BisectStatus {
    Old,
    New,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BisectInfo {
    pub start_ref: Option<String>,
    pub current_sha: Option<String>,
    pub new_term: String,
    pub old_term: String,
    pub statuses: HashMap<String, BisectStatus>,
}

impl Default for BisectInfo {
    fn default() -> Self {
        Self {
            start_ref: None,
            current_sha: None,
            new_term: "bad".to_string(),
            old_term: "good".to_string(),
            statuses: HashMap::new(),
        }
    }
}

impl BisectInfo {
    pub fn started(&self) -> bool {
        self.start_ref.is_some()
    }

    /// Label for commits that have the regression ("bad" or a custom term).
    pub fn new_term(&self) -> &str {
        &self.new_term
    }

    /// Label for commits from before the regression ("good" or a custom term).
    pub fn old_term(&self) -> &str {
        &self.old_term
    }

    pub fn new_sha(&self) -> Option<&str> {
        self.statuses
            .iter()
            .find(|(_, s)| **s == BisectStatus::New)
            .map(|(sha, _)| sha.as_str())
    }

    fn shas_with(&self, status: BisectStatus) -> Vec<String> {
        let mut shas: Vec<String> = self
            .statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(sha, _)| sha.clone())
            .collect();
        shas.sort();
        shas
    }

    pub fn state(&self) -> PendingActionState {
        let Some(start_ref) = self.start_ref.clone() else {
            return PendingActionState::Normal;
        };
        PendingActionState::BisectInProgress {
            start_ref,
            current_ref: self.current_sha.clone(),
            good_refs: self.shas_with(BisectStatus::Old),
            bad_refs: self.shas_with(BisectStatus::New),
            skipped_refs: self.shas_with(BisectStatus::Skipped),
        }
    }
}

/// Map `refs/bisect/*` entries onto statuses.
///
/// Input lines are `<refname> <sha>`. git stores the single new commit as
/// `refs/bisect/<new>` and every old or skipped commit as
/// `refs/bisect/<old>-<sha>` / `refs/bisect/skip-<sha>`.
pub fn parse_bisect_refs(
    text: &str,
    new_term: &str,
    old_term: &str,
) -> HashMap<String, BisectStatus> {
    let old_prefix = format!("{}-", old_term);
    let mut statuses = HashMap::new();

    for line in text.lines() {
        let Some((refname, sha)) = line.trim().split_once(' ') else {
            continue;
        };
        let Some(name) = refname.strip_prefix("refs/bisect/") else {
            continue;
        };
        let status = if name == new_term {
            BisectStatus::New
        } else if name.starts_with(&old_prefix) {
            BisectStatus::Old
        } else if name.starts_with("skip-") {
            BisectStatus::Skipped
        } else {
            continue;
        };
        statuses.insert(sha.trim().to_string(), status);
    }

    statuses
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BisectCompletion {
    NotDone,
    /// The search has narrowed down to these commits. More than one means
    /// skipped commits made the result indeterminate.
    Done { candidates: Vec<String> },
}

/// Walk history back from the new commit.
///
/// New and skipped commits are candidates. Reaching an old commit means
/// nothing untested remains in between; reaching an unmarked commit means
/// git still has something to test.
pub fn evaluate_bisect_walk(
    rev_list: &[String],
    statuses: &HashMap<String, BisectStatus>,
) -> BisectCompletion {
    let mut candidates = Vec::new();
    for sha in rev_list {
        match statuses.get(sha) {
            Some(BisectStatus::New | BisectStatus::Skipped) => candidates.push(sha.clone()),
            Some(BisectStatus::Old) => {
                if candidates.is_empty() {
                    return BisectCompletion::NotDone;
                }
                return BisectCompletion::Done { candidates };
            }
            None => return BisectCompletion::NotDone,
        }
    }
    BisectCompletion::NotDone
}

pub fn rebase_state(git: &dyn GitGateway) -> Result<PendingActionState, GitError> {
    Ok(match git.rebase_progress()? {
        Some(current_todo_index) => PendingActionState::RebaseInProgress { current_todo_index },
        None => PendingActionState::Normal,
    })
}

pub fn bisect_state(git: &dyn GitGateway) -> Result<PendingActionState, GitError> {
    Ok(git.bisect_info()?.state())
}

/// Bisect wins over rebase, rebase over merge.
pub fn pending_action_state(git: &dyn GitGateway) -> Result<PendingActionState, GitError> {
    let bisect = bisect_state(git)?;
    if !bisect.is_normal() {
        return Ok(bisect);
    }
    let rebase = rebase_state(git)?;
    if !rebase.is_normal() {
        return Ok(rebase);
    }
    if git.merge_in_progress()? {
        return Ok(PendingActionState::MergeInProgress);
    }
    Ok(PendingActionState::Normal)
}

fn check_term(info: &BisectInfo, term: &str) -> Result<(), GitError> {
    if term == info.new_term || term == info.old_term {
        return Ok(());
    }
    Err(GitError::InvalidOperation(format!(
        "'{}' is not a bisect term; use '{}' or '{}'",
        term, info.new_term, info.old_term
    )))
}

/// Start bisecting by marking `reference` with `term`.
///
/// If the first mark fails the session is reset, so a failed start never
/// leaves a half-started bisect behind.
pub fn start_bisect(git: &dyn GitGateway, reference: &str, term: &str) -> Result<(), GitError> {
    let info = git.bisect_info()?;
    if info.started() {
        return Err(GitError::InvalidOperation(
            "a bisect is already in progress".to_string(),
        ));
    }
    check_term(&info, term)?;

    info!(reference, term, "starting bisect");
    git.bisect_start()?;
    if let Err(e) = git.bisect_mark(reference, term) {
        let _ = git.bisect_reset();
        return Err(e);
    }
    Ok(())
}

pub fn mark_bisect(git: &dyn GitGateway, reference: &str, term: &str) -> Result<(), GitError> {
    let info = git.bisect_info()?;
    if !info.started() {
        return Err(GitError::InvalidOperation("no bisect in progress".to_string()));
    }
    check_term(&info, term)?;
    git.bisect_mark(reference, term)
}

pub fn skip_bisect(git: &dyn GitGateway, reference: &str) -> Result<(), GitError> {
    git.bisect_skip(reference)
}

pub fn reset_bisect(git: &dyn GitGateway) -> Result<(), GitError> {
    git.bisect_reset()
}

pub fn bisect_completion(git: &dyn GitGateway) -> Result<BisectCompletion, GitError> {
    let info = git.bisect_info()?;
    if !info.started() {
        return Ok(BisectCompletion::NotDone);
    }
    let Some(new_sha) = info.new_sha() else {
        return Ok(BisectCompletion::NotDone);
    };
    let revs = git.bisect_rev_list(new_sha)?;
    Ok(evaluate_bisect_walk(&revs, &info.statuses))
}
