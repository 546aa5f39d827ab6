//! Error taxonomy for git operations.
//!
//! Git reports failures as free text on stderr. That text is classified
//! exactly once, in [`classify_failure`], by the gateway that ran the command.
//! Everything above the gateway matches on [`GitError`] variants.

use thiserror::Error;

use crate::models::RebaseCommand;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitError {
    #[error("reference not found: {0}")]
    RefNotFound(String),
    #[error("uncommitted changes would be overwritten; commit or stash them first")]
    DirtyWorkingTree,
    #[error("merge conflict: {0}")]
    MergeConflict(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("branch '{0}' is not fully merged")]
    UnmergedBranch(String),
    #[error("rebase step produced no changes; needs `git rebase --{}`", .0.as_arg())]
    EmptyRebaseStep(RebaseCommand),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("{0}")]
    ExternalToolFailure(String),
}

impl GitError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, GitError::MergeConflict(_))
    }

    pub(crate) fn join(err: tokio::task::JoinError) -> Self {
        GitError::ExternalToolFailure(format!("Task join error: {}", err))
    }
}

const REF_NOT_FOUND: &[&str] = &[
    "did not match any file(s) known to git",
    "invalid reference",
    "unknown revision",
    "not a valid object name",
];

const DIRTY_TREE: &[&str] = &[
    "Please commit your changes or stash them before you",
    "would be overwritten by checkout",
];

const UNMERGED_BRANCH: &[&str] = &["is not fully merged", "git branch -D "];

const CONFLICT: &[&str] = &[
    "CONFLICT (",
    "When you have resolved this problem",
    "fix conflicts and then commit the result",
    "Resolve all conflicts manually",
    "after resolving the conflicts",
    "Automatic merge failed",
    "could not apply",
];

/// Map a failed git invocation onto the error taxonomy.
///
/// Checked in a fixed order: a dirty-tree refusal mentions files that would
/// conflict, so it must win over the generic conflict patterns.
pub fn classify_failure(exit_code: Option<i32>, stderr: &str) -> GitError {
    let text = stderr.trim();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if contains_any(DIRTY_TREE) {
        return GitError::DirtyWorkingTree;
    }
    if contains_any(REF_NOT_FOUND) {
        return GitError::RefNotFound(text.to_string());
    }
    if contains_any(UNMERGED_BRANCH) {
        let name = text
            .split('\'')
            .nth(1)
            .map(str::to_string)
            .unwrap_or_else(|| text.to_string());
        return GitError::UnmergedBranch(name);
    }
    if text.contains("No changes - did you forget to use 'git add'") {
        return GitError::EmptyRebaseStep(RebaseCommand::Skip);
    }
    if text.contains("The previous cherry-pick is now empty") {
        return GitError::EmptyRebaseStep(RebaseCommand::Continue);
    }
    if contains_any(CONFLICT) {
        return GitError::MergeConflict(text.to_string());
    }

    if text.is_empty() {
        let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        return GitError::ExternalToolFailure(format!("git exited with status {}", code));
    }
    GitError::ExternalToolFailure(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_checkout_wins_over_conflict_wording() {
        let stderr = "error: Your local changes to the following files would be overwritten by checkout:\n\
                      \tsrc/lib.rs\n\
                      Please commit your changes or stash them before you switch branches.\nAborting";
        assert_eq!(classify_failure(Some(1), stderr), GitError::DirtyWorkingTree);
    }

    #[test]
    fn unknown_pathspec_is_ref_not_found() {
        let stderr = "error: pathspec 'nope' did not match any file(s) known to git";
        assert!(matches!(
            classify_failure(Some(1), stderr),
            GitError::RefNotFound(_)
        ));
    }

    #[test]
    fn unmerged_branch_extracts_name() {
        let stderr = "error: The branch 'feature-x' is not fully merged.\n\
                      If you are sure you want to delete it, run 'git branch -D feature-x'.";
        assert_eq!(
            classify_failure(Some(1), stderr),
            GitError::UnmergedBranch("feature-x".to_string())
        );
    }

    #[test]
    fn stash_pop_conflict_is_merge_conflict() {
        let stderr = "Auto-merging a.txt\nCONFLICT (content): Merge conflict in a.txt";
        assert!(classify_failure(Some(1), stderr).is_conflict());
    }

    #[test]
    fn empty_rebase_steps_name_the_follow_up() {
        assert_eq!(
            classify_failure(Some(1), "No changes - did you forget to use 'git add'?"),
            GitError::EmptyRebaseStep(RebaseCommand::Skip)
        );
        assert_eq!(
            classify_failure(Some(1), "The previous cherry-pick is now empty, possibly due to conflict resolution."),
            GitError::EmptyRebaseStep(RebaseCommand::Continue)
        );
    }

    #[test]
    fn unrecognized_text_passes_through_verbatim() {
        assert_eq!(
            classify_failure(Some(128), "  fatal: something odd  "),
            GitError::ExternalToolFailure("fatal: something odd".to_string())
        );
        assert_eq!(
            classify_failure(Some(2), ""),
            GitError::ExternalToolFailure("git exited with status 2".to_string())
        );
    }
}
