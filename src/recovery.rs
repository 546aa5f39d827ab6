//! Multi-step flows that recover from a refused or finished operation.

use tracing::{info, warn};

use crate::error::GitError;
use crate::git_ops::CheckoutOptions;
use crate::models::short_sha;
use crate::orchestrator::{FollowUp, Outcome};
use crate::refresh::{RefreshMode, RefreshScope};
use crate::selection::PanelTag;
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowResult {
    Resolved,
    /// The user declined, or a step failed and earlier steps were undone.
    Abandoned,
}

fn abandoned() -> Outcome {
    Outcome {
        flow: Some(FlowResult::Abandoned),
        ..Outcome::default()
    }
}

/// Stash local changes, check out `reference`, and bring the changes back.
///
/// Runs after a plain checkout was refused because of a dirty tree. The
/// panels are always reloaded before a pop failure is surfaced, so the UI
/// never shows the pre-checkout branch while git has moved on.
pub async fn autostash_checkout(session: &Session, reference: &str) -> Outcome {
    if !session.prompter().confirm(
        "Autostash?",
        "You must stash and pop your changes to bring them across. Do this automatically? (enter/esc)",
    ) {
        return abandoned();
    }

    let message = format!("{}{}", session.config().stash_prefix, reference);
    info!(reference, "autostashing before checkout");
    if let Err(e) = session
        .git("stash", move |g| g.stash_save(&message))
        .await
    {
        return Outcome {
            flow: Some(FlowResult::Abandoned),
            ..Outcome::failed(e)
        };
    }

    let target = reference.to_string();
    if let Err(e) = session
        .git("checkout", move |g| g.checkout(&target, &CheckoutOptions::default()))
        .await
    {
        warn!(error = %e, "checkout failed after stashing; restoring changes");
        let restored = session.git("stash pop", |g| g.stash_pop(0)).await;
        let refresh = session.refresh(RefreshScope::all(RefreshMode::BlockUi)).await;
        let mut outcome = Outcome {
            refresh: Some(refresh),
            flow: Some(FlowResult::Abandoned),
            ..Outcome::default()
        };
        match restored {
            Ok(()) => outcome.error = Some(e),
            Err(GitError::MergeConflict(detail)) => {
                warn!("restoring stashed changes conflicted");
                outcome.error = Some(e);
                outcome.follow_up = Some(FollowUp::ResolveConflicts { detail });
            }
            Err(pop) => {
                warn!(error = %pop, "could not restore stashed changes");
                outcome.error = Some(GitError::ExternalToolFailure(format!(
                    "checkout failed: {}. Restoring your changes also failed, they remain in stash@{{0}}: {}",
                    e, pop
                )));
            }
        }
        return outcome;
    }

    session.reset_after_checkout();
    let popped = session.git("stash pop", |g| g.stash_pop(0)).await;
    let refresh = session.refresh(RefreshScope::all(RefreshMode::BlockUi)).await;

    match popped {
        Ok(()) => Outcome {
            refresh: Some(refresh),
            flow: Some(FlowResult::Resolved),
            ..Outcome::default()
        },
        Err(GitError::MergeConflict(detail)) => Outcome {
            refresh: Some(refresh),
            error: Some(GitError::MergeConflict(detail.clone())),
            follow_up: Some(FollowUp::ResolveConflicts { detail }),
            flow: Some(FlowResult::Resolved),
            ..Outcome::default()
        },
        Err(e) => Outcome {
            refresh: Some(refresh),
            error: Some(e),
            flow: Some(FlowResult::Resolved),
            ..Outcome::default()
        },
    }
}

/// Delete a local branch, offering a forced delete when git refuses
/// because it is not merged.
pub async fn delete_branch(session: &Session, name: String) -> Outcome {
    let body = format!("Are you sure you want to delete the branch '{}'?", name);
    if !session.prompter().confirm("Delete branch", &body) {
        return abandoned();
    }

    let n = name.clone();
    let mut result = session
        .git("delete branch", move |g| g.delete_branch(&n, false))
        .await;

    if let Err(GitError::UnmergedBranch(_)) = &result {
        let body = format!(
            "'{}' is not fully merged. Are you sure you want to delete it?",
            name
        );
        if !session.prompter().confirm("Force delete branch", &body) {
            return abandoned();
        }
        let n = name.clone();
        result = session
            .git("force delete branch", move |g| g.delete_branch(&n, true))
            .await;
    }

    match result {
        Ok(()) => {
            info!(branch = name, "deleted branch");
            let scope = RefreshScope::of(&[PanelTag::Branches], RefreshMode::Async);
            Outcome {
                refresh: Some(session.refresh(scope).await),
                flow: Some(FlowResult::Resolved),
                ..Outcome::default()
            }
        }
        Err(e) => Outcome {
            flow: Some(FlowResult::Abandoned),
            ..Outcome::failed(e)
        },
    }
}

/// Report the result of a finished bisect and offer to reset it.
pub async fn bisect_complete(session: &Session, new_term: &str, candidates: Vec<String>) -> Outcome {
    let indeterminate = candidates.len() > 1;
    let mut lines = Vec::with_capacity(candidates.len());
    for sha in &candidates {
        let summary = session.commit_summary(sha).await.unwrap_or_default();
        lines.push(format!("{} {}", short_sha(sha), summary));
    }

    let body = if indeterminate {
        format!(
            "Bisect complete! Skipped commits hide which of these is the first '{}' commit:\n{}\nDo you want to reset 'git bisect' now?",
            new_term,
            lines.join("\n")
        )
    } else {
        format!(
            "Bisect complete! The first '{}' commit is:\n{}\nDo you want to reset 'git bisect' now?",
            new_term,
            lines.join("\n")
        )
    };
    info!(candidates = candidates.len(), "bisect complete");

    let follow_up = Some(FollowUp::BisectComplete {
        candidates,
        indeterminate,
    });

    if !session.prompter().confirm("Bisect complete", &body) {
        let refresh = session.refresh(RefreshScope::all(RefreshMode::Async)).await;
        return Outcome {
            refresh: Some(refresh),
            follow_up,
            flow: Some(FlowResult::Abandoned),
            ..Outcome::default()
        };
    }

    let reset = session.git("bisect reset", |g| g.bisect_reset()).await;
    let refresh = session.refresh(RefreshScope::all(RefreshMode::Async)).await;
    Outcome {
        refresh: Some(refresh),
        error: reset.err(),
        follow_up,
        flow: Some(FlowResult::Resolved),
        ..Outcome::default()
    }
}
