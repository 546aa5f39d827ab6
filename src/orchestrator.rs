//! Turns user verbs into gateway calls, recovery flows and refreshes.
//!
//! Every verb runs the same way: mutate, re-read pending state where it
//! matters, refresh, reconcile selection. Anything that can leave conflicts
//! in the working tree goes through [`handle_merge_result`].

use tracing::info;

use crate::config::LogOrder;
use crate::error::GitError;
use crate::git_ops::CheckoutOptions;
use crate::models::{Direction, RebaseCommand, ResetStrength, TodoAction, short_sha};
use crate::recovery::{self, FlowResult};
use crate::refresh::{RefreshMode, RefreshScope};
use crate::selection::PanelTag;
use crate::session::Session;
use crate::state::{self, BisectCompletion};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BisectVerb {
    /// Start bisecting by marking `reference` with `term`.
    Start { reference: String, term: String },
    Mark { reference: String, term: String },
    Skip { reference: String },
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verb {
    Squash,
    Fixup,
    Drop,
    Edit,
    Pick,
    Reword { message: String },
    MoveDown,
    MoveUp,
    AmendTo,
    SquashAboveFixups,
    CreateFixupCommit,
    Revert,
    Tag { name: String, message: Option<String> },
    CheckoutCommit,
    CheckoutBranch,
    CheckoutByName { name: String },
    ForceCheckout,
    NewBranch { name: String },
    RenameBranch { new_name: String },
    DeleteBranch,
    Fetch,
    /// Bring the selected branch up to its upstream without merging.
    FastForward,
    Merge { branch: String },
    RebaseOnto { branch: String },
    ResetTo { reference: String, strength: ResetStrength },
    Bisect(BisectVerb),
    ContinueRebase,
    AbortRebase,
    SkipRebase,
    ToggleWholeGraph,
    SetLogOrder { order: LogOrder },
}

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Squash => "squash",
            Verb::Fixup => "fixup",
            Verb::Drop => "drop",
            Verb::Edit => "edit",
            Verb::Pick => "pick",
            Verb::Reword { .. } => "reword",
            Verb::MoveDown => "move down",
            Verb::MoveUp => "move up",
            Verb::AmendTo => "amend to",
            Verb::SquashAboveFixups => "squash above fixups",
            Verb::CreateFixupCommit => "create fixup commit",
            Verb::Revert => "revert",
            Verb::Tag { .. } => "tag",
            Verb::CheckoutCommit => "checkout commit",
            Verb::CheckoutBranch => "checkout branch",
            Verb::CheckoutByName { .. } => "checkout by name",
            Verb::ForceCheckout => "force checkout",
            Verb::NewBranch { .. } => "new branch",
            Verb::RenameBranch { .. } => "rename branch",
            Verb::DeleteBranch => "delete branch",
            Verb::Fetch => "fetch",
            Verb::FastForward => "fast-forward",
            Verb::Merge { .. } => "merge",
            Verb::RebaseOnto { .. } => "rebase onto",
            Verb::ResetTo { .. } => "reset",
            Verb::Bisect(_) => "bisect",
            Verb::ContinueRebase => "continue rebase",
            Verb::AbortRebase => "abort rebase",
            Verb::SkipRebase => "skip rebase",
            Verb::ToggleWholeGraph => "toggle whole graph",
            Verb::SetLogOrder { .. } => "set log order",
        }
    }

    /// The todo action this verb stands for when applied to a pending entry.
    fn todo_action(&self) -> Option<TodoAction> {
        match self {
            Verb::Squash => Some(TodoAction::Squash),
            Verb::Fixup => Some(TodoAction::Fixup),
            Verb::Drop => Some(TodoAction::Drop),
            Verb::Edit => Some(TodoAction::Edit),
            Verb::Pick => Some(TodoAction::Pick),
            Verb::Reword { .. } => Some(TodoAction::Reword),
            _ => None,
        }
    }
}

/// What to do when a checkout target does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnRefNotFound {
    /// Offer to create a branch with that name at HEAD.
    OfferNewBranch,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FollowUp {
    /// The working tree has conflicts; the UI should switch to conflict
    /// resolution and later send continue/abort/skip.
    ResolveConflicts { detail: String },
    BisectComplete {
        candidates: Vec<String>,
        /// Skipped commits kept git from narrowing down to one commit.
        indeterminate: bool,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// The verb was absorbed as an edit of the pending rebase todo list.
    pub applied: bool,
    /// The refresh that was issued, if any.
    pub refresh: Option<RefreshScope>,
    pub error: Option<GitError>,
    pub follow_up: Option<FollowUp>,
    /// Set when a recovery flow ran.
    pub flow: Option<FlowResult>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn failed(error: GitError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub(crate) fn refreshed(scope: RefreshScope) -> Self {
        Self {
            refresh: Some(scope),
            ..Self::default()
        }
    }
}

fn refusal(msg: &str) -> Outcome {
    Outcome::failed(GitError::InvalidOperation(msg.to_string()))
}

fn no_selection() -> Outcome {
    refusal("Nothing selected")
}

fn all(mode: RefreshMode) -> RefreshScope {
    RefreshScope::all(mode)
}

fn commits_reloaded(result: Result<(), GitError>) -> Outcome {
    Outcome {
        refresh: Some(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync)),
        error: result.err(),
        ..Outcome::default()
    }
}

/// The single place conflict-capable results are handled.
///
/// Always refreshes first. Empty rebase steps are skipped or continued
/// automatically; conflicts become [`FollowUp::ResolveConflicts`]; anything
/// else is returned as the error unchanged.
pub async fn handle_merge_result(session: &Session, result: Result<(), GitError>) -> Outcome {
    let mut result = result;
    loop {
        let refresh = session.refresh(all(RefreshMode::Async)).await;
        match result {
            Ok(()) => return Outcome::refreshed(refresh),
            Err(GitError::EmptyRebaseStep(command)) => {
                info!(command = command.as_arg(), "rebase step is empty, moving on");
                result = session
                    .git(command.as_arg(), move |g| g.rebase_command(command))
                    .await;
            }
            Err(GitError::MergeConflict(detail)) => {
                info!("conflicts need resolving");
                return Outcome {
                    refresh: Some(refresh),
                    follow_up: Some(FollowUp::ResolveConflicts { detail }),
                    ..Outcome::default()
                };
            }
            Err(error) => {
                return Outcome {
                    refresh: Some(refresh),
                    error: Some(error),
                    ..Outcome::default()
                };
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Orchestrator;

impl Orchestrator {
    pub fn new() -> Self {
        Self
    }

    pub async fn orchestrate(&self, session: &Session, verb: Verb) -> Outcome {
        info!(verb = verb.name(), "orchestrating");

        if let Some(action) = verb.todo_action() {
            if let Some(outcome) = self.handle_mid_rebase(session, action).await {
                return outcome;
            }
        }

        match verb {
            Verb::Squash => self.rebase_single(session, TodoAction::Squash).await,
            Verb::Fixup => self.rebase_single(session, TodoAction::Fixup).await,
            Verb::Drop => self.rebase_single(session, TodoAction::Drop).await,
            Verb::Edit => self.rebase_single(session, TodoAction::Edit).await,
            // Outside a rebase, pick means pull.
            Verb::Pick => {
                let result = session.git("pull", |g| g.pull()).await;
                handle_merge_result(session, result).await
            }
            Verb::Reword { message } => self.reword(session, message).await,
            Verb::MoveDown => self.move_commit(session, Direction::Down).await,
            Verb::MoveUp => self.move_commit(session, Direction::Up).await,
            Verb::AmendTo => self.amend_to(session).await,
            Verb::SquashAboveFixups => self.squash_above_fixups(session).await,
            Verb::CreateFixupCommit => self.create_fixup_commit(session).await,
            Verb::Revert => self.revert(session).await,
            Verb::Tag { name, message } => self.tag(session, name, message).await,
            Verb::CheckoutCommit => match session.selected_commit() {
                Some((_, c)) if c.is_rebasing() => {
                    refusal("Cannot check out a pending rebase entry")
                }
                Some((_, c)) => self.checkout_ref(session, c.sha, None).await,
                None => no_selection(),
            },
            Verb::CheckoutBranch => match session.selected_branch() {
                Some((_, b)) if b.is_checked_out => Outcome::failed(
                    GitError::InvalidOperation(format!("'{}' is already checked out", b.name)),
                ),
                Some((_, b)) => self.checkout_ref(session, b.name, None).await,
                None => no_selection(),
            },
            Verb::CheckoutByName { name } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return refusal("Branch name cannot be empty");
                }
                self.checkout_ref(session, name, Some(OnRefNotFound::OfferNewBranch))
                    .await
            }
            Verb::ForceCheckout => self.force_checkout(session).await,
            Verb::NewBranch { name } => self.new_branch(session, name).await,
            Verb::RenameBranch { new_name } => self.rename_branch(session, new_name).await,
            Verb::DeleteBranch => match session.selected_branch() {
                Some((_, b)) if b.is_checked_out => {
                    refusal("You cannot delete the checked out branch!")
                }
                Some((_, b)) => recovery::delete_branch(session, b.name).await,
                None => no_selection(),
            },
            Verb::Fetch => {
                let result = session.git("fetch", |g| g.fetch()).await;
                Outcome {
                    refresh: Some(session.refresh(all(RefreshMode::Async)).await),
                    error: result.err(),
                    ..Outcome::default()
                }
            }
            Verb::FastForward => self.fast_forward(session).await,
            Verb::Merge { branch } => self.merge(session, branch).await,
            Verb::RebaseOnto { branch } => self.rebase_onto(session, branch).await,
            Verb::ResetTo {
                reference,
                strength,
            } => self.reset_to(session, reference, strength).await,
            Verb::Bisect(b) => self.bisect(session, b).await,
            Verb::ContinueRebase => self.rebase_command(session, RebaseCommand::Continue).await,
            Verb::AbortRebase => {
                let body = "Are you sure you want to abort the current operation?";
                if !session.prompter().confirm("Abort", body) {
                    return Outcome::default();
                }
                self.rebase_command(session, RebaseCommand::Abort).await
            }
            Verb::SkipRebase => self.rebase_command(session, RebaseCommand::Skip).await,
            Verb::ToggleWholeGraph => {
                let coordinator = session.coordinator();
                let on = !coordinator.show_whole_graph();
                commits_reloaded(coordinator.set_show_whole_graph(on).await)
            }
            Verb::SetLogOrder { order } => {
                commits_reloaded(session.coordinator().set_log_order(order).await)
            }
        }
    }

    /// Rewrite a verb aimed at a pending todo entry into a todo edit.
    ///
    /// Returns `None` when the selected commit is not a pending entry and the
    /// verb should run normally. Makes no gateway call for reword.
    async fn handle_mid_rebase(&self, session: &Session, action: TodoAction) -> Option<Outcome> {
        let (index, commit) = session.selected_commit()?;
        if !commit.is_rebasing() {
            return None;
        }

        if action == TodoAction::Reword {
            return Some(Outcome::failed(GitError::UnsupportedOperation(
                "rewording a pending rebase entry needs an editor; reword it once the rebase reaches it"
                    .to_string(),
            )));
        }

        info!(index, %action, sha = commit.short_sha(), "editing pending todo entry");
        let result = session
            .git("edit todo", move |g| g.edit_todo_action(index, action))
            .await;
        let mut outcome = Outcome {
            applied: true,
            ..Outcome::default()
        };
        match result {
            Ok(()) => {
                let scope = RefreshScope::of(&[PanelTag::RebaseCommits], RefreshMode::Sync);
                outcome.refresh = Some(session.refresh(scope).await);
            }
            Err(e) => outcome.error = Some(e),
        }
        Some(outcome)
    }

    async fn ensure_not_rebasing(&self, session: &Session) -> Result<(), GitError> {
        if session.query(|g| g.rebase_progress()).await?.is_some() {
            return Err(GitError::InvalidOperation(
                "Can't perform this action during a rebase".to_string(),
            ));
        }
        Ok(())
    }

    async fn rebase_single(&self, session: &Session, action: TodoAction) -> Outcome {
        let Some((index, commit)) = session.selected_commit() else {
            return no_selection();
        };
        if let Err(e) = self.ensure_not_rebasing(session).await {
            return Outcome::failed(e);
        }
        let commits = session.commits();

        let prompt = match action {
            TodoAction::Squash | TodoAction::Fixup if index + 1 >= commits.len() => {
                return refusal("There is no commit below this one to squash into");
            }
            TodoAction::Squash => Some((
                "Squash",
                "Are you sure you want to squash this commit into the commit below?",
            )),
            TodoAction::Fixup => Some((
                "Fixup",
                "Are you sure you want to 'fixup' this commit? It will be merged into the commit below",
            )),
            TodoAction::Drop => Some(("Delete commit", "Are you sure you want to delete this commit?")),
            _ => None,
        };
        if let Some((title, body)) = prompt {
            if !session.prompter().confirm(title, body) {
                return Outcome::default();
            }
        }

        info!(%action, sha = commit.short_sha(), "starting interactive rebase");
        let result = session
            .git(action.as_str(), move |g| {
                g.interactive_rebase(&commits, index, action)
            })
            .await;
        handle_merge_result(session, result).await
    }

    async fn reword(&self, session: &Session, message: String) -> Outcome {
        let Some((index, _)) = session.selected_commit() else {
            return no_selection();
        };
        if message.trim().is_empty() {
            return refusal("Empty commit message");
        }
        if let Err(e) = self.ensure_not_rebasing(session).await {
            return Outcome::failed(e);
        }
        let commits = session.commits();
        let result = session
            .git("reword", move |g| g.reword_commit(&commits, index, &message))
            .await;
        handle_merge_result(session, result).await
    }

    async fn move_commit(&self, session: &Session, direction: Direction) -> Outcome {
        let Some((index, commit)) = session.selected_commit() else {
            return no_selection();
        };
        let commits = session.commits();
        let delta: isize = match direction {
            Direction::Down => 1,
            Direction::Up => -1,
        };

        if commit.is_rebasing() {
            let blocked = match direction {
                // The row below must be a pending entry too.
                Direction::Down => !commits.get(index + 1).is_some_and(|c| c.is_rebasing()),
                Direction::Up => index == 0,
            };
            if blocked {
                return Outcome::default();
            }

            let result = session
                .git("move todo entry", move |g| g.move_todo_entry(index, direction))
                .await;
            if let Err(e) = result {
                return Outcome::failed(e);
            }
            session
                .coordinator()
                .with_selections(|s| s.get_mut(PanelTag::Commits).shift(delta));
            let scope = RefreshScope::of(&[PanelTag::RebaseCommits], RefreshMode::Sync);
            return Outcome {
                applied: true,
                refresh: Some(session.refresh(scope).await),
                ..Outcome::default()
            };
        }

        let target = match direction {
            Direction::Down if index + 1 < commits.len() => index,
            Direction::Up if index > 0 => index - 1,
            _ => return Outcome::default(),
        };
        if let Err(e) = self.ensure_not_rebasing(session).await {
            return Outcome::failed(e);
        }

        let result = session
            .git("move commit", move |g| g.move_commit_down(&commits, target))
            .await;
        if result.is_ok() {
            session
                .coordinator()
                .with_selections(|s| s.get_mut(PanelTag::Commits).shift(delta));
        }
        handle_merge_result(session, result).await
    }

    async fn amend_to(&self, session: &Session) -> Outcome {
        let Some((_, commit)) = session.selected_commit() else {
            return no_selection();
        };
        if commit.is_rebasing() {
            return refusal("Cannot amend a pending rebase entry");
        }
        if let Err(e) = self.ensure_not_rebasing(session).await {
            return Outcome::failed(e);
        }
        if !session.prompter().confirm(
            "Amend commit",
            "Are you sure you want to amend this commit with your staged files?",
        ) {
            return Outcome::default();
        }
        let sha = commit.sha;
        let result = session.git("amend to", move |g| g.amend_to(&sha)).await;
        handle_merge_result(session, result).await
    }

    async fn squash_above_fixups(&self, session: &Session) -> Outcome {
        let Some((_, commit)) = session.selected_commit() else {
            return no_selection();
        };
        if commit.is_rebasing() {
            return refusal("Cannot squash onto a pending rebase entry");
        }
        let body = format!(
            "Are you sure you want to squash all fixup! commits above {}?",
            commit.short_sha()
        );
        if !session.prompter().confirm("Squash fixups", &body) {
            return Outcome::default();
        }
        let sha = commit.sha;
        let result = session
            .git("squash fixups", move |g| g.squash_all_above_fixups(&sha))
            .await;
        handle_merge_result(session, result).await
    }

    async fn create_fixup_commit(&self, session: &Session) -> Outcome {
        let Some((_, commit)) = session.selected_commit() else {
            return no_selection();
        };
        let sha = commit.sha;
        match session
            .git("create fixup commit", move |g| g.create_fixup_commit(&sha))
            .await
        {
            Ok(()) => Outcome::refreshed(session.refresh(all(RefreshMode::Async)).await),
            Err(e) => Outcome::failed(e),
        }
    }

    async fn revert(&self, session: &Session) -> Outcome {
        let Some((_, commit)) = session.selected_commit() else {
            return no_selection();
        };
        if commit.is_rebasing() {
            return refusal("Cannot revert a pending rebase entry");
        }

        let result = if commit.is_merge() {
            let mut labels = Vec::with_capacity(commit.parents.len());
            for parent in &commit.parents {
                let summary = session.commit_summary(parent).await.unwrap_or_default();
                labels.push(format!("{}: {}", short_sha(parent), summary));
            }
            let Some(choice) = session
                .prompter()
                .choose("Select parent commit for merge", &labels)
            else {
                return Outcome::default();
            };
            let sha = commit.sha.clone();
            session
                .git("revert merge", move |g| g.revert_merge(&sha, choice + 1))
                .await
        } else {
            let body = format!("Are you sure you want to revert {}?", commit.short_sha());
            if !session.prompter().confirm("Revert commit", &body) {
                return Outcome::default();
            }
            let sha = commit.sha.clone();
            session.git("revert", move |g| g.revert(&sha)).await
        };

        if result.is_err() {
            return handle_merge_result(session, result).await;
        }

        // The revert lands on top; keep the reverted commit selected.
        session
            .coordinator()
            .with_selections(|s| s.get_mut(PanelTag::Commits).remember(commit.sha.clone()));
        let scope = RefreshScope::of(&[PanelTag::Commits, PanelTag::Branches], RefreshMode::BlockUi);
        Outcome::refreshed(session.refresh(scope).await)
    }

    async fn tag(&self, session: &Session, name: String, message: Option<String>) -> Outcome {
        let Some((_, commit)) = session.selected_commit() else {
            return no_selection();
        };
        let name = name.trim().to_string();
        if name.is_empty() {
            return refusal("Tag name cannot be empty");
        }
        let message = message.filter(|m| !m.trim().is_empty());
        let sha = commit.sha;
        let result = session
            .git("create tag", move |g| g.create_tag(&name, &sha, message.as_deref()))
            .await;
        if let Err(e) = result {
            return Outcome::failed(e);
        }
        session
            .coordinator()
            .with_selections(|s| s.get_mut(PanelTag::Tags).reset());
        let scope = RefreshScope::of(&[PanelTag::Commits, PanelTag::Tags], RefreshMode::Async);
        Outcome::refreshed(session.refresh(scope).await)
    }

    /// Non-forced checkout with the standard recoveries.
    pub async fn checkout_ref(
        &self,
        session: &Session,
        reference: String,
        on_not_found: Option<OnRefNotFound>,
    ) -> Outcome {
        info!(reference, "checkout");
        let r = reference.clone();
        let result = session
            .git("checkout", move |g| g.checkout(&r, &CheckoutOptions::default()))
            .await;

        match result {
            Ok(()) => {
                session.reset_after_checkout();
                Outcome::refreshed(session.refresh(all(RefreshMode::BlockUi)).await)
            }
            Err(GitError::RefNotFound(detail)) => match on_not_found {
                Some(OnRefNotFound::OfferNewBranch) => {
                    self.offer_new_branch(session, reference).await
                }
                None => Outcome::failed(GitError::RefNotFound(detail)),
            },
            Err(GitError::DirtyWorkingTree) => recovery::autostash_checkout(session, &reference).await,
            Err(e) => Outcome::failed(e),
        }
    }

    async fn offer_new_branch(&self, session: &Session, name: String) -> Outcome {
        let body = format!(
            "Branch '{}' not found. Create a new branch named '{}'?",
            name, name
        );
        if !session.prompter().confirm("Branch not found", &body) {
            return Outcome::default();
        }
        let result = session
            .git("new branch", move |g| g.new_branch(&name, "HEAD"))
            .await;
        if let Err(e) = result {
            return Outcome::failed(e);
        }
        session.reset_after_checkout();
        Outcome::refreshed(session.refresh(all(RefreshMode::BlockUi)).await)
    }

    async fn force_checkout(&self, session: &Session) -> Outcome {
        let Some((_, branch)) = session.selected_branch() else {
            return no_selection();
        };
        if !session.prompter().confirm(
            "Force checkout",
            "Are you sure you want to force checkout? You will lose all local changes",
        ) {
            return Outcome::default();
        }
        let options = CheckoutOptions {
            force: true,
            ..CheckoutOptions::default()
        };
        let name = branch.name;
        match session
            .git("force checkout", move |g| g.checkout(&name, &options))
            .await
        {
            Ok(()) => Outcome::refreshed(session.refresh(all(RefreshMode::Async)).await),
            Err(e) => Outcome::failed(e),
        }
    }

    async fn new_branch(&self, session: &Session, name: String) -> Outcome {
        let name = sanitize_branch_name(&name);
        if name.is_empty() {
            return refusal("Branch name cannot be empty");
        }
        let base = session
            .selected_branch()
            .filter(|(_, b)| !b.detached)
            .map(|(_, b)| b.name)
            .unwrap_or_else(|| "HEAD".to_string());

        let result = session
            .git("new branch", move |g| g.new_branch(&name, &base))
            .await;
        if let Err(e) = result {
            return Outcome::failed(e);
        }
        session.coordinator().with_selections(|s| {
            s.get_mut(PanelTag::Branches).reset();
            s.get_mut(PanelTag::Commits).reset();
        });
        Outcome::refreshed(session.refresh(all(RefreshMode::Async)).await)
    }

    async fn rename_branch(&self, session: &Session, new_name: String) -> Outcome {
        let Some((_, branch)) = session.selected_branch() else {
            return no_selection();
        };
        if branch.detached {
            return refusal("Cannot rename a detached HEAD");
        }
        let new_name = sanitize_branch_name(&new_name);
        if new_name.is_empty() {
            return refusal("Branch name cannot be empty");
        }
        if branch.is_tracking_remote()
            && !session.prompter().confirm(
                "Rename branch",
                "This branch is tracking a remote. This action will only rename the local branch name, not the name of the remote branch. Continue?",
            )
        {
            return Outcome::default();
        }

        let (old, new) = (branch.name, new_name.clone());
        let result = session
            .git("rename branch", move |g| g.rename_branch(&old, &new))
            .await;
        if let Err(e) = result {
            return Outcome::failed(e);
        }

        // The renamed branch may sort differently; follow it by name.
        session
            .coordinator()
            .with_selections(|s| s.get_mut(PanelTag::Branches).remember(new_name));
        let scope = RefreshScope::of(&[PanelTag::Branches], RefreshMode::Sync);
        Outcome::refreshed(session.refresh(scope).await)
    }

    async fn fast_forward(&self, session: &Session) -> Outcome {
        let Some((_, branch)) = session.selected_branch() else {
            return no_selection();
        };
        if branch.detached {
            return refusal("Cannot fast-forward a detached HEAD");
        }
        let Some(upstream) = branch.upstream.clone() else {
            return refusal("Cannot fast-forward a branch with no upstream");
        };
        if !branch.remote_branch_stored_locally() {
            return refusal("Cannot fast-forward a branch whose remote is not stored locally");
        }
        if branch.has_commits_to_push() {
            return refusal("Cannot fast-forward a branch with commits to push");
        }

        if branch.is_checked_out {
            let result = session
                .git("pull --ff-only", |g| g.pull_fast_forward_only())
                .await;
            return handle_merge_result(session, result).await;
        }

        info!(branch = %branch.name, remote = %upstream.remote, "fast-forwarding");
        let name = branch.name;
        let result = session
            .git("fast-forward", move |g| {
                g.fast_forward(&name, &upstream.remote, &upstream.branch)
            })
            .await;
        match result {
            Ok(()) => {
                let scope = RefreshScope::of(&[PanelTag::Branches], RefreshMode::Async);
                Outcome::refreshed(session.refresh(scope).await)
            }
            Err(e) => Outcome::failed(e),
        }
    }

    fn current_branch_name(&self, session: &Session) -> Option<String> {
        session
            .checked_out_branch()
            .filter(|b| !b.detached)
            .map(|b| b.name)
    }

    async fn merge(&self, session: &Session, branch: String) -> Outcome {
        match session.query(|g| g.is_head_detached()).await {
            Ok(true) => return refusal("Cannot merge into a detached HEAD"),
            Ok(false) => {}
            Err(e) => return Outcome::failed(e),
        }
        let current = self.current_branch_name(session).unwrap_or_default();
        if current == branch {
            return refusal("You cannot merge a branch into itself");
        }
        let body = format!(
            "Are you sure you want to merge '{}' into '{}'?",
            branch, current
        );
        if !session.prompter().confirm("Merge", &body) {
            return Outcome::default();
        }
        let result = session.git("merge", move |g| g.merge(&branch)).await;
        handle_merge_result(session, result).await
    }

    async fn rebase_onto(&self, session: &Session, branch: String) -> Outcome {
        let current = self.current_branch_name(session).unwrap_or_default();
        if current == branch {
            return refusal("You cannot rebase a branch onto itself");
        }
        let body = format!(
            "Are you sure you want to rebase '{}' on top of '{}'?",
            current, branch
        );
        if !session.prompter().confirm("Rebase branch", &body) {
            return Outcome::default();
        }
        let result = session
            .git("rebase", move |g| g.rebase_branch(&branch))
            .await;
        handle_merge_result(session, result).await
    }

    async fn reset_to(
        &self,
        session: &Session,
        reference: String,
        strength: ResetStrength,
    ) -> Outcome {
        let result = session
            .git("reset", move |g| g.reset_to(&reference, strength))
            .await;
        if let Err(e) = result {
            return Outcome::failed(e);
        }
        session.coordinator().with_selections(|s| {
            s.get_mut(PanelTag::Commits).reset();
            s.get_mut(PanelTag::Reflog).reset();
        });
        session.coordinator().set_limit_commits(true);
        Outcome::refreshed(session.refresh(all(RefreshMode::Sync)).await)
    }

    async fn rebase_command(&self, session: &Session, command: RebaseCommand) -> Outcome {
        let result = session
            .git(command.as_arg(), move |g| g.rebase_command(command))
            .await;
        handle_merge_result(session, result).await
    }

    async fn bisect(&self, session: &Session, verb: BisectVerb) -> Outcome {
        let result = match verb {
            BisectVerb::Start { reference, term } => {
                let result = session
                    .git("bisect start", move |g| state::start_bisect(g, &reference, &term))
                    .await;
                return match result {
                    Ok(()) => Outcome::refreshed(session.refresh(all(RefreshMode::Async)).await),
                    Err(e) => Outcome::failed(e),
                };
            }
            BisectVerb::Mark { reference, term } => {
                session
                    .git("bisect mark", move |g| state::mark_bisect(g, &reference, &term))
                    .await
            }
            BisectVerb::Skip { reference } => {
                session
                    .git("bisect skip", move |g| state::skip_bisect(g, &reference))
                    .await
            }
            BisectVerb::Reset => {
                if !session
                    .prompter()
                    .confirm("Reset bisect", "Are you sure you want to reset 'git bisect'?")
                {
                    return Outcome::default();
                }
                return match session.git("bisect reset", |g| state::reset_bisect(g)).await {
                    Ok(()) => Outcome::refreshed(session.refresh(all(RefreshMode::Async)).await),
                    Err(e) => Outcome::failed(e),
                };
            }
        };

        if let Err(e) = result {
            return Outcome::failed(e);
        }
        self.after_bisect_mark(session).await
    }

    async fn after_bisect_mark(&self, session: &Session) -> Outcome {
        let done = session
            .query(|g| {
                let info = g.bisect_info()?;
                Ok((info.new_term, state::bisect_completion(g)?))
            })
            .await;
        match done {
            Ok((new_term, BisectCompletion::Done { candidates })) => {
                recovery::bisect_complete(session, &new_term, candidates).await
            }
            Ok((_, BisectCompletion::NotDone)) => {
                Outcome::refreshed(session.refresh(all(RefreshMode::Async)).await)
            }
            Err(e) => Outcome::failed(e),
        }
    }
}

/// Branch names cannot contain spaces; the prompt lets users type them.
pub fn sanitize_branch_name(name: &str) -> String {
    name.trim().replace(' ', "-")
}
