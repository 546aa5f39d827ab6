//! In-memory stand-ins for git and the UI, used by unit tests.
//!
//! `FakeGit` plays both the gateway and the loaders over one shared model
//! of a repository, and writes every call into one log so tests can assert
//! on ordering across the two.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;

use crate::error::GitError;
use crate::git_ops::{CheckoutOptions, GitGateway};
use crate::loaders::{CommitLoadOptions, EntityLoader, sort_by_recency};
use crate::models::{
    Branch, Commit, CommitStatus, Direction, RebaseCommand, ReflogEntry, ResetStrength, Tag,
    TodoAction, Upstream,
};
use crate::config::EngineConfig;
use crate::prompt::Prompter;
use crate::refresh::{PanelEvent, RefreshMode, RefreshScope};
use crate::session::Session;
use crate::state::{BisectInfo, BisectStatus};

pub fn commit(sha: &str) -> Commit {
    Commit {
        sha: sha.to_string(),
        parents: vec![format!("{}^", sha)],
        summary: format!("{} summary", sha),
        status: CommitStatus::Committed,
    }
}

pub fn merge_commit(sha: &str, parents: &[&str]) -> Commit {
    Commit {
        parents: parents.iter().map(|p| p.to_string()).collect(),
        ..commit(sha)
    }
}

pub fn pending(sha: &str) -> Commit {
    Commit {
        status: CommitStatus::Rebasing(TodoAction::Pick),
        ..commit(sha)
    }
}

pub fn branch(name: &str, checked_out: bool) -> Branch {
    Branch {
        is_checked_out: checked_out,
        ..Branch::local(name)
    }
}

/// A branch tracking `origin/<name>` with the given divergence.
pub fn tracking(name: &str, checked_out: bool, ahead: u32, behind: u32) -> Branch {
    Branch {
        upstream: Some(Upstream {
            remote: "origin".to_string(),
            branch: name.to_string(),
        }),
        ahead: Some(ahead),
        behind: Some(behind),
        ..branch(name, checked_out)
    }
}

pub fn reflog_checkout(from: &str, to: &str, unix_time: i64) -> ReflogEntry {
    ReflogEntry {
        sha: format!("{}-tip", to),
        selector: "HEAD@{0}".to_string(),
        subject: format!("checkout: moving from {} to {}", from, to),
        unix_time,
    }
}

/// A session over `git`, loaded and past startup, so no background load
/// races the test.
pub async fn start_session(git: &Arc<FakeGit>, prompter: Arc<ScriptedPrompter>) -> Session {
    let session = Session::new(
        "/repo",
        git.clone(),
        git.clone(),
        prompter,
        EngineConfig::default(),
    );
    let mut events = session.coordinator().events();
    session
        .coordinator()
        .refresh(RefreshScope::all(RefreshMode::Sync))
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(ev) = events.next().await {
            if ev.ok() == Some(PanelEvent::StartupComplete) {
                return;
            }
        }
    })
    .await
    .expect("startup did not complete");
    session
}

#[derive(Default)]
struct Repo {
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<GitError>>,
    commits: Vec<Commit>,
    todo: Vec<Commit>,
    branches: Vec<Branch>,
    tags: Vec<Tag>,
    reflog: Vec<ReflogEntry>,
    unmerged: HashSet<String>,
    summaries: HashMap<String, String>,
    rebase_progress: Option<usize>,
    merge_in_progress: bool,
    head_detached: bool,
    dirty: bool,
    stash: Vec<String>,
    bisect: BisectInfo,
    last_commit_options: Option<CommitLoadOptions>,
}

impl Repo {
    fn record(&mut self, call: String, op: &str) -> Result<(), GitError> {
        self.calls.push(call);
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_out(&mut self, name: &str) {
        for b in &mut self.branches {
            b.is_checked_out = b.name == name;
        }
        self.head_detached = false;
        if let Some(pos) = self.branches.iter().position(|b| b.name == name) {
            let b = self.branches.remove(pos);
            self.branches.insert(0, b);
        }
    }
}

#[derive(Default)]
pub struct FakeGit {
    repo: Mutex<Repo>,
}

impl FakeGit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: &str, err: GitError) {
        self.repo
            .lock()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.repo.lock().calls.clone()
    }

    /// Calls that change the repository: no loads, no state reads.
    pub fn mutations(&self) -> Vec<String> {
        const READS: &[&str] = &[
            "load_",
            "rebase_progress",
            "merge_in_progress",
            "bisect_info",
            "bisect_rev_list",
            "is_head_detached",
            "commit_first_line",
        ];
        self.calls()
            .into_iter()
            .filter(|c| !READS.iter().any(|r| c.starts_with(r)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.repo.lock().calls.clear();
    }

    pub fn set_commits(&self, commits: Vec<Commit>) {
        self.repo.lock().commits = commits;
    }

    /// Pending todo entries, newest first.
    pub fn set_todo(&self, shas: &[&str]) {
        let mut repo = self.repo.lock();
        repo.todo = shas.iter().map(|s| pending(s)).collect();
        repo.rebase_progress = (!shas.is_empty()).then_some(0);
    }

    pub fn todo(&self) -> Vec<Commit> {
        self.repo.lock().todo.clone()
    }

    pub fn set_branches(&self, branches: Vec<Branch>) {
        self.repo.lock().branches = branches;
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.repo.lock().branches.iter().map(|b| b.name.clone()).collect()
    }

    pub fn checked_out(&self) -> Option<String> {
        self.repo
            .lock()
            .branches
            .iter()
            .find(|b| b.is_checked_out)
            .map(|b| b.name.clone())
    }

    pub fn set_reflog(&self, reflog: Vec<ReflogEntry>) {
        self.repo.lock().reflog = reflog;
    }

    pub fn set_unmerged(&self, name: &str) {
        self.repo.lock().unmerged.insert(name.to_string());
    }

    pub fn set_rebase_progress(&self, progress: Option<usize>) {
        self.repo.lock().rebase_progress = progress;
    }

    pub fn set_merge_in_progress(&self, on: bool) {
        self.repo.lock().merge_in_progress = on;
    }

    pub fn set_head_detached(&self, on: bool) {
        self.repo.lock().head_detached = on;
    }

    pub fn set_dirty(&self, on: bool) {
        self.repo.lock().dirty = on;
    }

    pub fn is_dirty(&self) -> bool {
        self.repo.lock().dirty
    }

    pub fn stash(&self) -> Vec<String> {
        self.repo.lock().stash.clone()
    }

    pub fn set_summary(&self, sha: &str, summary: &str) {
        self.repo
            .lock()
            .summaries
            .insert(sha.to_string(), summary.to_string());
    }

    pub fn last_commit_limit(&self) -> Option<Option<usize>> {
        self.repo.lock().last_commit_options.as_ref().map(|o| o.limit)
    }

    pub fn last_commit_options(&self) -> Option<CommitLoadOptions> {
        self.repo.lock().last_commit_options.clone()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.repo.lock().tags.iter().map(|t| t.name.clone()).collect()
    }
}

impl EntityLoader for FakeGit {
    fn load_commits(&self, options: &CommitLoadOptions) -> Result<Vec<Commit>, GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("load_commits limit={:?}", options.limit), "load_commits")?;
        repo.last_commit_options = Some(options.clone());

        let limit = options.limit.unwrap_or(usize::MAX);
        let mut out = if options.include_rebase_entries {
            repo.todo.clone()
        } else {
            Vec::new()
        };
        out.extend(repo.commits.iter().take(limit).cloned());
        Ok(out)
    }

    fn load_rebasing_commits(&self) -> Result<Vec<Commit>, GitError> {
        let mut repo = self.repo.lock();
        repo.record("load_rebasing_commits".to_string(), "load_rebasing_commits")?;
        Ok(repo.todo.clone())
    }

    fn load_branches(&self, reflog: &[ReflogEntry]) -> Result<Vec<Branch>, GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("load_branches reflog={}", reflog.len()), "load_branches")?;
        Ok(sort_by_recency(repo.branches.clone(), reflog, 0))
    }

    fn load_reflog(&self, _filter_path: Option<&Path>) -> Result<Vec<ReflogEntry>, GitError> {
        let mut repo = self.repo.lock();
        repo.record("load_reflog".to_string(), "load_reflog")?;
        Ok(repo.reflog.clone())
    }

    fn load_tags(&self) -> Result<Vec<Tag>, GitError> {
        let mut repo = self.repo.lock();
        repo.record("load_tags".to_string(), "load_tags")?;
        Ok(repo.tags.clone())
    }
}

impl GitGateway for FakeGit {
    fn checkout(&self, reference: &str, options: &CheckoutOptions) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        let call = if options.force {
            format!("checkout --force {}", reference)
        } else {
            format!("checkout {}", reference)
        };
        repo.record(call, "checkout")?;

        let is_branch = repo.branches.iter().any(|b| b.name == reference);
        let is_commit = repo.commits.iter().any(|c| c.sha == reference);
        if !is_branch && !is_commit {
            return Err(GitError::RefNotFound(reference.to_string()));
        }
        if repo.dirty && !options.force {
            return Err(GitError::DirtyWorkingTree);
        }
        if options.force {
            repo.dirty = false;
        }
        if is_branch {
            repo.check_out(reference);
        } else {
            for b in &mut repo.branches {
                b.is_checked_out = false;
            }
            repo.head_detached = true;
        }
        Ok(())
    }

    fn interactive_rebase(
        &self,
        _commits: &[Commit],
        index: usize,
        action: TodoAction,
    ) -> Result<(), GitError> {
        self.repo
            .lock()
            .record(format!("interactive_rebase {} {}", index, action), "interactive_rebase")
    }

    fn move_commit_down(&self, _commits: &[Commit], index: usize) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("move_commit_down {}", index), "move_commit_down")?;
        if index + 1 < repo.commits.len() {
            repo.commits.swap(index, index + 1);
        }
        Ok(())
    }

    fn move_todo_entry(&self, index: usize, direction: Direction) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(
            format!("move_todo_entry {} {:?}", index, direction),
            "move_todo_entry",
        )?;
        let lower = match direction {
            Direction::Down => index,
            Direction::Up => index.checked_sub(1).ok_or_else(|| {
                GitError::InvalidOperation("cannot move the top todo entry up".to_string())
            })?,
        };
        if lower + 1 >= repo.todo.len() {
            return Err(GitError::InvalidOperation("no entry below".to_string()));
        }
        repo.todo.swap(lower, lower + 1);
        Ok(())
    }

    fn edit_todo_action(&self, index: usize, action: TodoAction) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("edit_todo_action {} {}", index, action), "edit_todo_action")?;
        match repo.todo.get_mut(index) {
            Some(entry) => {
                entry.status = CommitStatus::Rebasing(action);
                Ok(())
            }
            None => Err(GitError::InvalidOperation(format!("no todo entry {}", index))),
        }
    }

    fn reword_commit(
        &self,
        _commits: &[Commit],
        index: usize,
        message: &str,
    ) -> Result<(), GitError> {
        self.repo
            .lock()
            .record(format!("reword_commit {} {}", index, message), "reword_commit")
    }

    fn amend_to(&self, sha: &str) -> Result<(), GitError> {
        self.repo.lock().record(format!("amend_to {}", sha), "amend_to")
    }

    fn squash_all_above_fixups(&self, sha: &str) -> Result<(), GitError> {
        self.repo
            .lock()
            .record(format!("squash_all_above_fixups {}", sha), "squash_all_above_fixups")
    }

    fn rebase_branch(&self, name: &str) -> Result<(), GitError> {
        self.repo.lock().record(format!("rebase_branch {}", name), "rebase_branch")
    }

    fn rebase_command(&self, command: RebaseCommand) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("rebase_command {}", command.as_arg()), "rebase_command")?;
        if repo.rebase_progress.is_none() && !repo.merge_in_progress {
            return Err(GitError::InvalidOperation(
                "No rebase or merge in progress".to_string(),
            ));
        }
        if command == RebaseCommand::Abort {
            repo.rebase_progress = None;
            repo.merge_in_progress = false;
            repo.todo.clear();
        }
        Ok(())
    }

    fn rebase_progress(&self) -> Result<Option<usize>, GitError> {
        let mut repo = self.repo.lock();
        repo.record("rebase_progress".to_string(), "rebase_progress")?;
        Ok(repo.rebase_progress)
    }

    fn merge_in_progress(&self) -> Result<bool, GitError> {
        let mut repo = self.repo.lock();
        repo.record("merge_in_progress".to_string(), "merge_in_progress")?;
        Ok(repo.merge_in_progress)
    }

    fn revert(&self, sha: &str) -> Result<(), GitError> {
        self.repo.lock().record(format!("revert {}", sha), "revert")
    }

    fn revert_merge(&self, sha: &str, parent_number: usize) -> Result<(), GitError> {
        self.repo
            .lock()
            .record(format!("revert_merge {} {}", sha, parent_number), "revert_merge")
    }

    fn create_fixup_commit(&self, sha: &str) -> Result<(), GitError> {
        self.repo
            .lock()
            .record(format!("create_fixup_commit {}", sha), "create_fixup_commit")
    }

    fn create_tag(&self, name: &str, sha: &str, message: Option<&str>) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(
            format!("create_tag {} {} {:?}", name, sha, message),
            "create_tag",
        )?;
        repo.tags.insert(
            0,
            Tag {
                name: name.to_string(),
                sha: sha.to_string(),
                message: message.unwrap_or_default().to_string(),
            },
        );
        Ok(())
    }

    fn commit_first_line(&self, sha: &str) -> Result<String, GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("commit_first_line {}", sha), "commit_first_line")?;
        if let Some(s) = repo.summaries.get(sha) {
            return Ok(s.clone());
        }
        repo.commits
            .iter()
            .find(|c| c.sha == sha)
            .map(|c| c.summary.clone())
            .ok_or_else(|| GitError::RefNotFound(sha.to_string()))
    }

    fn bisect_info(&self) -> Result<BisectInfo, GitError> {
        let mut repo = self.repo.lock();
        repo.record("bisect_info".to_string(), "bisect_info")?;
        Ok(repo.bisect.clone())
    }

    fn bisect_start(&self) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record("bisect_start".to_string(), "bisect_start")?;
        let start = repo
            .branches
            .iter()
            .find(|b| b.is_checked_out)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| "HEAD".to_string());
        repo.bisect.start_ref = Some(start);
        Ok(())
    }

    fn bisect_mark(&self, reference: &str, term: &str) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("bisect_mark {} {}", reference, term), "bisect_mark")?;
        let status = if term == repo.bisect.new_term {
            repo.bisect.statuses.retain(|_, s| *s != BisectStatus::New);
            BisectStatus::New
        } else {
            BisectStatus::Old
        };
        repo.bisect.statuses.insert(reference.to_string(), status);
        Ok(())
    }

    fn bisect_skip(&self, reference: &str) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("bisect_skip {}", reference), "bisect_skip")?;
        repo.bisect
            .statuses
            .insert(reference.to_string(), BisectStatus::Skipped);
        Ok(())
    }

    fn bisect_reset(&self) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record("bisect_reset".to_string(), "bisect_reset")?;
        repo.bisect = BisectInfo::default();
        Ok(())
    }

    fn bisect_rev_list(&self, sha: &str) -> Result<Vec<String>, GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("bisect_rev_list {}", sha), "bisect_rev_list")?;
        let shas: Vec<String> = repo.commits.iter().map(|c| c.sha.clone()).collect();
        Ok(shas
            .iter()
            .position(|s| s == sha)
            .map(|pos| shas[pos..].to_vec())
            .unwrap_or_default())
    }

    fn stash_save(&self, message: &str) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("stash_save {}", message), "stash_save")?;
        repo.stash.insert(0, message.to_string());
        repo.dirty = false;
        Ok(())
    }

    fn stash_pop(&self, index: usize) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("stash_pop {}", index), "stash_pop")?;
        if index >= repo.stash.len() {
            return Err(GitError::ExternalToolFailure(
                "No stash entries found.".to_string(),
            ));
        }
        repo.stash.remove(index);
        repo.dirty = true;
        Ok(())
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("delete_branch {} force={}", name, force), "delete_branch")?;
        if !force && repo.unmerged.contains(name) {
            return Err(GitError::UnmergedBranch(name.to_string()));
        }
        repo.branches.retain(|b| b.name != name);
        Ok(())
    }

    fn new_branch(&self, name: &str, base: &str) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("new_branch {} {}", name, base), "new_branch")?;
        repo.branches.push(Branch::local(name));
        repo.check_out(name);
        Ok(())
    }

    fn rename_branch(&self, old: &str, new: &str) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(format!("rename_branch {} {}", old, new), "rename_branch")?;
        match repo.branches.iter_mut().find(|b| b.name == old) {
            Some(b) => {
                b.name = new.to_string();
                Ok(())
            }
            None => Err(GitError::RefNotFound(old.to_string())),
        }
    }

    fn merge(&self, name: &str) -> Result<(), GitError> {
        self.repo.lock().record(format!("merge {}", name), "merge")
    }

    fn pull(&self) -> Result<(), GitError> {
        self.repo.lock().record("pull".to_string(), "pull")
    }

    fn pull_fast_forward_only(&self) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record("pull --ff-only".to_string(), "pull")?;
        if let Some(b) = repo.branches.iter_mut().find(|b| b.is_checked_out) {
            b.behind = b.behind.map(|_| 0);
        }
        Ok(())
    }

    fn fetch(&self) -> Result<(), GitError> {
        self.repo.lock().record("fetch".to_string(), "fetch")
    }

    fn fast_forward(&self, name: &str, remote: &str, upstream: &str) -> Result<(), GitError> {
        let mut repo = self.repo.lock();
        repo.record(
            format!("fast_forward {} {}/{}", name, remote, upstream),
            "fast_forward",
        )?;
        if let Some(b) = repo.branches.iter_mut().find(|b| b.name == name) {
            b.behind = b.behind.map(|_| 0);
        }
        Ok(())
    }

    fn reset_to(&self, reference: &str, strength: ResetStrength) -> Result<(), GitError> {
        self.repo.lock().record(
            format!("reset_to {} {}", reference, strength.as_flag()),
            "reset_to",
        )
    }

    fn is_head_detached(&self) -> Result<bool, GitError> {
        let mut repo = self.repo.lock();
        repo.record("is_head_detached".to_string(), "is_head_detached")?;
        Ok(repo.head_detached)
    }
}

/// Answers prompts from a script, falling back to a fixed reply.
pub struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    choices: Mutex<VecDeque<Option<usize>>>,
    default_confirm: bool,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    /// Says yes to everything not scripted.
    pub fn accepting() -> Self {
        Self::with_default(true)
    }

    /// Says no to everything not scripted.
    pub fn declining() -> Self {
        Self::with_default(false)
    }

    fn with_default(default_confirm: bool) -> Self {
        Self {
            confirms: Mutex::new(VecDeque::new()),
            choices: Mutex::new(VecDeque::new()),
            default_confirm,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn confirm_next(&self, answer: bool) {
        self.confirms.lock().push_back(answer);
    }

    pub fn choose_next(&self, answer: Option<usize>) {
        self.choices.lock().push_back(answer);
    }

    /// Titles of every prompt shown, followed by its body or options.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, title: &str, body: &str) -> bool {
        self.asked.lock().push(format!("{}: {}", title, body));
        self.confirms
            .lock()
            .pop_front()
            .unwrap_or(self.default_confirm)
    }

    fn choose(&self, title: &str, options: &[String]) -> Option<usize> {
        self.asked
            .lock()
            .push(format!("{}: {}", title, options.join(" | ")));
        self.choices.lock().pop_front().unwrap_or(None)
    }
}
