//! Everything an action needs about the open repository, passed explicitly.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::command_log::{CommandLog, CommandLogEntry};
use crate::config::EngineConfig;
use crate::error::GitError;
use crate::git_ops::{GitCli, GitGateway, run_blocking};
use crate::loaders::{EntityLoader, GitLoaders};
use crate::models::{Branch, Commit};
use crate::prompt::Prompter;
use crate::refresh::{RefreshCoordinator, RefreshScope};
use crate::selection::PanelTag;
use crate::state::{self, PendingActionState};
use crate::summary_cache::SummaryCache;

pub struct Session {
    repo_root: PathBuf,
    git: Arc<dyn GitGateway>,
    coordinator: RefreshCoordinator,
    prompter: Arc<dyn Prompter>,
    config: EngineConfig,
    log: Mutex<CommandLog>,
    summaries: Arc<SummaryCache>,
}

impl Session {
    /// Must be called inside a tokio runtime; spawns the refresh coordinator.
    pub fn new(
        repo_root: impl Into<PathBuf>,
        git: Arc<dyn GitGateway>,
        loaders: Arc<dyn EntityLoader>,
        prompter: Arc<dyn Prompter>,
        config: EngineConfig,
    ) -> Self {
        let coordinator = RefreshCoordinator::spawn(loaders, &config);
        Self {
            repo_root: repo_root.into(),
            git,
            coordinator,
            prompter,
            summaries: Arc::new(SummaryCache::new(config.summary_cache_size)),
            config,
            log: Mutex::new(CommandLog::new()),
        }
    }

    /// A session backed by the `git` binary.
    pub fn open(
        repo_root: impl Into<PathBuf>,
        prompter: Arc<dyn Prompter>,
        config: EngineConfig,
    ) -> Self {
        let repo_root = repo_root.into();
        let git = Arc::new(GitCli::new(repo_root.clone()));
        let loaders = Arc::new(GitLoaders::new(repo_root.clone(), config.reflog_limit));
        Self::new(repo_root, git, loaders, prompter, config)
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    pub fn command_log(&self) -> Vec<CommandLogEntry> {
        self.log.lock().entries().cloned().collect()
    }

    /// Read from git's on-disk state. Never cached.
    pub async fn pending_action_state(&self) -> Result<PendingActionState, GitError> {
        self.query(|g| state::pending_action_state(g)).await
    }

    pub fn panel_selection(&self, tag: PanelTag) -> Option<usize> {
        self.coordinator.selection(tag)
    }

    pub fn commits(&self) -> Arc<Vec<Commit>> {
        self.coordinator.snapshot().commits
    }

    pub fn selected_commit(&self) -> Option<(usize, Commit)> {
        let index = self.panel_selection(PanelTag::Commits)?;
        let commits = self.commits();
        commits.get(index).cloned().map(|c| (index, c))
    }

    pub fn selected_branch(&self) -> Option<(usize, Branch)> {
        let index = self.panel_selection(PanelTag::Branches)?;
        let branches = self.coordinator.snapshot().branches;
        branches.get(index).cloned().map(|b| (index, b))
    }

    pub fn checked_out_branch(&self) -> Option<Branch> {
        self.coordinator
            .snapshot()
            .branches
            .iter()
            .find(|b| b.is_checked_out)
            .cloned()
    }

    /// Run a mutating gateway call and record it in the command log.
    pub(crate) async fn git<T, F>(&self, action: &str, f: F) -> Result<T, GitError>
    where
        F: FnOnce(&dyn GitGateway) -> Result<T, GitError> + Send + 'static,
        T: Send + 'static,
    {
        let git = self.git.clone();
        let result = run_blocking(move || f(git.as_ref())).await;
        if let Err(error) = &result {
            debug!(action, %error, "git call failed");
        }
        self.log.lock().push(action, &result);
        result
    }

    /// Run a read-only gateway call.
    pub(crate) async fn query<T, F>(&self, f: F) -> Result<T, GitError>
    where
        F: FnOnce(&dyn GitGateway) -> Result<T, GitError> + Send + 'static,
        T: Send + 'static,
    {
        let git = self.git.clone();
        run_blocking(move || f(git.as_ref())).await
    }

    pub(crate) async fn commit_summary(&self, sha: &str) -> Result<String, GitError> {
        let cache = self.summaries.clone();
        let git = self.git.clone();
        let sha = sha.to_string();
        run_blocking(move || cache.get_or_load(&sha, || git.commit_first_line(&sha))).await
    }

    /// Ask the coordinator for a reload. Failures are reported on the
    /// coordinator's event stream, so they are only logged here.
    pub(crate) async fn refresh(&self, scope: RefreshScope) -> RefreshScope {
        if let Err(error) = self.coordinator.refresh(scope.clone()).await {
            warn!(%error, panels = ?scope.panels, "refresh after action failed");
        }
        scope
    }

    /// A new HEAD invalidates positions and any deep history already loaded.
    pub(crate) fn reset_after_checkout(&self) {
        self.coordinator.with_selections(|s| {
            s.get_mut(PanelTag::Branches).reset();
            s.get_mut(PanelTag::Commits).reset();
        });
        self.coordinator.set_limit_commits(true);
    }

    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}
