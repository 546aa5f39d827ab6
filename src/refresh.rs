//! Refresh coordinator: the single owner of the commits, branches, tags and
//! reflog lists.
//!
//! A background task receives refresh requests over a channel and handles
//! them one at a time, so two reloads never race on the same list. Everyone
//! else reads `Arc` snapshots. Each reload replaces a list wholesale and
//! reconciles that panel's selection before the lock is released.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, LogOrder};
use crate::error::GitError;
use crate::git_ops::run_blocking;
use crate::loaders::{CommitLoadOptions, EntityLoader, merge_rebasing_commits};
use crate::models::{Branch, Commit, ReflogEntry, Tag};
use crate::selection::{PanelTag, Selections};

/// Selecting a commit past this row lifts the history limit.
pub const COMMIT_THRESHOLD: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshMode {
    /// Queue the reload and return immediately.
    Async,
    /// Return once the reload has finished.
    Sync,
    /// Like `Sync`, with the UI told to hold its frames until done.
    BlockUi,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshScope {
    /// Empty means every panel.
    pub panels: Vec<PanelTag>,
    pub mode: RefreshMode,
}

impl RefreshScope {
    pub fn all(mode: RefreshMode) -> Self {
        Self {
            panels: Vec::new(),
            mode,
        }
    }

    pub fn of(panels: &[PanelTag], mode: RefreshMode) -> Self {
        Self {
            panels: panels.to_vec(),
            mode,
        }
    }

    pub fn includes(&self, tag: PanelTag) -> bool {
        self.panels.is_empty() || self.panels.contains(&tag)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupStage {
    /// Branches are sorted with whatever reflog was at hand.
    Initial,
    /// The full reflog has been loaded once; every refresh now reloads it.
    Complete,
}

#[derive(Clone, Debug)]
pub struct PanelSnapshot {
    pub commits: Arc<Vec<Commit>>,
    pub branches: Arc<Vec<Branch>>,
    pub tags: Arc<Vec<Tag>>,
    pub reflog: Arc<Vec<ReflogEntry>>,
    pub stage: StartupStage,
}

impl Default for PanelSnapshot {
    fn default() -> Self {
        Self {
            commits: Arc::default(),
            branches: Arc::default(),
            tags: Arc::default(),
            reflog: Arc::default(),
            stage: StartupStage::Initial,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelEvent {
    Refreshed {
        panels: Vec<PanelTag>,
        mode: RefreshMode,
    },
    RefreshFailed {
        error: GitError,
    },
    StartupComplete,
}

enum Request {
    Refresh {
        scope: RefreshScope,
        done: Option<oneshot::Sender<Result<(), GitError>>>,
    },
    StartupReflog(Result<Vec<ReflogEntry>, GitError>),
}

struct Shared {
    snapshot: RwLock<PanelSnapshot>,
    selections: Mutex<Selections>,
    limit_commits: AtomicBool,
    show_whole_graph: AtomicBool,
    log_order: Mutex<LogOrder>,
    filter_path: Mutex<Option<PathBuf>>,
    events: broadcast::Sender<PanelEvent>,
    ui_blocked: watch::Sender<bool>,
}

/// Cloneable handle to the coordinator task.
#[derive(Clone)]
pub struct RefreshCoordinator {
    tx: mpsc::UnboundedSender<Request>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl RefreshCoordinator {
    /// Spawn the coordinator task. Must be called inside a tokio runtime.
    pub fn spawn(loaders: Arc<dyn EntityLoader>, config: &EngineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let (ui_blocked, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            snapshot: RwLock::new(PanelSnapshot::default()),
            selections: Mutex::new(Selections::default()),
            limit_commits: AtomicBool::new(true),
            show_whole_graph: AtomicBool::new(config.show_whole_graph),
            log_order: Mutex::new(config.log_order),
            filter_path: Mutex::new(None),
            events,
            ui_blocked,
        });
        let cancel = CancellationToken::new();

        let actor = Actor {
            loaders,
            shared: shared.clone(),
            tx: tx.clone(),
            cancel: cancel.clone(),
            commit_limit: config.commit_limit,
            startup_reflog_started: false,
        };
        tokio::spawn(actor.run(rx));

        Self { tx, shared, cancel }
    }

    /// Reload the panels in `scope`.
    ///
    /// `Async` returns once the request is queued. `Sync` and `BlockUi` wait
    /// for the reload and report its error, if any.
    pub async fn refresh(&self, scope: RefreshScope) -> Result<(), GitError> {
        if scope.mode == RefreshMode::Async {
            return self.send(Request::Refresh { scope, done: None });
        }

        let (done_tx, done_rx) = oneshot::channel();
        self.send(Request::Refresh {
            scope,
            done: Some(done_tx),
        })?;
        done_rx.await.map_err(|_| stopped())?
    }

    fn send(&self, request: Request) -> Result<(), GitError> {
        self.tx.send(request).map_err(|_| stopped())
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        self.shared.snapshot.read().clone()
    }

    pub fn stage(&self) -> StartupStage {
        self.shared.snapshot.read().stage
    }

    pub fn selection(&self, tag: PanelTag) -> Option<usize> {
        self.shared.selections.lock().index(tag)
    }

    /// Run `f` with the selections locked.
    pub fn with_selections<R>(&self, f: impl FnOnce(&mut Selections) -> R) -> R {
        f(&mut self.shared.selections.lock())
    }

    pub fn events(&self) -> BroadcastStream<PanelEvent> {
        BroadcastStream::new(self.shared.events.subscribe())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.shared.events.subscribe()
    }

    /// `true` while a UI-blocking refresh is running.
    pub fn ui_blocked(&self) -> watch::Receiver<bool> {
        self.shared.ui_blocked.subscribe()
    }

    pub fn limit_commits(&self) -> bool {
        self.shared.limit_commits.load(Ordering::SeqCst)
    }

    /// Turn the history limit back on. The next commits reload is short.
    pub fn set_limit_commits(&self, on: bool) {
        self.shared.limit_commits.store(on, Ordering::SeqCst);
    }

    /// Lift the history limit and queue one full commits reload.
    ///
    /// Returns `false` when the limit was already lifted; nothing is queued
    /// then.
    pub fn lift_commit_limit(&self) -> bool {
        if !self.shared.limit_commits.swap(false, Ordering::SeqCst) {
            return false;
        }
        info!("lifting commit limit");
        let _ = self.send(Request::Refresh {
            scope: RefreshScope::of(&[PanelTag::Commits], RefreshMode::Async),
            done: None,
        });
        true
    }

    /// The user moved the cursor in `tag`. Returns whether a full history
    /// reload was triggered.
    pub fn on_select(&self, tag: PanelTag, index: usize) -> bool {
        self.with_selections(|s| s.get_mut(tag).select(index));
        tag.selection_panel() == PanelTag::Commits
            && index > COMMIT_THRESHOLD
            && self.lift_commit_limit()
    }

    pub fn show_whole_graph(&self) -> bool {
        self.shared.show_whole_graph.load(Ordering::SeqCst)
    }

    /// Show every ref's history instead of HEAD's. Turning the graph on
    /// lifts the history limit. Returns once commits are reloaded.
    pub async fn set_show_whole_graph(&self, on: bool) -> Result<(), GitError> {
        self.shared.show_whole_graph.store(on, Ordering::SeqCst);
        if on {
            self.shared.limit_commits.store(false, Ordering::SeqCst);
        }
        info!(on, "whole graph toggled");
        self.refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync))
            .await
    }

    pub fn log_order(&self) -> LogOrder {
        *self.shared.log_order.lock()
    }

    /// Change the commit sort order. Returns once commits are reloaded.
    pub async fn set_log_order(&self, order: LogOrder) -> Result<(), GitError> {
        *self.shared.log_order.lock() = order;
        info!(?order, "log order changed");
        self.refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync))
            .await
    }

    /// Restrict commits and reflog to history touching `path`.
    pub fn set_filter_path(&self, path: Option<PathBuf>) {
        *self.shared.filter_path.lock() = path;
    }

    pub fn filter_path(&self) -> Option<PathBuf> {
        self.shared.filter_path.lock().clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn stopped() -> GitError {
    GitError::ExternalToolFailure("refresh coordinator stopped".to_string())
}

struct Actor {
    loaders: Arc<dyn EntityLoader>,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Request>,
    cancel: CancellationToken,
    commit_limit: usize,
    startup_reflog_started: bool,
}

type BranchLoad = Result<(Option<Vec<ReflogEntry>>, Vec<Branch>), GitError>;

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Request>) {
        loop {
            let request = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                r = rx.recv() => match r {
                    Some(r) => r,
                    None => break,
                },
            };

            match request {
                Request::Refresh { scope, done } => {
                    let result = self.refresh(&scope).await;
                    if let Some(done) = done {
                        let _ = done.send(result);
                    }
                    self.maybe_start_reflog_load();
                }
                Request::StartupReflog(result) => self.finish_startup(result).await,
            }
        }
        debug!("refresh coordinator stopped");
    }

    fn commit_options(&self) -> CommitLoadOptions {
        let limit = self
            .shared
            .limit_commits
            .load(Ordering::SeqCst)
            .then_some(self.commit_limit);
        CommitLoadOptions {
            limit,
            filter_path: self.shared.filter_path.lock().clone(),
            all_refs: self.shared.show_whole_graph.load(Ordering::SeqCst),
            order: *self.shared.log_order.lock(),
            ..CommitLoadOptions::default()
        }
    }

    async fn refresh(&self, scope: &RefreshScope) -> Result<(), GitError> {
        debug!(panels = ?scope.panels, mode = ?scope.mode, "refresh");
        let blocking = scope.mode == RefreshMode::BlockUi;
        if blocking {
            self.shared.ui_blocked.send_replace(true);
        }

        let want_commits = scope.includes(PanelTag::Commits);
        let want_pending = !want_commits && scope.includes(PanelTag::RebaseCommits);
        let want_branches = scope.includes(PanelTag::Branches) || scope.includes(PanelTag::Reflog);

        let commits = async {
            if want_commits {
                let loaders = self.loaders.clone();
                let options = self.commit_options();
                Some(run_blocking(move || loaders.load_commits(&options)).await)
            } else if want_pending {
                let loaders = self.loaders.clone();
                Some(run_blocking(move || loaders.load_rebasing_commits()).await)
            } else {
                None
            }
        };
        let branches = async {
            if want_branches {
                Some(self.load_branches().await)
            } else {
                None
            }
        };
        let tags = async {
            if scope.includes(PanelTag::Tags) {
                let loaders = self.loaders.clone();
                Some(run_blocking(move || loaders.load_tags()).await)
            } else {
                None
            }
        };
        let (commits, branches, tags) = tokio::join!(commits, branches, tags);

        let mut first_error = None;
        {
            let mut selections = self.shared.selections.lock();
            let mut snap = self.shared.snapshot.write();

            match commits {
                Some(Ok(list)) => {
                    let list = if want_pending {
                        merge_rebasing_commits(&snap.commits, list)
                    } else {
                        list
                    };
                    selections.get_mut(PanelTag::Commits).reconcile_items(&list);
                    snap.commits = Arc::new(list);
                }
                Some(Err(e)) => first_error = Some(e),
                None => {}
            }

            match branches {
                Some(Ok((reflog, list))) => {
                    if let Some(reflog) = reflog {
                        selections.get_mut(PanelTag::Reflog).reconcile_items(&reflog);
                        snap.reflog = Arc::new(reflog);
                    }
                    selections.get_mut(PanelTag::Branches).reconcile_items(&list);
                    snap.branches = Arc::new(list);
                }
                Some(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => {}
            }

            match tags {
                Some(Ok(list)) => {
                    selections.get_mut(PanelTag::Tags).reconcile_items(&list);
                    snap.tags = Arc::new(list);
                }
                Some(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => {}
            }
        }

        let panels = scope.panels.clone();
        let result = match first_error {
            Some(error) => {
                warn!(%error, "refresh failed; keeping previous lists");
                let _ = self.shared.events.send(PanelEvent::RefreshFailed {
                    error: error.clone(),
                });
                Err(error)
            }
            None => {
                let _ = self.shared.events.send(PanelEvent::Refreshed {
                    panels,
                    mode: scope.mode,
                });
                Ok(())
            }
        };

        if blocking {
            self.shared.ui_blocked.send_replace(false);
        }
        result
    }

    /// Reflog then branches, so recency is computed from one consistent
    /// reflog. Until startup completes the reflog already held is reused.
    async fn load_branches(&self) -> BranchLoad {
        let loaders = self.loaders.clone();
        let (stage, held) = {
            let snap = self.shared.snapshot.read();
            (snap.stage, snap.reflog.clone())
        };

        if stage == StartupStage::Initial {
            let branches = run_blocking(move || loaders.load_branches(&held)).await?;
            return Ok((None, branches));
        }

        let filter = self.shared.filter_path.lock().clone();
        run_blocking(move || {
            let reflog = loaders.load_reflog(filter.as_deref())?;
            let branches = loaders.load_branches(&reflog)?;
            Ok((Some(reflog), branches))
        })
        .await
    }

    fn maybe_start_reflog_load(&mut self) {
        if self.startup_reflog_started || self.shared.snapshot.read().stage != StartupStage::Initial {
            return;
        }
        self.startup_reflog_started = true;

        let loaders = self.loaders.clone();
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                r = run_blocking(move || loaders.load_reflog(None)) => r,
            };
            let _ = tx.send(Request::StartupReflog(result));
        });
    }

    async fn finish_startup(&mut self, result: Result<Vec<ReflogEntry>, GitError>) {
        let reflog = match result {
            Ok(reflog) => reflog,
            Err(error) => {
                warn!(%error, "startup reflog load failed");
                let _ = self.shared.events.send(PanelEvent::RefreshFailed { error });
                self.shared.snapshot.write().stage = StartupStage::Complete;
                return;
            }
        };

        let loaders = self.loaders.clone();
        let for_sort = reflog.clone();
        let branches = run_blocking(move || loaders.load_branches(&for_sort)).await;

        {
            let mut selections = self.shared.selections.lock();
            let mut snap = self.shared.snapshot.write();
            selections.get_mut(PanelTag::Reflog).reconcile_items(&reflog);
            snap.reflog = Arc::new(reflog);
            match branches {
                Ok(list) => {
                    selections.get_mut(PanelTag::Branches).reconcile_items(&list);
                    snap.branches = Arc::new(list);
                }
                Err(error) => {
                    warn!(%error, "re-sorting branches after startup failed");
                }
            }
            snap.stage = StartupStage::Complete;
        }

        info!("startup complete");
        let _ = self.shared.events.send(PanelEvent::StartupComplete);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_ops::GitGateway;
    use crate::testing::{FakeGit, branch, commit, reflog_checkout};
    use futures::StreamExt;
    use std::time::Duration;

    fn coordinator(git: &Arc<FakeGit>) -> RefreshCoordinator {
        RefreshCoordinator::spawn(git.clone(), &EngineConfig::default())
    }

    async fn wait_for(rc: &mut BroadcastStream<PanelEvent>, want: PanelEvent) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(ev) = rc.next().await {
                if ev.ok() == Some(want.clone()) {
                    return;
                }
            }
        })
        .await
        .expect("event not seen");
    }

    #[tokio::test]
    async fn sync_refresh_replaces_lists_and_reconciles() {
        let git = Arc::new(FakeGit::new());
        git.set_commits(vec![commit("c3"), commit("c2"), commit("c1")]);
        git.set_branches(vec![branch("main", true), branch("dev", false)]);
        let rc = coordinator(&git);

        rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.unwrap();
        let snap = rc.snapshot();
        assert_eq!(snap.commits.len(), 3);
        assert_eq!(snap.branches.len(), 2);
        assert_eq!(rc.selection(PanelTag::Commits), Some(0));

        rc.with_selections(|s| s.get_mut(PanelTag::Commits).select(2));
        git.set_commits(vec![commit("c1")]);
        rc.refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync))
            .await
            .unwrap();
        assert_eq!(rc.selection(PanelTag::Commits), Some(0));

        git.set_commits(Vec::new());
        rc.refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync))
            .await
            .unwrap();
        assert_eq!(rc.selection(PanelTag::Commits), None);
    }

    #[tokio::test]
    async fn async_requests_are_processed_in_order() {
        let git = Arc::new(FakeGit::new());
        let rc = coordinator(&git);

        git.set_commits(vec![commit("a")]);
        rc.refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Async))
            .await
            .unwrap();
        // The sync request queues behind the async one.
        rc.refresh(RefreshScope::of(&[PanelTag::Branches], RefreshMode::Sync))
            .await
            .unwrap();
        assert_eq!(rc.snapshot().commits.len(), 1);
    }

    #[tokio::test]
    async fn block_ui_raises_flag_and_emits_event() {
        let git = Arc::new(FakeGit::new());
        let rc = coordinator(&git);
        let mut events = rc.subscribe();
        let mut blocked = rc.ui_blocked();

        rc.refresh(RefreshScope::all(RefreshMode::BlockUi)).await.unwrap();

        assert!(blocked.has_changed().unwrap());
        assert!(!*blocked.borrow_and_update());
        assert_eq!(
            events.try_recv().unwrap(),
            PanelEvent::Refreshed {
                panels: Vec::new(),
                mode: RefreshMode::BlockUi
            }
        );
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_list() {
        let git = Arc::new(FakeGit::new());
        git.set_commits(vec![commit("c1")]);
        let rc = coordinator(&git);
        rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.unwrap();

        git.fail_next("load_commits", GitError::ExternalToolFailure("boom".to_string()));
        let err = rc
            .refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync))
            .await
            .unwrap_err();
        assert_eq!(err, GitError::ExternalToolFailure("boom".to_string()));
        assert_eq!(rc.snapshot().commits.len(), 1);
    }

    #[tokio::test]
    async fn startup_sorts_branches_twice() {
        let git = Arc::new(FakeGit::new());
        git.set_branches(vec![
            branch("main", true),
            branch("alpha", false),
            branch("beta", false),
        ]);
        git.set_reflog(vec![reflog_checkout("beta", "main", 100)]);
        let rc = coordinator(&git);
        let mut events = rc.events();

        rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.unwrap();
        wait_for(&mut events, PanelEvent::StartupComplete).await;

        assert_eq!(rc.stage(), StartupStage::Complete);
        let names: Vec<_> = rc.snapshot().branches.iter().map(|b| b.name.clone()).collect();
        assert_eq!(names, vec!["main", "beta", "alpha"]);

        let loads: Vec<_> = git
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("load_branches") || c.starts_with("load_reflog"))
            .collect();
        assert_eq!(
            loads,
            vec!["load_branches reflog=0", "load_reflog", "load_branches reflog=1"]
        );

        // After startup each refresh reloads the reflog itself.
        rc.refresh(RefreshScope::of(&[PanelTag::Branches], RefreshMode::Sync))
            .await
            .unwrap();
        assert_eq!(
            git.calls().iter().filter(|c| c.as_str() == "load_reflog").count(),
            2
        );
    }

    #[tokio::test]
    async fn commit_limit_lifts_once() {
        let git = Arc::new(FakeGit::new());
        let rc = coordinator(&git);
        rc.refresh(RefreshScope::of(&[PanelTag::Commits], RefreshMode::Sync))
            .await
            .unwrap();
        assert_eq!(git.last_commit_limit(), Some(Some(300)));

        assert!(!rc.on_select(PanelTag::Commits, COMMIT_THRESHOLD - 1));
        assert!(!rc.on_select(PanelTag::Commits, COMMIT_THRESHOLD));
        assert!(rc.limit_commits());
        assert!(rc.on_select(PanelTag::Commits, COMMIT_THRESHOLD + 1));
        assert!(!rc.on_select(PanelTag::Commits, COMMIT_THRESHOLD + 10));
        assert!(!rc.lift_commit_limit());

        rc.refresh(RefreshScope::of(&[PanelTag::Branches], RefreshMode::Sync))
            .await
            .unwrap();
        assert_eq!(git.last_commit_limit(), Some(None));
        assert_eq!(
            git.calls().iter().filter(|c| c.starts_with("load_commits")).count(),
            2
        );

        rc.set_limit_commits(true);
        assert!(rc.lift_commit_limit());
    }

    #[tokio::test]
    async fn whole_graph_reloads_every_ref_without_limit() {
        let git = Arc::new(FakeGit::new());
        git.set_commits(vec![commit("c1")]);
        let rc = coordinator(&git);
        rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.unwrap();
        git.clear_calls();

        rc.set_show_whole_graph(true).await.unwrap();
        let options = git.last_commit_options().unwrap();
        assert!(options.all_refs);
        assert_eq!(options.limit, None);
        assert!(!rc.limit_commits());
        let loads: Vec<_> = git
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("load_commits"))
            .collect();
        assert_eq!(loads, vec!["load_commits limit=None"]);

        rc.set_show_whole_graph(false).await.unwrap();
        assert!(!git.last_commit_options().unwrap().all_refs);
        assert!(!rc.show_whole_graph());
    }

    #[tokio::test]
    async fn log_order_applies_to_next_reload() {
        let git = Arc::new(FakeGit::new());
        let rc = coordinator(&git);
        assert_eq!(rc.log_order(), LogOrder::TopoOrder);

        rc.set_log_order(LogOrder::DateOrder).await.unwrap();
        assert_eq!(rc.log_order(), LogOrder::DateOrder);
        assert_eq!(git.last_commit_options().unwrap().order, LogOrder::DateOrder);
        // The limit stays on for a plain order change.
        assert_eq!(git.last_commit_limit(), Some(Some(300)));
    }

    #[tokio::test]
    async fn tags_scope_loads_tags_and_reconciles() {
        let git = Arc::new(FakeGit::new());
        git.create_tag("v1", "c1", None).unwrap();
        git.create_tag("v2", "c2", Some("second")).unwrap();
        let rc = coordinator(&git);

        rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.unwrap();
        let names: Vec<_> = rc.snapshot().tags.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["v2", "v1"]);
        rc.with_selections(|s| s.get_mut(PanelTag::Tags).select(1));

        git.create_tag("v3", "c3", None).unwrap();
        git.clear_calls();
        rc.refresh(RefreshScope::of(&[PanelTag::Tags], RefreshMode::Sync))
            .await
            .unwrap();
        let calls = git.calls();
        assert_eq!(calls.iter().filter(|c| c.as_str() == "load_tags").count(), 1);
        assert!(!calls.iter().any(|c| c.starts_with("load_commits")));
        assert_eq!(rc.snapshot().tags.len(), 3);
        assert_eq!(rc.selection(PanelTag::Tags), Some(1));
    }

    #[tokio::test]
    async fn rebase_scope_only_swaps_pending_entries() {
        let git = Arc::new(FakeGit::new());
        git.set_commits(vec![commit("c2"), commit("c1")]);
        let rc = coordinator(&git);
        rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.unwrap();

        git.set_todo(&["p2", "p1"]);
        rc.refresh(RefreshScope::of(&[PanelTag::RebaseCommits], RefreshMode::Sync))
            .await
            .unwrap();
        let shas: Vec<_> = rc.snapshot().commits.iter().map(|c| c.sha.clone()).collect();
        assert_eq!(shas, vec!["p2", "p1", "c2", "c1"]);
        assert_eq!(
            git.calls().iter().filter(|c| c.starts_with("load_commits")).count(),
            1
        );
    }

    #[tokio::test]
    async fn shutdown_stops_the_actor() {
        let git = Arc::new(FakeGit::new());
        let rc = coordinator(&git);
        rc.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rc.refresh(RefreshScope::all(RefreshMode::Sync)).await.is_err());
    }
}
