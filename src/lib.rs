//! Action orchestration and panel consistency for the lzgit git client.
//!
//! A [`Session`] owns one open repository. The UI sends user [`Verb`]s to an
//! [`Orchestrator`], which runs the git operations, walks any recovery flow,
//! and asks the [`RefreshCoordinator`] to reload the panels. The UI renders
//! from coordinator snapshots and listens for [`PanelEvent`]s.

pub mod command_log;
pub mod config;
pub mod error;
pub mod git_ops;
pub mod loaders;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod rebase_todo;
pub mod recovery;
pub mod refresh;
pub mod selection;
pub mod session;
pub mod state;
pub mod summary_cache;

#[cfg(test)]
mod testing;

pub use config::{EngineConfig, LogOrder};
pub use error::GitError;
pub use git_ops::{CheckoutOptions, GitCli, GitGateway};
pub use loaders::{EntityLoader, GitLoaders};
pub use models::{Branch, Commit, CommitStatus, ReflogEntry, Tag, TodoAction};
pub use orchestrator::{BisectVerb, FollowUp, OnRefNotFound, Orchestrator, Outcome, Verb};
pub use prompt::Prompter;
pub use recovery::FlowResult;
pub use refresh::{PanelEvent, PanelSnapshot, RefreshCoordinator, RefreshMode, RefreshScope};
pub use selection::{PanelSelection, PanelTag};
pub use session::Session;
pub use state::PendingActionState;
