//! The git gateway: every mutating git invocation goes through here.
//!
//! [`GitGateway`] is the seam the orchestrator talks to. [`GitCli`] is the
//! production implementation that shells out to `git`; tests substitute a
//! scripted fake. All calls block on the subprocess, so async callers run
//! them on `spawn_blocking`.

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use tracing::debug;

use crate::error::{GitError, classify_failure};
use crate::models::{Commit, Direction, RebaseCommand, ResetStrength, TodoAction};
use crate::rebase_todo;
use crate::state::{BisectInfo, parse_bisect_refs};

#[derive(Clone, Debug, Default)]
pub struct CheckoutOptions {
    pub force: bool,
    pub env_vars: Vec<(String, String)>,
}

pub trait GitGateway: Send + Sync {
    fn checkout(&self, reference: &str, options: &CheckoutOptions) -> Result<(), GitError>;

    /// Start a rebase that applies `action` to `commits[index]`.
    fn interactive_rebase(
        &self,
        commits: &[Commit],
        index: usize,
        action: TodoAction,
    ) -> Result<(), GitError>;
    /// Swap `commits[index]` with the commit below it.
    fn move_commit_down(&self, commits: &[Commit], index: usize) -> Result<(), GitError>;
    fn move_todo_entry(&self, index: usize, direction: Direction) -> Result<(), GitError>;
    fn edit_todo_action(&self, index: usize, action: TodoAction) -> Result<(), GitError>;
    fn reword_commit(
        &self,
        commits: &[Commit],
        index: usize,
        message: &str,
    ) -> Result<(), GitError>;
    fn amend_to(&self, sha: &str) -> Result<(), GitError>;
    fn squash_all_above_fixups(&self, sha: &str) -> Result<(), GitError>;
    fn rebase_branch(&self, name: &str) -> Result<(), GitError>;
    fn rebase_command(&self, command: RebaseCommand) -> Result<(), GitError>;
    /// Zero-based index of the todo entry a running rebase is on, or `None`.
    fn rebase_progress(&self) -> Result<Option<usize>, GitError>;
    fn merge_in_progress(&self) -> Result<bool, GitError>;

    fn revert(&self, sha: &str) -> Result<(), GitError>;
    fn revert_merge(&self, sha: &str, parent_number: usize) -> Result<(), GitError>;
    fn create_fixup_commit(&self, sha: &str) -> Result<(), GitError>;
    fn create_tag(&self, name: &str, sha: &str, message: Option<&str>) -> Result<(), GitError>;
    fn commit_first_line(&self, sha: &str) -> Result<String, GitError>;

    fn bisect_info(&self) -> Result<BisectInfo, GitError>;
    fn bisect_start(&self) -> Result<(), GitError>;
    fn bisect_mark(&self, reference: &str, term: &str) -> Result<(), GitError>;
    fn bisect_skip(&self, reference: &str) -> Result<(), GitError>;
    fn bisect_reset(&self) -> Result<(), GitError>;
    /// `git rev-list <sha>`, newest first.
    fn bisect_rev_list(&self, sha: &str) -> Result<Vec<String>, GitError>;

    fn stash_save(&self, message: &str) -> Result<(), GitError>;
    fn stash_pop(&self, index: usize) -> Result<(), GitError>;

    fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError>;
    fn new_branch(&self, name: &str, base: &str) -> Result<(), GitError>;
    fn rename_branch(&self, old: &str, new: &str) -> Result<(), GitError>;
    fn merge(&self, name: &str) -> Result<(), GitError>;
    fn pull(&self) -> Result<(), GitError>;
    fn pull_fast_forward_only(&self) -> Result<(), GitError>;
    fn fetch(&self) -> Result<(), GitError>;
    /// Move the local branch `name`, which is not checked out, to its
    /// upstream `remote/upstream` without touching the worktree.
    fn fast_forward(&self, name: &str, remote: &str, upstream: &str) -> Result<(), GitError>;
    fn reset_to(&self, reference: &str, strength: ResetStrength) -> Result<(), GitError>;
    fn is_head_detached(&self) -> Result<bool, GitError>;
}

pub(crate) fn run_git(cwd: &Path, args: &[&str], env: &[(String, String)]) -> io::Result<Output> {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(cwd)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GCM_INTERACTIVE", "never")
        .env("GIT_PAGER", "cat")
        .env("PAGER", "cat")
        .env("GIT_EDITOR", ":")
        .env("EDITOR", ":")
        .env("GIT_SEQUENCE_EDITOR", ":")
        .env("GIT_MERGE_AUTOEDIT", "no")
        .env("LC_ALL", "C");
    for (k, v) in env {
        cmd.env(k, v);
    }
    cmd.output()
}

/// Run git and return stdout, classifying any failure.
pub(crate) fn git_stdout(
    cwd: &Path,
    args: &[&str],
    env: &[(String, String)],
) -> Result<String, GitError> {
    debug!(command = %format!("git {}", args.join(" ")), "running git");
    let out = run_git(cwd, args, env).map_err(|e| GitError::ExternalToolFailure(e.to_string()))?;
    if !out.status.success() {
        // git prints some conflict reports on stdout.
        let mut text = String::from_utf8_lossy(&out.stderr).to_string();
        let stdout = String::from_utf8_lossy(&out.stdout);
        if !stdout.trim().is_empty() {
            text.push('\n');
            text.push_str(&stdout);
        }
        return Err(classify_failure(out.status.code(), &text));
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

/// Run a blocking git closure off the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, GitError>
where
    F: FnOnce() -> Result<T, GitError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(GitError::join)?
}

pub struct GitCli {
    repo_root: PathBuf,
}

impl GitCli {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn run(&self, args: &[&str]) -> Result<(), GitError> {
        git_stdout(&self.repo_root, args, &[]).map(|_| ())
    }

    fn output(&self, args: &[&str]) -> Result<String, GitError> {
        git_stdout(&self.repo_root, args, &[])
    }

    /// Resolve a path inside the git directory (works for worktrees).
    fn git_path(&self, name: &str) -> Result<PathBuf, GitError> {
        let p = self.output(&["rev-parse", "--git-path", name])?;
        Ok(self.repo_root.join(p.trim()))
    }

    fn read_git_file(&self, name: &str) -> Result<Option<String>, GitError> {
        let path = self.git_path(name)?;
        match fs::read_to_string(&path) {
            Ok(s) => Ok(Some(s.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GitError::ExternalToolFailure(e.to_string())),
        }
    }

    fn todo_path(&self) -> Result<PathBuf, GitError> {
        self.git_path("rebase-merge/git-rebase-todo")
    }

    /// Run `git rebase -i` with a prepared todo list in place of the editor.
    fn rebase_with_todo(&self, todo: &str, base: &str) -> Result<(), GitError> {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "lzgit-todo-{}-{}.txt",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
        ));
        fs::write(&path, todo).map_err(|e| GitError::ExternalToolFailure(e.to_string()))?;

        let editor = format!("cp '{}'", path.display());
        let result = git_stdout(
            &self.repo_root,
            &[
                "rebase",
                "--interactive",
                "--autostash",
                "--no-autosquash",
                base,
            ],
            &[("GIT_SEQUENCE_EDITOR".to_string(), editor)],
        );

        let _ = fs::remove_file(&path);
        result.map(|_| ())
    }

    fn autosquash_from(&self, sha: &str) -> Result<(), GitError> {
        let base = format!("{}^", sha);
        self.run(&[
            "rebase",
            "--interactive",
            "--autostash",
            "--autosquash",
            base.as_str(),
        ])
    }

    fn dir_exists(&self, name: &str) -> Result<bool, GitError> {
        Ok(self.git_path(name)?.exists())
    }
}

impl GitGateway for GitCli {
    fn checkout(&self, reference: &str, options: &CheckoutOptions) -> Result<(), GitError> {
        let mut args = vec!["checkout"];
        if options.force {
            args.push("--force");
        }
        args.push(reference);
        git_stdout(&self.repo_root, &args, &options.env_vars).map(|_| ())
    }

    fn interactive_rebase(
        &self,
        commits: &[Commit],
        index: usize,
        action: TodoAction,
    ) -> Result<(), GitError> {
        let (todo, base) = rebase_todo::build_single_action_todo(commits, index, action)?;
        self.rebase_with_todo(&todo, &base)
    }

    fn move_commit_down(&self, commits: &[Commit], index: usize) -> Result<(), GitError> {
        let (todo, base) = rebase_todo::build_swap_todo(commits, index)?;
        self.rebase_with_todo(&todo, &base)
    }

    fn move_todo_entry(&self, index: usize, direction: Direction) -> Result<(), GitError> {
        let path = self.todo_path()?;
        rebase_todo::rewrite_todo_file(&path, |text| {
            rebase_todo::move_entry(text, index, direction)
        })
    }

    fn edit_todo_action(&self, index: usize, action: TodoAction) -> Result<(), GitError> {
        let path = self.todo_path()?;
        rebase_todo::rewrite_todo_file(&path, |text| {
            rebase_todo::edit_action(text, index, action)
        })
    }

    fn reword_commit(
        &self,
        commits: &[Commit],
        index: usize,
        message: &str,
    ) -> Result<(), GitError> {
        let msg = message.trim();
        if msg.is_empty() {
            return Err(GitError::InvalidOperation("Empty commit message".to_string()));
        }
        if index > 0 {
            self.interactive_rebase(commits, index, TodoAction::Edit)?;
        }
        self.run(&["commit", "--allow-empty", "--amend", "--only", "-m", msg])?;
        if index > 0 {
            self.rebase_command(RebaseCommand::Continue)?;
        }
        Ok(())
    }

    fn amend_to(&self, sha: &str) -> Result<(), GitError> {
        let fixup = format!("--fixup={}", sha);
        self.run(&["commit", fixup.as_str()])?;
        self.autosquash_from(sha)
    }

    fn squash_all_above_fixups(&self, sha: &str) -> Result<(), GitError> {
        self.autosquash_from(sha)
    }

    fn rebase_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["rebase", "--autostash", name])
    }

    fn rebase_command(&self, command: RebaseCommand) -> Result<(), GitError> {
        let flag = format!("--{}", command.as_arg());
        if self.rebase_progress()?.is_some() {
            return self.run(&["rebase", flag.as_str()]);
        }
        if self.merge_in_progress()? {
            if command == RebaseCommand::Skip {
                return Err(GitError::InvalidOperation(
                    "a merge cannot be skipped".to_string(),
                ));
            }
            return self.run(&["merge", flag.as_str()]);
        }
        Err(GitError::InvalidOperation(
            "No rebase or merge in progress".to_string(),
        ))
    }

    fn rebase_progress(&self) -> Result<Option<usize>, GitError> {
        if self.dir_exists("rebase-merge")? {
            let step = self
                .read_git_file("rebase-merge/msgnum")?
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(1);
            return Ok(Some(step.saturating_sub(1)));
        }
        if self.dir_exists("rebase-apply")? {
            let step = self
                .read_git_file("rebase-apply/next")?
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(1);
            return Ok(Some(step.saturating_sub(1)));
        }
        Ok(None)
    }

    fn merge_in_progress(&self) -> Result<bool, GitError> {
        let out = run_git(
            &self.repo_root,
            &["rev-parse", "-q", "--verify", "MERGE_HEAD"],
            &[],
        )
        .map_err(|e| GitError::ExternalToolFailure(e.to_string()))?;
        Ok(out.status.success())
    }

    fn revert(&self, sha: &str) -> Result<(), GitError> {
        self.run(&["revert", "--no-edit", sha])
    }

    fn revert_merge(&self, sha: &str, parent_number: usize) -> Result<(), GitError> {
        let parent = parent_number.to_string();
        self.run(&["revert", "--no-edit", sha, "-m", parent.as_str()])
    }

    fn create_fixup_commit(&self, sha: &str) -> Result<(), GitError> {
        let fixup = format!("--fixup={}", sha);
        self.run(&["commit", fixup.as_str()])
    }

    fn create_tag(&self, name: &str, sha: &str, message: Option<&str>) -> Result<(), GitError> {
        match message {
            Some(msg) => self.run(&["tag", name, sha, "-m", msg]),
            None => self.run(&["tag", name, sha]),
        }
    }

    fn commit_first_line(&self, sha: &str) -> Result<String, GitError> {
        let out = self.output(&["log", "-1", "--format=%s", sha])?;
        Ok(out.trim().to_string())
    }

    fn bisect_info(&self) -> Result<BisectInfo, GitError> {
        let Some(start) = self.read_git_file("BISECT_START")? else {
            return Ok(BisectInfo::default());
        };

        let mut info = BisectInfo {
            start_ref: Some(start),
            ..BisectInfo::default()
        };

        if let Some(terms) = self.read_git_file("BISECT_TERMS")? {
            let mut it = terms.lines().map(str::trim).filter(|l| !l.is_empty());
            if let (Some(new), Some(old)) = (it.next(), it.next()) {
                info.new_term = new.to_string();
                info.old_term = old.to_string();
            }
        }

        info.current_sha = self.read_git_file("BISECT_EXPECTED_REV")?;

        let refs = self.output(&[
            "for-each-ref",
            "refs/bisect",
            "--format=%(refname) %(objectname)",
        ])?;
        info.statuses = parse_bisect_refs(&refs, &info.new_term, &info.old_term);
        Ok(info)
    }

    fn bisect_start(&self) -> Result<(), GitError> {
        self.run(&["bisect", "start"])
    }

    fn bisect_mark(&self, reference: &str, term: &str) -> Result<(), GitError> {
        self.run(&["bisect", term, reference])
    }

    fn bisect_skip(&self, reference: &str) -> Result<(), GitError> {
        self.run(&["bisect", "skip", reference])
    }

    fn bisect_reset(&self) -> Result<(), GitError> {
        self.run(&["bisect", "reset"])
    }

    fn bisect_rev_list(&self, sha: &str) -> Result<Vec<String>, GitError> {
        let out = self.output(&["rev-list", sha])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn stash_save(&self, message: &str) -> Result<(), GitError> {
        self.run(&["stash", "push", "-m", message])
    }

    fn stash_pop(&self, index: usize) -> Result<(), GitError> {
        let selector = format!("stash@{{{}}}", index);
        self.run(&["stash", "pop", selector.as_str()])
    }

    fn delete_branch(&self, name: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, name])
    }

    fn new_branch(&self, name: &str, base: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-b", name, base])
    }

    fn rename_branch(&self, old: &str, new: &str) -> Result<(), GitError> {
        self.run(&["branch", "--move", old, new])
    }

    fn merge(&self, name: &str) -> Result<(), GitError> {
        self.run(&["merge", "--no-edit", name])
    }

    fn pull(&self) -> Result<(), GitError> {
        self.run(&["pull", "--rebase"])
    }

    fn pull_fast_forward_only(&self) -> Result<(), GitError> {
        self.run(&["pull", "--ff-only"])
    }

    fn fetch(&self) -> Result<(), GitError> {
        self.run(&["fetch"])
    }

    fn fast_forward(&self, name: &str, remote: &str, upstream: &str) -> Result<(), GitError> {
        let refspec = format!("{}:{}", upstream, name);
        self.run(&["fetch", remote, refspec.as_str()])
    }

    fn reset_to(&self, reference: &str, strength: ResetStrength) -> Result<(), GitError> {
        self.run(&["reset", strength.as_flag(), reference])
    }

    fn is_head_detached(&self) -> Result<bool, GitError> {
        let out = run_git(&self.repo_root, &["symbolic-ref", "-q", "HEAD"], &[])
            .map_err(|e| GitError::ExternalToolFailure(e.to_string()))?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(classify_failure(
                out.status.code(),
                &String::from_utf8_lossy(&out.stderr),
            )),
        }
    }
}
