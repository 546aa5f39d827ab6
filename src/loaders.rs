//! Entity loaders: turn git state into ordered lists of commits, branches,
//! tags and reflog entries.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use crate::config::LogOrder;
use crate::error::GitError;
use crate::git_ops::git_stdout;
use crate::models::{Branch, Commit, CommitStatus, ReflogEntry, Tag, Upstream, short_sha};
use crate::rebase_todo;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitLoadOptions {
    /// `None` loads the whole history.
    pub limit: Option<usize>,
    pub filter_path: Option<PathBuf>,
    pub ref_name: String,
    pub include_rebase_entries: bool,
    pub all_refs: bool,
    pub order: LogOrder,
}

impl Default for CommitLoadOptions {
    fn default() -> Self {
        Self {
            limit: Some(300),
            filter_path: None,
            ref_name: "HEAD".to_string(),
            include_rebase_entries: true,
            all_refs: false,
            order: LogOrder::TopoOrder,
        }
    }
}

pub trait EntityLoader: Send + Sync {
    fn load_commits(&self, options: &CommitLoadOptions) -> Result<Vec<Commit>, GitError>;
    /// Pending todo entries of a running rebase, newest first.
    fn load_rebasing_commits(&self) -> Result<Vec<Commit>, GitError>;
    /// Local branches, checked-out branch first, the rest by reflog recency.
    fn load_branches(&self, reflog: &[ReflogEntry]) -> Result<Vec<Branch>, GitError>;
    fn load_reflog(&self, filter_path: Option<&Path>) -> Result<Vec<ReflogEntry>, GitError>;
    /// Tags, newest first.
    fn load_tags(&self) -> Result<Vec<Tag>, GitError>;
}

pub struct GitLoaders {
    repo_root: PathBuf,
    reflog_limit: usize,
}

impl GitLoaders {
    pub fn new(repo_root: impl Into<PathBuf>, reflog_limit: usize) -> Self {
        Self {
            repo_root: repo_root.into(),
            reflog_limit,
        }
    }

    fn output(&self, args: &[&str]) -> Result<String, GitError> {
        git_stdout(&self.repo_root, args, &[])
    }

    fn todo_text(&self) -> Result<Option<String>, GitError> {
        let p = self.output(&["rev-parse", "--git-path", "rebase-merge/git-rebase-todo"])?;
        let path = self.repo_root.join(p.trim());
        if !path.exists() {
            return Ok(None);
        }
        rebase_todo::load_todo(&path).map(Some)
    }
}

impl EntityLoader for GitLoaders {
    fn load_commits(&self, options: &CommitLoadOptions) -> Result<Vec<Commit>, GitError> {
        let limit_s = options.limit.map(|n| format!("-{}", n));
        let mut args: Vec<&str> = vec![
            "log",
            "--no-color",
            options.order.as_flag(),
            "--format=%H%x00%P%x00%s",
        ];
        if let Some(l) = limit_s.as_deref() {
            args.push(l);
        }
        if options.all_refs {
            args.push("--all");
        } else {
            args.push(options.ref_name.as_str());
        }
        let path_s = options
            .filter_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());
        if let Some(p) = path_s.as_deref() {
            args.push("--follow");
            args.push("--");
            args.push(p);
        }

        let out = match self.output(&args) {
            Ok(out) => out,
            // A fresh repository has no HEAD yet.
            Err(GitError::RefNotFound(_)) => String::new(),
            Err(e) => return Err(e),
        };
        let mut commits = parse_log(&out);

        if options.include_rebase_entries {
            let pending = self.load_rebasing_commits()?;
            if !pending.is_empty() {
                if let Some(head) = commits.first_mut() {
                    head.status = CommitStatus::Selected;
                }
                commits = merge_rebasing_commits(&commits, pending);
            }
        }

        Ok(commits)
    }

    fn load_rebasing_commits(&self) -> Result<Vec<Commit>, GitError> {
        Ok(self
            .todo_text()?
            .map(|t| rebase_todo::rebasing_commits(&t))
            .unwrap_or_default())
    }

    fn load_branches(&self, reflog: &[ReflogEntry]) -> Result<Vec<Branch>, GitError> {
        let out = self.output(&[
            "for-each-ref",
            "--sort=-committerdate",
            "refs/heads",
            "--format=%(HEAD)%00%(refname:short)%00%(upstream:short)%00%(upstream:track)",
        ])?;
        let mut branches = parse_branches(&out);

        if !branches.iter().any(|b| b.is_checked_out) {
            if let Ok(head) = self.output(&["rev-parse", "HEAD"]) {
                let head = head.trim();
                if !head.is_empty() {
                    branches.insert(0, detached_head(head));
                }
            }
        }

        Ok(sort_by_recency(branches, reflog, now_unix()))
    }

    fn load_reflog(&self, filter_path: Option<&Path>) -> Result<Vec<ReflogEntry>, GitError> {
        let max = format!("--max-count={}", self.reflog_limit);
        let path_s = filter_path.map(|p| p.to_string_lossy().to_string());
        let mut args: Vec<&str> = vec![
            "log",
            "-g",
            "--no-color",
            max.as_str(),
            "--format=%H%x00%gD%x00%gs%x00%ct",
        ];
        if let Some(p) = path_s.as_deref() {
            args.push("--");
            args.push(p);
        }

        match self.output(&args) {
            Ok(out) => Ok(parse_reflog(&out)),
            Err(GitError::RefNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn load_tags(&self) -> Result<Vec<Tag>, GitError> {
        let out = self.output(&[
            "for-each-ref",
            "--sort=-creatordate",
            "refs/tags",
            "--format=%(refname:short)%00%(objectname)%00%(contents:subject)",
        ])?;
        Ok(parse_tags(&out))
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub(crate) fn detached_head(sha: &str) -> Branch {
    Branch {
        is_checked_out: true,
        detached: true,
        ..Branch::local(format!("HEAD detached at {}", short_sha(sha)))
    }
}

pub fn parse_log(text: &str) -> Vec<Commit> {
    let mut commits = Vec::new();
    for line in text.lines() {
        let mut it = line.splitn(3, '\0');
        let sha = it.next().unwrap_or("").trim().to_string();
        if sha.is_empty() {
            continue;
        }
        let parents = it
            .next()
            .unwrap_or("")
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let summary = it.next().unwrap_or("").trim().to_string();
        commits.push(Commit {
            sha,
            parents,
            summary,
            status: CommitStatus::Committed,
        });
    }
    commits
}

/// Replace whatever pending entries sit on top of `existing` with `fresh`.
pub fn merge_rebasing_commits(existing: &[Commit], fresh: Vec<Commit>) -> Vec<Commit> {
    let mut out = fresh;
    out.extend(existing.iter().filter(|c| !c.is_rebasing()).cloned());
    out
}

fn parse_track(track: &str) -> (Option<u32>, Option<u32>) {
    let t = track.trim().trim_start_matches('[').trim_end_matches(']');
    if t.is_empty() {
        return (Some(0), Some(0));
    }
    if t == "gone" {
        return (None, None);
    }

    let mut ahead = Some(0);
    let mut behind = Some(0);
    for part in t.split(',') {
        let mut words = part.split_whitespace();
        match (words.next(), words.next().and_then(|n| n.parse::<u32>().ok())) {
            (Some("ahead"), Some(n)) => ahead = Some(n),
            (Some("behind"), Some(n)) => behind = Some(n),
            _ => {}
        }
    }
    (ahead, behind)
}

pub fn parse_branches(text: &str) -> Vec<Branch> {
    let mut branches = Vec::new();
    for line in text.lines() {
        let mut it = line.split('\0');
        let head = it.next().unwrap_or("").trim();
        let name = it.next().unwrap_or("").trim().to_string();
        if name.is_empty() {
            continue;
        }
        let upstream = it
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.split_once('/'))
            .map(|(remote, branch)| Upstream {
                remote: remote.to_string(),
                branch: branch.to_string(),
            });
        let (ahead, behind) = if upstream.is_some() {
            parse_track(it.next().unwrap_or(""))
        } else {
            (None, None)
        };

        branches.push(Branch {
            upstream,
            ahead,
            behind,
            is_checked_out: head == "*",
            ..Branch::local(name)
        });
    }
    branches
}

pub fn parse_reflog(text: &str) -> Vec<ReflogEntry> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let mut it = line.splitn(4, '\0');
        let sha = it.next().unwrap_or("").trim().to_string();
        if sha.is_empty() {
            continue;
        }
        let selector = it.next().unwrap_or("").trim().to_string();
        let subject = it.next().unwrap_or("").trim().to_string();
        let unix_time = it.next().and_then(|s| s.trim().parse().ok()).unwrap_or(0);
        entries.push(ReflogEntry {
            sha,
            selector,
            subject,
            unix_time,
        });
    }
    entries
}

pub fn parse_tags(text: &str) -> Vec<Tag> {
    text.lines()
        .filter_map(|line| {
            let mut it = line.splitn(3, '\0');
            let name = it.next()?.trim();
            if name.is_empty() {
                return None;
            }
            Some(Tag {
                name: name.to_string(),
                sha: it.next().unwrap_or("").trim().to_string(),
                message: it.next().unwrap_or("").trim().to_string(),
            })
        })
        .collect()
}

pub fn time_ago(then: i64, now: i64) -> String {
    let secs = (now - then).max(0);
    const UNITS: &[(i64, &str)] = &[
        (60 * 60 * 24 * 365, "y"),
        (60 * 60 * 24 * 30, "M"),
        (60 * 60 * 24 * 7, "w"),
        (60 * 60 * 24, "d"),
        (60 * 60, "h"),
        (60, "m"),
    ];
    for (size, label) in UNITS {
        if secs >= *size {
            return format!("{}{}", secs / size, label);
        }
    }
    format!("{}s", secs)
}

/// Order branches by how recently they were checked out.
///
/// Branches named in `checkout: moving from A to B` reflog subjects come
/// first, newest first, then everything else in loader order. The checked-out
/// branch is always moved to the front.
pub fn sort_by_recency(branches: Vec<Branch>, reflog: &[ReflogEntry], now: i64) -> Vec<Branch> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut recent: Vec<(&str, i64)> = Vec::new();
    for entry in reflog {
        let Some(rest) = entry.subject.strip_prefix("checkout: moving from ") else {
            continue;
        };
        let Some((from, to)) = rest.split_once(" to ") else {
            continue;
        };
        for name in [from.trim(), to.trim()] {
            if !name.is_empty() && seen.insert(name) {
                recent.push((name, entry.unix_time));
            }
        }
    }

    let mut remaining: Vec<Option<Branch>> = branches.into_iter().map(Some).collect();
    let mut sorted = Vec::with_capacity(remaining.len());
    for (name, when) in recent {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|b| b.as_ref().is_some_and(|b| b.name == name))
        {
            if let Some(mut b) = slot.take() {
                b.recency = Some(time_ago(when, now));
                sorted.push(b);
            }
        }
    }
    sorted.extend(remaining.into_iter().flatten());

    if let Some(pos) = sorted.iter().position(|b| b.is_checked_out) {
        let head = sorted.remove(pos);
        sorted.insert(0, head);
    }
    sorted
}
